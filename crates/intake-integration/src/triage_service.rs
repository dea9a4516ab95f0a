//! 分诊服务
//!
//! 优先调用远程AI分诊，任何失败都回退到本地关键词分类器。
//! 回退不是面向用户的错误：流程照常继续，只把"结果可能不够
//! 准确"的降级标记透出给界面。

use crate::connectors::RemoteClassifier;
use intake_core::{AgeBracket, Result, TriageResult};
use std::sync::Arc;
use tracing::{info, warn};

/// 分类结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    Remote,        // 远程AI分诊
    LocalFallback, // 本地关键词回退
}

/// 分类结果及其来源
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    pub result: TriageResult,
    pub source: ClassificationSource,
}

impl ClassificationOutcome {
    /// 是否处于降级模式（应提示用户结果可能不够准确）
    pub fn is_degraded(&self) -> bool {
        self.source == ClassificationSource::LocalFallback
    }
}

/// 分诊服务
///
/// 远程分类器可选；未配置时直接使用本地分类器且不视为降级
/// 以外的任何异常。
pub struct TriageService {
    remote: Option<Arc<dyn RemoteClassifier>>,
}

impl TriageService {
    /// 仅使用本地分类器
    pub fn local_only() -> Self {
        Self { remote: None }
    }

    /// 配置远程分类器
    pub fn with_remote(remote: Arc<dyn RemoteClassifier>) -> Self {
        Self { remote: Some(remote) }
    }

    /// 对症状文本分诊
    ///
    /// 空输入的验证错误直接返回；远程调用失败只记录告警并回退，
    /// 绝不因此中断流程。
    pub async fn classify(
        &self,
        symptoms_text: &str,
        age_bracket: Option<AgeBracket>,
        department_hint: Option<&str>,
    ) -> Result<ClassificationOutcome> {
        // 先做输入校验：无论走哪条路径，空输入都是调用方错误
        intake_core::utils::require_non_empty(symptoms_text, "symptoms text")?;

        if let Some(remote) = &self.remote {
            match remote.classify(symptoms_text, age_bracket).await {
                Ok(result) => {
                    info!(
                        "Remote classification: {:?} (confidence {:.2})",
                        result.urgency_level, result.confidence
                    );
                    return Ok(ClassificationOutcome {
                        result,
                        source: ClassificationSource::Remote,
                    });
                }
                Err(e) => {
                    warn!("Remote classifier unavailable, using local fallback: {}", e);
                }
            }
        }

        let result = intake_triage::classify(symptoms_text, age_bracket, department_hint)?;
        Ok(ClassificationOutcome {
            result,
            source: ClassificationSource::LocalFallback,
        })
    }
}
