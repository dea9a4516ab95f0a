//! 分诊演示程序
//!
//! 展示本地关键词分诊、优先级映射与远程分诊失败时的降级回退。

use async_trait::async_trait;
use intake_core::{AgeBracket, IntakeError, Result, TriageResult};
use intake_integration::{RemoteClassifier, TriageService};
use std::sync::Arc;

/// 模拟不可用的远程分诊服务
struct OfflineClassifier;

#[async_trait]
impl RemoteClassifier for OfflineClassifier {
    async fn classify(
        &self,
        _symptoms_text: &str,
        _age_bracket: Option<AgeBracket>,
    ) -> Result<TriageResult> {
        Err(IntakeError::External("triage service offline".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🩺 症状分诊演示\n");

    // 1. 本地分类器
    for text in [
        "severe chest pain and difficulty breathing",
        "fever and muscle pain since yesterday",
        "runny nose and sneezing",
    ] {
        let result = intake_triage::classify(text, None, None)?;
        let priority = intake_triage::to_priority(result.urgency_level);
        println!("📋 \"{}\"", text);
        println!(
            "   紧急程度 {:?}，评分 {}，置信度 {:.2}",
            result.urgency_level, result.triage_score, result.confidence
        );
        println!(
            "   推荐科室 {}，基线等待 {} 分钟，队列优先级 {:?}\n",
            result.recommended_department, result.estimated_wait_minutes, priority
        );
    }

    // 2. 远程分诊不可用时的降级回退
    let service = TriageService::with_remote(Arc::new(OfflineClassifier));
    let outcome = service
        .classify("severe bleeding after fall", Some(AgeBracket::Pediatric), None)
        .await?;

    println!("🔌 远程分诊不可用，本地回退:");
    println!(
        "   紧急程度 {:?}，降级模式: {}",
        outcome.result.urgency_level,
        outcome.is_degraded()
    );
    for risk in &outcome.result.risk_factors {
        println!("   风险因素: {}", risk);
    }

    Ok(())
}
