//! 症状关键词分级分类器
//!
//! 将自由文本症状描述映射到紧急程度、分诊评分、推荐科室与处置建议。
//! 分级扫描按 危急 → 高 → 中等 的固定顺序短路：命中危急关键词时
//! 无论还命中多少低级关键词都直接判定为危急。

use intake_core::{AgeBracket, IntakeError, Result, TriageResult, UrgencyLevel};
use tracing::debug;

/// 危急级关键词（任一命中即判定危急）
const CRITICAL_TERMS: &[&str] = &[
    "chest pain",
    "severe",
    "bleeding",
    "unconscious",
    "difficulty breathing",
    "critical",
];

/// 高紧急级关键词
const HIGH_TERMS: &[&str] = &["pain", "fever", "serious", "high"];

/// 危急级固定处置建议
const CRITICAL_ACTIONS: &[&str] = &[
    "Proceed to emergency care immediately",
    "Do not eat or drink until assessed",
    "Notify triage desk on arrival",
];

/// 危急级固定风险因素
const CRITICAL_RISKS: &[&str] = &[
    "Potentially life-threatening presentation",
    "Condition may deteriorate rapidly",
];

/// 高紧急级固定处置建议
const HIGH_ACTIONS: &[&str] = &[
    "Check in at urgent care within the hour",
    "Monitor symptoms and report any worsening",
];

/// 高紧急级固定风险因素
const HIGH_RISKS: &[&str] = &["Symptoms may worsen without timely care"];

/// 中等级固定处置建议
const MODERATE_ACTIONS: &[&str] = &[
    "Register at general medicine",
    "Rest and stay hydrated while waiting",
];

/// 中等级固定风险因素
const MODERATE_RISKS: &[&str] = &[];

/// 对症状文本做分级分类
///
/// `symptoms_text` 去除首尾空白后必须非空，否则返回验证错误；
/// 对合法输入本函数是全函数，永不失败。`department_hint` 仅对
/// 非危急级别生效：危急情况始终路由到急诊。
pub fn classify(
    symptoms_text: &str,
    age_bracket: Option<AgeBracket>,
    department_hint: Option<&str>,
) -> Result<TriageResult> {
    if symptoms_text.trim().is_empty() {
        return Err(IntakeError::Validation(
            "symptoms text must not be empty".to_string(),
        ));
    }

    let text = symptoms_text.to_lowercase();

    let critical_matches: Vec<&str> = CRITICAL_TERMS
        .iter()
        .filter(|term| text.contains(**term))
        .copied()
        .collect();

    let mut result = if !critical_matches.is_empty() {
        // 置信度随命中证据数量单调递增，封顶 0.9
        let confidence =
            (0.8 + 0.02 * (critical_matches.len() as f64 - 1.0)).min(0.9);
        debug!(
            "Critical tier matched terms {:?} in symptoms",
            critical_matches
        );
        TriageResult {
            urgency_level: UrgencyLevel::Critical,
            confidence,
            triage_score: 9,
            recommended_department: "emergency care".to_string(),
            estimated_wait_minutes: 0,
            recommended_actions: to_strings(CRITICAL_ACTIONS),
            risk_factors: to_strings(CRITICAL_RISKS),
        }
    } else if HIGH_TERMS.iter().any(|term| text.contains(*term)) {
        TriageResult {
            urgency_level: UrgencyLevel::High,
            confidence: 0.7,
            triage_score: 7,
            recommended_department: "urgent care".to_string(),
            estimated_wait_minutes: 15,
            recommended_actions: to_strings(HIGH_ACTIONS),
            risk_factors: to_strings(HIGH_RISKS),
        }
    } else {
        TriageResult {
            urgency_level: UrgencyLevel::Moderate,
            confidence: 0.6,
            triage_score: 5,
            recommended_department: "general medicine".to_string(),
            estimated_wait_minutes: 45,
            recommended_actions: to_strings(MODERATE_ACTIONS),
            risk_factors: to_strings(MODERATE_RISKS),
        }
    };

    if matches!(age_bracket, Some(AgeBracket::Pediatric)) {
        result
            .risk_factors
            .push("Pediatric patient - lower symptom tolerance".to_string());
        result
            .recommended_actions
            .push("Flag as pediatric at registration".to_string());
    }

    // 科室提示仅在非危急时覆盖推荐科室
    if result.urgency_level != UrgencyLevel::Critical {
        if let Some(hint) = department_hint {
            if !hint.trim().is_empty() {
                result.recommended_department = hint.trim().to_string();
            }
        }
    }

    Ok(result)
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
