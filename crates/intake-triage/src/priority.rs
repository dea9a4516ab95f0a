//! 紧急程度到队列优先级的映射

use intake_core::{Priority, UrgencyLevel};
use tracing::debug;

/// 将分诊紧急程度映射为队列优先级
pub fn to_priority(urgency: UrgencyLevel) -> Priority {
    match urgency {
        UrgencyLevel::Critical => Priority::Urgent,
        UrgencyLevel::High => Priority::High,
        UrgencyLevel::Moderate => Priority::Normal,
        UrgencyLevel::Low => Priority::Low,
    }
}

/// 合并自动分诊优先级与用户自选优先级
///
/// 取两者中较高的一个：自动分类可能在不安全方向出错，
/// 系统绝不基于它降低患者的自报紧急程度。
pub fn merge_priority(auto: Priority, user_selected: Option<Priority>) -> Priority {
    match user_selected {
        Some(user) => {
            let merged = auto.max(user);
            if merged != auto {
                debug!(
                    "User-selected priority {:?} overrides classified {:?}",
                    user, auto
                );
            }
            merged
        }
        None => auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_mapping() {
        assert_eq!(to_priority(UrgencyLevel::Critical), Priority::Urgent);
        assert_eq!(to_priority(UrgencyLevel::High), Priority::High);
        assert_eq!(to_priority(UrgencyLevel::Moderate), Priority::Normal);
        assert_eq!(to_priority(UrgencyLevel::Low), Priority::Low);
    }

    #[test]
    fn test_priority_total_order() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_merge_never_downgrades() {
        // 用户自报更紧急：采纳用户的
        assert_eq!(
            merge_priority(Priority::Normal, Some(Priority::Urgent)),
            Priority::Urgent
        );
        // 自动分类更紧急：不因用户选择降级
        assert_eq!(
            merge_priority(Priority::Urgent, Some(Priority::Low)),
            Priority::Urgent
        );
        assert_eq!(merge_priority(Priority::High, None), Priority::High);
        assert_eq!(
            merge_priority(Priority::Normal, Some(Priority::Normal)),
            Priority::Normal
        );
    }
}
