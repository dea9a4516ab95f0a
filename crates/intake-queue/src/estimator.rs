//! 等待时长估算器
//!
//! 排序函数是纯函数，只依赖传入的条目集合，与客户端本地状态无关：
//! 两个客户端在同一时刻对同一服务轮询必须推导出相同的排名。

use intake_core::{QueueEntry, QueueStatus};
use std::cmp::Ordering;

/// 无经验数据时的默认单患者平均处理时长（分钟）
pub const DEFAULT_AVERAGE_SERVICE_MINUTES: u32 = 15;

/// 等待条目的全序比较
///
/// 优先级降序，入队时间升序（同优先级内先到先服务），最后以
/// 条目ID升序兜底，保证严格全序与确定性。
pub fn compare_waiting(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// 计算条目的排名与预计等待时长
///
/// `position` = 1 + 严格排在该条目之前的等待条目数；
/// `estimated_wait_minutes` = position × 平均处理时长。
/// 只统计 `Waiting` 状态的条目，已叫号/就诊/终态条目不参与排序。
pub fn estimate(
    entry: &QueueEntry,
    all_entries_for_service: &[QueueEntry],
    average_service_minutes: u32,
) -> (u32, u32) {
    let ahead = all_entries_for_service
        .iter()
        .filter(|other| {
            other.status == QueueStatus::Waiting
                && other.id != entry.id
                && compare_waiting(other, entry) == Ordering::Less
        })
        .count() as u32;

    let position = ahead + 1;
    (position, position * average_service_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use intake_core::Priority;
    use uuid::Uuid;

    fn entry(priority: Priority, joined_offset_secs: i64) -> QueueEntry {
        QueueEntry {
            id: Uuid::new_v4(),
            queue_number: 0,
            patient_ref: Uuid::new_v4(),
            service_ref: Uuid::new_v4(),
            priority,
            status: QueueStatus::Waiting,
            position: 0,
            estimated_wait_minutes: 0,
            joined_at: Utc::now() + Duration::seconds(joined_offset_secs),
            called_at: None,
        }
    }

    #[test]
    fn test_fifo_within_same_priority() {
        let a = entry(Priority::Normal, 0);
        let b = entry(Priority::Normal, 10);
        let c = entry(Priority::Normal, 20);
        let all = vec![a.clone(), b.clone(), c.clone()];

        assert_eq!(estimate(&a, &all, 15), (1, 15));
        assert_eq!(estimate(&b, &all, 15), (2, 30));
        assert_eq!(estimate(&c, &all, 15), (3, 45));
    }

    #[test]
    fn test_urgent_admission_shifts_lower_priorities() {
        let a = entry(Priority::Normal, 0);
        let b = entry(Priority::Normal, 10);
        let c = entry(Priority::Normal, 20);
        let d = entry(Priority::Urgent, 30); // 最晚加入但优先级最高
        let all = vec![a.clone(), b.clone(), c.clone(), d.clone()];

        assert_eq!(estimate(&d, &all, 15), (1, 15));
        assert_eq!(estimate(&a, &all, 15), (2, 30));
        assert_eq!(estimate(&b, &all, 15), (3, 45));
        assert_eq!(estimate(&c, &all, 15), (4, 60));
    }

    #[test]
    fn test_non_waiting_entries_excluded() {
        let mut a = entry(Priority::Urgent, 0);
        let b = entry(Priority::Normal, 10);
        a.status = QueueStatus::Called;
        let all = vec![a, b.clone()];

        // 已叫号的紧急条目不再占用队列位置
        assert_eq!(estimate(&b, &all, 15), (1, 15));
    }

    #[test]
    fn test_ordering_is_strict_and_deterministic() {
        let mut entries: Vec<QueueEntry> = vec![
            entry(Priority::Low, 5),
            entry(Priority::Urgent, 40),
            entry(Priority::Normal, 0),
            entry(Priority::High, 30),
            entry(Priority::Normal, 0),
        ];
        // 两个相同 (priority, joined_at) 的条目由ID兜底区分
        entries[4].joined_at = entries[2].joined_at;

        let mut sorted_a = entries.clone();
        sorted_a.sort_by(compare_waiting);
        let mut sorted_b = entries.clone();
        sorted_b.sort_by(compare_waiting);

        let ids_a: Vec<_> = sorted_a.iter().map(|e| e.id).collect();
        let ids_b: Vec<_> = sorted_b.iter().map(|e| e.id).collect();
        assert_eq!(ids_a, ids_b);

        // 任意两个不同条目必有严格先后
        for i in 0..entries.len() {
            for j in 0..entries.len() {
                if i != j {
                    assert_ne!(
                        compare_waiting(&entries[i], &entries[j]),
                        Ordering::Equal
                    );
                }
            }
        }

        // 反对称性
        for i in 0..entries.len() {
            for j in 0..entries.len() {
                if i != j {
                    assert_eq!(
                        compare_waiting(&entries[i], &entries[j]),
                        compare_waiting(&entries[j], &entries[i]).reverse()
                    );
                }
            }
        }
    }

    #[test]
    fn test_position_at_least_one_and_exact_formula() {
        let a = entry(Priority::Low, 0);
        let all = vec![a.clone()];
        for avg in [1, 15, 30] {
            let (position, minutes) = estimate(&a, &all, avg);
            assert!(position >= 1);
            assert_eq!(minutes, position * avg);
        }
    }
}
