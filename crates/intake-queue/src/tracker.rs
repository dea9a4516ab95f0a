//! 队列状态跟踪
//!
//! 管理队列条目的生命周期状态转换，并以固定间隔轮询外部权威状态、
//! 刷新派生的排名与等待时长。轮询定时器是可取消的句柄，视图销毁
//! 时必须停止，避免回调泄漏到已销毁的上下文。

use crate::estimator;
use async_trait::async_trait;
use intake_core::{IntakeError, QueueEntry, QueueStatus, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 状态转换动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueAction {
    Call,         // 叫号（外部触发，轮询观察到）
    StartService, // 开始就诊（外部触发）
    Complete,     // 完成（外部触发）
    Leave,        // 离开队列（本核心唯一可主动发起的转换）
}

/// 队列状态机
///
/// 合法转换：Waiting→Called→Serving→Completed，以及
/// Waiting→Cancelled、Called→Cancelled。其余一律拒绝。
#[derive(Debug)]
pub struct QueueStateMachine {
    transitions: HashMap<(QueueStatus, QueueAction), QueueStatus>,
}

impl QueueStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((QueueStatus::Waiting, QueueAction::Call), QueueStatus::Called);
        transitions.insert((QueueStatus::Called, QueueAction::StartService), QueueStatus::Serving);
        transitions.insert((QueueStatus::Serving, QueueAction::Complete), QueueStatus::Completed);
        transitions.insert((QueueStatus::Waiting, QueueAction::Leave), QueueStatus::Cancelled);
        transitions.insert((QueueStatus::Called, QueueAction::Leave), QueueStatus::Cancelled);

        Self { transitions }
    }

    /// 检查状态转换是否合法
    pub fn can_transition(&self, from: QueueStatus, action: QueueAction) -> bool {
        self.transitions.contains_key(&(from, action))
    }

    /// 执行状态转换
    pub fn transition(&self, from: QueueStatus, action: QueueAction) -> Result<QueueStatus> {
        match self.transitions.get(&(from, action)) {
            Some(to) => Ok(*to),
            None => Err(IntakeError::InvalidTransition {
                from: format!("{:?}", from),
                action: format!("{:?}", action),
            }),
        }
    }

    /// 获取某状态下所有可执行的动作
    pub fn possible_actions(&self, current: QueueStatus) -> Vec<QueueAction> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, action)| *action)
            .collect()
    }
}

impl Default for QueueStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// 队列条目数据源
///
/// 轮询与未来可能的推送传输都通过该接口提供条目快照，
/// 替换传输方式不改变跟踪器的内部契约。
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// 获取某服务当前的全部条目（作为排序输入）
    async fn entries_for_service(&self, service_id: Uuid) -> Result<Vec<QueueEntry>>;

    /// 向外部记录系统提交离队请求
    async fn submit_leave(&self, entry_id: Uuid) -> Result<()>;
}

/// 队列状态跟踪器
///
/// 持有单个条目的最近快照（读穿缓存），每次刷新都从数据源取回
/// 条目集合并重新推导 position / estimated_wait_minutes。
pub struct StatusTracker {
    source: Arc<dyn EntrySource>,
    state_machine: QueueStateMachine,
    entry_id: Uuid,
    service_id: Uuid,
    average_service_minutes: u32,
    refresh_interval: Duration,
    snapshot: Arc<RwLock<Option<QueueEntry>>>,
}

impl StatusTracker {
    pub fn new(
        source: Arc<dyn EntrySource>,
        entry_id: Uuid,
        service_id: Uuid,
        average_service_minutes: u32,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            source,
            state_machine: QueueStateMachine::new(),
            entry_id,
            service_id,
            average_service_minutes,
            refresh_interval,
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    /// 最近一次刷新得到的条目快照
    pub async fn snapshot(&self) -> Option<QueueEntry> {
        self.snapshot.read().await.clone()
    }

    /// 手动刷新一次
    ///
    /// 派生字段永远重新计算，不信任上一次快照中的值。
    pub async fn refresh_once(&self) -> Result<QueueEntry> {
        let entries = self.source.entries_for_service(self.service_id).await?;

        let mut entry = entries
            .iter()
            .find(|e| e.id == self.entry_id)
            .cloned()
            .ok_or_else(|| {
                IntakeError::NotFound(format!("queue entry {} not found", self.entry_id))
            })?;

        if entry.status == QueueStatus::Waiting {
            let (position, minutes) =
                estimator::estimate(&entry, &entries, self.average_service_minutes);
            entry.position = position;
            entry.estimated_wait_minutes = minutes;
        } else {
            // 不在等待集合中的条目没有队列位置
            entry.position = 0;
            entry.estimated_wait_minutes = 0;
        }

        let mut snapshot = self.snapshot.write().await;
        if let Some(previous) = snapshot.as_ref() {
            if previous.status != entry.status {
                info!(
                    "Entry {} status observed {:?} -> {:?}",
                    entry.id, previous.status, entry.status
                );
            }
        }
        *snapshot = Some(entry.clone());

        debug!(
            "Refreshed entry {}: status {:?}, position {}, estimate {} min",
            entry.id, entry.status, entry.position, entry.estimated_wait_minutes
        );
        Ok(entry)
    }

    /// 离开队列
    ///
    /// 仅允许 Waiting / Called 状态下离队；已就诊或已终态的条目
    /// 返回 `InvalidTransition`，不发起外部请求。
    pub async fn leave_queue(&self) -> Result<QueueEntry> {
        let current = self.refresh_once().await?;

        self.state_machine
            .transition(current.status, QueueAction::Leave)?;

        self.source.submit_leave(self.entry_id).await?;
        info!("Entry {} left the queue", self.entry_id);

        // 以外部记录系统的回读为准
        self.refresh_once().await
    }

    /// 启动定时轮询，返回可取消的句柄
    pub fn start_polling(self: Arc<Self>) -> TrackerHandle {
        let tracker = Arc::clone(&self);
        let interval = self.refresh_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tracker.refresh_once().await {
                    Ok(entry) => {
                        if entry.status.is_terminal() {
                            debug!("Entry {} reached terminal state, polling stops", entry.id);
                            break;
                        }
                    }
                    Err(e) => {
                        // 单次轮询失败不终止跟踪，下个周期重试
                        warn!("Queue status refresh failed: {}", e);
                    }
                }
            }
        });

        TrackerHandle { handle }
    }
}

/// 轮询任务句柄
///
/// 丢弃或显式停止时取消底层定时任务。
pub struct TrackerHandle {
    handle: JoinHandle<()>,
}

impl TrackerHandle {
    /// 停止轮询
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// 轮询任务是否已结束
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use intake_core::Priority;

    fn waiting_entry(id: Uuid, service_id: Uuid, status: QueueStatus) -> QueueEntry {
        QueueEntry {
            id,
            queue_number: 1,
            patient_ref: Uuid::new_v4(),
            service_ref: service_id,
            priority: Priority::Normal,
            status,
            position: 0,
            estimated_wait_minutes: 0,
            joined_at: Utc::now(),
            called_at: None,
        }
    }

    struct FakeSource {
        entries: RwLock<Vec<QueueEntry>>,
        leaves: RwLock<Vec<Uuid>>,
    }

    impl FakeSource {
        fn new(entries: Vec<QueueEntry>) -> Self {
            Self {
                entries: RwLock::new(entries),
                leaves: RwLock::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EntrySource for FakeSource {
        async fn entries_for_service(&self, service_id: Uuid) -> Result<Vec<QueueEntry>> {
            Ok(self
                .entries
                .read()
                .await
                .iter()
                .filter(|e| e.service_ref == service_id)
                .cloned()
                .collect())
        }

        async fn submit_leave(&self, entry_id: Uuid) -> Result<()> {
            self.leaves.write().await.push(entry_id);
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.iter_mut().find(|e| e.id == entry_id) {
                entry.status = QueueStatus::Cancelled;
            }
            Ok(())
        }
    }

    #[test]
    fn test_legal_transitions() {
        let sm = QueueStateMachine::new();
        assert_eq!(
            sm.transition(QueueStatus::Waiting, QueueAction::Call).unwrap(),
            QueueStatus::Called
        );
        assert_eq!(
            sm.transition(QueueStatus::Called, QueueAction::StartService).unwrap(),
            QueueStatus::Serving
        );
        assert_eq!(
            sm.transition(QueueStatus::Serving, QueueAction::Complete).unwrap(),
            QueueStatus::Completed
        );
        assert_eq!(
            sm.transition(QueueStatus::Waiting, QueueAction::Leave).unwrap(),
            QueueStatus::Cancelled
        );
        assert_eq!(
            sm.transition(QueueStatus::Called, QueueAction::Leave).unwrap(),
            QueueStatus::Cancelled
        );
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let sm = QueueStateMachine::new();
        assert!(sm.transition(QueueStatus::Serving, QueueAction::Leave).is_err());
        assert!(sm.transition(QueueStatus::Completed, QueueAction::Leave).is_err());
        assert!(sm.transition(QueueStatus::Cancelled, QueueAction::Leave).is_err());
        assert!(sm.transition(QueueStatus::Waiting, QueueAction::Complete).is_err());
        assert!(sm.transition(QueueStatus::Completed, QueueAction::Call).is_err());
    }

    #[test]
    fn test_terminal_states_have_no_actions() {
        let sm = QueueStateMachine::new();
        assert!(sm.possible_actions(QueueStatus::Completed).is_empty());
        assert!(sm.possible_actions(QueueStatus::Cancelled).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_recomputes_derived_fields() {
        let service_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let mut other = waiting_entry(Uuid::new_v4(), service_id, QueueStatus::Waiting);
        other.priority = Priority::Urgent;
        let mine = waiting_entry(entry_id, service_id, QueueStatus::Waiting);

        let source = Arc::new(FakeSource::new(vec![other, mine]));
        let tracker = StatusTracker::new(source, entry_id, service_id, 15, Duration::from_secs(30));

        let refreshed = tracker.refresh_once().await.unwrap();
        assert_eq!(refreshed.position, 2);
        assert_eq!(refreshed.estimated_wait_minutes, 30);
        assert!(tracker.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_leave_queue_while_waiting_succeeds() {
        let service_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let mine = waiting_entry(entry_id, service_id, QueueStatus::Waiting);

        let source = Arc::new(FakeSource::new(vec![mine]));
        let tracker = StatusTracker::new(
            Arc::clone(&source) as Arc<dyn EntrySource>,
            entry_id,
            service_id,
            15,
            Duration::from_secs(30),
        );

        let left = tracker.leave_queue().await.unwrap();
        assert_eq!(left.status, QueueStatus::Cancelled);
        assert_eq!(source.leaves.read().await.as_slice(), &[entry_id]);
    }

    #[tokio::test]
    async fn test_leave_queue_while_serving_rejected() {
        let service_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let mine = waiting_entry(entry_id, service_id, QueueStatus::Serving);

        let source = Arc::new(FakeSource::new(vec![mine]));
        let tracker = StatusTracker::new(
            Arc::clone(&source) as Arc<dyn EntrySource>,
            entry_id,
            service_id,
            15,
            Duration::from_secs(30),
        );

        let err = tracker.leave_queue().await.unwrap_err();
        assert!(matches!(err, IntakeError::InvalidTransition { .. }));
        // 非法请求不应触达外部系统
        assert!(source.leaves.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_polling_refreshes_snapshot_and_stops_on_terminal() {
        let service_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let mine = waiting_entry(entry_id, service_id, QueueStatus::Waiting);

        let source = Arc::new(FakeSource::new(vec![mine]));
        let tracker = Arc::new(StatusTracker::new(
            Arc::clone(&source) as Arc<dyn EntrySource>,
            entry_id,
            service_id,
            15,
            Duration::from_millis(10),
        ));

        let handle = Arc::clone(&tracker).start_polling();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = tracker.snapshot().await.unwrap();
        assert_eq!(snapshot.position, 1);
        assert_eq!(snapshot.estimated_wait_minutes, 15);
        assert!(!handle.is_finished());

        // 条目进入终态后轮询自行结束
        source.submit_leave(entry_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
        assert_eq!(
            tracker.snapshot().await.unwrap().status,
            QueueStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_stopping_handle_cancels_polling() {
        let service_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let mine = waiting_entry(entry_id, service_id, QueueStatus::Waiting);

        let source = Arc::new(FakeSource::new(vec![mine]));
        let tracker = Arc::new(StatusTracker::new(
            source,
            entry_id,
            service_id,
            15,
            Duration::from_millis(10),
        ));

        let handle = Arc::clone(&tracker).start_polling();
        handle.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_polling() {
        let service_id = Uuid::new_v4();
        let entry_id = Uuid::new_v4();
        let mine = waiting_entry(entry_id, service_id, QueueStatus::Waiting);

        let source = Arc::new(FakeSource::new(vec![mine]));
        let tracker = Arc::new(StatusTracker::new(
            source,
            entry_id,
            service_id,
            15,
            Duration::from_millis(10),
        ));

        let handle = Arc::clone(&tracker).start_polling();
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 任务被取消后不再持有跟踪器的引用
        assert_eq!(Arc::strong_count(&tracker), 1);
    }

    #[tokio::test]
    async fn test_cancelled_entry_excluded_from_positions() {
        let service_id = Uuid::new_v4();
        let first_id = Uuid::new_v4();
        let second_id = Uuid::new_v4();
        let mut first = waiting_entry(first_id, service_id, QueueStatus::Waiting);
        let second = waiting_entry(second_id, service_id, QueueStatus::Waiting);
        first.joined_at = second.joined_at - chrono::Duration::seconds(60);

        let source = Arc::new(FakeSource::new(vec![first, second]));
        let first_tracker = StatusTracker::new(
            Arc::clone(&source) as Arc<dyn EntrySource>,
            first_id,
            service_id,
            15,
            Duration::from_secs(30),
        );
        let second_tracker = StatusTracker::new(
            Arc::clone(&source) as Arc<dyn EntrySource>,
            second_id,
            service_id,
            15,
            Duration::from_secs(30),
        );

        assert_eq!(second_tracker.refresh_once().await.unwrap().position, 2);

        first_tracker.leave_queue().await.unwrap();
        assert_eq!(second_tracker.refresh_once().await.unwrap().position, 1);
    }
}
