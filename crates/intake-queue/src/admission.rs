//! 入队受理
//!
//! 按服务划分的队列管理器：分配单调递增的取号编号，创建等待条目
//! 并立即附带初始排名与等待时长估计。每个服务的排序结果带短TTL
//! 缓存，任何入队/离队/升级事件都会使其失效，派生数据永远与
//! 当前的优先级和时间数据一致。

use crate::estimator;
use crate::tracker::{QueueAction, QueueStateMachine};
use chrono::{DateTime, Utc};
use intake_core::utils::validate_patient_details;
use intake_core::{
    IntakeError, PatientDetails, Priority, QueueEntry, QueueStatus, Result, Service,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 队列变更事件类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueChangeKind {
    Joined,         // 新患者入队
    Left,           // 患者离队
    Escalated,      // 优先级升级
    StatusObserved, // 观察到外部状态转换
}

/// 队列变更事件
///
/// 同一服务的其他等待条目收到事件后，其派生的排名/估计即告失效，
/// 下次读取时必须重新计算。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueChanged {
    pub service_id: Uuid,
    pub entry_id: Uuid,
    pub kind: QueueChangeKind,
}

/// 单个服务的队列状态
#[derive(Debug)]
struct ServiceQueue {
    next_queue_number: u32,
    entries: HashMap<Uuid, QueueEntry>,
    idempotency: HashMap<String, Uuid>, // 幂等键 -> 已受理条目ID
    ordering_cache: Option<OrderingCache>,
}

impl ServiceQueue {
    fn new() -> Self {
        Self {
            next_queue_number: 1,
            entries: HashMap::new(),
            idempotency: HashMap::new(),
            ordering_cache: None,
        }
    }
}

/// 排序缓存（TTL 等于轮询间隔）
#[derive(Debug)]
struct OrderingCache {
    ordered_ids: Vec<Uuid>,
    computed_at: DateTime<Utc>,
}

/// 队列管理器
#[derive(Debug)]
pub struct QueueManager {
    services: HashMap<Uuid, ServiceQueue>,
    state_machine: QueueStateMachine,
    events: broadcast::Sender<QueueChanged>,
    cache_ttl: Duration,
}

impl QueueManager {
    /// 创建新的队列管理器
    pub fn new() -> Self {
        Self::with_cache_ttl(Duration::from_secs(30))
    }

    /// 指定排序缓存TTL（一般取轮询间隔）
    pub fn with_cache_ttl(cache_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            services: HashMap::new(),
            state_machine: QueueStateMachine::new(),
            events,
            cache_ttl,
        }
    }

    /// 订阅队列变更事件
    pub fn subscribe(&self) -> broadcast::Receiver<QueueChanged> {
        self.events.subscribe()
    }

    /// 当前排序缓存TTL
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// 患者入队
    ///
    /// 取号编号在服务范围内单调递增且永不复用（取消后也不回收）。
    /// 携带相同幂等键的重试直接返回已受理的条目，不会重复入队。
    pub fn join(
        &mut self,
        service: &Service,
        patient_ref: Uuid,
        priority: Priority,
        details: &PatientDetails,
        idempotency_key: Option<&str>,
    ) -> Result<QueueEntry> {
        if !service.is_active {
            return Err(IntakeError::ServiceUnavailable(format!(
                "service {} is not active",
                service.name
            )));
        }
        validate_patient_details(details)?;

        let queue = self
            .services
            .entry(service.id)
            .or_insert_with(ServiceQueue::new);

        if let Some(key) = idempotency_key {
            if let Some(existing_id) = queue.idempotency.get(key).copied() {
                if queue.entries.contains_key(&existing_id) {
                    // 重放也按"读取时重新推导"规则刷新派生字段
                    let all: Vec<QueueEntry> = queue.entries.values().cloned().collect();
                    if let Some(existing) = queue.entries.get_mut(&existing_id) {
                        if existing.status == QueueStatus::Waiting {
                            let (position, minutes) = estimator::estimate(
                                existing,
                                &all,
                                service.average_service_minutes,
                            );
                            existing.position = position;
                            existing.estimated_wait_minutes = minutes;
                        }
                        debug!(
                            "Join replay with idempotency key {}, returning entry {}",
                            key, existing.id
                        );
                        return Ok(existing.clone());
                    }
                }
            }
        }

        let queue_number = queue.next_queue_number;
        queue.next_queue_number += 1;

        let mut entry = QueueEntry {
            id: Uuid::new_v4(),
            queue_number,
            patient_ref,
            service_ref: service.id,
            priority,
            status: QueueStatus::Waiting,
            position: 0,
            estimated_wait_minutes: 0,
            joined_at: Utc::now(),
            called_at: None,
        };

        queue.entries.insert(entry.id, entry.clone());
        if let Some(key) = idempotency_key {
            queue.idempotency.insert(key.to_string(), entry.id);
        }
        queue.ordering_cache = None;

        // 初始排名在条目入集合之后计算
        let all: Vec<QueueEntry> = queue.entries.values().cloned().collect();
        let (position, minutes) =
            estimator::estimate(&entry, &all, service.average_service_minutes);
        entry.position = position;
        entry.estimated_wait_minutes = minutes;
        if let Some(stored) = queue.entries.get_mut(&entry.id) {
            stored.position = position;
            stored.estimated_wait_minutes = minutes;
        }

        info!(
            "Patient {} joined service {} queue as number {} with priority {:?}, position {}",
            patient_ref, service.id, queue_number, priority, position
        );
        self.emit(service.id, entry.id, QueueChangeKind::Joined);

        Ok(entry)
    }

    /// 离开队列
    ///
    /// 仅 Waiting / Called 状态可离队；其余状态返回 `InvalidTransition`
    /// 且队列不变。条目保留在集合中（本核心从不删除条目），但被排除
    /// 在此后的一切排名计算之外。
    pub fn leave(&mut self, entry_id: Uuid) -> Result<QueueEntry> {
        let (service_id, entry) = self.transition_entry(entry_id, QueueAction::Leave)?;
        info!("Entry {} cancelled and removed from ordering", entry_id);
        self.emit(service_id, entry_id, QueueChangeKind::Left);
        Ok(entry)
    }

    /// 观察到外部记录系统执行的状态转换（叫号/开始就诊/完成）
    pub fn observe(&mut self, entry_id: Uuid, action: QueueAction) -> Result<QueueEntry> {
        let (service_id, entry) = self.transition_entry(entry_id, action)?;
        self.emit(service_id, entry_id, QueueChangeKind::StatusObserved);
        Ok(entry)
    }

    /// 重新分诊后的优先级升级
    ///
    /// 只升不降：低于当前优先级的结果被忽略，系统绝不静默降级。
    pub fn escalate_priority(&mut self, entry_id: Uuid, new_priority: Priority) -> Result<QueueEntry> {
        let queue = self.service_of_mut(entry_id)?;
        let entry = queue
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| IntakeError::NotFound(format!("queue entry {} not found", entry_id)))?;

        if new_priority <= entry.priority {
            debug!(
                "Ignoring non-escalating priority {:?} for entry {} at {:?}",
                new_priority, entry_id, entry.priority
            );
            return Ok(entry.clone());
        }

        let old = entry.priority;
        entry.priority = new_priority;
        let service_id = entry.service_ref;
        let escalated = entry.clone();
        queue.ordering_cache = None;

        warn!(
            "Entry {} priority escalated {:?} -> {:?}",
            entry_id, old, new_priority
        );
        self.emit(service_id, entry_id, QueueChangeKind::Escalated);
        Ok(escalated)
    }

    /// 获取条目（不刷新派生字段）
    pub fn entry(&self, entry_id: Uuid) -> Option<&QueueEntry> {
        self.services
            .values()
            .find_map(|queue| queue.entries.get(&entry_id))
    }

    /// 读取条目并重新计算派生字段
    ///
    /// 排名/估计每次读取都重新推导，绝不信任过期缓存。
    pub fn refreshed_entry(&mut self, entry_id: Uuid, average_service_minutes: u32) -> Result<QueueEntry> {
        let queue = self.service_of_mut(entry_id)?;
        let all: Vec<QueueEntry> = queue.entries.values().cloned().collect();

        let entry = queue
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| IntakeError::NotFound(format!("queue entry {} not found", entry_id)))?;

        if entry.status == QueueStatus::Waiting {
            let (position, minutes) = estimator::estimate(entry, &all, average_service_minutes);
            entry.position = position;
            entry.estimated_wait_minutes = minutes;
        } else {
            entry.position = 0;
            entry.estimated_wait_minutes = 0;
        }
        Ok(entry.clone())
    }

    /// 某服务的全部条目（含终态，供跟踪器做排序输入）
    pub fn entries_for_service(&self, service_id: Uuid) -> Vec<QueueEntry> {
        self.services
            .get(&service_id)
            .map(|queue| queue.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 某服务按排序规则排列的等待条目ID
    ///
    /// 结果带TTL缓存；任何变更事件都会使缓存失效。
    pub fn ordered_waiting(&mut self, service_id: Uuid) -> Vec<Uuid> {
        let cache_ttl = self.cache_ttl;
        let Some(queue) = self.services.get_mut(&service_id) else {
            return Vec::new();
        };

        if let Some(cache) = &queue.ordering_cache {
            let age = Utc::now() - cache.computed_at;
            if age.to_std().map(|a| a < cache_ttl).unwrap_or(false) {
                return cache.ordered_ids.clone();
            }
        }

        let mut waiting: Vec<&QueueEntry> = queue
            .entries
            .values()
            .filter(|e| e.status == QueueStatus::Waiting)
            .collect();
        waiting.sort_by(|a, b| estimator::compare_waiting(a, b));
        let ordered_ids: Vec<Uuid> = waiting.iter().map(|e| e.id).collect();

        queue.ordering_cache = Some(OrderingCache {
            ordered_ids: ordered_ids.clone(),
            computed_at: Utc::now(),
        });
        ordered_ids
    }

    /// 某服务当前等待人数
    pub fn waiting_count(&self, service_id: Uuid) -> usize {
        self.services
            .get(&service_id)
            .map(|queue| {
                queue
                    .entries
                    .values()
                    .filter(|e| e.status == QueueStatus::Waiting)
                    .count()
            })
            .unwrap_or(0)
    }

    fn transition_entry(&mut self, entry_id: Uuid, action: QueueAction) -> Result<(Uuid, QueueEntry)> {
        // 状态机校验放在借用条目之前，失败时队列保持原样
        let current = self
            .entry(entry_id)
            .ok_or_else(|| IntakeError::NotFound(format!("queue entry {} not found", entry_id)))?
            .status;
        let next = self.state_machine.transition(current, action)?;

        let queue = self.service_of_mut(entry_id)?;
        let entry = queue
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| IntakeError::NotFound(format!("queue entry {} not found", entry_id)))?;

        entry.status = next;
        if next == QueueStatus::Called && entry.called_at.is_none() {
            entry.called_at = Some(Utc::now());
        }
        if next != QueueStatus::Waiting {
            entry.position = 0;
            entry.estimated_wait_minutes = 0;
        }

        let service_id = entry.service_ref;
        let updated = entry.clone();
        queue.ordering_cache = None;

        info!(
            "Entry {} transitioned {:?} -> {:?}",
            entry_id, current, next
        );
        Ok((service_id, updated))
    }

    fn service_of_mut(&mut self, entry_id: Uuid) -> Result<&mut ServiceQueue> {
        self.services
            .values_mut()
            .find(|queue| queue.entries.contains_key(&entry_id))
            .ok_or_else(|| IntakeError::NotFound(format!("queue entry {} not found", entry_id)))
    }

    fn emit(&self, service_id: Uuid, entry_id: Uuid, kind: QueueChangeKind) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(QueueChanged {
            service_id,
            entry_id,
            kind,
        });
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}
