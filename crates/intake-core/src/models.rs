//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 队列优先级
///
/// 全序关系：Urgent > High > Normal > Low。
/// 派生的 Ord 按声明顺序升序，因此 Urgent 为最大值。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,    // 低
    Normal, // 普通
    High,   // 高
    Urgent, // 紧急
}

/// 队列条目状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    Waiting,   // 等待中
    Called,    // 已叫号
    Serving,   // 就诊中
    Completed, // 已完成
    Cancelled, // 已取消
}

impl QueueStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }
}

/// 队列条目
///
/// `position` 和 `estimated_wait_minutes` 是派生快照，每次读取时
/// 由估算器重新计算，不作为权威状态存储。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub queue_number: u32, // 服务范围内单调递增的取号编号
    pub patient_ref: Uuid, // 外部患者登记系统中的患者ID（仅引用）
    pub service_ref: Uuid, // 目标服务ID（仅引用）
    pub priority: Priority,
    pub status: QueueStatus,
    pub position: u32,               // 派生：同服务等待条目中的1起始排名
    pub estimated_wait_minutes: u32, // 派生：position × 平均服务时长
    pub joined_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
}

/// 服务（科室队列）信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,       // 服务名称，如 "普通内科"
    pub department: String, // 所属科室
    pub is_active: bool,
    pub average_service_minutes: u32, // 单个患者平均处理时长
}

/// 入队时的患者登记信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDetails {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub date_of_birth: Option<chrono::NaiveDate>,
}

/// 年龄段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgeBracket {
    Pediatric, // 儿科
    Adult,     // 成人
}

/// 分诊紧急程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UrgencyLevel {
    Low,      // 低
    Moderate, // 中等
    High,     // 高
    Critical, // 危急
}

/// 分诊结果
///
/// 临时数据，不由本核心持久化。`estimated_wait_minutes` 是分诊时
/// 的基线估计，与队列内的实时估计相互独立。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub urgency_level: UrgencyLevel,
    pub confidence: f64, // [0, 1]
    pub triage_score: u8, // [0, 10]
    pub recommended_department: String,
    pub estimated_wait_minutes: u32,
    pub recommended_actions: Vec<String>,
    pub risk_factors: Vec<String>,
}
