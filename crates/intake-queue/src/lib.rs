//! # Intake Queue
//!
//! 按服务划分的优先级等待队列：入队受理、等待时长估算与状态跟踪。

pub mod admission;
pub mod estimator;
pub mod tracker;

pub use admission::{QueueChangeKind, QueueChanged, QueueManager};
pub use estimator::{compare_waiting, estimate, DEFAULT_AVERAGE_SERVICE_MINUTES};
pub use tracker::{EntrySource, QueueAction, QueueStateMachine, StatusTracker, TrackerHandle};
