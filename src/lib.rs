//! # Intake
//!
//! 患者分诊与排队叫号核心：根包聚合各子 crate，供演示程序与
//! 下游直接引用。

pub use intake_core as core;
pub use intake_integration as integration;
pub use intake_queue as queue;
pub use intake_triage as triage;
