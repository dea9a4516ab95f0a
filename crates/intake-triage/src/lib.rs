//! # Intake Triage
//!
//! 症状分诊模块：关键词分级分类器与优先级映射。
//!
//! 分类器是纯函数实现的本地回退方案，在远程AI分诊服务不可用时
//! 必须给出等价结果，因此不依赖任何外部资源。

pub mod classifier;
pub mod priority;

pub use classifier::classify;
pub use priority::{merge_priority, to_priority};
