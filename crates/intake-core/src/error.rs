//! 错误定义模块

use thiserror::Error;

/// 分诊排队系统统一错误类型
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("服务不可用: {0}")]
    ServiceUnavailable(String),

    #[error("入队失败: {0}")]
    AdmissionFailed(String),

    #[error("无效状态转换: 从 {from} 执行 {action}")]
    InvalidTransition { from: String, action: String },

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("外部服务错误: {0}")]
    External(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 分诊排队系统统一结果类型
pub type Result<T> = std::result::Result<T, IntakeError>;
