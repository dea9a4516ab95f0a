//! 配置管理
//!
//! 配置文件 + 环境变量两层来源，环境变量以 INTAKE_ 前缀覆盖
//! 文件中的同名项。

use ::config::{Config, Environment, File};
use intake_core::{IntakeError, Result};
use intake_queue::DEFAULT_AVERAGE_SERVICE_MINUTES;
use serde::{Deserialize, Serialize};

/// 分诊排队系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 队列配置
    pub queue: QueueConfig,
    /// 外部系统集成配置
    #[serde(default)]
    pub integration: IntegrationConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 队列状态轮询间隔（秒）
    pub refresh_interval_seconds: u64,
    /// 服务目录刷新间隔（秒），比队列轮询慢一档
    pub catalog_refresh_interval_seconds: u64,
    /// 无经验数据时的默认平均处理时长（分钟）
    pub default_average_service_minutes: u32,
}

/// 外部系统集成配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// 队列记录系统端点（为空时使用进程内队列）
    #[serde(default)]
    pub queue_service_endpoint: Option<String>,
    /// 远程分诊服务端点（为空时仅用本地分类器）
    #[serde(default)]
    pub triage_service_endpoint: Option<String>,
    /// API密钥（两个端点共用）
    #[serde(default)]
    pub api_key: Option<String>,
}

impl IntakeConfig {
    /// 加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")
            .map_err(|e| IntakeError::Config(e.to_string()))?
            .set_default("server.port", 8080)
            .map_err(|e| IntakeError::Config(e.to_string()))?
            .set_default("queue.refresh_interval_seconds", 30)
            .map_err(|e| IntakeError::Config(e.to_string()))?
            .set_default("queue.catalog_refresh_interval_seconds", 300)
            .map_err(|e| IntakeError::Config(e.to_string()))?
            .set_default(
                "queue.default_average_service_minutes",
                DEFAULT_AVERAGE_SERVICE_MINUTES as i64,
            )
            .map_err(|e| IntakeError::Config(e.to_string()))?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("INTAKE").separator("__"));

        let config: IntakeConfig = builder
            .build()
            .map_err(|e| IntakeError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| IntakeError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.queue.refresh_interval_seconds == 0 {
            return Err(IntakeError::Config(
                "queue.refresh_interval_seconds must be positive".to_string(),
            ));
        }
        if self.queue.catalog_refresh_interval_seconds == 0 {
            return Err(IntakeError::Config(
                "queue.catalog_refresh_interval_seconds must be positive".to_string(),
            ));
        }
        if self.queue.default_average_service_minutes == 0 {
            return Err(IntakeError::Config(
                "queue.default_average_service_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
