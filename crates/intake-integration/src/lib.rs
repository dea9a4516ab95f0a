//! # Intake Integration
//!
//! 边界接口模块：服务目录、队列记录系统与远程分诊服务的客户端。
//! 存储、鉴权、通知等具体实现都在边界之外，本核心只通过这里的
//! 窄接口消费它们。

pub mod connectors;
pub mod triage_service;

pub use connectors::{
    AuthenticationConfig, ConnectorConfig, QueueServiceConnector, RemoteClassifier,
    ServiceDirectory, QueueTransport, TriageConnector,
};
pub use triage_service::{ClassificationOutcome, ClassificationSource, TriageService};
