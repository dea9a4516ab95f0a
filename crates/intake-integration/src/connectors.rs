//! 外部系统连接器模块
//!
//! 提供与外部协作系统的连接器：
//! - 服务目录（科室队列登记）
//! - 队列记录系统（权威队列状态）
//! - 远程AI分诊服务（可选且可能不可靠）

use async_trait::async_trait;
use intake_core::{
    AgeBracket, IntakeError, PatientDetails, Priority, QueueEntry, Result, Service, TriageResult,
};
use intake_queue::EntrySource;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// 连接器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    pub endpoint: String,
    pub authentication: AuthenticationConfig,
    pub enabled: bool,
}

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthenticationConfig {
    None,
    ApiKey { key: String, header: Option<String> },
    BearerToken { token: String },
}

fn add_auth_headers(
    request: reqwest::RequestBuilder,
    auth: &AuthenticationConfig,
) -> reqwest::RequestBuilder {
    match auth {
        AuthenticationConfig::None => request,
        AuthenticationConfig::ApiKey { key, header } => {
            let header_name = header.as_deref().unwrap_or("X-API-Key");
            request.header(header_name, key)
        }
        AuthenticationConfig::BearerToken { token } => request.bearer_auth(token),
    }
}

/// 服务目录接口
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// 获取当前启用的服务列表
    async fn active_services(&self) -> Result<Vec<Service>>;
}

/// 队列传输接口
///
/// 轮询实现与未来的推送实现都必须满足同样的契约：
/// 返回的条目集合是排序函数的唯一输入。
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// 获取某服务的全部队列条目
    async fn queue_entries(&self, service_id: Uuid) -> Result<Vec<QueueEntry>>;

    /// 提交入队请求
    async fn submit_join(
        &self,
        service_id: Uuid,
        details: &PatientDetails,
        priority: Priority,
        idempotency_key: Option<&str>,
    ) -> Result<QueueEntry>;

    /// 提交离队请求
    async fn submit_leave(&self, entry_id: Uuid) -> Result<()>;
}

/// 远程分诊接口
///
/// 调用方必须准备好处理任何错误并回退到本地分类器。
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify(
        &self,
        symptoms_text: &str,
        age_bracket: Option<AgeBracket>,
    ) -> Result<TriageResult>;
}

/// 队列服务连接器
///
/// 通过REST访问外部服务目录与队列记录系统。
pub struct QueueServiceConnector {
    config: ConnectorConfig,
    client: reqwest::Client,
}

/// 入队请求报文
#[derive(Debug, Serialize)]
struct JoinRequest<'a> {
    patient: &'a PatientDetails,
    priority: Priority,
}

impl QueueServiceConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(IntakeError::ServiceUnavailable(format!(
                "connector {} is disabled",
                self.config.name
            )))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.config.endpoint, path);
        let request = add_auth_headers(self.client.get(&url), &self.config.authentication);

        let response = request
            .send()
            .await
            .map_err(|e| IntakeError::External(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(IntakeError::External(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IntakeError::External(format!("invalid response from {}: {}", url, e)))
    }
}

#[async_trait]
impl ServiceDirectory for QueueServiceConnector {
    async fn active_services(&self) -> Result<Vec<Service>> {
        self.ensure_enabled()?;
        debug!("Fetching active services from {}", self.config.endpoint);
        let services: Vec<Service> = self.get_json("/services").await?;
        Ok(services.into_iter().filter(|s| s.is_active).collect())
    }
}

#[async_trait]
impl QueueTransport for QueueServiceConnector {
    async fn queue_entries(&self, service_id: Uuid) -> Result<Vec<QueueEntry>> {
        self.ensure_enabled()?;
        self.get_json(&format!("/services/{}/entries", service_id)).await
    }

    async fn submit_join(
        &self,
        service_id: Uuid,
        details: &PatientDetails,
        priority: Priority,
        idempotency_key: Option<&str>,
    ) -> Result<QueueEntry> {
        self.ensure_enabled()?;
        let url = format!("{}/services/{}/queue", self.config.endpoint, service_id);
        let mut request = add_auth_headers(self.client.post(&url), &self.config.authentication)
            .json(&JoinRequest { patient: details, priority });

        // 相同幂等键的重试由服务端识别，避免重复入队
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IntakeError::AdmissionFailed(format!("join request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IntakeError::AdmissionFailed(format!(
                "join rejected with status {}",
                response.status()
            )));
        }

        let entry: QueueEntry = response
            .json()
            .await
            .map_err(|e| IntakeError::AdmissionFailed(format!("invalid join response: {}", e)))?;
        info!(
            "Joined queue for service {} as entry {} (number {})",
            service_id, entry.id, entry.queue_number
        );
        Ok(entry)
    }

    async fn submit_leave(&self, entry_id: Uuid) -> Result<()> {
        self.ensure_enabled()?;
        let url = format!("{}/entries/{}/leave", self.config.endpoint, entry_id);
        let request = add_auth_headers(self.client.post(&url), &self.config.authentication);

        let response = request
            .send()
            .await
            .map_err(|e| IntakeError::External(format!("leave request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IntakeError::External(format!(
                "leave rejected with status {}",
                response.status()
            )));
        }
        info!("Entry {} leave submitted", entry_id);
        Ok(())
    }
}

#[async_trait]
impl EntrySource for QueueServiceConnector {
    async fn entries_for_service(&self, service_id: Uuid) -> Result<Vec<QueueEntry>> {
        QueueTransport::queue_entries(self, service_id).await
    }

    async fn submit_leave(&self, entry_id: Uuid) -> Result<()> {
        QueueTransport::submit_leave(self, entry_id).await
    }
}

/// 远程分诊连接器
pub struct TriageConnector {
    config: ConnectorConfig,
    client: reqwest::Client,
}

/// 远程分诊请求报文
#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    symptoms_text: &'a str,
    age_bracket: Option<AgeBracket>,
}

impl TriageConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RemoteClassifier for TriageConnector {
    async fn classify(
        &self,
        symptoms_text: &str,
        age_bracket: Option<AgeBracket>,
    ) -> Result<TriageResult> {
        if !self.config.enabled {
            return Err(IntakeError::ServiceUnavailable(format!(
                "connector {} is disabled",
                self.config.name
            )));
        }

        let url = format!("{}/triage/classify", self.config.endpoint);
        let request = add_auth_headers(self.client.post(&url), &self.config.authentication)
            .json(&ClassifyRequest { symptoms_text, age_bracket });

        let response = request
            .send()
            .await
            .map_err(|e| IntakeError::External(format!("classification request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IntakeError::External(format!(
                "classifier returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| IntakeError::External(format!("invalid classification response: {}", e)))
    }
}
