//! HTTP请求处理器
//!
//! 错误分类到状态码的映射遵循 §错误taxonomy：验证错误返回400、
//! 服务不可用503、非法状态转换409、资源未找到404，其余一律502/500，
//! 并尽量携带具体错误消息，不静默吞掉入队/离队失败。

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use intake_core::{
    AgeBracket, IntakeError, PatientDetails, Priority, QueueEntry, Service, TriageResult,
};
use intake_integration::TriageService;
use intake_queue::QueueManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// API状态管理器
#[derive(Clone)]
pub struct ApiState {
    pub queue_manager: Arc<RwLock<QueueManager>>,
    pub triage_service: Arc<TriageService>,
    /// 服务目录快照，由后台定时器按较长间隔刷新
    pub service_catalog: Arc<RwLock<HashMap<Uuid, Service>>>,
    /// 服务目录中查不到服务时使用的平均处理时长（分钟）
    pub default_average_minutes: u32,
}

impl ApiState {
    /// 创建API状态
    ///
    /// 排序缓存TTL取队列轮询间隔，派生数据的陈旧程度不超过一个
    /// 轮询周期。
    pub fn new(
        triage_service: Arc<TriageService>,
        refresh_interval: std::time::Duration,
        default_average_minutes: u32,
    ) -> Self {
        Self {
            queue_manager: Arc::new(RwLock::new(QueueManager::with_cache_ttl(refresh_interval))),
            triage_service,
            service_catalog: Arc::new(RwLock::new(HashMap::new())),
            default_average_minutes,
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: IntakeError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        IntakeError::Validation(_) => StatusCode::BAD_REQUEST,
        IntakeError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        IntakeError::InvalidTransition { .. } => StatusCode::CONFLICT,
        IntakeError::NotFound(_) => StatusCode::NOT_FOUND,
        IntakeError::AdmissionFailed(_) | IntakeError::External(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

/// 分诊请求
#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub symptoms_text: String,
    pub age_bracket: Option<AgeBracket>,
    pub department_hint: Option<String>,
    /// 用户自选优先级，与分诊结果按"只升不降"合并
    pub user_priority: Option<Priority>,
}

/// 分诊响应
#[derive(Debug, Serialize)]
pub struct TriageResponse {
    pub result: TriageResult,
    pub priority: Priority,
    /// 远程分诊不可用、采用本地回退时为 true
    pub degraded: bool,
}

/// 入队请求
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub patient_ref: Uuid,
    pub priority: Priority,
    pub patient: PatientDetails,
}

/// API处理器
pub struct ApiHandler;

impl ApiHandler {
    /// 健康检查
    pub async fn health_check() -> Json<HashMap<String, String>> {
        let mut status = HashMap::new();
        status.insert("status".to_string(), "healthy".to_string());
        status.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());
        status.insert("version".to_string(), "0.1.0".to_string());
        Json(status)
    }

    /// 获取启用的服务列表
    pub async fn list_services(State(state): State<ApiState>) -> Json<Vec<Service>> {
        let catalog = state.service_catalog.read().await;
        let mut services: Vec<Service> =
            catalog.values().filter(|s| s.is_active).cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Json(services)
    }

    /// 症状分诊
    pub async fn classify(
        State(state): State<ApiState>,
        Json(request): Json<TriageRequest>,
    ) -> Result<Json<TriageResponse>, (StatusCode, Json<ErrorResponse>)> {
        let outcome = state
            .triage_service
            .classify(
                &request.symptoms_text,
                request.age_bracket,
                request.department_hint.as_deref(),
            )
            .await
            .map_err(error_response)?;

        let auto = intake_triage::to_priority(outcome.result.urgency_level);
        let priority = intake_triage::merge_priority(auto, request.user_priority);
        let degraded = outcome.is_degraded();

        info!(
            "Classified symptoms: urgency {:?}, priority {:?}, degraded {}",
            outcome.result.urgency_level, priority, degraded
        );
        Ok(Json(TriageResponse {
            result: outcome.result,
            priority,
            degraded,
        }))
    }

    /// 入队
    pub async fn join_queue(
        State(state): State<ApiState>,
        Path(service_id): Path<Uuid>,
        headers: HeaderMap,
        Json(request): Json<JoinRequest>,
    ) -> Result<(StatusCode, Json<QueueEntry>), (StatusCode, Json<ErrorResponse>)> {
        let service = state
            .service_catalog
            .read()
            .await
            .get(&service_id)
            .cloned()
            .ok_or_else(|| {
                error_response(IntakeError::ServiceUnavailable(format!(
                    "service {} not found",
                    service_id
                )))
            })?;

        let idempotency_key = headers
            .get("Idempotency-Key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let entry = state
            .queue_manager
            .write()
            .await
            .join(
                &service,
                request.patient_ref,
                request.priority,
                &request.patient,
                idempotency_key.as_deref(),
            )
            .map_err(error_response)?;

        Ok((StatusCode::CREATED, Json(entry)))
    }

    /// 查询条目状态（派生字段读取时重新计算）
    pub async fn get_entry(
        State(state): State<ApiState>,
        Path(entry_id): Path<Uuid>,
    ) -> Result<Json<QueueEntry>, (StatusCode, Json<ErrorResponse>)> {
        debug!("Reading entry {}", entry_id);

        let mut manager = state.queue_manager.write().await;
        let service_id = manager
            .entry(entry_id)
            .map(|e| e.service_ref)
            .ok_or_else(|| {
                error_response(IntakeError::NotFound(format!(
                    "queue entry {} not found",
                    entry_id
                )))
            })?;

        let average = state
            .service_catalog
            .read()
            .await
            .get(&service_id)
            .map(|s| s.average_service_minutes)
            .unwrap_or(state.default_average_minutes);

        let entry = manager
            .refreshed_entry(entry_id, average)
            .map_err(error_response)?;
        Ok(Json(entry))
    }

    /// 离开队列
    pub async fn leave_queue(
        State(state): State<ApiState>,
        Path(entry_id): Path<Uuid>,
    ) -> Result<Json<QueueEntry>, (StatusCode, Json<ErrorResponse>)> {
        let entry = state
            .queue_manager
            .write()
            .await
            .leave(entry_id)
            .map_err(error_response)?;
        Ok(Json(entry))
    }
}

/// 创建API路由
pub fn create_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(ApiHandler::health_check))
        .route("/services", get(ApiHandler::list_services))
        .route("/triage", post(ApiHandler::classify))
        .route("/services/:service_id/queue", post(ApiHandler::join_queue))
        .route("/entries/:entry_id", get(ApiHandler::get_entry))
        .route("/entries/:entry_id/leave", post(ApiHandler::leave_queue))
        .with_state(state)
        .layer(axum::middleware::from_fn(
            |req: axum::extract::Request, next: axum::middleware::Next| async move {
                info!("API request: {} {}", req.method(), req.uri());
                let response = next.run(req).await;
                info!("API response: {}", response.status());
                response
            },
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_state(default_average_minutes: u32) -> ApiState {
        ApiState::new(
            Arc::new(TriageService::local_only()),
            Duration::from_secs(45),
            default_average_minutes,
        )
    }

    #[tokio::test]
    async fn test_queue_settings_threaded_into_state() {
        let state = test_state(20);
        assert_eq!(state.default_average_minutes, 20);
        // 排序缓存TTL跟随配置的轮询间隔，而非硬编码值
        assert_eq!(
            state.queue_manager.read().await.cache_ttl(),
            Duration::from_secs(45)
        );
    }

    #[tokio::test]
    async fn test_get_entry_falls_back_to_configured_average() {
        let state = test_state(20);
        let service = Service {
            id: Uuid::new_v4(),
            name: "General Medicine".to_string(),
            department: "Internal Medicine".to_string(),
            is_active: true,
            average_service_minutes: 15,
        };
        let details = PatientDetails {
            name: "张三".to_string(),
            phone: "13800000000".to_string(),
            email: "zhangsan@example.com".to_string(),
            date_of_birth: None,
        };

        let entry = state
            .queue_manager
            .write()
            .await
            .join(&service, Uuid::new_v4(), Priority::Normal, &details, None)
            .unwrap();

        // 服务不在目录快照中，读取时回退到配置的默认平均时长
        let response = ApiHandler::get_entry(State(state.clone()), Path(entry.id))
            .await
            .unwrap();
        assert_eq!(response.0.position, 1);
        assert_eq!(response.0.estimated_wait_minutes, 20);
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, _) = error_response(IntakeError::Validation("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_response(IntakeError::ServiceUnavailable("off".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = error_response(IntakeError::InvalidTransition {
            from: "Serving".to_string(),
            action: "Leave".to_string(),
        });
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = error_response(IntakeError::NotFound("x".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = error_response(IntakeError::AdmissionFailed("db down".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        // 具体错误消息透出给调用方
        assert!(body.0.error.contains("db down"));
    }
}
