//! 分诊排队服务器主程序

mod config;

use crate::config::IntakeConfig;
use clap::Parser;
use intake_integration::{
    AuthenticationConfig, ConnectorConfig, QueueServiceConnector, ServiceDirectory,
    TriageConnector, TriageService,
};
use intake_web::{ApiServer, ApiState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 分诊排队服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "intake-server")]
#[command(about = "患者分诊与排队叫号服务器")]
struct Args {
    /// 监听端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn auth_from(config: &IntakeConfig) -> AuthenticationConfig {
    match &config.integration.api_key {
        Some(key) => AuthenticationConfig::ApiKey {
            key: key.clone(),
            header: None,
        },
        None => AuthenticationConfig::None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动分诊排队服务器...");

    let mut config = IntakeConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("服务器配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  队列轮询间隔: {}秒", config.queue.refresh_interval_seconds);
    info!(
        "  服务目录刷新间隔: {}秒",
        config.queue.catalog_refresh_interval_seconds
    );

    // 远程分诊可选；未配置时仅用本地分类器
    let triage_service = match &config.integration.triage_service_endpoint {
        Some(endpoint) => {
            info!("  远程分诊端点: {}", endpoint);
            Arc::new(TriageService::with_remote(Arc::new(TriageConnector::new(
                ConnectorConfig {
                    name: "remote-triage".to_string(),
                    endpoint: endpoint.clone(),
                    authentication: auth_from(&config),
                    enabled: true,
                },
            ))))
        }
        None => {
            info!("  未配置远程分诊，使用本地分类器");
            Arc::new(TriageService::local_only())
        }
    };

    let state = ApiState::new(
        triage_service,
        Duration::from_secs(config.queue.refresh_interval_seconds),
        config.queue.default_average_service_minutes,
    );

    // 服务目录刷新定时器（独立于队列轮询，间隔更长，可取消）
    let catalog_task = match &config.integration.queue_service_endpoint {
        Some(endpoint) => {
            let directory = Arc::new(QueueServiceConnector::new(ConnectorConfig {
                name: "queue-service".to_string(),
                endpoint: endpoint.clone(),
                authentication: auth_from(&config),
                enabled: true,
            }));
            let catalog = Arc::clone(&state.service_catalog);
            let interval = Duration::from_secs(config.queue.catalog_refresh_interval_seconds);

            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    match directory.active_services().await {
                        Ok(services) => {
                            let mut catalog = catalog.write().await;
                            catalog.clear();
                            for service in services {
                                catalog.insert(service.id, service);
                            }
                            info!("Service catalog refreshed: {} services", catalog.len());
                        }
                        Err(e) => warn!("Service catalog refresh failed: {}", e),
                    }
                }
            }))
        }
        None => {
            warn!("未配置队列记录系统端点，服务目录为空");
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let server = ApiServer::new(state);

    let result = server.run(&addr).await;

    // 服务器退出时取消后台定时器，避免泄漏
    if let Some(task) = catalog_task {
        task.abort();
    }

    if let Err(e) = &result {
        error!("服务器运行失败: {}", e);
    }
    result
}
