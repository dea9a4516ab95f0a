//! API服务器

use crate::handlers::{create_api_routes, ApiState};
use axum::Router;
use tracing::info;

/// API服务器
pub struct ApiServer {
    app: Router,
}

impl ApiServer {
    pub fn new(state: ApiState) -> Self {
        let app = create_api_routes(state)
            .layer(tower_http::cors::CorsLayer::permissive());
        Self { app }
    }

    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        info!("Starting intake API server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }
}
