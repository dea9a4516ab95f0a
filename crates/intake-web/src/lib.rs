//! # Intake Web
//!
//! 面向客户端的REST接口层，把分诊与队列核心暴露为HTTP服务。

pub mod handlers;
pub mod server;

pub use handlers::{create_api_routes, ApiState};
pub use server::ApiServer;
