use axum::{http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::utils::success_to_api_response;

pub mod attachment;
pub mod catalog;
pub mod project;
pub mod user;

#[derive(Serialize)]
pub struct PingResponse {
    pub status: String,
    /// 服务器时间
    pub timestamp: i64,
}

/// 健康检查接口，不经过身份网关
pub async fn ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(PingResponse {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }),
    )
}
