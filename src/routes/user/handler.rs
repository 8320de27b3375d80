use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{AppState, error::AppError, utils::success_to_api_response};

use super::model::{CurrentUser, UserSummary};

/// 首页：已登记的用户列表
#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let users = state
        .repo
        .list_users()
        .await?
        .into_iter()
        .map(UserSummary::from)
        .collect::<Vec<_>>();

    Ok((StatusCode::OK, success_to_api_response(users)))
}

#[axum::debug_handler]
pub async fn me(Extension(current): Extension<CurrentUser>) -> impl IntoResponse {
    (StatusCode::OK, success_to_api_response(current))
}
