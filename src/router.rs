use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{IdentityGateway, identity_gateway, log_errors},
    routes,
};

pub fn create_router(state: AppState, gateway: Arc<IdentityGateway>) -> Router {
    let public_routes = Router::new().route("/ping", get(routes::ping));

    let protected_routes = Router::new()
        // 用户
        .route("/", get(routes::user::list_users))
        .route("/me", get(routes::user::me))
        // 项目
        .route(
            "/projects",
            get(routes::project::list_projects).post(routes::project::create_project),
        )
        .route("/projects/create", get(routes::project::create_form))
        .route(
            "/projects/{id}",
            get(routes::project::show_project).delete(routes::project::delete_project),
        )
        // 附件
        .route("/attachments/{kind}/{id}", get(routes::attachment::list_attachments))
        .route("/attachments/{kind}/{id}/links", post(routes::attachment::attach_link))
        .route("/attachments/{kind}/{id}/assets", post(routes::attachment::attach_asset))
        .route("/links/{id}", delete(routes::attachment::detach_link))
        .route("/assets/{id}", delete(routes::attachment::detach_asset))
        // 身份网关
        .layer(axum::middleware::from_fn_with_state(gateway, identity_gateway));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(state.config.max_request_bytes))
        .layer(axum::middleware::from_fn(log_errors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
