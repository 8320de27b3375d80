use axum::{
    extract::{Extension, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    AppState,
    error::AppError,
    routes::attachment::OwnerRef,
    routes::catalog::{AssetType, Category, LinkType, Status},
    routes::user::CurrentUser,
    utils::{message_to_api_response, success_to_api_response},
};

use super::intake::ProjectSubmission;
use super::model::{LIFECYCLE_STATUSES, Priority, Project, ProjectDetail};

/// 新建项目表单需要的下拉选项
#[derive(Debug, Serialize)]
pub struct ProjectForm {
    pub statuses: Vec<Status>,
    pub categories: Vec<Category>,
    pub priorities: Vec<Priority>,
    pub link_types: Vec<LinkType>,
    pub asset_types: Vec<AssetType>,
    pub max_asset_bytes: usize,
}

async fn visible_project(state: &AppState, current: &CurrentUser, id: i64) -> Result<Project, AppError> {
    state
        .repo
        .find_project(id)
        .await?
        .filter(|p| p.is_visible_to(&current.user))
        .ok_or_else(|| AppError::NotFound(format!("project {id}")))
}

#[axum::debug_handler]
pub async fn create_form(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.catalog.snapshot().await;
    let statuses = snapshot
        .statuses
        .iter()
        .filter(|s| s.is_active && LIFECYCLE_STATUSES.contains(&s.key.as_str()))
        .cloned()
        .collect();

    let form = ProjectForm {
        statuses,
        categories: snapshot.categories.clone(),
        priorities: Priority::ALL.to_vec(),
        link_types: snapshot.link_types.clone(),
        asset_types: snapshot.asset_types.clone(),
        max_asset_bytes: state.attachments.max_asset_bytes(),
    };
    Ok((StatusCode::OK, success_to_api_response(form)))
}

#[axum::debug_handler]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let submission = ProjectSubmission::from_multipart(multipart, state.attachments.max_asset_bytes()).await?;
    let detail = Project::submit(&state, &current, submission).await?;
    Ok((
        StatusCode::CREATED,
        message_to_api_response("Project created successfully!", detail),
    ))
}

#[axum::debug_handler]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let projects = state.repo.list_projects_for_user(current.user.id).await?;
    Ok((StatusCode::OK, success_to_api_response(projects)))
}

#[axum::debug_handler]
pub async fn show_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let project = visible_project(&state, &current, id).await?;
    let attachments = state.attachments.list_for(OwnerRef::project(project.id)).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ProjectDetail {
            project,
            links: attachments.links,
            assets: attachments.assets,
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let project = visible_project(&state, &current, id).await?;
    if !project.is_owned_by(&current.user) && !current.user.is_super_admin {
        return Err(AppError::Forbidden);
    }

    // 项目与其附件在同一事务中软删除
    if state.repo.soft_delete_project(project.id).await? {
        tracing::info!("Project {} deleted by {}", project.key, current.user.username);
    }
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}
