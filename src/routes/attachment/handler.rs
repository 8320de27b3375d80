use axum::{
    extract::{Extension, Json, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState,
    error::AppError,
    routes::user::CurrentUser,
    storage::Upload,
    utils::success_to_api_response,
};

use super::model::{AttachmentId, OwnerKind, OwnerRef};

#[derive(Debug, Deserialize)]
pub struct AttachLinkRequest {
    pub link_type: String,
    pub name: String,
    pub url: String,
}

fn owner_ref(kind: &str, id: i64) -> Result<OwnerRef, AppError> {
    let kind: OwnerKind = kind
        .parse()
        .map_err(|_| AppError::NotFound(format!("owner kind {kind}")))?;
    Ok(OwnerRef::new(kind, id))
}

/// 确认归属实体存在且当前用户可以修改它
async fn writable_owner(
    state: &AppState,
    current: &CurrentUser,
    owner: OwnerRef,
) -> Result<(), AppError> {
    let resolved = state.attachments.resolve_owner(owner).await?;
    if !resolved.is_owned_by(current) {
        tracing::warn!(
            "User {} tried to modify attachments of {}",
            current.user.username,
            owner
        );
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let owner = owner_ref(&kind, id)?;
    let resolved = state.attachments.resolve_owner(owner).await?;
    if !resolved.is_visible_to(&current) {
        // 不暴露私有项目是否存在
        return Err(AppError::UnknownOwner(owner));
    }

    let attachments = state.attachments.list_for(owner).await?;
    Ok((StatusCode::OK, success_to_api_response(attachments)))
}

#[axum::debug_handler]
pub async fn attach_link(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((kind, id)): Path<(String, i64)>,
    Json(req): Json<AttachLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    let owner = owner_ref(&kind, id)?;
    writable_owner(&state, &current, owner).await?;

    let link = state
        .attachments
        .attach_link(owner, &req.link_type, &req.name, &req.url)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(link)))
}

#[axum::debug_handler]
pub async fn attach_asset(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((kind, id)): Path<(String, i64)>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let owner = owner_ref(&kind, id)?;
    writable_owner(&state, &current, owner).await?;

    let mut asset_type: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart payload: {e}")))?
    {
        match field.name() {
            Some("asset_type") => {
                asset_type = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("invalid asset_type field: {e}"))
                })?);
            }
            Some("display_name") => {
                display_name = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("invalid display_name field: {e}"))
                })?);
            }
            Some("file") => {
                upload = Some(Upload::read_field(field, state.attachments.max_asset_bytes()).await);
            }
            _ => {}
        }
    }

    let asset_type = asset_type.unwrap_or_default();
    let upload = upload
        .filter(|u| !u.is_blank())
        .ok_or_else(|| AppError::BadRequest("missing file field".into()))?;
    let asset = state
        .attachments
        .attach_asset(owner, asset_type.trim(), display_name.as_deref(), upload)
        .await?;
    Ok((StatusCode::CREATED, success_to_api_response(asset)))
}

async fn detach(
    state: &AppState,
    current: &CurrentUser,
    id: AttachmentId,
) -> Result<(), AppError> {
    let owner = state.attachments.owner_of(id).await?;
    match state.attachments.resolve_owner(owner).await {
        Ok(resolved) if !resolved.is_owned_by(current) => return Err(AppError::Forbidden),
        Ok(_) => {}
        // 归属实体已被删除时附件也已级联删除，只有超级管理员可以继续操作
        Err(AppError::UnknownOwner(_)) if current.user.is_super_admin => {}
        Err(e) => return Err(e),
    }
    state.attachments.detach(id).await
}

#[axum::debug_handler]
pub async fn detach_link(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    detach(&state, &current, AttachmentId::Link(id)).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}

#[axum::debug_handler]
pub async fn detach_asset(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    detach(&state, &current, AttachmentId::Asset(id)).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "success": true })),
    ))
}
