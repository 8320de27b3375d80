use std::sync::Arc;

use uuid::Uuid;

use crate::database::Repository;
use crate::error::AppError;
use crate::routes::catalog::Catalog;
use crate::storage::{FileStore, PROJECT_ASSETS, Upload, UploadBody, sha256_hex};
use crate::validation::{FieldErrors, required_text};

use super::model::{
    Asset, AttachmentId, Attachments, Link, NewAsset, NewLink, Owner, OwnerKind, OwnerRef,
    parse_link_url,
};

pub const MAX_LINK_NAME_CHARS: usize = 255;
pub const MAX_LINK_URL_CHARS: usize = 500;

/// 多态附件存储。
///
/// 数据库不能跨 (owner_kind, owner_id) 做外键约束，这里负责：
/// 写入前确认归属实体存在、校验字典类型、先写文件后写行、级联软删除。
#[derive(Clone)]
pub struct AttachmentStore {
    repo: Arc<dyn Repository>,
    files: Arc<dyn FileStore>,
    catalog: Arc<Catalog>,
    max_asset_bytes: usize,
}

impl AttachmentStore {
    pub fn new(
        repo: Arc<dyn Repository>,
        files: Arc<dyn FileStore>,
        catalog: Arc<Catalog>,
        max_asset_bytes: usize,
    ) -> Self {
        Self {
            repo,
            files,
            catalog,
            max_asset_bytes,
        }
    }

    pub fn max_asset_bytes(&self) -> usize {
        self.max_asset_bytes
    }

    pub async fn resolve_owner(&self, owner: OwnerRef) -> Result<Owner, AppError> {
        let resolved = match owner.kind {
            OwnerKind::User => self.resolve_user(owner.id).await?,
            OwnerKind::Profile => self.resolve_profile(owner.id).await?,
            OwnerKind::Project => self.resolve_project(owner.id).await?,
        };
        resolved.ok_or(AppError::UnknownOwner(owner))
    }

    async fn resolve_user(&self, id: i64) -> Result<Option<Owner>, AppError> {
        let user = self.repo.find_user(id).await?;
        Ok(user.filter(|u| u.deleted_at.is_none()).map(Owner::User))
    }

    /// 资料随所属用户一起失效
    async fn resolve_profile(&self, id: i64) -> Result<Option<Owner>, AppError> {
        let Some(profile) = self.repo.find_profile(id).await? else {
            return Ok(None);
        };
        let user_live = self
            .repo
            .find_user(profile.user_id)
            .await?
            .is_some_and(|u| u.deleted_at.is_none());
        Ok(user_live.then_some(Owner::Profile(profile)))
    }

    async fn resolve_project(&self, id: i64) -> Result<Option<Owner>, AppError> {
        Ok(self.repo.find_project(id).await?.map(Owner::Project))
    }

    /// 校验链接类型与地址，生成待写入的链接
    pub async fn prepare_link(&self, link_type_key: &str, name: &str, url: &str) -> Result<NewLink, AppError> {
        let link_type = self
            .catalog
            .lookup(self.repo.as_ref(), |c| c.link_type(link_type_key).cloned())
            .await?
            .ok_or_else(|| AppError::InvalidLinkType(link_type_key.to_string()))?;

        let parsed = parse_link_url(url)
            .filter(|u| u.as_str().chars().count() <= MAX_LINK_URL_CHARS)
            .ok_or_else(|| AppError::InvalidUrl(url.to_string()))?;

        Ok(NewLink {
            key: Uuid::new_v4().simple().to_string(),
            name: name.trim().to_string(),
            url: parsed.into(),
            link_type_id: link_type.id,
        })
    }

    /// 校验并写入文件，返回待写入的资源行；调用方负责在行写入失败时 `discard`
    pub async fn store_upload(
        &self,
        owner_kind: OwnerKind,
        asset_type_key: &str,
        display_name: Option<&str>,
        upload: Upload,
    ) -> Result<NewAsset, AppError> {
        let asset_type = self
            .catalog
            .lookup(self.repo.as_ref(), |c| c.asset_type(asset_type_key).cloned())
            .await?
            .ok_or_else(|| AppError::InvalidAssetType(asset_type_key.to_string()))?;

        let content_type = upload.detected_content_type();
        let data = match upload.body {
            UploadBody::Bytes(data) => data,
            UploadBody::TooLarge { size } => {
                return Err(AppError::AssetTooLarge {
                    size,
                    limit: self.max_asset_bytes,
                });
            }
            UploadBody::Unreadable(reason) => return Err(AppError::AssetUnreadable(reason)),
        };
        if data.len() > self.max_asset_bytes {
            return Err(AppError::AssetTooLarge {
                size: data.len(),
                limit: self.max_asset_bytes,
            });
        }

        let stored = self
            .files
            .put(namespace_for(owner_kind), &upload.file_name, &data)
            .await?;

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(upload.file_name.as_str())
            .to_string();

        Ok(NewAsset {
            display_name,
            filename: stored.path,
            original_name: upload.file_name,
            size_bytes: stored.size as i64,
            content_type,
            checksum: sha256_hex(&data),
            asset_type_id: asset_type.id,
        })
    }

    /// 删除已写入但不会被记录的文件，失败只记日志
    pub async fn discard(&self, assets: &[NewAsset]) {
        for asset in assets {
            if let Err(e) = self.files.remove(&asset.filename).await {
                tracing::warn!("Failed to remove orphaned file {}: {}", asset.filename, e);
            }
        }
    }

    pub async fn attach_link(
        &self,
        owner: OwnerRef,
        link_type_key: &str,
        name: &str,
        url: &str,
    ) -> Result<Link, AppError> {
        let mut errors = FieldErrors::new();
        required_text(&mut errors, "name", Some(name), MAX_LINK_NAME_CHARS);
        if !errors.is_empty() {
            return Err(AppError::Validation {
                errors,
                input: serde_json::json!({ "link_type": link_type_key, "name": name, "url": url }),
            });
        }

        self.resolve_owner(owner).await?;
        let new_link = self.prepare_link(link_type_key, name, url).await?;
        let link = self.repo.insert_link(owner, &new_link).await?;
        tracing::info!("Attached link {} to {}", link.id, owner);
        Ok(link)
    }

    pub async fn attach_asset(
        &self,
        owner: OwnerRef,
        asset_type_key: &str,
        display_name: Option<&str>,
        upload: Upload,
    ) -> Result<Asset, AppError> {
        self.resolve_owner(owner).await?;
        let new_asset = self
            .store_upload(owner.kind, asset_type_key, display_name, upload)
            .await?;

        match self.repo.insert_asset(owner, &new_asset).await {
            Ok(asset) => {
                tracing::info!("Attached asset {} ({}) to {}", asset.id, asset.filename, owner);
                Ok(asset)
            }
            Err(e) => {
                tracing::error!("Failed to record asset for {}: {}", owner, e);
                self.discard(std::slice::from_ref(&new_asset)).await;
                Err(e.into())
            }
        }
    }

    /// 按插入顺序返回未删除的附件
    pub async fn list_for(&self, owner: OwnerRef) -> Result<Attachments, AppError> {
        Ok(Attachments {
            links: self.repo.list_links(owner).await?,
            assets: self.repo.list_assets(owner).await?,
        })
    }

    /// 附件的归属，已软删除的附件同样可以查到
    pub async fn owner_of(&self, id: AttachmentId) -> Result<OwnerRef, AppError> {
        let owner = match id {
            AttachmentId::Link(id) => self.repo.find_link(id).await?.map(|l| l.owner()),
            AttachmentId::Asset(id) => self.repo.find_asset(id).await?.map(|a| a.owner()),
        };
        owner.ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// 软删除单个附件；重复删除不是错误，不存在的 id 返回 NotFound
    pub async fn detach(&self, id: AttachmentId) -> Result<(), AppError> {
        self.owner_of(id).await?;
        let changed = match id {
            AttachmentId::Link(id) => self.repo.soft_delete_link(id).await?,
            AttachmentId::Asset(id) => self.repo.soft_delete_asset(id).await?,
        };
        if changed {
            tracing::info!("Detached {}", id);
        } else {
            tracing::debug!("{} was already detached", id);
        }
        Ok(())
    }

    /// 归属实体被软删除时调用
    pub async fn cascade_detach(&self, owner: OwnerRef) -> Result<u64, AppError> {
        let count = self.repo.soft_delete_attachments(owner).await?;
        tracing::info!("Detached {} attachments of {}", count, owner);
        Ok(count)
    }
}

fn namespace_for(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::Project => PROJECT_ASSETS,
        OwnerKind::User => "user-assets",
        OwnerKind::Profile => "profile-assets",
    }
}
