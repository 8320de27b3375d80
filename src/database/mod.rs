//! 持久化层。
//!
//! 业务逻辑只依赖 [`Repository`]，生产环境使用 [`PgRepository`]，
//! 测试使用内存实现。多态附件的 (owner_kind, owner_id) 不受数据库外键约束，
//! 归属校验与级联软删除都在应用层完成。

use async_trait::async_trait;

use crate::routes::attachment::{Asset, Link, NewAsset, NewLink, OwnerRef};
use crate::routes::catalog::CatalogSnapshot;
use crate::routes::project::{NewProject, Project};
use crate::routes::user::{NewUser, Profile, User};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgRepository;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation(_))
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn load_catalog(&self) -> DbResult<CatalogSnapshot>;

    async fn list_users(&self) -> DbResult<Vec<User>>;
    async fn find_user(&self, id: i64) -> DbResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>>;
    /// 受唯一约束保护的插入；与已有行冲突时返回 `None` 而不是错误
    async fn insert_user(&self, user: &NewUser) -> DbResult<Option<User>>;

    async fn find_profile(&self, id: i64) -> DbResult<Option<Profile>>;
    async fn find_profile_by_user(&self, user_id: i64) -> DbResult<Option<Profile>>;
    /// 同 `insert_user`，用户已有资料时返回 `None`
    async fn insert_profile(&self, user_id: i64, display_name: &str) -> DbResult<Option<Profile>>;

    async fn find_project(&self, id: i64) -> DbResult<Option<Project>>;
    async fn list_projects_for_user(&self, user_id: i64) -> DbResult<Vec<Project>>;
    /// 在同一事务中写入项目及其全部链接、资源
    async fn create_project(
        &self,
        project: &NewProject,
        links: &[NewLink],
        assets: &[NewAsset],
    ) -> DbResult<(Project, Vec<Link>, Vec<Asset>)>;
    /// 软删除项目并在同一事务中级联软删除其附件，项目不存在或已删除时返回 false
    async fn soft_delete_project(&self, id: i64) -> DbResult<bool>;

    async fn insert_link(&self, owner: OwnerRef, link: &NewLink) -> DbResult<Link>;
    async fn insert_asset(&self, owner: OwnerRef, asset: &NewAsset) -> DbResult<Asset>;
    async fn list_links(&self, owner: OwnerRef) -> DbResult<Vec<Link>>;
    async fn list_assets(&self, owner: OwnerRef) -> DbResult<Vec<Asset>>;
    /// 包含已软删除的行
    async fn find_link(&self, id: i64) -> DbResult<Option<Link>>;
    /// 包含已软删除的行
    async fn find_asset(&self, id: i64) -> DbResult<Option<Asset>>;
    async fn soft_delete_link(&self, id: i64) -> DbResult<bool>;
    async fn soft_delete_asset(&self, id: i64) -> DbResult<bool>;
    async fn soft_delete_attachments(&self, owner: OwnerRef) -> DbResult<u64>;
}
