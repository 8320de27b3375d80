//! 测试用的内存仓库，约束与迁移脚本保持一致：
//! 未删除用户的用户名/邮箱唯一、每个用户一份资料、项目键唯一。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::routes::attachment::{Asset, Link, NewAsset, NewLink, OwnerRef};
use crate::routes::catalog::{AssetType, CatalogSnapshot, Category, LinkType, Status};
use crate::routes::project::{NewProject, Project};
use crate::routes::user::{NewUser, Profile, User};

use super::{DbError, DbResult, Repository};

#[derive(Default)]
struct Tables {
    next_id: i64,
    catalog: CatalogSnapshot,
    users: Vec<User>,
    profiles: Vec<Profile>,
    projects: Vec<Project>,
    links: Vec<Link>,
    assets: Vec<Asset>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    fail_projects: AtomicBool,
}

fn seeded_catalog() -> CatalogSnapshot {
    let categories = [
        ("web", "Web"),
        ("mobile", "Mobile"),
        ("desktop", "Desktop"),
        ("library", "Library"),
        ("data", "Data"),
        ("other", "Other"),
    ];
    let statuses = [
        ("planning", "Planning"),
        ("in_progress", "In Progress"),
        ("review", "Review"),
        ("completed", "Completed"),
        ("on_hold", "On Hold"),
    ];
    let link_types = [
        ("github", "GitHub"),
        ("linkedin", "LinkedIn"),
        ("portfolio", "Portfolio"),
        ("liveurl", "Live URL"),
    ];
    let asset_types = [
        ("image", "Image"),
        ("video", "Video"),
        ("resume", "Resume"),
        ("readme", "Readme"),
        ("document", "Document"),
    ];

    CatalogSnapshot {
        categories: (1..)
            .zip(categories)
            .map(|(id, (key, name))| Category {
                id,
                key: key.into(),
                name: name.into(),
            })
            .collect(),
        statuses: (1..)
            .zip(statuses)
            .map(|(id, (key, name))| Status {
                id,
                key: key.into(),
                name: name.into(),
                is_active: true,
            })
            .collect(),
        link_types: (1..)
            .zip(link_types)
            .map(|(id, (key, name))| LinkType {
                id,
                key: key.into(),
                name: name.into(),
                description: None,
            })
            .collect(),
        asset_types: (1..)
            .zip(asset_types)
            .map(|(id, (key, name))| AssetType {
                id,
                key: key.into(),
                name: name.into(),
                description: None,
            })
            .collect(),
    }
}

impl MemoryRepository {
    /// 与迁移脚本相同的字典数据
    pub fn seeded() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_id: 100,
                catalog: seeded_catalog(),
                ..Default::default()
            }),
            fail_projects: AtomicBool::new(false),
        }
    }

    pub async fn set_status_active(&self, key: &str, active: bool) {
        let mut tables = self.tables.lock().await;
        for status in tables.catalog.statuses.iter_mut().filter(|s| s.key == key) {
            status.is_active = active;
        }
    }

    pub async fn add_link_type(&self, key: &str, name: &str) {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        tables.catalog.link_types.push(LinkType {
            id,
            key: key.into(),
            name: name.into(),
            description: None,
        });
    }

    pub async fn add_category(&self, key: &str, name: &str) {
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        tables.catalog.categories.push(Category {
            id,
            key: key.into(),
            name: name.into(),
        });
    }

    /// 之后的 `create_project` 全部失败，模拟事务中途出错
    pub fn fail_project_inserts(&self, fail: bool) {
        self.fail_projects.store(fail, Ordering::SeqCst);
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    pub async fn profile_count_for(&self, user_id: i64) -> usize {
        self.tables
            .lock()
            .await
            .profiles
            .iter()
            .filter(|p| p.user_id == user_id)
            .count()
    }

    pub async fn project_count(&self) -> usize {
        self.tables.lock().await.projects.len()
    }

    pub async fn link_count(&self) -> usize {
        self.tables.lock().await.links.len()
    }

    pub async fn promote_to_super_admin(&self, user_id: i64) {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.is_super_admin = true;
        }
    }

    pub async fn soft_delete_user(&self, user_id: i64) {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.deleted_at = Some(Utc::now());
        }
    }

    fn link_row(tables: &mut Tables, owner: OwnerRef, link: &NewLink) -> Link {
        let now = Utc::now();
        Link {
            id: tables.next_id(),
            key: link.key.clone(),
            name: link.name.clone(),
            url: link.url.clone(),
            link_type_id: link.link_type_id,
            owner_kind: owner.kind,
            owner_id: owner.id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn asset_row(tables: &mut Tables, owner: OwnerRef, asset: &NewAsset) -> Asset {
        let now = Utc::now();
        Asset {
            id: tables.next_id(),
            display_name: asset.display_name.clone(),
            filename: asset.filename.clone(),
            original_name: asset.original_name.clone(),
            size_bytes: asset.size_bytes,
            content_type: asset.content_type.clone(),
            checksum: asset.checksum.clone(),
            asset_type_id: asset.asset_type_id,
            is_active: true,
            owner_kind: owner.kind,
            owner_id: owner.id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn detach_all(tables: &mut Tables, owner: OwnerRef) -> u64 {
        let now = Utc::now();
        let mut count = 0;
        for link in tables
            .links
            .iter_mut()
            .filter(|l| l.owner() == owner && l.deleted_at.is_none())
        {
            link.deleted_at = Some(now);
            count += 1;
        }
        for asset in tables
            .assets
            .iter_mut()
            .filter(|a| a.owner() == owner && a.deleted_at.is_none())
        {
            asset.deleted_at = Some(now);
            count += 1;
        }
        count
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn load_catalog(&self) -> DbResult<CatalogSnapshot> {
        Ok(self.tables.lock().await.catalog.clone())
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn find_user(&self, id: i64) -> DbResult<Option<User>> {
        Ok(self.tables.lock().await.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == username && u.deleted_at.is_none())
            .cloned())
    }

    async fn insert_user(&self, user: &NewUser) -> DbResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        let taken = tables.users.iter().any(|u| {
            u.deleted_at.is_none() && (u.username == user.username || u.email == user.email)
        });
        if taken {
            return Ok(None);
        }

        let now = Utc::now();
        let row = User {
            id: tables.next_id(),
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            is_super_admin: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.users.push(row.clone());
        Ok(Some(row))
    }

    async fn find_profile(&self, id: i64) -> DbResult<Option<Profile>> {
        Ok(self.tables.lock().await.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn find_profile_by_user(&self, user_id: i64) -> DbResult<Option<Profile>> {
        Ok(self
            .tables
            .lock()
            .await
            .profiles
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_profile(&self, user_id: i64, display_name: &str) -> DbResult<Option<Profile>> {
        let mut tables = self.tables.lock().await;
        if tables.profiles.iter().any(|p| p.user_id == user_id) {
            return Ok(None);
        }

        let now = Utc::now();
        let row = Profile {
            id: tables.next_id(),
            user_id,
            display_name: display_name.to_string(),
            bio: None,
            created_at: now,
            updated_at: now,
        };
        tables.profiles.push(row.clone());
        Ok(Some(row))
    }

    async fn find_project(&self, id: i64) -> DbResult<Option<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .projects
            .iter()
            .find(|p| p.id == id && p.deleted_at.is_none())
            .cloned())
    }

    async fn list_projects_for_user(&self, user_id: i64) -> DbResult<Vec<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .projects
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id && p.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn create_project(
        &self,
        project: &NewProject,
        links: &[NewLink],
        assets: &[NewAsset],
    ) -> DbResult<(Project, Vec<Link>, Vec<Asset>)> {
        if self.fail_projects.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        let mut tables = self.tables.lock().await;
        if tables.projects.iter().any(|p| p.key == project.key) {
            return Err(DbError::UniqueViolation("projects_key_key".into()));
        }

        let now = Utc::now();
        let row = Project {
            id: tables.next_id(),
            key: project.key.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            notes: project.notes.clone(),
            status_id: project.status_id,
            category_id: project.category_id,
            priority: project.priority,
            budget: project.budget.clone(),
            client: project.client.clone(),
            tags: project.tags.clone(),
            technologies: project.technologies.clone(),
            team_members: project.team_members.clone(),
            start_date: project.start_date,
            end_date: project.end_date,
            user_id: project.user_id,
            is_public: project.is_public,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let owner = OwnerRef::project(row.id);
        let link_rows: Vec<_> = links
            .iter()
            .map(|l| Self::link_row(&mut tables, owner, l))
            .collect();
        let asset_rows: Vec<_> = assets
            .iter()
            .map(|a| Self::asset_row(&mut tables, owner, a))
            .collect();

        tables.projects.push(row.clone());
        tables.links.extend(link_rows.iter().cloned());
        tables.assets.extend(asset_rows.iter().cloned());
        Ok((row, link_rows, asset_rows))
    }

    async fn soft_delete_project(&self, id: i64) -> DbResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(project) = tables
            .projects
            .iter_mut()
            .find(|p| p.id == id && p.deleted_at.is_none())
        else {
            return Ok(false);
        };
        project.deleted_at = Some(Utc::now());
        Self::detach_all(&mut tables, OwnerRef::project(id));
        Ok(true)
    }

    async fn insert_link(&self, owner: OwnerRef, link: &NewLink) -> DbResult<Link> {
        let mut tables = self.tables.lock().await;
        let row = Self::link_row(&mut tables, owner, link);
        tables.links.push(row.clone());
        Ok(row)
    }

    async fn insert_asset(&self, owner: OwnerRef, asset: &NewAsset) -> DbResult<Asset> {
        let mut tables = self.tables.lock().await;
        let row = Self::asset_row(&mut tables, owner, asset);
        tables.assets.push(row.clone());
        Ok(row)
    }

    async fn list_links(&self, owner: OwnerRef) -> DbResult<Vec<Link>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .links
            .iter()
            .filter(|l| l.owner() == owner && l.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_assets(&self, owner: OwnerRef) -> DbResult<Vec<Asset>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assets
            .iter()
            .filter(|a| a.owner() == owner && a.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn find_link(&self, id: i64) -> DbResult<Option<Link>> {
        Ok(self.tables.lock().await.links.iter().find(|l| l.id == id).cloned())
    }

    async fn find_asset(&self, id: i64) -> DbResult<Option<Asset>> {
        Ok(self.tables.lock().await.assets.iter().find(|a| a.id == id).cloned())
    }

    async fn soft_delete_link(&self, id: i64) -> DbResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.links.iter_mut().find(|l| l.id == id && l.deleted_at.is_none()) {
            Some(link) => {
                link.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_asset(&self, id: i64) -> DbResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.assets.iter_mut().find(|a| a.id == id && a.deleted_at.is_none()) {
            Some(asset) => {
                asset.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_attachments(&self, owner: OwnerRef) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        Ok(Self::detach_all(&mut tables, owner))
    }
}
