use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::routes::attachment::{Asset, Link, NewAsset, NewLink, OwnerRef};
use crate::routes::catalog::{AssetType, CatalogSnapshot, Category, LinkType, Status};
use crate::routes::project::{NewProject, Project};
use crate::routes::user::{NewUser, Profile, User};

use super::{DbError, DbResult, Repository};

const USER_COLUMNS: &str =
    "id, username, email, name, is_super_admin, created_at, updated_at, deleted_at";
const PROFILE_COLUMNS: &str = "id, user_id, display_name, bio, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, key, name, description, notes, status_id, category_id, priority, \
     budget, client, tags, technologies, team_members, start_date, end_date, user_id, is_public, \
     created_at, updated_at, deleted_at";
const LINK_COLUMNS: &str =
    "id, key, name, url, link_type_id, owner_kind, owner_id, created_at, updated_at, deleted_at";
const ASSET_COLUMNS: &str = "id, display_name, filename, original_name, size_bytes, content_type, \
     checksum, asset_type_id, is_active, owner_kind, owner_id, created_at, updated_at, deleted_at";

/// 把唯一约束冲突从普通数据库错误中区分出来
fn classify(e: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return DbError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string());
        }
    }
    DbError::Sqlx(e)
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_link_on(conn: &mut PgConnection, owner: OwnerRef, link: &NewLink) -> DbResult<Link> {
        sqlx::query_as::<_, Link>(&format!(
            r#"
            INSERT INTO links (key, name, url, link_type_id, owner_kind, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(&link.key)
        .bind(&link.name)
        .bind(&link.url)
        .bind(link.link_type_id)
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_one(conn)
        .await
        .map_err(classify)
    }

    async fn insert_asset_on(conn: &mut PgConnection, owner: OwnerRef, asset: &NewAsset) -> DbResult<Asset> {
        sqlx::query_as::<_, Asset>(&format!(
            r#"
            INSERT INTO assets (
                display_name, filename, original_name, size_bytes, content_type,
                checksum, asset_type_id, owner_kind, owner_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ASSET_COLUMNS}
            "#
        ))
        .bind(&asset.display_name)
        .bind(&asset.filename)
        .bind(&asset.original_name)
        .bind(asset.size_bytes)
        .bind(&asset.content_type)
        .bind(&asset.checksum)
        .bind(asset.asset_type_id)
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_one(conn)
        .await
        .map_err(classify)
    }

    async fn soft_delete_attachments_on(conn: &mut PgConnection, owner: OwnerRef) -> DbResult<u64> {
        let links = sqlx::query(
            r#"
            UPDATE links SET deleted_at = NOW(), updated_at = NOW()
            WHERE owner_kind = $1 AND owner_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let assets = sqlx::query(
            r#"
            UPDATE assets SET deleted_at = NOW(), updated_at = NOW()
            WHERE owner_kind = $1 AND owner_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(links + assets)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn load_catalog(&self) -> DbResult<CatalogSnapshot> {
        let categories = sqlx::query_as::<_, Category>("SELECT id, key, name FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let statuses = sqlx::query_as::<_, Status>("SELECT id, key, name, is_active FROM status ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let link_types =
            sqlx::query_as::<_, LinkType>("SELECT id, key, name, description FROM link_types ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let asset_types =
            sqlx::query_as::<_, AssetType>("SELECT id, key, name, description FROM asset_types ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(CatalogSnapshot {
            categories,
            statuses,
            link_types,
            asset_types,
        })
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_user(&self, id: i64) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND deleted_at IS NULL"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &NewUser) -> DbResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, name)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn find_profile(&self, id: i64) -> DbResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn find_profile_by_user(&self, user_id: i64) -> DbResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn insert_profile(&self, user_id: i64, display_name: &str) -> DbResult<Option<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (user_id, display_name)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn find_project(&self, id: i64) -> DbResult<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn list_projects_for_user(&self, user_id: i64) -> DbResult<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = $1 AND deleted_at IS NULL ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    async fn create_project(
        &self,
        project: &NewProject,
        links: &[NewLink],
        assets: &[NewAsset],
    ) -> DbResult<(Project, Vec<Link>, Vec<Asset>)> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (
                key, name, description, notes, status_id, category_id, priority,
                budget, client, tags, technologies, team_members,
                start_date, end_date, user_id, is_public
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&project.key)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.notes)
        .bind(project.status_id)
        .bind(project.category_id)
        .bind(project.priority.as_str())
        .bind(&project.budget)
        .bind(&project.client)
        .bind(&project.tags)
        .bind(&project.technologies)
        .bind(&project.team_members)
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.user_id)
        .bind(project.is_public)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let owner = OwnerRef::project(created.id);
        let mut created_links = Vec::with_capacity(links.len());
        for link in links {
            created_links.push(Self::insert_link_on(&mut tx, owner, link).await?);
        }
        let mut created_assets = Vec::with_capacity(assets.len());
        for asset in assets {
            created_assets.push(Self::insert_asset_on(&mut tx, owner, asset).await?);
        }

        // 任何一步出错时 tx 被 drop，整体回滚
        tx.commit().await?;
        Ok((created, created_links, created_assets))
    }

    async fn soft_delete_project(&self, id: i64) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            r#"
            UPDATE projects SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            return Ok(false);
        }

        let detached = Self::soft_delete_attachments_on(&mut tx, OwnerRef::project(id)).await?;
        tx.commit().await?;
        tracing::debug!("Soft-deleted project {} and {} attachments", id, detached);
        Ok(true)
    }

    async fn insert_link(&self, owner: OwnerRef, link: &NewLink) -> DbResult<Link> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_link_on(&mut conn, owner, link).await
    }

    async fn insert_asset(&self, owner: OwnerRef, asset: &NewAsset) -> DbResult<Asset> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_asset_on(&mut conn, owner, asset).await
    }

    async fn list_links(&self, owner: OwnerRef) -> DbResult<Vec<Link>> {
        let links = sqlx::query_as::<_, Link>(&format!(
            r#"
            SELECT {LINK_COLUMNS} FROM links
            WHERE owner_kind = $1 AND owner_id = $2 AND deleted_at IS NULL
            ORDER BY id
            "#
        ))
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(links)
    }

    async fn list_assets(&self, owner: OwnerRef) -> DbResult<Vec<Asset>> {
        let assets = sqlx::query_as::<_, Asset>(&format!(
            r#"
            SELECT {ASSET_COLUMNS} FROM assets
            WHERE owner_kind = $1 AND owner_id = $2 AND deleted_at IS NULL
            ORDER BY id
            "#
        ))
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(assets)
    }

    async fn find_link(&self, id: i64) -> DbResult<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!("SELECT {LINK_COLUMNS} FROM links WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(link)
    }

    async fn find_asset(&self, id: i64) -> DbResult<Option<Asset>> {
        let asset = sqlx::query_as::<_, Asset>(&format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(asset)
    }

    async fn soft_delete_link(&self, id: i64) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE links SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn soft_delete_asset(&self, id: i64) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE assets SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn soft_delete_attachments(&self, owner: OwnerRef) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let count = Self::soft_delete_attachments_on(&mut tx, owner).await?;
        tx.commit().await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    const SCHEMA: &str = include_str!("../../migrations/20250725000001_create_schema.sql");

    #[test]
    fn migration_creates_the_persisted_tables() {
        for table in [
            "users",
            "profiles",
            "categories",
            "status",
            "projects",
            "link_types",
            "links",
            "asset_types",
            "assets",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE {table} (")),
                "missing table {table}"
            );
        }
        assert!(SCHEMA.contains("REFERENCES status (id)"));
    }

    #[test]
    fn migration_seeds_catalogs_but_no_users() {
        assert!(SCHEMA.contains("INSERT INTO status (key, name)"));
        assert!(!SCHEMA.contains("INSERT INTO users"));
    }
}
