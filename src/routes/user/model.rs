use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::Repository;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 上游网关注入的身份声明，已认为可信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
}

/// 经过身份网关后挂在请求上的当前用户
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub user: User,
    pub profile: Profile,
}

/// 首页展示的用户列表项
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub name: Option<String>,
    pub email: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            email: user.email,
        }
    }
}

impl User {
    /// 按用户名查找或创建用户。
    ///
    /// 并发的首次请求可能同时走到插入，插入由唯一约束保护，
    /// 输掉竞争的一方拿到 `None` 后重新读取即可。
    pub async fn find_or_create(
        repo: &dyn Repository,
        claims: &IdentityClaims,
    ) -> Result<Self, AppError> {
        if let Some(user) = repo.find_user_by_username(&claims.username).await? {
            return Ok(user);
        }

        let new_user = NewUser {
            username: claims.username.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
        };
        let inserted = match repo.insert_user(&new_user).await {
            Ok(inserted) => inserted,
            Err(e) if e.is_unique_violation() => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(user) = inserted {
            tracing::info!("Provisioned user {} (id {})", user.username, user.id);
            return Ok(user);
        }

        tracing::debug!(
            "Duplicate identity while provisioning {}, re-fetching",
            claims.username
        );
        match repo.find_user_by_username(&claims.username).await? {
            Some(user) => Ok(user),
            // 冲突来自另一个用户名占用了同一邮箱
            None => Err(AppError::IdentityConflict(format!(
                "email {} is already bound to another user",
                claims.email
            ))),
        }
    }
}

impl Profile {
    /// 保证用户恰好有一份资料，显示名默认取 name 声明，否则取用户名
    pub async fn ensure_for(
        repo: &dyn Repository,
        user: &User,
        name_claim: Option<&str>,
    ) -> Result<Self, AppError> {
        if let Some(profile) = repo.find_profile_by_user(user.id).await? {
            return Ok(profile);
        }

        let display_name = name_claim.unwrap_or(&user.username);
        let inserted = match repo.insert_profile(user.id, display_name).await {
            Ok(inserted) => inserted,
            Err(e) if e.is_unique_violation() => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(profile) = inserted {
            tracing::info!("Created profile for user {}", user.username);
            return Ok(profile);
        }

        repo.find_profile_by_user(user.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile of user {}", user.id)))
    }
}
