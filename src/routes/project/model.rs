use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::routes::attachment::{Asset, Link};
use crate::routes::user::User;

/// 项目生命周期状态，提交时必须是其中之一，且在 status 字典表中处于启用状态
pub const LIFECYCLE_STATUSES: [&str; 5] = ["planning", "in_progress", "review", "completed", "on_hold"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown priority: {0}")]
pub struct UnknownPriority(pub String);

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPriority(s.to_string()))
    }
}

impl TryFrom<String> for Priority {
    type Error = UnknownPriority;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status_id: i64,
    pub category_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub budget: Option<String>,
    pub client: Option<String>,
    pub tags: Vec<String>,
    pub technologies: Vec<String>,
    pub team_members: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub user_id: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status_id: i64,
    pub category_id: Option<i64>,
    pub priority: Priority,
    pub budget: Option<String>,
    pub client: Option<String>,
    pub tags: Vec<String>,
    pub technologies: Vec<String>,
    pub team_members: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub user_id: i64,
    pub is_public: bool,
}

/// 项目及其全部未删除的附件
#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub links: Vec<Link>,
    pub assets: Vec<Asset>,
}

impl Project {
    pub fn is_owned_by(&self, user: &User) -> bool {
        self.user_id == user.id
    }

    /// 公开项目所有人可见，否则只对创建者（以及超级管理员）可见
    pub fn is_visible_to(&self, user: &User) -> bool {
        self.is_public || self.is_owned_by(user) || user.is_super_admin
    }
}
