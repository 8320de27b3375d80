use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;

use crate::routes::project::Project;
use crate::routes::user::{CurrentUser, Profile, User};

/// 可以挂载附件的实体种类，数据库中以小写文本保存在 owner_kind 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Profile,
    Project,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown owner kind: {0}")]
pub struct UnknownOwnerKind(pub String);

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::User => "user",
            OwnerKind::Profile => "profile",
            OwnerKind::Project => "project",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = UnknownOwnerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(OwnerKind::User),
            "profile" => Ok(OwnerKind::Profile),
            "project" => Ok(OwnerKind::Project),
            other => Err(UnknownOwnerKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for OwnerKind {
    type Error = UnknownOwnerKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 附件的归属：(种类, id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: i64,
}

impl OwnerRef {
    pub fn new(kind: OwnerKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn user(id: i64) -> Self {
        Self::new(OwnerKind::User, id)
    }

    pub fn profile(id: i64) -> Self {
        Self::new(OwnerKind::Profile, id)
    }

    pub fn project(id: i64) -> Self {
        Self::new(OwnerKind::Project, id)
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// 解析后的归属实体
#[derive(Debug, Clone)]
pub enum Owner {
    User(User),
    Profile(Profile),
    Project(Project),
}

impl Owner {
    /// 用户拥有自己、自己的资料和自己创建的项目
    pub fn is_owned_by(&self, current: &CurrentUser) -> bool {
        current.user.is_super_admin
            || match self {
                Owner::User(user) => user.id == current.user.id,
                Owner::Profile(profile) => profile.user_id == current.user.id,
                Owner::Project(project) => project.is_owned_by(&current.user),
            }
    }

    /// 用户与资料视为公开，项目按 is_public 判断
    pub fn is_visible_to(&self, current: &CurrentUser) -> bool {
        match self {
            Owner::Project(project) => project.is_visible_to(&current.user),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub url: String,
    pub link_type_id: i64,
    #[sqlx(try_from = "String")]
    pub owner_kind: OwnerKind,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub key: String,
    pub name: String,
    pub url: String,
    pub link_type_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: i64,
    pub display_name: String,
    /// 存储中的相对路径
    pub filename: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub checksum: String,
    pub asset_type_id: i64,
    pub is_active: bool,
    #[sqlx(try_from = "String")]
    pub owner_kind: OwnerKind,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub display_name: String,
    pub filename: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub checksum: String,
    pub asset_type_id: i64,
}

impl Link {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(self.owner_kind, self.owner_id)
    }
}

impl Asset {
    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(self.owner_kind, self.owner_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentId {
    Link(i64),
    Asset(i64),
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentId::Link(id) => write!(f, "link {id}"),
            AttachmentId::Asset(id) => write!(f, "asset {id}"),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Attachments {
    pub links: Vec<Link>,
    pub assets: Vec<Asset>,
}

/// 只接受带主机名的 http(s) 绝对地址
pub fn parse_link_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Some(url),
        _ => None,
    }
}

/// 按主机名推断链接类型
pub fn classify_link(url: &Url) -> &'static str {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

    if matches("github.com") {
        "github"
    } else if matches("linkedin.com") {
        "linkedin"
    } else {
        "liveurl"
    }
}

/// 按内容类型和文件名推断资源类型，无法归类的统一记为 document
pub fn classify_upload(file_name: &str, content_type: &str) -> &'static str {
    let lower_name = file_name.to_ascii_lowercase();
    if content_type.starts_with("image/") {
        "image"
    } else if content_type.starts_with("video/") {
        "video"
    } else if lower_name.starts_with("readme") || content_type == "text/markdown" {
        "readme"
    } else if matches!(
        content_type,
        "application/pdf"
            | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    ) {
        "resume"
    } else {
        "document"
    }
}
