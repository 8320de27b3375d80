//! 项目提交：解析 multipart、逐字段收集校验错误、在一个事务中写入项目与附件。

use std::collections::BTreeMap;

use axum::extract::Multipart;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;
use crate::routes::attachment::{
    MAX_LINK_NAME_CHARS, MAX_LINK_URL_CHARS, OwnerKind, classify_link, classify_upload,
    parse_link_url,
};
use crate::routes::catalog::CatalogSnapshot;
use crate::routes::user::CurrentUser;
use crate::storage::{Upload, UploadBody};
use crate::utils::slugify;
use crate::validation::{FieldError, FieldErrors, optional_text, required_text};

use super::model::{LIFECYCLE_STATUSES, NewProject, Priority, Project, ProjectDetail};

pub const MAX_TEXT_CHARS: usize = 255;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkSubmission {
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

/// 原样保存的提交内容，校验失败时序列化后回显给客户端（文件只回显名称和大小）
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectSubmission {
    pub name: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub budget: Option<String>,
    pub client: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_public: Option<String>,
    pub tags: Vec<String>,
    pub technologies: Vec<String>,
    pub team_members: Vec<String>,
    pub links: Vec<LinkSubmission>,
    pub assets: Vec<Upload>,
}

#[derive(Debug, Clone)]
pub struct ValidatedLink {
    pub title: String,
    pub url: Url,
    pub link_type: String,
}

#[derive(Debug, Clone)]
pub struct ValidatedProject {
    pub name: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status_id: i64,
    pub category_id: Option<i64>,
    pub priority: Priority,
    pub budget: Option<String>,
    pub client: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_public: bool,
    pub tags: Vec<String>,
    pub technologies: Vec<String>,
    pub team_members: Vec<String>,
    pub links: Vec<ValidatedLink>,
    pub uploads: Vec<Upload>,
}

/// 解析 `links[3][title]` 形式的字段名
fn parse_link_field(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("links[")?;
    let (index, part) = rest.split_once("][")?;
    Some((index.parse().ok()?, part.strip_suffix(']')?))
}

fn parse_date(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<NaiveDate> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(field, FieldError::InvalidDate);
            None
        }
    }
}

fn parse_flag(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("off") | Some("no") => false,
        Some("1") | Some("true") | Some("on") | Some("yes") => true,
        Some(_) => {
            errors.add(field, FieldError::NotOneOf(vec!["true".into(), "false".into()]));
            false
        }
    }
}

/// 字符串列表：丢弃空白项，其余每项不超过 255 个字符
fn string_list(errors: &mut FieldErrors, field: &str, values: &[String]) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| optional_text(errors, &format!("{field}.{i}"), Some(v.as_str()), Some(MAX_TEXT_CHARS)))
        .collect()
}

impl ProjectSubmission {
    pub async fn from_multipart(mut multipart: Multipart, max_asset_bytes: usize) -> Result<Self, AppError> {
        let mut submission = Self::default();
        let mut links: BTreeMap<usize, LinkSubmission> = BTreeMap::new();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                // 文件读取中断后流已无法继续，交给校验阶段报告该文件
                Err(_) if submission.has_unreadable_upload() => break,
                Err(e) => return Err(AppError::BadRequest(format!("invalid multipart payload: {e}"))),
            };
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "assets" || name.starts_with("assets[") {
                let upload = Upload::read_field(field, max_asset_bytes).await;
                if upload.is_blank() {
                    tracing::debug!("Skipping empty file field {}", name);
                } else {
                    submission.assets.push(upload);
                }
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("invalid field {name}: {e}")))?;
            submission.apply_text_field(&mut links, &name, value);
        }

        submission.links = links.into_values().collect();
        Ok(submission)
    }

    fn has_unreadable_upload(&self) -> bool {
        self.assets
            .iter()
            .any(|u| matches!(u.body, UploadBody::Unreadable(_)))
    }

    fn apply_text_field(&mut self, links: &mut BTreeMap<usize, LinkSubmission>, name: &str, value: String) {
        match name {
            "name" => self.name = Some(value),
            "description" => self.description = Some(value),
            "notes" => self.notes = Some(value),
            "category" => self.category = Some(value),
            "status" => self.status = Some(value),
            "priority" => self.priority = Some(value),
            "budget" => self.budget = Some(value),
            "client" => self.client = Some(value),
            "start_date" => self.start_date = Some(value),
            "end_date" => self.end_date = Some(value),
            "is_public" => self.is_public = Some(value),
            "tags" | "tags[]" => self.tags.push(value),
            "technologies" | "technologies[]" => self.technologies.push(value),
            "team_members" | "team_members[]" => self.team_members.push(value),
            other => match parse_link_field(other) {
                Some((index, part)) => {
                    let link = links.entry(index).or_default();
                    match part {
                        "title" => link.title = Some(value),
                        "url" => link.url = Some(value),
                        "type" => link.link_type = Some(value),
                        _ => tracing::debug!("Ignoring link field {}", other),
                    }
                }
                None => tracing::debug!("Ignoring unknown field {}", other),
            },
        }
    }

    /// 提交中引用的字典键在当前快照里找不到，可能是字典表刚新增了数据
    pub fn references_unknown_keys(&self, catalog: &CatalogSnapshot) -> bool {
        let trimmed = |v: &Option<String>| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

        let status_missing = trimmed(&self.status)
            .is_some_and(|s| LIFECYCLE_STATUSES.contains(&s.as_str()) && catalog.active_status(&s).is_none());
        let category_missing = trimmed(&self.category).is_some_and(|c| catalog.category(&c).is_none());
        let link_type_missing = self
            .links
            .iter()
            .filter_map(|l| trimmed(&l.link_type))
            .any(|t| catalog.link_type(&t).is_none());

        status_missing || category_missing || link_type_missing
    }

    /// 校验全部字段并收集所有错误，不会在第一个错误处停止
    pub fn validate(self, catalog: &CatalogSnapshot, max_asset_bytes: usize) -> Result<ValidatedProject, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = required_text(&mut errors, "name", self.name.as_deref(), MAX_TEXT_CHARS);
        let description = optional_text(&mut errors, "description", self.description.as_deref(), None);
        let notes = optional_text(&mut errors, "notes", self.notes.as_deref(), None);
        let budget = optional_text(&mut errors, "budget", self.budget.as_deref(), Some(MAX_TEXT_CHARS));
        let client = optional_text(&mut errors, "client", self.client.as_deref(), Some(MAX_TEXT_CHARS));

        let status_id = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => {
                errors.add("status", FieldError::Required);
                None
            }
            Some(key) if !LIFECYCLE_STATUSES.contains(&key) => {
                errors.add(
                    "status",
                    FieldError::NotOneOf(LIFECYCLE_STATUSES.iter().map(|s| s.to_string()).collect()),
                );
                None
            }
            Some(key) => match catalog.active_status(key) {
                Some(status) => Some(status.id),
                None => {
                    errors.add(
                        "status",
                        FieldError::UnknownCatalogKey {
                            catalog: "status",
                            key: key.to_string(),
                        },
                    );
                    None
                }
            },
        };

        let category_id = optional_text(&mut errors, "category", self.category.as_deref(), Some(MAX_TEXT_CHARS))
            .and_then(|key| match catalog.category(&key) {
                Some(category) => Some(category.id),
                None => {
                    errors.add("category", FieldError::UnknownCatalogKey { catalog: "category", key });
                    None
                }
            });

        let priority = match self.priority.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            None => {
                errors.add("priority", FieldError::Required);
                None
            }
            Some(raw) => match raw.parse::<Priority>() {
                Ok(priority) => Some(priority),
                Err(_) => {
                    errors.add(
                        "priority",
                        FieldError::NotOneOf(Priority::ALL.iter().map(|p| p.to_string()).collect()),
                    );
                    None
                }
            },
        };

        let start_date = parse_date(&mut errors, "start_date", self.start_date.as_deref());
        let end_date = parse_date(&mut errors, "end_date", self.end_date.as_deref());
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.add("end_date", FieldError::InvalidDateRange);
            }
        }

        let is_public = parse_flag(&mut errors, "is_public", self.is_public.as_deref());
        let tags = string_list(&mut errors, "tags", &self.tags);
        let technologies = string_list(&mut errors, "technologies", &self.technologies);
        let team_members = string_list(&mut errors, "team_members", &self.team_members);

        let mut links = Vec::with_capacity(self.links.len());
        for (i, link) in self.links.iter().enumerate() {
            let title = required_text(&mut errors, &format!("links.{i}.title"), link.title.as_deref(), MAX_LINK_NAME_CHARS);

            let url_field = format!("links.{i}.url");
            let url = match link.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                None => {
                    errors.add(&url_field, FieldError::Required);
                    None
                }
                Some(raw) => match parse_link_url(raw) {
                    None => {
                        errors.add(&url_field, FieldError::InvalidUrl);
                        None
                    }
                    // 按规范化后实际入库的地址计算长度，百分号编码会变长
                    Some(url) if url.as_str().chars().count() > MAX_LINK_URL_CHARS => {
                        errors.add(&url_field, FieldError::TooLong { max: MAX_LINK_URL_CHARS });
                        None
                    }
                    Some(url) => Some(url),
                },
            };

            let explicit_type = link.link_type.as_deref().map(str::trim).filter(|t| !t.is_empty());
            let type_known = match explicit_type {
                Some(key) if catalog.link_type(key).is_none() => {
                    errors.add(
                        format!("links.{i}.type"),
                        FieldError::UnknownCatalogKey {
                            catalog: "link type",
                            key: key.to_string(),
                        },
                    );
                    false
                }
                _ => true,
            };

            if let (Some(title), Some(url), true) = (title, url, type_known) {
                let link_type = explicit_type
                    .map(str::to_string)
                    .unwrap_or_else(|| classify_link(&url).to_string());
                links.push(ValidatedLink { title, url, link_type });
            }
        }

        for (i, upload) in self.assets.iter().enumerate() {
            let field = format!("assets.{i}");
            match &upload.body {
                UploadBody::TooLarge { size } => errors.add(
                    field,
                    FieldError::AssetTooLarge {
                        size: *size,
                        limit: max_asset_bytes,
                    },
                ),
                UploadBody::Bytes(data) if data.len() > max_asset_bytes => errors.add(
                    field,
                    FieldError::AssetTooLarge {
                        size: data.len(),
                        limit: max_asset_bytes,
                    },
                ),
                UploadBody::Unreadable(reason) => errors.add(field, FieldError::AssetUnreadable(reason.clone())),
                UploadBody::Bytes(_) => {}
            }
        }

        match (name, status_id, priority) {
            (Some(name), Some(status_id), Some(priority)) if errors.is_empty() => Ok(ValidatedProject {
                name,
                description,
                notes,
                status_id,
                category_id,
                priority,
                budget,
                client,
                start_date,
                end_date,
                is_public,
                tags,
                technologies,
                team_members,
                links,
                uploads: self.assets,
            }),
            _ => Err(errors),
        }
    }
}

/// 项目键：名称的 slug 加随机后缀
fn project_key(name: &str) -> String {
    let mut slug = slugify(name);
    slug.truncate(48);
    let slug = slug.trim_end_matches('-');
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    if slug.is_empty() {
        format!("project-{suffix}")
    } else {
        format!("{slug}-{suffix}")
    }
}

impl Project {
    /// 处理一次项目提交。
    ///
    /// 校验失败时不写入任何数据；文件写入失败或数据库写入失败时整个提交回滚，
    /// 并删除本次已写入的文件。
    pub async fn submit(
        state: &AppState,
        current: &CurrentUser,
        submission: ProjectSubmission,
    ) -> Result<ProjectDetail, AppError> {
        let repo = state.repo.as_ref();
        let input = serde_json::to_value(&submission).unwrap_or(serde_json::Value::Null);

        if submission.references_unknown_keys(&*state.catalog.snapshot().await) {
            state.catalog.refresh_if_stale(repo).await?;
        }
        let snapshot = state.catalog.snapshot().await;

        let valid = match submission.validate(&snapshot, state.attachments.max_asset_bytes()) {
            Ok(valid) => valid,
            Err(errors) => {
                tracing::info!(
                    "Project submission from {} rejected: {:?}",
                    current.user.username,
                    errors.fields().collect::<Vec<_>>()
                );
                return Err(AppError::Validation { errors, input });
            }
        };

        let mut new_links = Vec::with_capacity(valid.links.len());
        for link in &valid.links {
            new_links.push(
                state
                    .attachments
                    .prepare_link(&link.link_type, &link.title, link.url.as_str())
                    .await?,
            );
        }

        let mut new_assets = Vec::with_capacity(valid.uploads.len());
        for upload in valid.uploads {
            let asset_type = classify_upload(&upload.file_name, &upload.detected_content_type());
            let file_name = upload.file_name.clone();
            match state
                .attachments
                .store_upload(OwnerKind::Project, asset_type, None, upload)
                .await
            {
                Ok(asset) => new_assets.push(asset),
                Err(e) => {
                    tracing::error!("Failed to store {} for new project: {}", file_name, e);
                    state.attachments.discard(&new_assets).await;
                    return Err(e);
                }
            }
        }

        let new_project = NewProject {
            key: project_key(&valid.name),
            name: valid.name,
            description: valid.description,
            notes: valid.notes,
            status_id: valid.status_id,
            category_id: valid.category_id,
            priority: valid.priority,
            budget: valid.budget,
            client: valid.client,
            tags: valid.tags,
            technologies: valid.technologies,
            team_members: valid.team_members,
            start_date: valid.start_date,
            end_date: valid.end_date,
            user_id: current.user.id,
            is_public: valid.is_public,
        };

        match repo.create_project(&new_project, &new_links, &new_assets).await {
            Ok((project, links, assets)) => {
                tracing::info!(
                    "Project {} created by {} with {} links and {} assets",
                    project.key,
                    current.user.username,
                    links.len(),
                    assets.len()
                );
                Ok(ProjectDetail {
                    project,
                    links,
                    assets,
                })
            }
            Err(e) => {
                tracing::error!("Failed to persist project {}: {}", new_project.key, e);
                state.attachments.discard(&new_assets).await;
                Err(e.into())
            }
        }
    }
}
