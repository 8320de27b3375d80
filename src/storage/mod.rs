//! 上传文件的存储。
//!
//! 文件先写入存储，再记录 Asset 行；行写入失败时由调用方删除已写入的文件。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::multipart::Field;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;

/// 项目资源在公开存储中的命名空间
pub const PROJECT_ASSETS: &str = "project-assets";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out writing {0}")]
    Timeout(String),
    #[error("storage rejected {0}")]
    Rejected(String),
}

/// 已写入存储的文件，`path` 为相对存储根目录的路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub size: usize,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, namespace: &str, file_name: &str, data: &[u8]) -> Result<StoredObject, StorageError>;

    async fn remove(&self, path: &str) -> Result<(), StorageError>;
}

/// 本地文件系统存储，写入采用临时文件 + rename
pub struct LocalFileStore {
    root: PathBuf,
    timeout: Duration,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    async fn write_atomic(full_path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, full_path).await
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, namespace: &str, file_name: &str, data: &[u8]) -> Result<StoredObject, StorageError> {
        let relative = object_path(namespace, file_name);
        let full_path = self.root.join(&relative);
        tracing::debug!("Writing {} bytes to {}", data.len(), full_path.display());

        match tokio::time::timeout(self.timeout, Self::write_atomic(&full_path, data)).await {
            Ok(Ok(())) => Ok(StoredObject {
                path: relative,
                size: data.len(),
            }),
            Ok(Err(source)) => {
                tracing::warn!("Failed to write {}: {}", full_path.display(), source);
                Err(StorageError::Io {
                    path: relative,
                    source,
                })
            }
            Err(_) => {
                tracing::warn!("Timed out writing {}", full_path.display());
                let temp_path = full_path.with_extension("tmp");
                if let Err(e) = fs::remove_file(&temp_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove {}: {}", temp_path.display(), e);
                    }
                }
                Err(StorageError::Timeout(relative))
            }
        }
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.root.join(path);
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

/// 生成 `<namespace>/<uuid>.<ext>`，扩展名取自原始文件名且只保留字母数字
fn object_path(namespace: &str, file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    let id = Uuid::new_v4().simple();
    match extension {
        Some(ext) => format!("{namespace}/{id}.{ext}"),
        None => format!("{namespace}/{id}"),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// 上传声明的类型可信时直接使用，否则按文件名推断
pub fn detect_content_type(file_name: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(declared) if !declared.is_empty() && declared != "application/octet-stream" => {
            declared.to_string()
        }
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// 请求中读取到的单个上传文件
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub body: UploadBody,
}

#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Vec<u8>),
    /// 超过上限后不再保留内容，只记录已读取的字节数
    TooLarge { size: usize },
    Unreadable(String),
}

#[derive(Serialize)]
struct UploadEcho<'a> {
    file_name: &'a str,
    content_type: Option<&'a str>,
    size: Option<usize>,
}

impl Serialize for Upload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        UploadEcho {
            file_name: &self.file_name,
            content_type: self.content_type.as_deref(),
            size: self.size(),
        }
        .serialize(serializer)
    }
}

impl Upload {
    pub fn from_bytes(file_name: impl Into<String>, content_type: Option<&str>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.map(Into::into),
            body: UploadBody::Bytes(data),
        }
    }

    /// 逐块读取 multipart 文件字段，超过 `limit` 的部分只计数不保留
    pub async fn read_field(mut field: Field<'_>, limit: usize) -> Self {
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut data = Vec::new();
        let mut size = 0usize;
        let body = loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    size += chunk.len();
                    if size <= limit {
                        data.extend_from_slice(&chunk);
                    } else {
                        data = Vec::new();
                    }
                }
                Ok(None) if size > limit => break UploadBody::TooLarge { size },
                Ok(None) => break UploadBody::Bytes(data),
                Err(e) => break UploadBody::Unreadable(e.to_string()),
            }
        };

        Self {
            file_name,
            content_type,
            body,
        }
    }

    /// 浏览器对未选择文件的 file 输入框也会发送一个无文件名的空字段
    pub fn is_blank(&self) -> bool {
        self.file_name.trim().is_empty() && matches!(&self.body, UploadBody::Bytes(data) if data.is_empty())
    }

    pub fn size(&self) -> Option<usize> {
        match &self.body {
            UploadBody::Bytes(data) => Some(data.len()),
            UploadBody::TooLarge { size } => Some(*size),
            UploadBody::Unreadable(_) => None,
        }
    }

    pub fn detected_content_type(&self) -> String {
        detect_content_type(&self.file_name, self.content_type.as_deref())
    }
}
