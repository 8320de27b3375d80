use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tokio::sync::{Mutex, RwLock};

use crate::database::{DbResult, Repository};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Status {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkType {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AssetType {
    pub id: i64,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
}

/// 四张字典表某一时刻的完整内容
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogSnapshot {
    pub categories: Vec<Category>,
    pub statuses: Vec<Status>,
    pub link_types: Vec<LinkType>,
    pub asset_types: Vec<AssetType>,
}

impl CatalogSnapshot {
    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// 只返回启用中的状态
    pub fn active_status(&self, key: &str) -> Option<&Status> {
        self.statuses.iter().find(|s| s.key == key && s.is_active)
    }

    pub fn link_type(&self, key: &str) -> Option<&LinkType> {
        self.link_types.iter().find(|t| t.key == key)
    }

    pub fn asset_type(&self, key: &str) -> Option<&AssetType> {
        self.asset_types.iter().find(|t| t.key == key)
    }
}

/// 字典表的内存缓存。
///
/// 启动时整体加载；查找未命中时调用方可以请求刷新，两次刷新之间至少间隔
/// `min_refresh`，这样新增的字典值无需重新部署即可生效。
pub struct Catalog {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    last_refresh: Mutex<Option<Instant>>,
    min_refresh: Duration,
}

impl Catalog {
    pub fn new(snapshot: CatalogSnapshot, min_refresh: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            last_refresh: Mutex::new(Some(Instant::now())),
            min_refresh,
        }
    }

    pub async fn load(repo: &dyn Repository, min_refresh: Duration) -> DbResult<Self> {
        let snapshot = repo.load_catalog().await?;
        tracing::info!(
            "Loaded catalog: {} categories, {} statuses, {} link types, {} asset types",
            snapshot.categories.len(),
            snapshot.statuses.len(),
            snapshot.link_types.len(),
            snapshot.asset_types.len()
        );
        Ok(Self::new(snapshot, min_refresh))
    }

    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn refresh(&self, repo: &dyn Repository) -> DbResult<Arc<CatalogSnapshot>> {
        let fresh = Arc::new(repo.load_catalog().await?);
        *self.snapshot.write().await = fresh.clone();
        *self.last_refresh.lock().await = Some(Instant::now());
        tracing::debug!("Catalog refreshed");
        Ok(fresh)
    }

    /// 距上次刷新超过 `min_refresh` 时重新加载，返回是否真的刷新了
    pub async fn refresh_if_stale(&self, repo: &dyn Repository) -> DbResult<bool> {
        {
            let last = self.last_refresh.lock().await;
            if last.is_some_and(|at| at.elapsed() < self.min_refresh) {
                return Ok(false);
            }
        }
        self.refresh(repo).await?;
        Ok(true)
    }

    /// 先查缓存，未命中则按节流规则刷新后再查一次
    pub async fn lookup<T, F>(&self, repo: &dyn Repository, find: F) -> DbResult<Option<T>>
    where
        F: Fn(&CatalogSnapshot) -> Option<T>,
    {
        if let Some(found) = find(&*self.snapshot().await) {
            return Ok(Some(found));
        }
        if self.refresh_if_stale(repo).await? {
            return Ok(find(&*self.snapshot().await));
        }
        Ok(None)
    }
}
