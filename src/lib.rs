use std::sync::Arc;

use config::Config;
use database::Repository;
use routes::attachment::AttachmentStore;
use routes::catalog::Catalog;
use storage::FileStore;

pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod storage;
pub mod utils;
pub mod validation;

#[cfg(test)]
mod test_support;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn Repository>,
    pub catalog: Arc<Catalog>,
    pub attachments: AttachmentStore,
}

impl AppState {
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        files: Arc<dyn FileStore>,
        catalog: Arc<Catalog>,
    ) -> Self {
        let attachments = AttachmentStore::new(repo.clone(), files, catalog.clone(), config.max_asset_bytes);
        Self {
            config,
            repo,
            catalog,
            attachments,
        }
    }
}
