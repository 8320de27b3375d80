//! 单元测试共用的夹具

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::AppState;
use crate::config::Config;
use crate::database::Repository;
use crate::database::memory::MemoryRepository;
use crate::middleware::IdentityGateway;
use crate::router::create_router;
use crate::routes::catalog::Catalog;
use crate::routes::project::{NewProject, Priority};
use crate::routes::user::{CurrentUser, IdentityClaims, Profile, User};
use crate::storage::memory::MemoryFileStore;

pub const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

pub fn test_config() -> Config {
    Config::from_lookup(|name| match name {
        "DATABASE_URL" => Some("postgres://localhost/portfolio_test".into()),
        "APP_URL" => Some("https://portfolio.example.com".into()),
        _ => None,
    })
    .unwrap()
}

/// 刷新间隔为零，查找未命中时总会重新加载
pub async fn seeded_catalog(repo: &dyn Repository) -> Catalog {
    Catalog::load(repo, Duration::ZERO).await.unwrap()
}

pub async fn new_project_for(repo: &dyn Repository, user_id: i64) -> NewProject {
    let catalog = repo.load_catalog().await.unwrap();
    let planning = catalog.active_status("planning").unwrap();
    NewProject {
        key: format!("fixture-{}", uuid::Uuid::new_v4().simple()),
        name: "Fixture".into(),
        description: None,
        notes: None,
        status_id: planning.id,
        category_id: None,
        priority: Priority::Low,
        budget: None,
        client: None,
        tags: Vec::new(),
        technologies: Vec::new(),
        team_members: Vec::new(),
        start_date: None,
        end_date: None,
        user_id,
        is_public: false,
    }
}

pub async fn test_state_with(files: Arc<MemoryFileStore>) -> (AppState, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::seeded());
    let catalog = Arc::new(seeded_catalog(repo.as_ref()).await);
    let state = AppState::new(test_config(), repo.clone(), files, catalog);
    (state, repo)
}

pub async fn current_user(state: &AppState, username: &str) -> CurrentUser {
    let claims = IdentityClaims {
        username: username.into(),
        email: format!("{username}@example.com"),
        name: None,
    };
    let user = User::find_or_create(state.repo.as_ref(), &claims).await.unwrap();
    let profile = Profile::ensure_for(state.repo.as_ref(), &user, None).await.unwrap();
    CurrentUser { user, profile }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub files: Arc<MemoryFileStore>,
}

pub async fn test_app() -> TestApp {
    let files = Arc::new(MemoryFileStore::new());
    let (state, repo) = test_state_with(files.clone()).await;
    let gateway = Arc::new(IdentityGateway::new(
        state.repo.clone(),
        state.config.logout_url().unwrap(),
    ));
    TestApp {
        router: create_router(state.clone(), gateway),
        state,
        repo,
        files,
    }
}

/// 手工拼装 multipart/form-data 请求体
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.bytes
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }
}
