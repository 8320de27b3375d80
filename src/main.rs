use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use portfolio_backend::{
    AppState,
    config::Config,
    database::{PgRepository, Repository},
    middleware::IdentityGateway,
    router::create_router,
    routes::catalog::Catalog,
    storage::LocalFileStore,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");
    let logout_url = config.logout_url().expect("Invalid logout URL");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'portfolio_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let repo: Arc<dyn Repository> = Arc::new(PgRepository::new(pool));

    // 字典表常驻内存
    let catalog = Arc::new(
        Catalog::load(repo.as_ref(), config.catalog_refresh_interval())
            .await
            .expect("Failed to load catalog"),
    );

    let files = Arc::new(LocalFileStore::new(
        config.storage_root.clone(),
        config.storage_timeout(),
    ));
    tracing::info!("Storing uploads under {}", config.storage_root.display());

    // 设置应用状态
    let state = AppState::new(config.clone(), repo.clone(), files, catalog);
    let gateway = Arc::new(IdentityGateway::new(repo, logout_url));

    let router = create_router(state, gateway);

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
