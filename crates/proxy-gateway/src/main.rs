use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

mod app;
mod bearer;
mod error;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    proxy_core::logging::init();

    let config_path = std::env::var("PROXY_CONFIG").ok();
    let config = proxy_core::config::ProxyConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        proxy_core::config::ProxyConfig::default()
    });

    std::fs::create_dir_all(&config.uploads.root)?;
    std::fs::create_dir_all(&config.uploads.exports_root)?;
    if let Some(parent) = std::path::Path::new(&config.store.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = rusqlite::Connection::open(&config.store.path)?;
    proxy_store::db::init_db(&conn)?;
    let store = Arc::new(proxy_store::Store::new(conn));

    let bind = config.bind.clone();
    let port = config.port;
    let state = Arc::new(app::AppState::new(config, store));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("proxy gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
