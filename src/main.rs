use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use forklink::analytics::{AnalyticsService, GeoIpService, WindowedCache};
use forklink::auth::AuthService;
use forklink::config::Config;
use forklink::links::LinkManager;
use forklink::redirect::RedirectService;
use forklink::storage::{SqliteStorage, Storage};
use forklink::{api, cache, redirect};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!("Using SQLite storage: {}", config.database.url);
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to open database")?,
    );

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let backend = cache::from_config(&config.cache).await?;
    info!("Analytics cache backend: {:?}", config.cache.backend);
    let window_cache = Arc::new(WindowedCache::new(backend, config.cache.extra_pages));

    let geoip = GeoIpService::new(config.visitor.geoip_country_db.as_deref())?;
    if geoip.is_enabled() {
        info!("🌍 GeoIP country lookups enabled");
    } else {
        info!("🌍 No GeoIP database configured, Country falls back to client data");
    }

    let auth_service = Arc::new(AuthService::new(config.auth.jwt_secret.as_deref()));
    let analytics = Arc::new(AnalyticsService::new(
        Arc::clone(&storage),
        Arc::clone(&window_cache),
    ));
    let links = Arc::new(
        LinkManager::new(Arc::clone(&storage), window_cache)
            .with_max_rules(config.links.max_rules),
    );
    let redirects = Arc::new(RedirectService::new(Arc::clone(&storage)));

    let api_router = api::create_api_router(analytics, links, auth_service)
        .layer(TraceLayer::new_for_http());
    let redirect_router =
        redirect::create_redirect_router(redirects, geoip, config.visitor.clone())
            .layer(TraceLayer::new_for_http());

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);

    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!("🚀 Redirect server listening on http://{}", redirect_addr);

    tokio::try_join!(
        axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>()
        ),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>()
        ),
    )?;

    Ok(())
}
