//! Autoresource server: loads resource config, connects to Postgres and serves the resource routes.
//!
//! Run: `cargo run --bin autoresource-server` (reads `.env` and `AUTORESOURCE_*` variables).

use autoresource::{
    build_registry, common_routes, ensure_audit_table, ensure_database_exists, load_dir, resource_routes,
    AppState, CacheLayer, ControllerServices, PgAuditStore, PgStore, Settings, StatusColumnScope,
};
use axum::middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autoresource=info")),
        )
        .init();

    let settings = Settings::from_env();
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;
    ensure_audit_table(&pool).await?;

    let config = load_dir(&settings.config_path).await?;
    let services = ControllerServices {
        registry: Arc::new(build_registry(&config)?),
        store: Arc::new(PgStore::new(pool.clone())),
        audit: Arc::new(PgAuditStore::new(pool.clone())),
        cache: Arc::new(CacheLayer::new(settings.cache_capacity, settings.invalidation)),
        publication: Arc::new(StatusColumnScope::default()),
        filter_mode: settings.filter_mode,
        default_ttl_secs: settings.cache_ttl_secs,
    };
    let state = AppState::build(&config, &services).await?;
    tracing::info!(resources = ?state.resource_keys(), "resources ready");

    let mut app = common_routes().merge(resource_routes(state));
    if settings.trust_subject_header {
        tracing::warn!("trusting X-Subject-Id as caller identity; do not enable in production");
        app = app.layer(middleware::from_fn(autoresource::extractors::trust_subject_header));
    }
    let app = app.layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("autoresource listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
