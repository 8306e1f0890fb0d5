//! claude-tollgate - multi-tenant reverse proxy for a hosted Anthropic-style
//! messages API, with ledgered cost accounting and rate/cost/quota enforcement.

mod admin;
mod aggregator;
mod auth;
mod backend;
mod config;
mod db;
mod error;
mod ledger;
mod limiter;
mod meter;
mod model_rewrite;
mod pricing;
mod proxy;
mod routes;
mod tenant_key;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::model_rewrite::ModelSwapState;

/// Shared application state
pub struct AppState {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub http_client: reqwest::Client,
    pub model_swap: ModelSwapState,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claude_tollgate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    tracing::info!(port = config.server_port, "Starting claude-tollgate");

    let database = db::Database::connect(&config.database_url, config.db_max_connections).await?;
    database.run_migrations().await?;
    backend::seed_default_if_empty(
        database.pool(),
        &config.anthropic_base_url,
        config.anthropic_api_key.as_deref(),
    )
    .await?;

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.http_client_timeout_secs))
        .build()?;

    let model_swap = ModelSwapState::new(config.enable_model_swapping, config.model_mapping.clone());

    let state = Arc::new(AppState {
        db: database.pool().clone(),
        http_client,
        model_swap,
        config,
    });

    let app = Router::new()
        .route("/", axum::routing::get(routes::health::banner))
        .route("/health", axum::routing::get(routes::health::health_check))
        .route("/ready", axum::routing::get(routes::health::readiness_check))
        .merge(routes::proxy::router())
        .merge(admin::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state.clone());

    let addr = format!("{}:{}", state.config.server_host, state.config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "claude-tollgate listening");

    axum::serve(listener, app).await?;

    Ok(())
}
