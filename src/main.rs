//! Sentinel IDS Backend Server
//!
//! Serves a pre-trained network intrusion classifier over HTTP and keeps a
//! log of every prediction it makes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SENTINEL IDS                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────────┐  ┌─────────────────────┐ │
//! │  │  API      │─▶│ Feature       │─▶│ Prediction Engine   │ │
//! │  │  (Axum)   │  │ Encoder       │  │ (classifier)        │ │
//! │  └─────┬─────┘  └───────┬───────┘  └──────────┬──────────┘ │
//! │        │          Model Artifact Store        │            │
//! │        └──────────────────┬───────────────────┘            │
//! │                           ▼                                 │
//! │                    ┌─────────────┐                          │
//! │                    │   SQLite    │  prediction log          │
//! │                    └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod model;
mod models;
mod handlers;
mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};
use model::ModelStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_log_filter().into());
    if config.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Sentinel IDS starting...");

    let models = load_models(&config)?;

    // Initialize database
    let pool = db::create_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    db::run_migrations(&pool)
        .await
        .context("Failed to apply database schema")?;

    // Build application state
    let state = AppState {
        pool,
        models,
        config: config.clone(),
    };

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    /// `None` when the artifacts failed to load (degraded mode)
    pub models: Option<Arc<ModelStore>>,
    pub config: config::Config,
}

/// Load model artifacts, degrading to `None` unless `require_model` is set
fn load_models(config: &config::Config) -> anyhow::Result<Option<Arc<ModelStore>>> {
    tracing::info!("Loading model from {}", config.model_dir.display());

    match ModelStore::load(&config.model_dir) {
        Ok(store) => Ok(Some(Arc::new(store))),
        Err(e) if !config.require_model => {
            tracing::error!("{}", e);
            tracing::error!("Serving without a model; /api/predict will fail until artifacts are added and the server restarted");
            Ok(None)
        }
        Err(e) => Err(e).context("REQUIRE_MODEL is set and model artifacts failed to load"),
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::check))
        .route("/api/predict", post(handlers::predict::predict))
        .route("/api/stats", get(handlers::history::stats))
        .route("/api/recent", get(handlers::history::recent))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &std::path::Path, require_model: bool) -> config::Config {
        config::Config {
            model_dir: dir.to_path_buf(),
            require_model,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_artifacts_degrade_by_default() {
        let dir = tempfile::tempdir().unwrap();

        let models = load_models(&config_for(dir.path(), false)).unwrap();
        assert!(models.is_none());
    }

    #[test]
    fn test_require_model_fails_fast() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_models(&config_for(dir.path(), true)).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("REQUIRE_MODEL"));
        for artifact in [
            model::artifacts::MODEL_FILE,
            model::artifacts::ENCODERS_FILE,
            model::artifacts::FEATURES_FILE,
        ] {
            assert!(message.contains(artifact), "{artifact} not named in: {message}");
        }
    }
}
