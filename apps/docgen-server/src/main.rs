//! docgen Server
//!
//! Fills Word (`.docx`) templates from JSON payloads and returns the
//! generated document as a download. Provides REST API endpoints for:
//!
//! - Document generation (`/generate`, `/generate-cv`)
//! - Template listing
//! - Liveness and health checks
//!
//! ## Architecture
//!
//! Request handling is a thin layer over `docx-engine`'s
//! `DocumentPipeline`, adding:
//!
//! - Rate limiting via tower-governor
//! - Request body limits
//! - Render timeouts

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use docx_engine::DocumentPipeline;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod error;

use api::{handle_generate, handle_health, handle_list_templates, handle_root};
use config::Args;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    /// Render timeout in milliseconds
    pub timeout_ms: u64,
}

/// Routes without transport middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Liveness
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        // API endpoints
        .route("/api/templates", get(handle_list_templates))
        .route("/generate", post(handle_generate))
        .route("/generate-cv", post(handle_generate))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting docgen server on {}:{}", args.host, args.port);

    let pipeline = DocumentPipeline::new(args.pipeline_config()?)
        .context("Invalid pipeline configuration")?;
    let templates = pipeline.template_directory();
    if !templates.root().is_dir() {
        warn!(
            "Templates directory {} does not exist; every request will fail",
            templates.root().display()
        );
    }

    // Create rate limiter configuration
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(args.rate_limit.into())
            .burst_size(args.rate_limit * 2)
            .finish()
            .context("Failed to create rate limiter config")?,
    );

    // Create shared state
    let state = AppState {
        pipeline: Arc::new(pipeline),
        timeout_ms: args.timeout_ms,
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = build_router(state.clone())
        // Apply middleware
        .layer(DefaultBodyLimit::max(args.body_limit))
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let templates = state.pipeline.template_directory();
    info!("Server listening on http://{}", addr);
    info!("Templates: {}", templates.root().display());
    info!("Default template: {}", templates.default_template());
    info!("Rate limit: {} requests/second per IP", args.rate_limit);
    info!("Render timeout: {}ms", args.timeout_ms);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
