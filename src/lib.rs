//! Dashfeed - a live dashboard relay authorized with OAuth 1.0a
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - OAuth handshake routes (/auth, /callback)                │
//! │  - Home and direct fetch (/, /posts)                        │
//! │  - WebSocket stream (/socket)                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Dashboard API client                                     │
//! │  - Per-connection poll tasks                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Session store (Redis or in-memory)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP and WebSocket handlers
//! - `auth`: signed cookies, sessions, OAuth 1.0a handshake
//! - `service`: dashboard client and polling
//! - `data`: session store backends
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; every field is a shared handle. The session
/// store is the only state shared between requests and connections.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Session records, shared by the HTTP routes and streaming connections
    pub sessions: Arc<dyn data::SessionStore>,

    /// OAuth 1.0a provider token endpoints
    pub oauth: Arc<dyn auth::OAuthProvider>,

    /// Dashboard API
    pub dashboard: Arc<dyn service::DashboardApi>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build the outbound HTTP client
    /// 2. Connect the session store
    /// 3. Wire the provider and dashboard clients
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = reqwest::Client::builder()
            .user_agent("Dashfeed/0.1.0")
            .timeout(std::time::Duration::from_secs(
                config.dashboard.request_timeout_seconds,
            ))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let sessions = data::connect_session_store(&config.session).await?;

        let oauth = Arc::new(auth::OAuth1Provider::new(http_client.clone()));
        let dashboard = Arc::new(service::TumblrDashboard::new(
            http_client,
            &config.dashboard.api_url,
            config.oauth.clone(),
        )?);

        tracing::info!("Application state initialized successfully");

        Ok(Self::with_backends(config, sessions, oauth, dashboard))
    }

    /// Assemble state from already constructed backends
    pub fn with_backends(
        config: config::AppConfig,
        sessions: Arc<dyn data::SessionStore>,
        oauth: Arc<dyn auth::OAuthProvider>,
        dashboard: Arc<dyn service::DashboardApi>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            oauth,
            dashboard,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .merge(api::dashboard_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
