//! API layer
//!
//! HTTP handlers for:
//! - Home page and direct dashboard fetch
//! - WebSocket streaming of new posts
//! - Metrics (Prometheus)

mod home;
pub mod metrics;
mod posts;
pub mod streaming;

use axum::{Router, routing::get};

use crate::AppState;

pub use metrics::metrics_router;
pub use streaming::{ClientMessage, ServerMessage, StreamConnection, authenticate_connection};

/// Create the dashboard router
///
/// Routes:
/// - GET / - Home (redirects into the handshake when unauthorized)
/// - GET /posts - One dashboard page by offset
/// - GET /socket - WebSocket stream of new posts
pub fn dashboard_router() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/posts", get(posts::list_posts))
        .route("/socket", get(streaming::stream_socket))
}
