//! OAuth 1.0a authentication
//!
//! Handles:
//! - Signed session-id cookies
//! - Session records and the HTTP session extractor
//! - Request signing and provider token calls
//! - The three-legged handshake routes

pub mod cookie;
mod oauth;
pub mod provider;
pub mod session;
pub mod signature;

pub use oauth::{HOME_PATH, Transition, auth_router, complete, initiate};
pub use provider::{OAuth1Provider, OAuthProvider, authorize_url};
pub use session::{AccessToken, HttpSession, OAuthStatus, RequestToken, Session};
