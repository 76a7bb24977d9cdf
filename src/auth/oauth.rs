//! OAuth 1.0a handshake
//!
//! Three-legged flow bound to the HTTP session:
//! `none -> initialized -> authenticated`. Each step computes the next
//! session record and a redirect; the handler writes the record whole, so a
//! failed step never leaves a half-updated session behind.

use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    response::Redirect,
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::provider::{OAuthProvider, authorize_url};
use super::session::{HttpSession, Session};
use crate::AppState;
use crate::config::OAuthConfig;
use crate::error::AppError;
use crate::metrics::OAUTH_STEPS_TOTAL;

/// Where the browser lands once authorized (or when a step is a no-op)
pub const HOME_PATH: &str = "/";

/// Result of a handshake step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Replacement session record; `None` leaves the session untouched
    pub next: Option<Session>,
    /// Redirect target for the browser
    pub redirect: String,
}

impl Transition {
    fn unchanged(redirect: impl Into<String>) -> Self {
        Self {
            next: None,
            redirect: redirect.into(),
        }
    }
}

fn record_step<T>(step: &str, result: &Result<T, AppError>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    OAUTH_STEPS_TOTAL.with_label_values(&[step, outcome]).inc();
}

/// Start the handshake
///
/// An already authenticated session goes straight home. Otherwise a
/// request token is obtained and the browser is sent to the provider's
/// authorize page. Any earlier, unfinished handshake is replaced.
pub async fn initiate(
    provider: &dyn OAuthProvider,
    consumer: &OAuthConfig,
    callback_url: &str,
    session: &Session,
) -> Result<Transition, AppError> {
    if session.is_authenticated() {
        OAUTH_STEPS_TOTAL
            .with_label_values(&["initiate", "skipped"])
            .inc();
        return Ok(Transition::unchanged(HOME_PATH));
    }

    let result = provider.request_token(consumer, callback_url).await;
    record_step("initiate", &result);
    let request = result?;

    Ok(Transition {
        redirect: authorize_url(consumer, &request),
        next: Some(Session::Initialized(request)),
    })
}

/// Finish the handshake from the provider callback
///
/// Only an `initialized` session is exchanged; anything else is a no-op
/// redirect home. Concurrent callbacks for one session race to the store
/// and the last write wins; a late callback that sees `authenticated`
/// short-circuits here.
pub async fn complete(
    provider: &dyn OAuthProvider,
    consumer: &OAuthConfig,
    session: &Session,
    verifier: Option<&str>,
) -> Result<Transition, AppError> {
    let Some(request) = session.request_token() else {
        OAUTH_STEPS_TOTAL
            .with_label_values(&["complete", "skipped"])
            .inc();
        return Ok(Transition::unchanged(HOME_PATH));
    };

    let verifier = verifier
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation("oauth_verifier is required".to_string()))?;

    let result = provider.access_token(consumer, request, verifier).await;
    record_step("complete", &result);
    let access = result?;

    Ok(Transition {
        next: Some(Session::Authenticated(access)),
        redirect: HOME_PATH.to_string(),
    })
}

/// Create authentication router
///
/// Routes:
/// - GET /auth - Start the handshake
/// - GET /callback - Provider callback
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(begin_auth))
        .route("/callback", get(oauth_callback))
}

/// Response of a handshake step: a cookie for a newly written session and
/// the redirect
type StepResponse = (Option<CookieJar>, Redirect);

async fn apply(
    state: &AppState,
    session: HttpSession,
    transition: Transition,
) -> Result<StepResponse, AppError> {
    let jar = match transition.next {
        Some(next) => {
            tracing::info!(status = next.status().as_str(), "OAuth status changed");
            Some(session.commit(state, next).await?)
        }
        None => None,
    };

    Ok((jar, Redirect::to(&transition.redirect)))
}

/// GET /auth
async fn begin_auth(
    State(state): State<AppState>,
    session: HttpSession,
) -> Result<StepResponse, AppError> {
    let transition = initiate(
        state.oauth.as_ref(),
        &state.config.oauth,
        &state.config.server.callback_url(),
        &session.data,
    )
    .await
    .inspect_err(|e| tracing::error!(error = %e, step = "initiate", "OAuth step failed"))?;

    apply(&state, session, transition).await
}

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    oauth_verifier: Option<String>,
}

/// GET /callback
async fn oauth_callback(
    State(state): State<AppState>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    session: HttpSession,
) -> Result<StepResponse, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    let transition = complete(
        state.oauth.as_ref(),
        &state.config.oauth,
        &session.data,
        query.oauth_verifier.as_deref(),
    )
    .await
    .inspect_err(|e| tracing::error!(error = %e, step = "complete", "OAuth step failed"))?;

    apply(&state, session, transition).await
}
