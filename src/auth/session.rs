//! Session management
//!
//! Sessions live in the shared session store, keyed by an opaque id that
//! travels in a signed cookie. The record is a tagged variant over the
//! OAuth status, so each status carries exactly the credentials it needs.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::cookie::{session_cookie_value, verify_session_cookie};
use crate::AppState;
use crate::error::AppError;

/// Request token issued by the provider while the user authorizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    #[serde(rename = "oauth_token")]
    pub token: String,
    #[serde(rename = "oauth_token_secret")]
    pub secret: String,
}

/// Access token used to sign dashboard API calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "oauth_access_token")]
    pub token: String,
    #[serde(rename = "oauth_access_token_secret")]
    pub secret: String,
}

/// Session record
///
/// Serialized flat with an `oauth_status` tag:
/// `{"oauth_status":"initialized","oauth_token":"..","oauth_token_secret":".."}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "oauth_status", rename_all = "lowercase")]
pub enum Session {
    /// No handshake started
    #[default]
    #[serde(rename = "none")]
    Anonymous,
    /// Request token obtained, waiting for the provider callback
    Initialized(RequestToken),
    /// Access token obtained
    Authenticated(AccessToken),
}

/// OAuth status without the attached credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthStatus {
    None,
    Initialized,
    Authenticated,
}

impl OAuthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthStatus::None => "none",
            OAuthStatus::Initialized => "initialized",
            OAuthStatus::Authenticated => "authenticated",
        }
    }
}

impl Session {
    pub fn status(&self) -> OAuthStatus {
        match self {
            Session::Anonymous => OAuthStatus::None,
            Session::Initialized(_) => OAuthStatus::Initialized,
            Session::Authenticated(_) => OAuthStatus::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    /// Access credentials, present only once authenticated
    pub fn access_token(&self) -> Option<&AccessToken> {
        match self {
            Session::Authenticated(token) => Some(token),
            _ => None,
        }
    }

    /// Request credentials, present only while initialized
    pub fn request_token(&self) -> Option<&RequestToken> {
        match self {
            Session::Initialized(token) => Some(token),
            _ => None,
        }
    }
}

/// Generate a new random session id
///
/// 24 random bytes, URL-safe base64 without padding.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Session bound to the current HTTP request
///
/// Resolved from the signed cookie. A missing or invalid cookie, or an id
/// the store no longer knows, yields a fresh anonymous session under a new
/// id; nothing is written until [`HttpSession::commit`] is called.
#[derive(Debug, Clone)]
pub struct HttpSession {
    id: String,
    is_new: bool,
    pub data: Session,
}

impl HttpSession {
    fn fresh() -> Self {
        Self {
            id: generate_session_id(),
            is_new: true,
            data: Session::Anonymous,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Overwrite the whole session record in the store
    ///
    /// Returns a cookie jar carrying `Set-Cookie` when the session id has
    /// not been issued to the client yet.
    pub async fn commit(self, state: &AppState, data: Session) -> Result<CookieJar, AppError> {
        state.sessions.set(&self.id, &data).await?;

        let jar = CookieJar::new();
        if !self.is_new {
            return Ok(jar);
        }

        let session_config = &state.config.session;
        let value = session_cookie_value(&self.id, &session_config.secret)?;
        let cookie = Cookie::build((session_config.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(state.config.should_use_secure_cookies())
            .same_site(SameSite::Lax)
            .build();

        Ok(jar.add(cookie))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for HttpSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let session_config = &state.config.session;

        let id = match verify_session_cookie(
            &parts.headers,
            &session_config.cookie_name,
            &session_config.secret,
        ) {
            Ok(id) => id,
            Err(_) => return Ok(Self::fresh()),
        };

        match state.sessions.get(&id).await? {
            Some(data) => Ok(Self {
                id,
                is_new: false,
                data,
            }),
            None => Ok(Self::fresh()),
        }
    }
}
