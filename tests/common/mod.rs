//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashfeed::auth::cookie::session_cookie_value;
use dashfeed::auth::{AccessToken, OAuthProvider, RequestToken, Session};
use dashfeed::config::{self, OAuthConfig};
use dashfeed::data::MemorySessionStore;
use dashfeed::error::AppError;
use dashfeed::service::{DashboardApi, DashboardPage, DashboardQuery, Post, PostId};
use dashfeed::{AppState, build_router};
use tokio::net::TcpListener;

pub const REQUEST_TOKEN: &str = "req-token";
pub const VERIFIER: &str = "good-verifier";

/// Provider that hands out fixed tokens
#[derive(Default)]
pub struct FakeProvider {
    pub fail: AtomicBool,
    pub request_calls: AtomicUsize,
    pub access_calls: AtomicUsize,
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    async fn request_token(
        &self,
        _consumer: &OAuthConfig,
        _callback_url: &str,
    ) -> Result<RequestToken, AppError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Provider("provider unavailable".to_string()));
        }
        Ok(RequestToken {
            token: REQUEST_TOKEN.to_string(),
            secret: "req-secret".to_string(),
        })
    }

    async fn access_token(
        &self,
        _consumer: &OAuthConfig,
        request: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, AppError> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst)
            || request.token != REQUEST_TOKEN
            || verifier != VERIFIER
        {
            return Err(AppError::Provider("access token rejected".to_string()));
        }
        Ok(AccessToken {
            token: "acc-token".to_string(),
            secret: "acc-secret".to_string(),
        })
    }
}

/// Dashboard that serves queued pages for `since_id` polls
///
/// A page registered for a specific cursor is served once to the first
/// poll from that cursor; other polls take from the shared queue.
#[derive(Default)]
pub struct FakeDashboard {
    pub fail: AtomicBool,
    pub queries: Mutex<Vec<DashboardQuery>>,
    pub since_pages: Mutex<VecDeque<DashboardPage>>,
    pub pages_by_cursor: Mutex<HashMap<PostId, DashboardPage>>,
}

impl FakeDashboard {
    pub fn queue(&self, page: DashboardPage) {
        self.since_pages.lock().unwrap().push_back(page);
    }

    pub fn respond_after(&self, cursor: u64, page: DashboardPage) {
        self.pages_by_cursor
            .lock()
            .unwrap()
            .insert(PostId(cursor), page);
    }

    pub fn queries(&self) -> Vec<DashboardQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DashboardApi for FakeDashboard {
    async fn fetch(
        &self,
        _token: &AccessToken,
        query: DashboardQuery,
    ) -> Result<DashboardPage, AppError> {
        self.queries.lock().unwrap().push(query);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ExternalApi("dashboard unavailable".to_string()));
        }

        match query {
            DashboardQuery::Since(cursor) => {
                if let Some(page) = self.pages_by_cursor.lock().unwrap().remove(&cursor) {
                    return Ok(page);
                }
                Ok(self
                    .since_pages
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_default())
            }
            DashboardQuery::Offset(offset) => {
                let newest = 1000u64.saturating_sub(offset);
                Ok(page(&[newest, newest.saturating_sub(1)]))
            }
        }
    }
}

pub fn page(ids: &[u64]) -> DashboardPage {
    let posts = ids
        .iter()
        .map(|id| {
            let mut fields = serde_json::Map::new();
            fields.insert("type".to_string(), serde_json::json!("text"));
            Post {
                id: PostId(*id),
                fields,
            }
        })
        .collect();

    DashboardPage {
        posts,
        extra: serde_json::Map::new(),
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    pub provider: Arc<FakeProvider>,
    pub dashboard: Arc<FakeDashboard>,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            session: config::SessionConfig {
                secret: "test-secret-key-32-bytes-long!!!".to_string(),
                cookie_name: "connect.sid".to_string(),
                ttl_seconds: 3600,
                backend: config::SessionBackend::Memory,
                redis_url: None,
                key_prefix: "sess:".to_string(),
            },
            oauth: config::OAuthConfig {
                consumer_key: "test-consumer-key".to_string(),
                consumer_secret: "test-consumer-secret".to_string(),
                request_token_url: "https://provider.test/oauth/request_token".to_string(),
                access_token_url: "https://provider.test/oauth/access_token".to_string(),
                authorize_url: "https://provider.test/oauth/authorize".to_string(),
            },
            dashboard: config::DashboardConfig {
                api_url: "https://api.provider.test/v2/user/dashboard".to_string(),
                poll_interval_seconds: 1,
                request_timeout_seconds: 5,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let provider = Arc::new(FakeProvider::default());
        let dashboard = Arc::new(FakeDashboard::default());
        let sessions = Arc::new(MemorySessionStore::new(config.session.ttl()));
        let state = AppState::with_backends(config, sessions, provider.clone(), dashboard.clone());

        // Redirects are asserted on, never followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            client,
            provider,
            dashboard,
        }
    }

    /// Get base URL for HTTP requests
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Get URL for the WebSocket endpoint
    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket", self.addr)
    }

    /// Store a session under `id` and return a matching `Cookie` header
    pub async fn login_as(&self, id: &str, session: Session) -> String {
        self.state.sessions.set(id, &session).await.unwrap();
        self.cookie_for(id)
    }

    /// Signed `Cookie` header for a session id
    pub fn cookie_for(&self, id: &str) -> String {
        let value = session_cookie_value(id, &self.state.config.session.secret).unwrap();
        format!("connect.sid={}", urlencoding::encode(&value))
    }
}

pub fn authenticated_session() -> Session {
    Session::Authenticated(AccessToken {
        token: "acc-token".to_string(),
        secret: "acc-secret".to_string(),
    })
}

/// `name=value` pair from a `Set-Cookie` header, usable as a `Cookie` header
pub fn cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}
