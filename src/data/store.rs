//! Session store backends
//!
//! A session record is read and written whole; there are no partial-field
//! updates. Concurrent writers to the same id resolve as last writer wins,
//! which the store guarantees per key.

use async_trait::async_trait;
use moka::future::Cache;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

use crate::auth::Session;
use crate::config::{SessionBackend, SessionConfig};
use crate::error::AppError;
use crate::metrics::SESSION_STORE_OPERATIONS_TOTAL;

/// Key-value store holding session records by id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session; `Ok(None)` on a miss or an expired record
    async fn get(&self, id: &str) -> Result<Option<Session>, AppError>;

    /// Overwrite the session record and refresh its expiry
    async fn set(&self, id: &str, session: &Session) -> Result<(), AppError>;
}

fn record_operation<T>(operation: &str, result: &Result<T, AppError>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    SESSION_STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Connect the backend selected in configuration
pub async fn connect_session_store(
    config: &SessionConfig,
) -> Result<std::sync::Arc<dyn SessionStore>, AppError> {
    match config.backend {
        SessionBackend::Memory => {
            tracing::info!("Using in-memory session store");
            Ok(std::sync::Arc::new(MemorySessionStore::new(config.ttl())))
        }
        SessionBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                AppError::Config("session.redis_url is required for redis backend".to_string())
            })?;
            let store = RedisSessionStore::connect(url, &config.key_prefix, config.ttl()).await?;
            tracing::info!("Connected to Redis session store");
            Ok(std::sync::Arc::new(store))
        }
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Volatile session store for development and tests
///
/// Records expire after the configured TTL and are lost on restart.
pub struct MemorySessionStore {
    sessions: Cache<String, Session>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        let sessions = Cache::builder().time_to_live(ttl).build();
        Self { sessions }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, AppError> {
        let result = Ok(self.sessions.get(id).await);
        record_operation("get", &result);
        result
    }

    async fn set(&self, id: &str, session: &Session) -> Result<(), AppError> {
        self.sessions.insert(id.to_owned(), session.clone()).await;
        let result = Ok(());
        record_operation("set", &result);
        result
    }
}

// =============================================================================
// Redis backend
// =============================================================================

/// Redis-backed session store
///
/// Records are JSON strings under `<prefix><id>` with `EX` set to the TTL.
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    ttl: Duration,
}

impl RedisSessionStore {
    pub async fn connect(url: &str, key_prefix: &str, ttl: Duration) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_owned(),
            ttl,
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, id: &str) -> Result<Option<Session>, AppError> {
        let result: Result<Option<Session>, AppError> = async {
            let raw: Option<String> = self.conn.clone().get(self.key(id)).await?;
            raw.map(|json| {
                serde_json::from_str::<Session>(&json)
                    .map_err(|e| AppError::SessionStore(format!("corrupt session record: {e}")))
            })
            .transpose()
        }
        .await;

        record_operation("get", &result);
        result
    }

    async fn set(&self, id: &str, session: &Session) -> Result<(), AppError> {
        let result: Result<(), AppError> = async {
            let json =
                serde_json::to_string(session).map_err(|e| AppError::Internal(e.into()))?;
            let _: () = self
                .conn
                .clone()
                .set_ex(self.key(id), json, self.ttl.as_secs().max(1))
                .await?;
            Ok::<(), AppError>(())
        }
        .await;

        record_operation("set", &result);
        result
    }
}
