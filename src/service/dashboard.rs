//! Dashboard API client
//!
//! Fetches pages of the authorized user's dashboard, either everything
//! newer than a post id or a page at an offset. Pages are newest-first.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use url::Url;

use crate::auth::AccessToken;
use crate::auth::signature::{SigningKey, authorization_header};
use crate::config::OAuthConfig;
use crate::error::AppError;

/// Post identifier; ordering follows the API's id ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(PostId(id)),
            Raw::Text(text) => text
                .parse()
                .map(PostId)
                .map_err(|_| serde::de::Error::custom(format!("invalid post id: {text}"))),
        }
    }
}

/// Single dashboard post; fields beyond `id` pass through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// One page of dashboard results, newest first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardPage {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DashboardPage {
    pub fn newest_id(&self) -> Option<PostId> {
        self.posts.first().map(|post| post.id)
    }
}

/// Which slice of the dashboard to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardQuery {
    /// Posts strictly newer than the given id
    Since(PostId),
    /// Page starting at an offset from the newest post
    Offset(u64),
}

impl DashboardQuery {
    fn as_param(&self) -> (&'static str, String) {
        match self {
            DashboardQuery::Since(id) => ("since_id", id.to_string()),
            DashboardQuery::Offset(offset) => ("offset", offset.to_string()),
        }
    }
}

/// External dashboard API
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch(
        &self,
        token: &AccessToken,
        query: DashboardQuery,
    ) -> Result<DashboardPage, AppError>;
}

/// Response envelope: `{"meta": {...}, "response": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    response: DashboardPage,
}

/// Tumblr v2 dashboard client, signing each call with the user's token
pub struct TumblrDashboard {
    http: reqwest::Client,
    api_url: Url,
    consumer: OAuthConfig,
}

impl TumblrDashboard {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        consumer: OAuthConfig,
    ) -> Result<Self, AppError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| AppError::Config(format!("invalid dashboard.api_url: {e}")))?;
        Ok(Self {
            http,
            api_url,
            consumer,
        })
    }
}

#[async_trait]
impl DashboardApi for TumblrDashboard {
    async fn fetch(
        &self,
        token: &AccessToken,
        query: DashboardQuery,
    ) -> Result<DashboardPage, AppError> {
        let (name, value) = query.as_param();
        let mut url = self.api_url.clone();
        url.query_pairs_mut().append_pair(name, &value);

        let key = SigningKey {
            consumer_key: &self.consumer.consumer_key,
            consumer_secret: &self.consumer.consumer_secret,
            token: Some(&token.token),
            token_secret: &token.secret,
        };
        let authorization = authorization_header("GET", &url, &[], &key, &[])?;

        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("dashboard request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalApi(format!("dashboard returned {status}")));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("invalid dashboard response: {e}")))?;

        Ok(envelope.response)
    }
}
