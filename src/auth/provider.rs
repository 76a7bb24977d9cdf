//! OAuth 1.0a provider client
//!
//! Talks to the provider's request-token and access-token endpoints.
//! Consumer credentials and endpoint URLs are passed in on every call as
//! an immutable [`OAuthConfig`] value.

use async_trait::async_trait;
use url::Url;

use super::session::{AccessToken, RequestToken};
use super::signature::{SigningKey, authorization_header};
use crate::config::OAuthConfig;
use crate::error::AppError;

/// Token endpoints of an OAuth 1.0a provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Obtain a temporary request token, registering `callback_url`
    async fn request_token(
        &self,
        consumer: &OAuthConfig,
        callback_url: &str,
    ) -> Result<RequestToken, AppError>;

    /// Exchange an authorized request token and verifier for an access token
    async fn access_token(
        &self,
        consumer: &OAuthConfig,
        request: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, AppError>;
}

/// URL the user is sent to for authorizing `request`
pub fn authorize_url(consumer: &OAuthConfig, request: &RequestToken) -> String {
    format!(
        "{}?oauth_token={}",
        consumer.authorize_url,
        urlencoding::encode(&request.token)
    )
}

/// HTTP implementation of [`OAuthProvider`]
pub struct OAuth1Provider {
    http: reqwest::Client,
}

impl OAuth1Provider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// POST a signed token request and parse the form-encoded token pair
    async fn token_request(
        &self,
        endpoint: &str,
        key: &SigningKey<'_>,
        extra_oauth: &[(&str, &str)],
    ) -> Result<(String, String), AppError> {
        let url = Url::parse(endpoint)
            .map_err(|e| AppError::Config(format!("invalid OAuth endpoint {endpoint}: {e}")))?;
        let authorization = authorization_header("POST", &url, &[], key, extra_oauth)?;

        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("request to {endpoint} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("reading {endpoint} response failed: {e}")))?;

        if !status.is_success() {
            return Err(AppError::Provider(format!(
                "{endpoint} returned {status}: {body}"
            )));
        }

        parse_token_response(&body)
    }
}

/// Parse `oauth_token=..&oauth_token_secret=..`
fn parse_token_response(body: &str) -> Result<(String, String), AppError> {
    let mut token = None;
    let mut secret = None;

    for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_token_secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }

    match (token, secret) {
        (Some(token), Some(secret)) if !token.is_empty() => Ok((token, secret)),
        _ => Err(AppError::Provider(
            "token response is missing oauth_token or oauth_token_secret".to_string(),
        )),
    }
}

#[async_trait]
impl OAuthProvider for OAuth1Provider {
    async fn request_token(
        &self,
        consumer: &OAuthConfig,
        callback_url: &str,
    ) -> Result<RequestToken, AppError> {
        let key = SigningKey {
            consumer_key: &consumer.consumer_key,
            consumer_secret: &consumer.consumer_secret,
            token: None,
            token_secret: "",
        };

        let (token, secret) = self
            .token_request(
                &consumer.request_token_url,
                &key,
                &[("oauth_callback", callback_url)],
            )
            .await?;

        Ok(RequestToken { token, secret })
    }

    async fn access_token(
        &self,
        consumer: &OAuthConfig,
        request: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, AppError> {
        let key = SigningKey {
            consumer_key: &consumer.consumer_key,
            consumer_secret: &consumer.consumer_secret,
            token: Some(&request.token),
            token_secret: &request.secret,
        };

        let (token, secret) = self
            .token_request(
                &consumer.access_token_url,
                &key,
                &[("oauth_verifier", verifier)],
            )
            .await?;

        Ok(AccessToken { token, secret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let (token, secret) = parse_token_response(
            "oauth_token=abc%2B1&oauth_token_secret=def&oauth_callback_confirmed=true\n",
        )
        .unwrap();
        assert_eq!(token, "abc+1");
        assert_eq!(secret, "def");
    }

    #[test]
    fn test_parse_token_response_requires_both_fields() {
        assert!(matches!(
            parse_token_response("oauth_token=abc"),
            Err(AppError::Provider(_))
        ));
        assert!(parse_token_response("").is_err());
        assert!(parse_token_response("oauth_token=&oauth_token_secret=x").is_err());
    }

    #[test]
    fn test_authorize_url_carries_request_token() {
        let consumer = crate::config::tests::valid_config().oauth;
        let request = RequestToken {
            token: "req token".to_string(),
            secret: "secret".to_string(),
        };
        assert_eq!(
            authorize_url(&consumer, &request),
            "https://www.tumblr.com/oauth/authorize?oauth_token=req%20token"
        );
    }
}
