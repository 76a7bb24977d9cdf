//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1)
//!
//! Produces the `Authorization: OAuth ...` header for provider token calls
//! and for dashboard API calls made on behalf of an authorized user.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::{Rng, distributions::Alphanumeric};
use sha1::Sha1;
use url::Url;

use crate::error::AppError;

type HmacSha1 = Hmac<Sha1>;

/// Consumer credentials plus the optional token being used
#[derive(Debug, Clone, Copy)]
pub struct SigningKey<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: Option<&'a str>,
    pub token_secret: &'a str,
}

/// RFC 3986 percent-encoding (everything but unreserved characters)
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Scheme, authority and path, lowercased with default ports dropped
fn base_string_uri(url: &Url) -> String {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.to_string()
}

/// Compute `oauth_signature` for a request
///
/// `params` holds every protocol and request parameter except the
/// signature itself; query parameters of `url` are folded in here.
pub fn sign_request(
    method: &str,
    url: &Url,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, AppError> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .cloned()
        .chain(url.query_pairs().into_owned())
        .map(|(k, v)| (encode(&k), encode(&v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(&base_string_uri(url)),
        encode(&normalized)
    );
    let signing_key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid HMAC key: {e}")))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Build the `Authorization` header value with a fresh nonce and timestamp
///
/// # Arguments
/// * `form_params` - url-encoded body parameters that take part in signing
/// * `extra_oauth` - protocol parameters such as `oauth_callback`
pub fn authorization_header(
    method: &str,
    url: &Url,
    form_params: &[(&str, &str)],
    key: &SigningKey<'_>,
    extra_oauth: &[(&str, &str)],
) -> Result<String, AppError> {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    authorization_header_with(
        method,
        url,
        form_params,
        key,
        extra_oauth,
        &generate_nonce(),
        &timestamp,
    )
}

fn authorization_header_with(
    method: &str,
    url: &Url,
    form_params: &[(&str, &str)],
    key: &SigningKey<'_>,
    extra_oauth: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> Result<String, AppError> {
    let mut oauth: Vec<(String, String)> = vec![
        ("oauth_consumer_key".to_string(), key.consumer_key.to_string()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ];
    if let Some(token) = key.token {
        oauth.push(("oauth_token".to_string(), token.to_string()));
    }
    oauth.extend(
        extra_oauth
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
    );

    let mut signed_params = oauth.clone();
    signed_params.extend(
        form_params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
    );

    let signature = sign_request(
        method,
        url,
        &signed_params,
        key.consumer_secret,
        key.token_secret,
    )?;
    oauth.push(("oauth_signature".to_string(), signature));
    oauth.sort();

    let fields = oauth
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {fields}"))
}
