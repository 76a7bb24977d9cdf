//! Signed session-id cookies
//!
//! The cookie value is `s:<id>.<signature>` where the signature is
//! base64(HMAC-SHA256(secret, id)) with the `=` padding stripped. The same
//! format is produced by the HTTP session layer and checked when a
//! streaming connection presents its handshake cookies, so both paths must
//! agree bit for bit.

use axum_extra::extract::CookieJar;
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Marker prepended to signed cookie values
const SIGNED_PREFIX: &str = "s:";

fn mac_for(value: &str, secret: &str) -> Result<HmacSha256, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid HMAC key: {e}")))?;
    mac.update(value.as_bytes());
    Ok(mac)
}

/// Sign a value, producing `value.signature`
pub fn sign(value: &str, secret: &str) -> Result<String, AppError> {
    let signature = mac_for(value, secret)?.finalize().into_bytes();
    Ok(format!("{}.{}", value, STANDARD_NO_PAD.encode(signature)))
}

/// Verify `value.signature` and return the bare value
///
/// The split happens at the last `.`, so the value itself may contain dots.
/// Comparison is constant time.
///
/// # Errors
/// `VerificationFailed` on a missing separator, undecodable signature, or
/// signature mismatch
pub fn unsign(signed: &str, secret: &str) -> Result<String, AppError> {
    let (value, signature_b64) = signed
        .rsplit_once('.')
        .ok_or(AppError::VerificationFailed)?;

    let signature = STANDARD_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::VerificationFailed)?;

    mac_for(value, secret)?
        .verify_slice(&signature)
        .map_err(|_| AppError::VerificationFailed)?;

    Ok(value.to_owned())
}

/// Build the cookie value issued for a session id
pub fn session_cookie_value(session_id: &str, secret: &str) -> Result<String, AppError> {
    Ok(format!("{}{}", SIGNED_PREFIX, sign(session_id, secret)?))
}

/// Extract and verify the session id from a raw cookie value
///
/// The value must carry the `s:` marker; a still-percent-encoded value is
/// tolerated.
pub fn verify_cookie_value(raw: &str, secret: &str) -> Result<String, AppError> {
    let decoded = urlencoding::decode(raw).map_err(|_| AppError::VerificationFailed)?;
    let signed = decoded
        .strip_prefix(SIGNED_PREFIX)
        .ok_or(AppError::VerificationFailed)?;
    unsign(signed, secret)
}

/// Locate the named session cookie in request headers and verify it
///
/// # Errors
/// `VerificationFailed` when the cookie is absent or its signature is bad
pub fn verify_session_cookie(
    headers: &HeaderMap,
    cookie_name: &str,
    secret: &str,
) -> Result<String, AppError> {
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(cookie_name).ok_or(AppError::VerificationFailed)?;
    verify_cookie_value(cookie.value(), secret)
}
