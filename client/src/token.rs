//! Reading the expiry out of an access token.
//!
//! The access token is a JWT. Only its `exp` claim matters here; the
//! signature is the backend's business.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use jiff::Timestamp;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    NotAJwt,
    #[error("token payload is not base64")]
    Encoding,
    #[error("token payload is not a JSON claim set")]
    Claims,
    #[error("token has no exp claim")]
    MissingExpiry,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<f64>,
}

/// Where an access token stands relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Outside the soft-refresh window.
    Fresh,
    /// Still valid but expiring within the soft-refresh window.
    ExpiringSoon,
    /// Expired, or unreadable.
    Expired,
}

/// The `exp` claim of a JWT, in epoch seconds.
pub fn expiry(access_token: &str) -> Result<i64, TokenError> {
    let mut parts = access_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::NotAJwt);
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|_| TokenError::Encoding)?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|_| TokenError::Claims)?;
    claims
        .exp
        .map(|exp| exp.floor() as i64)
        .ok_or(TokenError::MissingExpiry)
}

/// Classify a token. Any decoding failure counts as expired.
pub fn classify(
    access_token: &str,
    now: Timestamp,
    soft_window: Duration,
) -> TokenStatus {
    let exp = match expiry(access_token) {
        Ok(exp) => exp,
        Err(e) => {
            tracing::debug!("Treating unreadable access token as expired: {e}");
            return TokenStatus::Expired;
        }
    };
    let now = now.as_second();
    if now >= exp {
        TokenStatus::Expired
    } else if (exp - now) as u64 <= soft_window.as_secs() {
        TokenStatus::ExpiringSoon
    } else {
        TokenStatus::Fresh
    }
}
