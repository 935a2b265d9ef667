//! Callback signature verification.
//!
//! The platform signs every callback by sorting `[token, timestamp, nonce]`,
//! concatenating them and sending the SHA-1 hex digest as `signature`.

use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::warn;

use crate::config::AuthMode;
use crate::error::AuthError;

/// Query parameters the platform attaches to every callback request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    /// Only present on the GET ownership challenge.
    pub echostr: Option<String>,
}

/// Signing parameters once all three are known to be present.
#[derive(Debug, Clone, Copy)]
pub struct SignedParams<'a> {
    pub timestamp: &'a str,
    pub nonce: &'a str,
    pub signature: &'a str,
}

impl CallbackQuery {
    /// Extract the signing parameters, failing on the first missing one.
    pub fn signed(&self) -> Result<SignedParams<'_>, AuthError> {
        Ok(SignedParams {
            timestamp: required(&self.timestamp, "timestamp")?,
            nonce: required(&self.nonce, "nonce")?,
            signature: required(&self.signature, "signature")?,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, AuthError> {
    value.as_deref().ok_or(AuthError::MissingParameter(name))
}

/// Compute the expected signature for a callback.
pub fn signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Whether `signature` is the platform's signature over `timestamp` and `nonce`.
pub fn verify(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
    constant_time_eq(&self::signature(token, timestamp, nonce), signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Gate a request on its signature.
///
/// Missing parameters are always rejected. A mismatch is rejected in
/// [`AuthMode::Strict`] and only logged in [`AuthMode::Relaxed`].
pub fn authenticate(token: &str, mode: AuthMode, query: &CallbackQuery) -> Result<(), AuthError> {
    let params = query.signed()?;
    if verify(token, params.timestamp, params.nonce, params.signature) {
        return Ok(());
    }

    match mode {
        AuthMode::Strict => Err(AuthError::SignatureMismatch),
        AuthMode::Relaxed => {
            warn!(
                timestamp = params.timestamp,
                nonce = params.nonce,
                "Invalid callback signature, continuing in relaxed mode"
            );
            Ok(())
        }
    }
}
