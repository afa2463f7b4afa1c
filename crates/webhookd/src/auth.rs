//! Bearer credential verification.
//!
//! Callers present a compact HS256 JWT. Any token that is well formed,
//! correctly signed with the shared secret and not yet expired grants access
//! to every action on every switch. The issuer is reported for logging but
//! never checked.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::Validation;
use secrecy::ExposeSecret;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Minimum length of the shared secret, in characters.
pub const MIN_SECRET_LEN: usize = 32;

/// Reasons a credential is rejected.
///
/// Callers only ever see a generic "unauthorized"; the variant is kept for logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed credential")]
    Malformed,

    #[error("credential signature does not verify")]
    BadSignature,

    #[error("credential expired")]
    Expired,
}

/// Claims carried by a verified credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Issuer, if the token names one
    #[serde(default)]
    pub iss: Option<String>,

    /// Expiry, in seconds since the Unix epoch
    pub exp: u64,
}

impl Claims {
    pub fn issuer(&self) -> &str {
        self.iss.as_deref().unwrap_or("unknown")
    }
}

/// Verifies HS256 bearer tokens against a single shared secret.
pub struct Verifier {
    key: DecodingKey,
    validation: Validation,
}

impl Verifier {
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand so that a token is dead at exactly `exp`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Verify `token` against the current wall-clock time.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.verify_at(token, now)
    }

    /// Verify `token` as if the current time were `now` (seconds since the epoch).
    pub fn verify_at(&self, token: &str, now: u64) -> Result<Claims, AuthError> {
        if !is_compact_jws(token) {
            return Err(AuthError::Malformed);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| classify(e.kind()))?;

        if now >= data.claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }
}

/// Pull the token out of an `Authorization` header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::Malformed)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

/// Three non-empty base64url segments separated by dots.
fn is_compact_jws(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty()
                && s
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::BadSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed,
    }
}
