//! Compact signed-token codec used for stateless authentication.
//!
//! A token is three dot-joined base64url segments (no padding): a JSON
//! header `{"alg":"HS256","typ":"JWT"}`, a JSON claims payload, and an
//! HMAC-SHA-256 signature over `header.payload`. Nothing is stored server
//! side; possession of a valid, unexpired token is the whole credential,
//! and there is no revocation at this layer.
//!
//! Verification checks structure, then signature, then payload, then
//! expiry. The signature comparison goes through [`Mac::verify_slice`],
//! which is constant-time. Callers are expected to collapse every
//! [`TokenError`] variant into one generic "unauthenticated" response so
//! the failing check is not leaked to clients.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Tokens expire 24 hours after issuance.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from issuing or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token does not have the three-segment shape we produce.
    #[error("malformed token")]
    MalformedToken,
    /// The signature does not match the header and payload.
    #[error("invalid token signature")]
    InvalidSignature,
    /// The payload segment is not a valid claims document.
    #[error("malformed claims payload")]
    MalformedClaims,
    /// The claims were valid once but the token has expired.
    #[error("token expired")]
    Expired,
    /// Claims could not be serialized while issuing.
    #[error("failed to encode claims")]
    EncodeClaims(#[source] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: Header = Header { alg: "HS256", typ: "JWT" };

/// Claims carried inside a token.
///
/// Reconstructed and validated on every authenticated request; never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated subject (the user row id).
    pub subject_id: i64,
    /// Human-readable subject label (the login email).
    pub subject_label: String,
    /// Absolute expiry, unix seconds.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl Claims {
    /// Claims for `subject` expiring [`TOKEN_TTL`] from now.
    pub fn new(subject_id: i64, subject_label: impl Into<String>) -> Self {
        Self {
            subject_id,
            subject_label: subject_label.into(),
            expires_at: unix_now().saturating_add(TOKEN_TTL.as_secs() as i64),
        }
    }
}

/// Stateless sign/verify of claims blobs under one shared secret.
///
/// Cheap to clone; requires no synchronization.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the secret.
        f.debug_struct("TokenCodec").field("secret", &"***").finish()
    }
}

impl TokenCodec {
    /// Create a codec over the shared HMAC secret (from the environment,
    /// passed in by the bootstrap layer).
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Issue a token for `subject_id`/`subject_label` expiring
    /// [`TOKEN_TTL`] from now.
    pub fn issue(
        &self,
        subject_id: i64,
        subject_label: impl Into<String>,
    ) -> Result<String, TokenError> {
        self.sign(&Claims::new(subject_id, subject_label))
    }

    /// Sign explicit claims. Exposed so callers and tests can control the
    /// expiry directly.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = serde_json::to_vec(&HEADER).map_err(TokenError::EncodeClaims)?;
        let payload = serde_json::to_vec(claims).map_err(TokenError::EncodeClaims)?;

        let message =
            format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(payload));
        let signature = self.mac_over(message.as_bytes()).finalize().into_bytes();

        Ok(format!("{}.{}", message, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify `token` and return its claims.
    ///
    /// Checks run in order: segment structure (`MalformedToken`), signature
    /// (`InvalidSignature`, constant-time), payload decode
    /// (`MalformedClaims`), expiry (`Expired`).
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments[..] else {
            return Err(TokenError::MalformedToken);
        };

        let signature =
            URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::MalformedToken)?;
        let message = format!("{}.{}", header, payload);
        self.mac_over(message.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::MalformedClaims)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::MalformedClaims)?;

        if claims.expires_at < unix_now() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn mac_over(&self, message: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(message);
        mac
    }
}

/// Current wall-clock time in unix seconds.
fn unix_now() -> i64 {
    UNIX_EPOCH.elapsed().map_or(0, |elapsed| elapsed.as_secs() as i64)
}
