// SPDX-License-Identifier: MIT OR Apache-2.0
//! Presigned-URL minting and verification.
//!
//! A presigned URL authorizes exactly one action on one subject until a
//! deadline: `<path>?act=<action>&exp=<unix>&sig=<b64url>` where
//! `sig = base64url(HMAC-SHA256(key, "<action>:<subject>:<exp>"))`,
//! base64url unpadded. Verification tolerates a configurable clock skew and
//! compares signatures in constant time. Actions come from a strict
//! whitelist; `upload` and `download` tokens are not interchangeable.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use qto_core::Clock;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 900;
/// Default tolerated clock skew in seconds.
pub const DEFAULT_SKEW_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Whitelisted presign actions. Disjoint by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Authorizes one `PUT` of file content.
    Upload,
    /// Authorizes one artifact download.
    Download,
}

impl Action {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }

    /// Parse a wire name; anything off the whitelist is rejected.
    pub fn parse(s: &str) -> Result<Self, PresignError> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            _ => Err(PresignError::Invalid),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PresignError {
    /// The deadline (plus skew) has passed.
    #[error("presigned URL expired")]
    Expired,
    /// Signature mismatch, malformed signature, or unknown action.
    #[error("invalid signature")]
    Invalid,
}

impl From<PresignError> for qto_error::Error {
    fn from(err: PresignError) -> Self {
        qto_error::Error::Forbidden(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Presigner
// ---------------------------------------------------------------------------

/// The signed query-string triple appended to a presigned path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedQuery {
    /// Action name.
    pub act: String,
    /// Unix expiry timestamp.
    pub exp: i64,
    /// Unpadded base64url HMAC-SHA256 signature.
    pub sig: String,
}

/// Mints and verifies presigned tokens.
///
/// Holds the process-wide secret; construction fails on an empty secret so
/// a misconfigured deployment dies at boot rather than signing with "".
pub struct Presigner {
    secret: Vec<u8>,
    default_ttl_secs: u64,
    skew_secs: u64,
    clock: Arc<dyn Clock>,
}

impl Presigner {
    /// Create a presigner with explicit TTL and skew.
    pub fn new(
        secret: impl Into<Vec<u8>>,
        default_ttl_secs: u64,
        skew_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> qto_error::Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(qto_error::Error::Internal(
                "presign secret must not be empty".into(),
            ));
        }
        Ok(Self {
            secret,
            default_ttl_secs,
            skew_secs,
            clock,
        })
    }

    /// Create a presigner with the default TTL and skew.
    pub fn with_defaults(
        secret: impl Into<Vec<u8>>,
        clock: Arc<dyn Clock>,
    ) -> qto_error::Result<Self> {
        Self::new(secret, DEFAULT_TTL_SECS, DEFAULT_SKEW_SECS, clock)
    }

    /// Sign `action` on `subject`, valid for `ttl_secs` (default TTL when
    /// `None`).
    pub fn sign(&self, action: Action, subject: &str, ttl_secs: Option<u64>) -> SignedQuery {
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        let exp = self.clock.unix_now() + ttl as i64;
        SignedQuery {
            act: action.as_str().to_string(),
            exp,
            sig: self.signature(action, subject, exp),
        }
    }

    /// Build a full presigned URL for `path`.
    pub fn presign(
        &self,
        path: &str,
        action: Action,
        subject: &str,
        ttl_secs: Option<u64>,
    ) -> String {
        let q = self.sign(action, subject, ttl_secs);
        format!("{path}?act={}&exp={}&sig={}", q.act, q.exp, q.sig)
    }

    /// Verify a presented token.
    ///
    /// The action is parsed against the whitelist first, then the deadline
    /// is checked against `now - skew`, then the signature is recomputed
    /// and compared in constant time.
    pub fn verify(
        &self,
        action: &str,
        subject: &str,
        exp: i64,
        sig: &str,
    ) -> Result<(), PresignError> {
        let action = Action::parse(action)?;
        if exp + (self.skew_secs as i64) < self.clock.unix_now() {
            return Err(PresignError::Expired);
        }
        let raw = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| PresignError::Invalid)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(message(action, subject, exp).as_bytes());
        mac.verify_slice(&raw).map_err(|_| PresignError::Invalid)
    }

    fn signature(&self, action: Action, subject: &str, exp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(message(action, subject, exp).as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

fn message(action: Action, subject: &str, exp: i64) -> String {
    format!("{}:{}:{}", action.as_str(), subject, exp)
}
