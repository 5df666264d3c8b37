// SPDX-License-Identifier: MIT OR Apache-2.0
//! HS256 access tokens and one-shot random tokens.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use qto_core::{Clock, UserId};
use qto_error::{Error, Result};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issue an HS256 access token for `user_id`, valid for `ttl_secs`.
pub fn issue_access_token(
    secret: &[u8],
    user_id: UserId,
    ttl_secs: u64,
    clock: &dyn Clock,
) -> Result<String> {
    let now = clock.unix_now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl_secs as i64,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| Error::Internal(format!("token encode: {e}")))
}

/// Verify an access token and return its subject.
pub fn verify_access_token(secret: &[u8], token: &str) -> Result<UserId> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 30;
    let data = jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|_| Error::Unauthenticated("invalid or expired token".into()))?;
    data.claims
        .sub
        .parse()
        .map_err(|_| Error::Unauthenticated("invalid token subject".into()))
}

/// Generate a URL-safe random token (32 bytes of entropy).
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a token, the only form ever persisted.
pub fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
