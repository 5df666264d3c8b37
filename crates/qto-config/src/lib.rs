// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime settings loaded from the environment.
//!
//! [`Settings::from_env`] reads process environment variables;
//! [`Settings::from_lookup`] takes a lookup closure so tests can exercise
//! parsing without mutating the process environment. `SECRET_KEY` is the
//! one mandatory variable — boot fails without it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use qto_core::FileType;
use serde::Serialize;
use std::path::PathBuf;

/// Default presigned-URL lifetime.
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 900;
/// Default tolerated clock skew when verifying presigned URLs.
pub const DEFAULT_PRESIGN_SKEW_SECS: u64 = 30;
/// Default credits debited per submitted job.
pub const DEFAULT_COST_PER_JOB: u64 = 400;
/// Default credits granted on registration.
pub const DEFAULT_SIGNUP_CREDITS: u64 = 1000;
/// Default upload cap: 100 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
/// Default cooldown between verification-mail resends.
pub const DEFAULT_RESEND_COOLDOWN_SECS: u64 = 60;
/// Default invitation validity.
pub const DEFAULT_INVITATION_EXPIRY_DAYS: i64 = 7;
/// Default access-token lifetime.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60 * 24;
/// Default PBKDF2 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
/// Default HTTP rate limit: requests per client IP per window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
/// Default HTTP rate-limit window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent or empty.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable was present but unparsable.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure detail.
        reason: String,
    },
}

/// SMTP relay settings consumed by the mailer implementation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SmtpSettings {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// From address on outgoing mail.
    pub from: String,
}

/// All runtime settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// HMAC key for presigned URLs, access tokens, and invitation hashes.
    /// Never serialized.
    #[serde(skip_serializing)]
    pub secret_key: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Root of the on-disk layout (`uploads/`, `artifacts/`, `config/`,
    /// `state/`).
    pub storage_dir: PathBuf,
    /// Presigned-URL lifetime in seconds.
    pub presign_default_ttl_secs: u64,
    /// Tolerated clock skew when verifying presigned URLs.
    pub presign_clock_skew_secs: u64,
    /// Credits debited per submitted job.
    pub cost_per_job: u64,
    /// Credits granted on registration.
    pub signup_credits: u64,
    /// Upload size cap in bytes.
    pub max_upload_bytes: u64,
    /// Upload formats accepted by `POST /files`.
    pub allowed_upload_types: Vec<FileType>,
    /// Cooldown between verification-mail resends, per user.
    pub resend_cooldown_secs: u64,
    /// Invitation validity in days.
    pub invitation_expiry_days: i64,
    /// Access-token lifetime in seconds.
    pub access_token_ttl_secs: u64,
    /// PBKDF2 iteration count for password hashing.
    pub pbkdf2_iterations: u32,
    /// Requests admitted per client IP within the rate-limit window.
    pub rate_limit_max_requests: u32,
    /// Length of the sliding rate-limit window in seconds.
    pub rate_limit_window_secs: u64,
    /// SMTP relay, when configured.
    pub smtp: Option<SmtpSettings>,
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` as the variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("SECRET_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("SECRET_KEY"))?;

        let storage_dir = lookup("STORAGE_DIR").unwrap_or_else(|| "storage".to_string());

        let allowed_upload_types = match lookup("ALLOWED_UPLOAD_TYPES") {
            None => FileType::all().to_vec(),
            Some(raw) => {
                let mut types = Vec::new();
                for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let t = part.parse::<FileType>().map_err(|reason| ConfigError::Invalid {
                        name: "ALLOWED_UPLOAD_TYPES",
                        reason,
                    })?;
                    if !types.contains(&t) {
                        types.push(t);
                    }
                }
                if types.is_empty() {
                    return Err(ConfigError::Invalid {
                        name: "ALLOWED_UPLOAD_TYPES",
                        reason: "no types listed".into(),
                    });
                }
                types
            }
        };

        let smtp = match lookup("SMTP_HOST") {
            None => None,
            Some(host) => Some(SmtpSettings {
                host,
                port: parse_or(&lookup, "SMTP_PORT", 587u16)?,
                from: lookup("SMTP_FROM").unwrap_or_else(|| "noreply@qto.local".to_string()),
            }),
        };

        Ok(Self {
            secret_key,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            storage_dir: PathBuf::from(storage_dir),
            presign_default_ttl_secs: parse_or(
                &lookup,
                "PRESIGN_DEFAULT_TTL_SECONDS",
                DEFAULT_PRESIGN_TTL_SECS,
            )?,
            presign_clock_skew_secs: parse_or(
                &lookup,
                "PRESIGN_CLOCK_SKEW_SECONDS",
                DEFAULT_PRESIGN_SKEW_SECS,
            )?,
            cost_per_job: parse_or(&lookup, "COST_PER_JOB", DEFAULT_COST_PER_JOB)?,
            signup_credits: parse_or(&lookup, "SIGNUP_CREDITS", DEFAULT_SIGNUP_CREDITS)?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            allowed_upload_types,
            resend_cooldown_secs: parse_or(
                &lookup,
                "RESEND_COOLDOWN_SECONDS",
                DEFAULT_RESEND_COOLDOWN_SECS,
            )?,
            invitation_expiry_days: parse_or(
                &lookup,
                "INVITATION_EXPIRY_DAYS",
                DEFAULT_INVITATION_EXPIRY_DAYS,
            )?,
            access_token_ttl_secs: parse_or(
                &lookup,
                "ACCESS_TOKEN_TTL_SECONDS",
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
            )?,
            pbkdf2_iterations: parse_or(&lookup, "PBKDF2_ITERATIONS", DEFAULT_PBKDF2_ITERATIONS)?,
            rate_limit_max_requests: parse_or(
                &lookup,
                "RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            )?,
            rate_limit_window_secs: parse_or(
                &lookup,
                "RATE_LIMIT_WINDOW_SECONDS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?,
            smtp,
        })
    }

    /// Path of the uploads directory.
    pub fn uploads_dir(&self) -> PathBuf {
        self.storage_dir.join("uploads")
    }

    /// Path of the artifacts directory.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.storage_dir.join("artifacts")
    }

    /// Path of the mapping-config directory.
    pub fn config_dir(&self) -> PathBuf {
        self.storage_dir.join("config")
    }

    /// Path of the store-snapshot directory.
    pub fn state_dir(&self) -> PathBuf {
        self.storage_dir.join("state")
    }

    /// Settings suitable for tests: tiny PBKDF2 cost, temp-friendly paths.
    pub fn for_tests(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            secret_key: "test-secret-key".into(),
            bind_addr: "127.0.0.1:0".into(),
            storage_dir: storage_dir.into(),
            presign_default_ttl_secs: DEFAULT_PRESIGN_TTL_SECS,
            presign_clock_skew_secs: DEFAULT_PRESIGN_SKEW_SECS,
            cost_per_job: DEFAULT_COST_PER_JOB,
            signup_credits: DEFAULT_SIGNUP_CREDITS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_upload_types: FileType::all().to_vec(),
            resend_cooldown_secs: DEFAULT_RESEND_COOLDOWN_SECS,
            invitation_expiry_days: DEFAULT_INVITATION_EXPIRY_DAYS,
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            pbkdf2_iterations: 2,
            // Handler tests hammer the router from one "client"; keep the
            // limiter out of their way.
            rate_limit_max_requests: 10_000,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            smtp: None,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
