// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport-agnostic error taxonomy for the qto back-end.
//!
//! Every domain component returns [`Error`]. Each variant carries a stable,
//! machine-readable [`Error::code`] that survives across releases; the HTTP
//! layer maps variants to status codes without inspecting messages.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::Serialize;

/// Result alias used across all domain crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Tagged domain error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape, size, magic bytes, or numeric bounds were off.
    #[error("validation failed: {message}")]
    Validation {
        /// What failed.
        message: String,
        /// Offending field, when known.
        field: Option<String>,
    },

    /// Missing or invalid credentials token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller's role is insufficient.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Absent, or hidden from this caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency loss or uniqueness violation.
    #[error("conflict: {message}")]
    Conflict {
        /// What conflicted.
        message: String,
        /// Version the caller presented, for optimistic-concurrency losses.
        expected_version: Option<String>,
        /// Version actually stored.
        actual_version: Option<String>,
    },

    /// The account cannot cover the requested debit.
    #[error("insufficient credits: required {required}, balance {balance}")]
    PaymentRequired {
        /// Credits the operation costs.
        required: u64,
        /// Credits currently available.
        balance: u64,
    },

    /// A cooldown window is still active.
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the next attempt is admitted.
        retry_after_secs: u64,
    },

    /// Upload exceeds the configured cap.
    #[error("payload too large: {size} bytes exceeds cap of {limit}")]
    TooLarge {
        /// Received size.
        size: u64,
        /// Configured cap.
        limit: u64,
    },

    /// Unexpected internal failure; the message must never carry secrets.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for a field-less validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Validation error pinned to a field.
    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Convenience constructor for a plain conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            expected_version: None,
            actual_version: None,
        }
    }

    /// Conflict carrying both optimistic-concurrency versions.
    pub fn version_conflict(
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            message: message.into(),
            expected_version: Some(expected.into()),
            actual_version: Some(actual.into()),
        }
    }

    /// `NotFound` for an entity kind plus id.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// True for variants the caller can correct (4xx family).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Serializable body shape for error responses.
///
/// Internal errors serialize with a generic message so implementation
/// detail never leaves the process.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    /// Stable code, see [`Error::code`].
    pub error_code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Version the caller presented, on optimistic-concurrency conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,
    /// Stored version, on optimistic-concurrency conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_version: Option<String>,
    /// Seconds until retry, on rate limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Current balance, on failed debits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        let message = match err {
            Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let (expected_version, actual_version) = match err {
            Error::Conflict {
                expected_version,
                actual_version,
                ..
            } => (expected_version.clone(), actual_version.clone()),
            _ => (None, None),
        };
        Self {
            error_code: err.code(),
            message,
            expected_version,
            actual_version,
            retry_after_secs: match err {
                Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                _ => None,
            },
            balance: match err {
                Error::PaymentRequired { balance, .. } => Some(*balance),
                _ => None,
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("io: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serde: {err}"))
    }
}
