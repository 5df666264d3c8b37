// SPDX-License-Identifier: MIT OR Apache-2.0
//! Accounts and credit balances.

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Global account role. Project access is governed separately by
/// [`crate::Role`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Platform administrator: may grant credits and manage price lists.
    Admin,
    /// Regular account.
    User,
}

/// A registered account.
///
/// Accounts are never hard-deleted; `deactivated` marks soft deletion.
/// `credits_balance` is unsigned by construction — the only way to remove
/// credits is the store's conditional debit, which refuses to underflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Unique, lowercased email address.
    pub email: String,
    /// PHC-style password hash. Never serialized to API responses.
    pub password_hash: String,
    /// Global role.
    pub role: UserRole,
    /// Whether the email address has been verified.
    pub email_verified: bool,
    /// Remaining job credits.
    pub credits_balance: u64,
    /// Display name.
    pub full_name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent verification-mail attempt, for the
    /// resend cooldown.
    pub last_verification_sent_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    pub deactivated: bool,
}

impl User {
    /// True when the account may authenticate.
    pub fn is_active(&self) -> bool {
        !self.deactivated
    }

    /// True for platform administrators.
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Pending email-verification token for one account.
///
/// Only the SHA-256 hash of the mailed token is stored; a new row
/// replaces any previous one for the same account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmailVerification {
    /// Account awaiting verification.
    pub user_id: UserId,
    /// Hex SHA-256 of the mailed token.
    pub token_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
