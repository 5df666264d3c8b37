// SPDX-License-Identifier: MIT OR Apache-2.0
//! API-facing representations.
//!
//! Entities that carry secrets (password hashes, invitation token hashes)
//! never serialize directly; everything else reuses the domain types.

use chrono::{DateTime, Utc};
use qto_core::{Invitation, InvitationStatus, Role, User, UserRole};
use serde::Serialize;
use uuid::Uuid;

/// Public account representation.
#[derive(Debug, Clone, Serialize)]
pub struct UserOut {
    /// Account id.
    pub id: Uuid,
    /// Email address.
    pub email: String,
    /// Global role.
    pub role: UserRole,
    /// Verification state.
    pub email_verified: bool,
    /// Remaining credits.
    pub credits_balance: u64,
    /// Display name.
    pub full_name: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
            email_verified: user.email_verified,
            credits_balance: user.credits_balance,
            full_name: user.full_name,
            created_at: user.created_at,
        }
    }
}

/// Public invitation representation (no token hash).
#[derive(Debug, Clone, Serialize)]
pub struct InvitationOut {
    /// Invitation id.
    pub id: Uuid,
    /// Target project.
    pub project_id: Uuid,
    /// Invited address.
    pub email: String,
    /// Granted role.
    pub role: Role,
    /// Lifecycle status.
    pub status: InvitationStatus,
    /// Inviting account.
    pub invited_by: Uuid,
    /// Creation timestamp.
    pub invited_at: DateTime<Utc>,
    /// Acceptance deadline.
    pub expires_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationOut {
    fn from(inv: Invitation) -> Self {
        Self {
            id: inv.id,
            project_id: inv.project_id,
            email: inv.email,
            role: inv.role,
            status: inv.status,
            invited_by: inv.invited_by,
            invited_at: inv.invited_at,
            expires_at: inv.expires_at,
        }
    }
}

/// Body of a successful login or invite completion.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: &'static str,
    /// The authenticated account.
    pub user: UserOut,
}

impl TokenResponse {
    /// Build from an account and its fresh token.
    pub fn new(user: User, access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
            user: user.into(),
        }
    }
}
