// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collaborator membership and invitations.

use crate::{ProjectId, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership row granting `user_id` a role on `project_id`.
///
/// Unique on (project, user). The project owner has no row; their
/// membership is implicit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    /// Unique identifier.
    pub id: Uuid,
    /// Project the membership applies to.
    pub project_id: ProjectId,
    /// Member account.
    pub user_id: UserId,
    /// Granted role.
    pub role: Role,
    /// Account that created the membership.
    pub invited_by: UserId,
    /// When the membership (or its invitation) was created.
    pub invited_at: DateTime<Utc>,
    /// When the member accepted; direct adds are accepted immediately.
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Lifecycle of an invitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    /// Waiting for the recipient.
    Pending,
    /// Converted into a membership.
    Accepted,
    /// Withdrawn by the project side.
    Revoked,
    /// Deadline passed before acceptance.
    Expired,
}

/// A pending (or settled) invitation to collaborate.
///
/// Only the SHA-256 hash of the invitation token is stored; the raw token
/// is returned exactly once to the inviter, for mail delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    /// Unique identifier.
    pub id: Uuid,
    /// Target project.
    pub project_id: ProjectId,
    /// Invited address, lowercased; may not belong to an account yet.
    pub email: String,
    /// Role granted on acceptance; never `owner`.
    pub role: Role,
    /// Hex SHA-256 of the raw token.
    pub token_hash: String,
    /// Lifecycle status.
    pub status: InvitationStatus,
    /// Inviting account.
    pub invited_by: UserId,
    /// Creation timestamp.
    pub invited_at: DateTime<Utc>,
    /// Acceptance deadline.
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    /// True while the invitation can still be accepted at `now`.
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && now <= self.expires_at
    }
}
