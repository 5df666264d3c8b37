// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project-scoped audit rows: comments, activities, notifications.

use crate::{AuditId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a comment is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentContext {
    /// The project itself.
    Project,
    /// A BoQ row.
    Boq,
}

/// A threaded comment on a project resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier.
    pub id: AuditId,
    /// Project scope.
    pub project_id: ProjectId,
    /// What kind of resource is commented on.
    pub context: CommentContext,
    /// Identifier of the commented resource.
    pub context_id: String,
    /// Authoring account.
    pub author_id: UserId,
    /// Comment body.
    pub body: String,
    /// Parent comment for threading.
    pub parent_id: Option<AuditId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-edit timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Append-only audit record of something that happened in a project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier.
    pub id: AuditId,
    /// Project scope.
    pub project_id: ProjectId,
    /// Acting account, when attributable.
    pub actor_id: Option<UserId>,
    /// Event name, e.g. `invitation.created`.
    pub kind: String,
    /// Structured payload.
    pub payload: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A per-user notification derived from project activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier.
    pub id: AuditId,
    /// Recipient account.
    pub user_id: UserId,
    /// Project scope.
    pub project_id: ProjectId,
    /// Event name.
    pub kind: String,
    /// Structured payload.
    pub payload: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once the recipient has seen it.
    pub read_at: Option<DateTime<Utc>>,
}
