// SPDX-License-Identifier: MIT OR Apache-2.0
//! BoQ templates and saved estimates.

use crate::{JobId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reusable set of BoQ line presets owned by a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning account.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Preset lines as JSON (`[{code, description, unit, qty}, ...]`).
    pub body: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A frozen totals snapshot of a priced job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Unique identifier.
    pub id: Uuid,
    /// Project scope.
    pub project_id: ProjectId,
    /// Job the snapshot was taken from.
    pub job_id: JobId,
    /// Display name.
    pub name: String,
    /// Totals snapshot (`{currency, total, rows}`).
    pub totals: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
