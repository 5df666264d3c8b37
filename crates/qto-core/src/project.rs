// SPDX-License-Identifier: MIT OR Apache-2.0
//! Projects.

use crate::{ProjectId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Work in progress.
    Active,
    /// Finished but kept visible.
    Completed,
    /// Hidden from default listings.
    Archived,
}

/// A construction project that files, jobs, and collaborators hang off.
///
/// The owner is implicitly a collaborator with role `owner`; no explicit
/// collaborator row is written for them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: ProjectId,
    /// Owning account.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Planned start date.
    pub start_date: Option<NaiveDate>,
    /// Planned end date.
    pub end_date: Option<NaiveDate>,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}
