// SPDX-License-Identifier: MIT OR Apache-2.0
//! Jobs and their persisted stage events.

use crate::{FileId, JobId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage names emitted by the processing pipeline, in emission order.
pub mod stage {
    /// Initial stage right after the worker picks the job up.
    pub const QUEUED: &str = "queued";
    /// Model validation.
    pub const VALIDATING: &str = "validating";
    /// Non-fatal validation findings.
    pub const WARNINGS: &str = "warnings";
    /// Model parsing.
    pub const PARSING: &str = "parsing";
    /// Quantity extraction.
    pub const TAKEOFF: &str = "takeoff";
    /// BoQ rows persisted.
    pub const COMPLETE: &str = "complete";
    /// Price application outcome (applied or skipped with reason).
    pub const PRICING: &str = "pricing";
    /// Terminal success.
    pub const COMPLETED: &str = "completed";
    /// Terminal failure detail.
    pub const ERROR: &str = "error";
    /// Credits returned after a failure.
    pub const REFUND: &str = "refund";
}

/// Stable job error codes.
pub mod error_code {
    /// The uploaded model failed validation.
    pub const VALIDATION: &str = "validation_error";
    /// The extractor raised.
    pub const TAKEOFF: &str = "takeoff_error";
    /// Anything the pipeline did not anticipate.
    pub const UNEXPECTED: &str = "unexpected_error";
}

/// Lifecycle status of a job.
///
/// Transitions are one-way; terminal states never transition back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting for a worker.
    Queued,
    /// A worker is executing the pipeline.
    Running,
    /// Finished successfully; progress is 100.
    Completed,
    /// Finished with an error; credits were refunded.
    Failed,
    /// Terminated externally before completion.
    Canceled,
}

impl JobStatus {
    /// Returns `true` for states that never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Valid successor states.
    pub fn valid_transitions(self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[Self::Running, Self::Canceled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Canceled],
            Self::Completed | Self::Failed | Self::Canceled => &[],
        }
    }

    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// A take-off job over one uploaded file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Submitting account (the one that was debited).
    pub user_id: UserId,
    /// Input file.
    pub file_id: FileId,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Progress percentage, 0..=100. 100 iff completed.
    pub progress: u8,
    /// Stable error code when `status == Failed`.
    pub error_code: Option<String>,
    /// Price list resolved at submission, if any.
    pub price_list_id: Option<Uuid>,
    /// Supplier whose prices shadow the admin list, if any.
    pub supplier_id: Option<Uuid>,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the worker transitions to `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on any terminal transition.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Checks the cross-field invariants of a job row.
    ///
    /// Used by store debug assertions and the integrity tests; returns the
    /// first violated rule as a message.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.progress > 100 {
            return Err(format!("progress {} out of range", self.progress));
        }
        if (self.progress == 100) != (self.status == JobStatus::Completed) {
            return Err("progress=100 must coincide with completed".into());
        }
        if self.status.is_terminal() && self.finished_at.is_none() {
            return Err(format!("terminal status {} without finished_at", self.status.as_str()));
        }
        if let (Some(s), Some(f)) = (self.started_at, self.finished_at) {
            if s > f {
                return Err("started_at after finished_at".into());
            }
        }
        Ok(())
    }
}

/// Append-only stage event persisted for replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// Job this event belongs to.
    pub job_id: JobId,
    /// Emission timestamp; non-decreasing per job.
    pub ts: DateTime<Utc>,
    /// Stage name, see [`stage`].
    pub stage: String,
    /// Human-readable message.
    pub message: String,
    /// Structured detail payload.
    pub details: Option<serde_json::Value>,
}

/// Wire payload fanned out on `job:{id}` channels and over SSE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage name.
    pub stage: String,
    /// Human-readable message.
    pub message: String,
    /// Emission timestamp.
    pub ts: DateTime<Utc>,
    /// Structured detail payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&JobEvent> for StageEvent {
    fn from(ev: &JobEvent) -> Self {
        Self {
            stage: ev.stage.clone(),
            message: ev.message.clone(),
            ts: ev.ts,
            details: ev.details.clone(),
        }
    }
}
