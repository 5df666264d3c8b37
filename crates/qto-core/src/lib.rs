// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain model for the qto take-off and estimating back-end.
//!
//! Every entity that the store persists and the HTTP layer serializes lives
//! here, together with the small pieces of domain logic that belong to the
//! types themselves: the job state machine, role ordering, unit-class
//! rounding, and the injectable [`Clock`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod boq;
pub mod clock;
pub mod collab;
pub mod file;
pub mod job;
pub mod pricing;
pub mod project;
pub mod role;
pub mod template;
pub mod units;
pub mod user;

pub use audit::{Activity, Comment, CommentContext, Notification};
pub use boq::{BoqItem, BoqItemPatch, Revision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collab::{Collaborator, Invitation, InvitationStatus};
pub use file::{FileType, StoredFile};
pub use job::{Job, JobEvent, JobStatus, StageEvent};
pub use pricing::{PriceItem, PriceList, Supplier, SupplierPriceItem};
pub use project::{Project, ProjectStatus};
pub use role::Role;
pub use template::{Estimate, Template};
pub use units::UnitClass;
pub use user::{EmailVerification, User, UserRole};

use uuid::Uuid;

/// Broker channel naming.
///
/// Channel names are the only coupling between publishers and subscribers;
/// building them through these helpers keeps the two sides in sync.
pub mod channel {
    use uuid::Uuid;

    /// Stage events of one job.
    pub fn job(job_id: Uuid) -> String {
        format!("job:{job_id}")
    }

    /// Collaboration and BoQ updates of one project.
    pub fn project(project_id: Uuid) -> String {
        format!("project:{project_id}")
    }

    /// Export lifecycle of one job.
    pub fn job_exports(job_id: Uuid) -> String {
        format!("jobs:{job_id}:exports")
    }
}

/// Identifier of a [`User`].
pub type UserId = Uuid;
/// Identifier of a [`Project`].
pub type ProjectId = Uuid;
/// Identifier of a [`StoredFile`].
pub type FileId = Uuid;
/// Identifier of a [`Job`].
pub type JobId = Uuid;
/// Identifier of a [`BoqItem`].
pub type BoqItemId = Uuid;
/// Identifier of an [`audit::Activity`], [`Comment`] or [`Notification`].
pub type AuditId = Uuid;
/// Identifier of an artifact row.
pub type ArtifactId = Uuid;

/// Tolerance, in currency units, for the `total_price` invariant.
///
/// After any writer commits, `|total_price - (qty * unit_price + allowance)|`
/// must not exceed this value.
pub const TOTAL_PRICE_TOLERANCE: f64 = 0.01;

/// Tolerance, in seconds, for optimistic `updated_at` version comparison.
pub const VERSION_TOLERANCE_SECS: i64 = 1;

/// An artifact produced by the export pipeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Artifact {
    /// Unique artifact identifier.
    pub id: ArtifactId,
    /// Job the artifact belongs to.
    pub job_id: JobId,
    /// Artifact kind, e.g. `export:csv`.
    pub kind: String,
    /// Absolute path of the rendered file.
    pub path: String,
    /// Size of the rendered file in bytes.
    pub size: u64,
    /// Hex SHA-256 checksum of the rendered bytes.
    pub checksum: String,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
}
