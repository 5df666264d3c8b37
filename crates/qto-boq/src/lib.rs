// SPDX-License-Identifier: MIT OR Apache-2.0
//! BoQ editing: validated patches under optimistic concurrency.
//!
//! Every accepted edit writes a revision row and fans out on the owning
//! project's channel. Writers that lose the `updated_at` race receive
//! `Conflict` carrying both versions and decide themselves whether to
//! retry with a fresh token.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, SecondsFormat, Utc};
use qto_broker::EventBus;
use qto_core::{BoqItem, BoqItemId, BoqItemPatch, JobId, Role, UserId, channel};
use qto_error::{Error, Result};
use qto_store::Store;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Behavior switches for [`BoqEditor::update_one`].
#[derive(Clone, Copy, Debug)]
pub struct UpdateOptions {
    /// Enforce the `expected_updated_at` version token when present.
    pub check_concurrency: bool,
    /// Publish `boq.item.updated` on success.
    pub broadcast: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            check_concurrency: true,
            broadcast: true,
        }
    }
}

/// Result of a single-item update.
#[derive(Clone, Debug)]
pub struct UpdateOutcome {
    /// The row after the operation.
    pub item: BoqItem,
    /// Whether anything was actually written.
    pub modified: bool,
}

/// One entry of a bulk update request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkPatch {
    /// Target row.
    pub id: BoqItemId,
    /// Fields to change.
    #[serde(flatten)]
    pub patch: BoqItemPatch,
}

/// Per-item failure inside a bulk update.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkError {
    /// Target row, when identifiable.
    pub item_id: Option<BoqItemId>,
    /// Offending field, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Failure message.
    pub message: String,
    /// Version the caller presented, on conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,
    /// Version actually stored, on conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_version: Option<String>,
}

/// Aggregate result of a bulk update.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BulkSummary {
    /// Number of requested patches.
    pub total: usize,
    /// Rows actually written.
    pub updated: usize,
    /// Rows skipped: no-ops, conflicts, validation rejects.
    pub skipped: usize,
    /// Failures, in request order.
    pub errors: Vec<BulkError>,
}

/// One finding of [`BoqEditor::validate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationFinding {
    /// Affected row.
    pub item_id: BoqItemId,
    /// Affected field.
    pub field: String,
    /// Finding text.
    pub message: String,
}

/// Integrity report over a job's rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no error-level finding exists.
    pub valid: bool,
    /// Number of rows scanned.
    pub total_items: usize,
    /// Error-level findings.
    pub errors: Vec<ValidationFinding>,
    /// Warning-level findings.
    pub warnings: Vec<ValidationFinding>,
}

/// The editor and its collaborators.
pub struct BoqEditor {
    store: Store,
    broker: Arc<dyn EventBus>,
}

impl BoqEditor {
    /// Wire an editor.
    pub fn new(store: Store, broker: Arc<dyn EventBus>) -> Self {
        Self { store, broker }
    }

    /// Update a single row.
    ///
    /// Authorization requires `editor` on the owning project. With
    /// concurrency checking on and a token present, a token that differs
    /// from the stored `updated_at` by more than a second yields
    /// `Conflict` with both versions. Patches that change nothing return
    /// `modified = false` without writing.
    pub fn update_one(
        &self,
        item_id: BoqItemId,
        patch: &BoqItemPatch,
        actor: UserId,
        opts: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        let item = self.store.boq_item_get(item_id)?;
        let job = self.store.job_get(item.job_id)?;
        qto_rbac::require_project_access(&self.store, job.project_id, actor, Role::Editor)?;

        if opts.check_concurrency {
            if let Some(expected) = patch.expected_updated_at {
                let drift = (item.updated_at - expected).num_seconds().abs();
                if drift > qto_core::VERSION_TOLERANCE_SECS {
                    return Err(version_conflict(expected, item.updated_at));
                }
            }
        }

        validate_patch(patch)?;

        let changes = patch.diff(&item);
        if changes.is_empty() {
            return Ok(UpdateOutcome {
                item,
                modified: false,
            });
        }

        // Re-check under the store lock against the version we just read,
        // so a racing writer between our read and this write still loses
        // cleanly.
        let (row, modified) = self
            .store
            .boq_item_update_if(item_id, Some(item.updated_at), patch)?;
        if !modified {
            let expected = patch.expected_updated_at.unwrap_or(item.updated_at);
            return Err(version_conflict(expected, row.updated_at));
        }

        self.store
            .revision_append(item_id, actor, serde_json::Value::Object(changes.clone()))?;

        if opts.broadcast {
            self.broker.publish(
                &channel::project(job.project_id),
                serde_json::json!({
                    "type": "boq.item.updated",
                    "project_id": job.project_id,
                    "job_id": job.id,
                    "item_id": item_id,
                    "changes": changes,
                    "updated_by": actor,
                    "ts": row.updated_at,
                }),
            );
        }

        Ok(UpdateOutcome {
            item: row,
            modified: true,
        })
    }

    /// Apply many patches, one conflict-checked update each, then publish
    /// a single `boq.bulk.updated` aggregate on the project channel.
    pub fn update_many(&self, patches: Vec<BulkPatch>, actor: UserId) -> BulkSummary {
        let mut summary = BulkSummary {
            total: patches.len(),
            ..Default::default()
        };
        let mut project_id = None;

        for entry in patches {
            let opts = UpdateOptions {
                check_concurrency: true,
                broadcast: false,
            };
            match self.update_one(entry.id, &entry.patch, actor, opts) {
                Ok(outcome) => {
                    if outcome.modified {
                        summary.updated += 1;
                        if project_id.is_none() {
                            project_id = self
                                .store
                                .job_get(outcome.item.job_id)
                                .ok()
                                .map(|j| j.project_id);
                        }
                    } else {
                        summary.skipped += 1;
                    }
                }
                Err(err) => {
                    summary.skipped += 1;
                    summary.errors.push(bulk_error(entry.id, &err));
                    warn!(item_id = %entry.id, error = %err, "bulk update entry failed");
                }
            }
        }

        if summary.updated > 0 {
            if let Some(project_id) = project_id {
                self.broker.publish(
                    &channel::project(project_id),
                    serde_json::json!({
                        "type": "boq.bulk.updated",
                        "project_id": project_id,
                        "summary": {
                            "total": summary.total,
                            "updated": summary.updated,
                            "skipped": summary.skipped,
                        },
                        "updated_by": actor,
                    }),
                );
            }
        }

        summary
    }

    /// Scan a job's rows for integrity problems.
    ///
    /// Missing description/unit and negative numerics are errors; a total
    /// off by more than the tolerance and duplicate non-empty codes are
    /// warnings.
    pub fn validate(&self, job_id: JobId, actor: UserId) -> Result<ValidationReport> {
        let job = self.store.job_get(job_id)?;
        qto_rbac::require_project_access(&self.store, job.project_id, actor, Role::Viewer)?;

        let items = self.store.boq_for_job(job_id);
        let mut report = ValidationReport {
            valid: true,
            total_items: items.len(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };
        let mut seen_codes: HashMap<String, BoqItemId> = HashMap::new();

        for item in &items {
            let mut error = |field: &str, message: String| {
                report.errors.push(ValidationFinding {
                    item_id: item.id,
                    field: field.into(),
                    message,
                });
            };
            if item.description.trim().is_empty() {
                error("description", "description is required".into());
            }
            if item.unit.trim().is_empty() {
                error("unit", "unit is required".into());
            }
            if item.qty < 0.0 {
                error("qty", format!("negative quantity: {}", item.qty));
            }
            if item.unit_price < 0.0 {
                error("unit_price", format!("negative unit price: {}", item.unit_price));
            }
            if item.allowance < 0.0 {
                error("allowance", format!("negative allowance: {}", item.allowance));
            }

            if !item.total_in_tolerance() {
                report.warnings.push(ValidationFinding {
                    item_id: item.id,
                    field: "total_price".into(),
                    message: format!(
                        "total price mismatch: expected {:.2}, got {:.2}",
                        item.expected_total(),
                        item.total_price
                    ),
                });
            }
            if let Some(code) = item.code.as_deref().filter(|c| !c.is_empty()) {
                if let Some(first) = seen_codes.get(code) {
                    report.warnings.push(ValidationFinding {
                        item_id: item.id,
                        field: "code".into(),
                        message: format!("duplicate code '{code}' (also in item {first})"),
                    });
                } else {
                    seen_codes.insert(code.to_string(), item.id);
                }
            }
        }

        report.valid = report.errors.is_empty();
        Ok(report)
    }
}

fn version_conflict(expected: DateTime<Utc>, actual: DateTime<Utc>) -> Error {
    Error::version_conflict(
        "row was modified by another user",
        expected.to_rfc3339_opts(SecondsFormat::Micros, true),
        actual.to_rfc3339_opts(SecondsFormat::Micros, true),
    )
}

fn validate_patch(patch: &BoqItemPatch) -> Result<()> {
    if let Some(qty) = patch.qty {
        if !qty.is_finite() || qty < 0.0 {
            return Err(Error::validation_field("qty", "quantity cannot be negative"));
        }
    }
    if let Some(price) = patch.unit_price {
        if !price.is_finite() || price < 0.0 {
            return Err(Error::validation_field(
                "unit_price",
                "unit price cannot be negative",
            ));
        }
    }
    if let Some(allowance) = patch.allowance {
        if !allowance.is_finite() || allowance < 0.0 {
            return Err(Error::validation_field(
                "allowance",
                "allowance cannot be negative",
            ));
        }
    }
    if let Some(desc) = &patch.description {
        if desc.trim().is_empty() {
            return Err(Error::validation_field(
                "description",
                "description cannot be empty",
            ));
        }
    }
    if let Some(unit) = &patch.unit {
        if unit.trim().is_empty() {
            return Err(Error::validation_field("unit", "unit cannot be empty"));
        }
    }
    Ok(())
}

fn bulk_error(item_id: Uuid, err: &Error) -> BulkError {
    match err {
        Error::Conflict {
            message,
            expected_version,
            actual_version,
        } => BulkError {
            item_id: Some(item_id),
            field: None,
            message: message.clone(),
            expected_version: expected_version.clone(),
            actual_version: actual_version.clone(),
        },
        Error::Validation { message, field } => BulkError {
            item_id: Some(item_id),
            field: field.clone(),
            message: message.clone(),
            expected_version: None,
            actual_version: None,
        },
        other => BulkError {
            item_id: Some(item_id),
            field: None,
            message: other.to_string(),
            expected_version: None,
            actual_version: None,
        },
    }
}
