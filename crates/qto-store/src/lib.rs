// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-writer persistent state for the qto back-end.
//!
//! The entire data model lives in one [`StoreState`] value guarded by a
//! mutex. Transactions are closures over a working copy that is swapped in
//! only when the closure returns `Ok`, so a failing operation can never
//! leave partial writes behind. When opened with a snapshot directory the
//! committed state is additionally written to disk as JSON (atomic
//! rename), and hydrated again at boot.
//!
//! Because every mutation runs under the same lock, the conditional
//! operations the rest of the system depends on — [`Store::credits_debit`]
//! and [`Store::boq_item_update_if`] — are linearizable by construction.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod state;

pub use state::StoreState;

use chrono::{DateTime, Utc};
use qto_core::{
    Activity, Artifact, BoqItem, BoqItemPatch, Clock, Collaborator, Comment, EmailVerification,
    Estimate, Invitation, InvitationStatus, Job, JobEvent, JobStatus, Notification, PriceItem,
    PriceList, Project, Revision, Role, StoredFile, Supplier, SupplierPriceItem, Template, User,
    VERSION_TOLERANCE_SECS,
};
use qto_error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the shared state. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<StoreState>,
    snapshot: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl Store {
    /// Create an empty, memory-only store.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                snapshot: None,
                clock,
            }),
        }
    }

    /// Open a store persisted under `state_dir`, hydrating any existing
    /// snapshot.
    pub fn open(state_dir: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let snapshot = state_dir.join("state.json");
        let state = if snapshot.exists() {
            let bytes = std::fs::read(&snapshot)?;
            serde_json::from_slice(&bytes)?
        } else {
            StoreState::default()
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                snapshot: Some(snapshot),
                clock,
            }),
        })
    }

    /// Current instant according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Run `f` against a working copy of the state; commit (and persist)
    /// only on `Ok`.
    pub fn tx<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.state.lock().expect("store lock poisoned");
        let mut working = guard.clone();
        let out = f(&mut working)?;
        if let Some(path) = &self.inner.snapshot {
            persist(path, &working)?;
        }
        *guard = working;
        Ok(out)
    }

    /// Run a read-only closure against the current state.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        let guard = self.inner.state.lock().expect("store lock poisoned");
        f(&guard)
    }

    // -----------------------------------------------------------------------
    // Users & credits
    // -----------------------------------------------------------------------

    /// Insert a new account. Email addresses are unique and stored
    /// lowercased.
    pub fn user_insert(&self, user: User) -> Result<User> {
        let mut user = user;
        user.email = user.email.to_ascii_lowercase();
        self.tx(|s| {
            if s.user_by_email(&user.email).is_some() {
                return Err(Error::conflict(format!(
                    "email already registered: {}",
                    user.email
                )));
            }
            s.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    /// Fetch an account by id.
    pub fn user_get(&self, id: Uuid) -> Result<User> {
        self.read(|s| s.users.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("user {id}")))
    }

    /// Fetch an account by email, if registered.
    pub fn user_by_email(&self, email: &str) -> Option<User> {
        self.read(|s| s.user_by_email(email).cloned())
    }

    /// Apply an in-place mutation to an account.
    pub fn user_update(&self, id: Uuid, f: impl FnOnce(&mut User)) -> Result<User> {
        self.tx(|s| {
            let user = s
                .users
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("user {id}")))?;
            f(user);
            Ok(user.clone())
        })
    }

    /// Atomic conditional debit.
    ///
    /// The only legal way to remove credits. Returns `(balance, ok)`:
    /// when the balance cannot cover `amount`, nothing is written and
    /// `ok` is `false` with the untouched balance.
    pub fn credits_debit(&self, user_id: Uuid, amount: u64) -> Result<(u64, bool)> {
        self.tx(|s| {
            let user = s
                .users
                .get_mut(&user_id)
                .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
            if user.credits_balance < amount {
                return Ok((user.credits_balance, false));
            }
            user.credits_balance -= amount;
            Ok((user.credits_balance, true))
        })
    }

    /// Unconditional credit, used for refunds and admin grants.
    pub fn credits_credit(&self, user_id: Uuid, amount: u64) -> Result<u64> {
        self.tx(|s| {
            let user = s
                .users
                .get_mut(&user_id)
                .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
            user.credits_balance = user.credits_balance.saturating_add(amount);
            Ok(user.credits_balance)
        })
    }

    /// Replace the pending verification token for an account.
    pub fn email_verification_upsert(&self, verification: EmailVerification) -> Result<()> {
        self.tx(|s| {
            if !s.users.contains_key(&verification.user_id) {
                return Err(Error::not_found(format!("user {}", verification.user_id)));
            }
            s.email_verifications
                .insert(verification.user_id, verification);
            Ok(())
        })
    }

    /// Find a pending verification by token hash.
    pub fn email_verification_by_hash(&self, token_hash: &str) -> Option<EmailVerification> {
        self.read(|s| {
            s.email_verifications
                .values()
                .find(|v| v.token_hash == token_hash)
                .cloned()
        })
    }

    /// Consume a verification token: marks the account verified and
    /// removes the row, in one transaction.
    pub fn email_verification_consume(&self, token_hash: &str) -> Result<User> {
        self.tx(|s| {
            let user_id = s
                .email_verifications
                .values()
                .find(|v| v.token_hash == token_hash)
                .map(|v| v.user_id)
                .ok_or_else(|| Error::not_found("verification token"))?;
            s.email_verifications.remove(&user_id);
            let user = s
                .users
                .get_mut(&user_id)
                .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
            user.email_verified = true;
            Ok(user.clone())
        })
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Insert a project.
    pub fn project_insert(&self, project: Project) -> Result<Project> {
        self.tx(|s| {
            s.projects.insert(project.id, project.clone());
            Ok(project)
        })
    }

    /// Fetch a project by id.
    pub fn project_get(&self, id: Uuid) -> Result<Project> {
        self.read(|s| s.projects.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("project {id}")))
    }

    /// Apply an in-place mutation to a project, bumping `updated_at`.
    pub fn project_update(&self, id: Uuid, f: impl FnOnce(&mut Project)) -> Result<Project> {
        let now = self.now();
        self.tx(|s| {
            let project = s
                .projects
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("project {id}")))?;
            f(project);
            project.updated_at = now;
            Ok(project.clone())
        })
    }

    /// Projects the user owns or collaborates on.
    pub fn projects_for_user(&self, user_id: Uuid) -> Vec<Project> {
        self.read(|s| {
            let mut out: Vec<Project> = s
                .projects
                .values()
                .filter(|p| {
                    p.owner_id == user_id || s.collaborator_for(p.id, user_id).is_some()
                })
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            out
        })
    }

    /// Delete a project and cascade to all children.
    pub fn project_delete(&self, id: Uuid) -> Result<()> {
        self.tx(|s| {
            if !s.projects.contains_key(&id) {
                return Err(Error::not_found(format!("project {id}")));
            }
            s.delete_project_cascade(id);
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Insert a file metadata row.
    pub fn file_insert(&self, file: StoredFile) -> Result<StoredFile> {
        self.tx(|s| {
            s.files.insert(file.id, file.clone());
            Ok(file)
        })
    }

    /// Fetch a file by id.
    pub fn file_get(&self, id: Uuid) -> Result<StoredFile> {
        self.read(|s| s.files.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("file {id}")))
    }

    /// Apply an in-place mutation to a file row.
    pub fn file_update(&self, id: Uuid, f: impl FnOnce(&mut StoredFile)) -> Result<StoredFile> {
        self.tx(|s| {
            let file = s
                .files
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("file {id}")))?;
            f(file);
            Ok(file.clone())
        })
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Insert a job row.
    pub fn job_insert(&self, job: Job) -> Result<Job> {
        self.tx(|s| {
            s.jobs.insert(job.id, job.clone());
            Ok(job)
        })
    }

    /// Fetch a job by id.
    pub fn job_get(&self, id: Uuid) -> Result<Job> {
        self.read(|s| s.jobs.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("job {id}")))
    }

    /// Jobs submitted by one user, newest first.
    pub fn jobs_for_user(&self, user_id: Uuid) -> Vec<Job> {
        self.read(|s| {
            let mut out: Vec<Job> = s
                .jobs
                .values()
                .filter(|j| j.user_id == user_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            out
        })
    }

    /// Transition a job's status, enforcing the one-way state machine.
    ///
    /// `Running` stamps `started_at`; terminal states stamp `finished_at`;
    /// `Completed` forces progress to 100.
    pub fn job_update_status(
        &self,
        id: Uuid,
        next: JobStatus,
        error_code: Option<String>,
    ) -> Result<Job> {
        let now = self.now();
        self.tx(|s| {
            let job = s
                .jobs
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("job {id}")))?;
            if !job.status.can_transition_to(next) {
                return Err(Error::conflict(format!(
                    "illegal job transition {} -> {}",
                    job.status.as_str(),
                    next.as_str()
                )));
            }
            job.status = next;
            match next {
                JobStatus::Running => job.started_at = Some(now),
                JobStatus::Completed => {
                    job.progress = 100;
                    job.finished_at = Some(now);
                }
                JobStatus::Failed | JobStatus::Canceled => job.finished_at = Some(now),
                JobStatus::Queued => {}
            }
            if let Some(code) = error_code {
                job.error_code = Some(code);
            }
            debug_assert!(job.check_invariants().is_ok());
            Ok(job.clone())
        })
    }

    /// Set a job's progress percentage.
    pub fn job_set_progress(&self, id: Uuid, progress: u8) -> Result<Job> {
        self.tx(|s| {
            let job = s
                .jobs
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("job {id}")))?;
            job.progress = progress.min(100);
            Ok(job.clone())
        })
    }

    /// Append a stage event. Timestamps are forced non-decreasing per job
    /// so replay order equals emission order.
    pub fn job_event_append(
        &self,
        job_id: Uuid,
        stage: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Result<JobEvent> {
        let now = self.now();
        self.tx(|s| {
            if !s.jobs.contains_key(&job_id) {
                return Err(Error::not_found(format!("job {job_id}")));
            }
            let last_ts = s
                .job_events
                .iter()
                .rev()
                .find(|e| e.job_id == job_id)
                .map(|e| e.ts);
            let ts = match last_ts {
                Some(prev) if prev > now => prev,
                _ => now,
            };
            let event = JobEvent {
                id: Uuid::new_v4(),
                job_id,
                ts,
                stage: stage.to_string(),
                message: message.to_string(),
                details,
            };
            s.job_events.push(event.clone());
            Ok(event)
        })
    }

    /// Stored events for a job, in emission order.
    pub fn job_events(&self, job_id: Uuid) -> Vec<JobEvent> {
        self.read(|s| s.events_for_job(job_id))
    }

    // -----------------------------------------------------------------------
    // BoQ rows
    // -----------------------------------------------------------------------

    /// Persist extracted rows for a job in one transaction.
    pub fn boq_insert_rows(&self, rows: Vec<BoqItem>) -> Result<usize> {
        self.tx(|s| {
            let n = rows.len();
            for row in rows {
                s.boq_items.insert(row.id, row);
            }
            Ok(n)
        })
    }

    /// Fetch a BoQ row by id.
    pub fn boq_item_get(&self, id: Uuid) -> Result<BoqItem> {
        self.read(|s| s.boq_items.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("boq item {id}")))
    }

    /// All rows of a job in stable order.
    pub fn boq_for_job(&self, job_id: Uuid) -> Vec<BoqItem> {
        self.read(|s| s.boq_for_job(job_id))
    }

    /// Conditional update under the optimistic `updated_at` token.
    ///
    /// When `expected` is given and differs from the stored token by more
    /// than [`VERSION_TOLERANCE_SECS`], nothing is written and the current
    /// row is returned with `modified = false` — the caller decides whether
    /// that is a conflict. A patch that changes nothing also returns
    /// `modified = false` without stamping a new version.
    pub fn boq_item_update_if(
        &self,
        id: Uuid,
        expected: Option<DateTime<Utc>>,
        patch: &BoqItemPatch,
    ) -> Result<(BoqItem, bool)> {
        let now = self.now();
        self.tx(|s| {
            let current = s
                .boq_items
                .get(&id)
                .ok_or_else(|| Error::not_found(format!("boq item {id}")))?
                .clone();
            if let Some(expected) = expected {
                let drift = (current.updated_at - expected).num_seconds().abs();
                if drift > VERSION_TOLERANCE_SECS {
                    return Ok((current, false));
                }
            }
            let mut updated = current.clone();
            let changes = patch.apply(&mut updated);
            if changes.is_empty() {
                return Ok((current, false));
            }
            updated.updated_at = now;
            s.boq_items.insert(id, updated.clone());
            Ok((updated, true))
        })
    }

    /// Append a revision row for an accepted edit.
    pub fn revision_append(
        &self,
        item_id: Uuid,
        actor: Uuid,
        changes: serde_json::Value,
    ) -> Result<Revision> {
        let now = self.now();
        self.tx(|s| {
            if !s.boq_items.contains_key(&item_id) {
                return Err(Error::not_found(format!("boq item {item_id}")));
            }
            let rev = Revision {
                id: Uuid::new_v4(),
                boq_item_id: item_id,
                actor,
                changes,
                created_at: now,
            };
            s.revisions.push(rev.clone());
            Ok(rev)
        })
    }

    /// Revision trail of one row.
    pub fn revisions_for_item(&self, item_id: Uuid) -> Vec<Revision> {
        self.read(|s| s.revisions_for_item(item_id))
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Insert an artifact row.
    pub fn artifact_insert(&self, artifact: Artifact) -> Result<Artifact> {
        self.tx(|s| {
            s.artifacts.insert(artifact.id, artifact.clone());
            Ok(artifact)
        })
    }

    /// Fetch an artifact by id.
    pub fn artifact_get(&self, id: Uuid) -> Result<Artifact> {
        self.read(|s| s.artifacts.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("artifact {id}")))
    }

    /// Artifacts of a job, newest first.
    pub fn artifacts_for_job(&self, job_id: Uuid) -> Vec<Artifact> {
        self.read(|s| s.artifacts_for_job(job_id))
    }

    // -----------------------------------------------------------------------
    // Pricing catalog
    // -----------------------------------------------------------------------

    /// Insert a price list.
    pub fn price_list_insert(&self, list: PriceList) -> Result<PriceList> {
        self.tx(|s| {
            s.price_lists.insert(list.id, list.clone());
            Ok(list)
        })
    }

    /// Fetch a price list by id.
    pub fn price_list_get(&self, id: Uuid) -> Result<PriceList> {
        self.read(|s| s.price_lists.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("price list {id}")))
    }

    /// The current default admin list, if any.
    pub fn active_price_list(&self) -> Option<PriceList> {
        self.read(|s| s.active_price_list().cloned())
    }

    /// Insert a price item.
    pub fn price_item_insert(&self, item: PriceItem) -> Result<PriceItem> {
        self.tx(|s| {
            s.price_items.insert(item.id, item.clone());
            Ok(item)
        })
    }

    /// Fetch a price item by id.
    pub fn price_item_get(&self, id: Uuid) -> Result<PriceItem> {
        self.read(|s| s.price_items.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("price item {id}")))
    }

    /// Items of one price list.
    pub fn price_items_for_list(&self, list_id: Uuid) -> Vec<PriceItem> {
        self.read(|s| {
            s.price_items_for_list(list_id)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Insert a supplier.
    pub fn supplier_insert(&self, supplier: Supplier) -> Result<Supplier> {
        self.tx(|s| {
            s.suppliers.insert(supplier.id, supplier.clone());
            Ok(supplier)
        })
    }

    /// Fetch a supplier by id.
    pub fn supplier_get(&self, id: Uuid) -> Result<Supplier> {
        self.read(|s| s.suppliers.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("supplier {id}")))
    }

    /// Insert a supplier rate.
    pub fn supplier_price_item_insert(&self, item: SupplierPriceItem) -> Result<SupplierPriceItem> {
        self.tx(|s| {
            s.supplier_price_items.insert(item.id, item.clone());
            Ok(item)
        })
    }

    /// Supplier rates for one supplier.
    pub fn supplier_items_for(&self, supplier_id: Uuid) -> Vec<SupplierPriceItem> {
        self.read(|s| s.supplier_items_for(supplier_id).into_iter().cloned().collect())
    }

    // -----------------------------------------------------------------------
    // Collaborators & invitations
    // -----------------------------------------------------------------------

    /// Insert a membership row; `(project, user)` is unique.
    pub fn collaborator_insert(&self, collab: Collaborator) -> Result<Collaborator> {
        self.tx(|s| {
            if s.collaborator_for(collab.project_id, collab.user_id).is_some() {
                return Err(Error::conflict("user is already a collaborator"));
            }
            s.collaborators.insert(collab.id, collab.clone());
            Ok(collab)
        })
    }

    /// Membership row for (project, user), if any.
    pub fn collaborator_for(&self, project_id: Uuid, user_id: Uuid) -> Option<Collaborator> {
        self.read(|s| s.collaborator_for(project_id, user_id).cloned())
    }

    /// All memberships of a project.
    pub fn collaborators_for_project(&self, project_id: Uuid) -> Vec<Collaborator> {
        self.read(|s| {
            s.collaborators
                .values()
                .filter(|c| c.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    /// Fetch a membership row by id, scoped to a project.
    pub fn collaborator_find(&self, id: Uuid, project_id: Uuid) -> Result<Collaborator> {
        self.read(|s| s.collaborators.get(&id).cloned())
            .filter(|c| c.project_id == project_id)
            .ok_or_else(|| Error::not_found(format!("collaborator {id}")))
    }

    /// Change a member's role.
    pub fn collaborator_set_role(&self, id: Uuid, role: Role) -> Result<Collaborator> {
        self.tx(|s| {
            let collab = s
                .collaborators
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("collaborator {id}")))?;
            collab.role = role;
            Ok(collab.clone())
        })
    }

    /// Remove a membership row.
    pub fn collaborator_remove(&self, id: Uuid) -> Result<Collaborator> {
        self.tx(|s| {
            s.collaborators
                .remove(&id)
                .ok_or_else(|| Error::not_found(format!("collaborator {id}")))
        })
    }

    /// Insert an invitation; one pending invitation per (project, email).
    pub fn invitation_insert(&self, invitation: Invitation) -> Result<Invitation> {
        self.tx(|s| {
            let duplicate = s.invitations.values().any(|i| {
                i.project_id == invitation.project_id
                    && i.email == invitation.email
                    && i.status == InvitationStatus::Pending
            });
            if duplicate {
                return Err(Error::conflict(format!(
                    "pending invitation already exists for {}",
                    invitation.email
                )));
            }
            s.invitations.insert(invitation.id, invitation.clone());
            Ok(invitation)
        })
    }

    /// Fetch an invitation by id.
    pub fn invitation_get(&self, id: Uuid) -> Result<Invitation> {
        self.read(|s| s.invitations.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("invitation {id}")))
    }

    /// Look up an invitation by token hash.
    pub fn invitation_by_token_hash(&self, token_hash: &str) -> Option<Invitation> {
        self.read(|s| {
            s.invitations
                .values()
                .find(|i| i.token_hash == token_hash)
                .cloned()
        })
    }

    /// Invitations of a project.
    pub fn invitations_for_project(&self, project_id: Uuid) -> Vec<Invitation> {
        self.read(|s| {
            s.invitations
                .values()
                .filter(|i| i.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    /// Apply an in-place mutation to an invitation.
    pub fn invitation_update(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Invitation),
    ) -> Result<Invitation> {
        self.tx(|s| {
            let inv = s
                .invitations
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("invitation {id}")))?;
            f(inv);
            Ok(inv.clone())
        })
    }

    /// Accept an invitation by token hash: marks it accepted and inserts
    /// the membership row in one transaction.
    ///
    /// Returns `NotFound` for unknown hashes and for invitations that are
    /// no longer pending (a consumed token is indistinguishable from a bad
    /// one), and flips the row to `Expired` when the deadline passed.
    pub fn invitation_accept(&self, token_hash: &str, user_id: Uuid) -> Result<(Invitation, Collaborator)> {
        let now = self.now();
        self.tx(|s| {
            let inv_id = s
                .invitations
                .values()
                .find(|i| i.token_hash == token_hash)
                .map(|i| i.id)
                .ok_or_else(|| Error::not_found("invitation"))?;
            let inv = s.invitations.get_mut(&inv_id).expect("id just looked up");
            if inv.status != InvitationStatus::Pending {
                return Err(Error::not_found("invitation"));
            }
            if now > inv.expires_at {
                inv.status = InvitationStatus::Expired;
                return Err(Error::not_found("invitation"));
            }
            inv.status = InvitationStatus::Accepted;
            let inv = inv.clone();

            if s.collaborator_for(inv.project_id, user_id).is_some() {
                return Err(Error::conflict("user is already a collaborator"));
            }
            let collab = Collaborator {
                id: Uuid::new_v4(),
                project_id: inv.project_id,
                user_id,
                role: inv.role,
                invited_by: inv.invited_by,
                invited_at: inv.invited_at,
                accepted_at: Some(now),
            };
            s.collaborators.insert(collab.id, collab.clone());
            debug!(project_id = %inv.project_id, user_id = %user_id, "invitation accepted");
            Ok((inv, collab))
        })
    }

    // -----------------------------------------------------------------------
    // Audit rows
    // -----------------------------------------------------------------------

    /// Insert a comment.
    pub fn comment_insert(&self, comment: Comment) -> Result<Comment> {
        self.tx(|s| {
            s.comments.insert(comment.id, comment.clone());
            Ok(comment)
        })
    }

    /// Comments of a project, oldest first.
    pub fn comments_for_project(&self, project_id: Uuid) -> Vec<Comment> {
        self.read(|s| {
            let mut out: Vec<Comment> = s
                .comments
                .values()
                .filter(|c| c.project_id == project_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            out
        })
    }

    /// Append an activity record.
    pub fn activity_append(&self, activity: Activity) -> Result<Activity> {
        self.tx(|s| {
            s.activities.push(activity.clone());
            Ok(activity)
        })
    }

    /// Activities of a project, oldest first.
    pub fn activities_for_project(&self, project_id: Uuid) -> Vec<Activity> {
        self.read(|s| {
            s.activities
                .iter()
                .filter(|a| a.project_id == project_id)
                .cloned()
                .collect()
        })
    }

    /// Insert a notification.
    pub fn notification_insert(&self, notification: Notification) -> Result<Notification> {
        self.tx(|s| {
            s.notifications.insert(notification.id, notification.clone());
            Ok(notification)
        })
    }

    /// Unread-first notifications for a user, newest first.
    pub fn notifications_for_user(&self, user_id: Uuid) -> Vec<Notification> {
        self.read(|s| {
            let mut out: Vec<Notification> = s
                .notifications
                .values()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| {
                (a.read_at.is_some(), b.created_at).cmp(&(b.read_at.is_some(), a.created_at))
            });
            out
        })
    }

    // -----------------------------------------------------------------------
    // Templates & estimates
    // -----------------------------------------------------------------------

    /// Insert a template.
    pub fn template_insert(&self, template: Template) -> Result<Template> {
        self.tx(|s| {
            s.templates.insert(template.id, template.clone());
            Ok(template)
        })
    }

    /// Fetch a template by id.
    pub fn template_get(&self, id: Uuid) -> Result<Template> {
        self.read(|s| s.templates.get(&id).cloned())
            .ok_or_else(|| Error::not_found(format!("template {id}")))
    }

    /// Delete a template.
    pub fn template_delete(&self, id: Uuid) -> Result<Template> {
        self.tx(|s| {
            s.templates
                .remove(&id)
                .ok_or_else(|| Error::not_found(format!("template {id}")))
        })
    }

    /// Templates owned by a user.
    pub fn templates_for_user(&self, user_id: Uuid) -> Vec<Template> {
        self.read(|s| {
            s.templates
                .values()
                .filter(|t| t.owner_id == user_id)
                .cloned()
                .collect()
        })
    }

    /// Insert an estimate snapshot.
    pub fn estimate_insert(&self, estimate: Estimate) -> Result<Estimate> {
        self.tx(|s| {
            s.estimates.insert(estimate.id, estimate.clone());
            Ok(estimate)
        })
    }

    /// Estimates of a project.
    pub fn estimates_for_project(&self, project_id: Uuid) -> Vec<Estimate> {
        self.read(|s| {
            s.estimates
                .values()
                .filter(|e| e.project_id == project_id)
                .cloned()
                .collect()
        })
    }
}

// ---------------------------------------------------------------------------
// Snapshot persistence
// ---------------------------------------------------------------------------

/// Write `state` to `path` via a temp file and atomic rename.
fn persist(path: &Path, state: &StoreState) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qto_core::{ManualClock, SystemClock, UserRole};

    fn store() -> Store {
        Store::in_memory(Arc::new(SystemClock))
    }

    fn insert_user(store: &Store, balance: u64) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("{}@test.local", Uuid::new_v4()),
            password_hash: "h".into(),
            role: UserRole::User,
            email_verified: true,
            credits_balance: balance,
            full_name: "Test".into(),
            created_at: store.now(),
            last_verification_sent_at: None,
            deactivated: false,
        };
        store.user_insert(user).unwrap()
    }

    fn insert_job(store: &Store, user: &User) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: user.id,
            file_id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            error_code: None,
            price_list_id: None,
            supplier_id: None,
            created_at: store.now(),
            started_at: None,
            finished_at: None,
        };
        store.job_insert(job).unwrap()
    }

    fn insert_item(store: &Store, job: &Job) -> BoqItem {
        let mut item = BoqItem {
            id: Uuid::new_v4(),
            job_id: job.id,
            code: Some("C-1".into()),
            description: "Wall".into(),
            unit: "m2".into(),
            qty: 10.0,
            source_ref: None,
            mapped_price_item_id: None,
            allowance: 0.0,
            unit_price: 10.0,
            total_price: 0.0,
            created_at: store.now(),
            updated_at: store.now(),
        };
        item.recompute_total();
        store.boq_insert_rows(vec![item.clone()]).unwrap();
        item
    }

    // -- transactions ----------------------------------------------------

    #[test]
    fn failed_tx_leaves_state_untouched() {
        let s = store();
        let user = insert_user(&s, 100);
        let err = s.tx(|state| -> Result<()> {
            state.users.get_mut(&user.id).unwrap().credits_balance = 0;
            Err(Error::Internal("abort".into()))
        });
        assert!(err.is_err());
        assert_eq!(s.user_get(user.id).unwrap().credits_balance, 100);
    }

    // -- credits ---------------------------------------------------------

    #[test]
    fn debit_succeeds_when_covered() {
        let s = store();
        let user = insert_user(&s, 1000);
        let (balance, ok) = s.credits_debit(user.id, 400).unwrap();
        assert!(ok);
        assert_eq!(balance, 600);
    }

    #[test]
    fn debit_refuses_underflow_without_writing() {
        let s = store();
        let user = insert_user(&s, 300);
        let (balance, ok) = s.credits_debit(user.id, 400).unwrap();
        assert!(!ok);
        assert_eq!(balance, 300);
        assert_eq!(s.user_get(user.id).unwrap().credits_balance, 300);
    }

    #[test]
    fn parallel_debits_admit_exactly_floor() {
        // Invariant 1: from balance B with cost c, exactly floor(B/c)
        // concurrent debits succeed.
        let s = store();
        let user = insert_user(&s, 1000);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let s = s.clone();
            let uid = user.id;
            handles.push(std::thread::spawn(move || {
                s.credits_debit(uid, 400).unwrap().1
            }));
        }
        let oks = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(oks, 2);
        assert_eq!(s.user_get(user.id).unwrap().credits_balance, 200);
    }

    #[test]
    fn refund_restores_balance() {
        let s = store();
        let user = insert_user(&s, 600);
        s.credits_debit(user.id, 400).unwrap();
        let balance = s.credits_credit(user.id, 400).unwrap();
        assert_eq!(balance, 600);
    }

    // -- job state machine ----------------------------------------------

    #[test]
    fn status_transitions_enforced() {
        let s = store();
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);

        let running = s.job_update_status(job.id, JobStatus::Running, None).unwrap();
        assert!(running.started_at.is_some());

        let done = s
            .job_update_status(job.id, JobStatus::Completed, None)
            .unwrap();
        assert_eq!(done.progress, 100);
        assert!(done.finished_at.is_some());

        let err = s.job_update_status(job.id, JobStatus::Running, None);
        assert!(matches!(err, Err(Error::Conflict { .. })));
    }

    #[test]
    fn queued_cannot_complete_directly() {
        let s = store();
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);
        let err = s.job_update_status(job.id, JobStatus::Completed, None);
        assert!(matches!(err, Err(Error::Conflict { .. })));
    }

    #[test]
    fn failed_stamps_error_code() {
        let s = store();
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);
        s.job_update_status(job.id, JobStatus::Running, None).unwrap();
        let failed = s
            .job_update_status(job.id, JobStatus::Failed, Some("takeoff_error".into()))
            .unwrap();
        assert_eq!(failed.error_code.as_deref(), Some("takeoff_error"));
    }

    // -- job events -------------------------------------------------------

    #[test]
    fn events_keep_emission_order_even_when_clock_rewinds() {
        let clock = Arc::new(ManualClock::start_now());
        let s = Store {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                snapshot: None,
                clock: clock.clone(),
            }),
        };
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);

        s.job_event_append(job.id, "queued", "Job queued", None).unwrap();
        clock.advance_secs(-30);
        s.job_event_append(job.id, "validating", "Validating", None)
            .unwrap();

        let events = s.job_events(job.id);
        assert_eq!(events.len(), 2);
        assert!(events[0].ts <= events[1].ts);
        assert_eq!(events[0].stage, "queued");
        assert_eq!(events[1].stage, "validating");
    }

    #[test]
    fn event_for_unknown_job_is_not_found() {
        let s = store();
        let err = s.job_event_append(Uuid::new_v4(), "queued", "x", None);
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    // -- optimistic BoQ update -------------------------------------------

    #[test]
    fn update_if_applies_on_matching_token() {
        let s = store();
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);
        let item = insert_item(&s, &job);

        let patch = BoqItemPatch {
            qty: Some(12.0),
            ..Default::default()
        };
        let (row, modified) = s
            .boq_item_update_if(item.id, Some(item.updated_at), &patch)
            .unwrap();
        assert!(modified);
        assert_eq!(row.qty, 12.0);
        assert_eq!(row.total_price, 120.0);
        assert!(row.updated_at >= item.updated_at);
    }

    #[test]
    fn update_if_rejects_stale_token_without_writing() {
        let clock = Arc::new(ManualClock::start_now());
        let s = Store {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                snapshot: None,
                clock: clock.clone(),
            }),
        };
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);
        let item = insert_item(&s, &job);

        let stale = item.updated_at - chrono::Duration::seconds(30);
        let patch = BoqItemPatch {
            qty: Some(99.0),
            ..Default::default()
        };
        let (row, modified) = s.boq_item_update_if(item.id, Some(stale), &patch).unwrap();
        assert!(!modified);
        assert_eq!(row.qty, 10.0);
        assert_eq!(s.boq_item_get(item.id).unwrap().qty, 10.0);
    }

    #[test]
    fn update_if_tolerates_one_second_drift() {
        let s = store();
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);
        let item = insert_item(&s, &job);

        let near = item.updated_at - chrono::Duration::milliseconds(900);
        let patch = BoqItemPatch {
            qty: Some(11.0),
            ..Default::default()
        };
        let (_, modified) = s.boq_item_update_if(item.id, Some(near), &patch).unwrap();
        assert!(modified);
    }

    #[test]
    fn noop_patch_does_not_stamp_version() {
        let s = store();
        let user = insert_user(&s, 0);
        let job = insert_job(&s, &user);
        let item = insert_item(&s, &job);

        let patch = BoqItemPatch {
            qty: Some(item.qty),
            ..Default::default()
        };
        let (row, modified) = s
            .boq_item_update_if(item.id, Some(item.updated_at), &patch)
            .unwrap();
        assert!(!modified);
        assert_eq!(row.updated_at, item.updated_at);
    }

    // -- invitations ------------------------------------------------------

    fn pending_invitation(s: &Store, hash: &str) -> Invitation {
        let inviter = insert_user(s, 0);
        let inv = Invitation {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            email: "e@x.test".into(),
            role: Role::Editor,
            token_hash: hash.into(),
            status: InvitationStatus::Pending,
            invited_by: inviter.id,
            invited_at: s.now(),
            expires_at: s.now() + chrono::Duration::days(7),
        };
        s.invitation_insert(inv).unwrap()
    }

    #[test]
    fn duplicate_pending_invitation_conflicts() {
        let s = store();
        let first = pending_invitation(&s, "aa");
        let dup = Invitation {
            id: Uuid::new_v4(),
            token_hash: "bb".into(),
            ..first
        };
        let err = s.invitation_insert(dup);
        assert!(matches!(err, Err(Error::Conflict { .. })));
    }

    #[test]
    fn accept_is_transactional_and_single_shot() {
        let s = store();
        let inv = pending_invitation(&s, "cafe");
        let member = insert_user(&s, 0);

        let (accepted, collab) = s.invitation_accept("cafe", member.id).unwrap();
        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert_eq!(collab.role, Role::Editor);
        assert!(s.collaborator_for(inv.project_id, member.id).is_some());

        // Second accept with the same token: no longer pending.
        let err = s.invitation_accept("cafe", member.id);
        assert!(matches!(err, Err(Error::NotFound(_))));
    }

    #[test]
    fn accept_with_unknown_token_is_not_found() {
        let s = store();
        pending_invitation(&s, "cafe");
        let member = insert_user(&s, 0);
        assert!(matches!(
            s.invitation_accept("beef", member.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn accept_after_expiry_flips_to_expired() {
        let clock = Arc::new(ManualClock::start_now());
        let s = Store {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                snapshot: None,
                clock: clock.clone(),
            }),
        };
        let inv = pending_invitation(&s, "cafe");
        let member = insert_user(&s, 0);
        clock.advance(chrono::Duration::days(8));

        assert!(matches!(
            s.invitation_accept("cafe", member.id),
            Err(Error::NotFound(_))
        ));
        assert_eq!(
            s.invitation_get(inv.id).unwrap().status,
            InvitationStatus::Expired
        );
    }

    // -- persistence ------------------------------------------------------

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let user_id;
        {
            let s = Store::open(dir.path(), clock.clone()).unwrap();
            let user = insert_user(&s, 777);
            user_id = user.id;
        }

        let reopened = Store::open(dir.path(), clock).unwrap();
        assert_eq!(reopened.user_get(user_id).unwrap().credits_balance, 777);
    }

    #[test]
    fn cascade_delete_removes_children() {
        let s = store();
        let user = insert_user(&s, 0);
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: user.id,
            name: "P".into(),
            description: String::new(),
            start_date: None,
            end_date: None,
            status: qto_core::ProjectStatus::Active,
            created_at: s.now(),
            updated_at: s.now(),
        };
        s.project_insert(project.clone()).unwrap();
        let mut job = insert_job(&s, &user);
        job.project_id = project.id;
        s.job_insert(job.clone()).unwrap();
        let item = insert_item(&s, &job);
        s.job_event_append(job.id, "queued", "x", None).unwrap();

        s.project_delete(project.id).unwrap();
        assert!(s.job_get(job.id).is_err());
        assert!(s.boq_item_get(item.id).is_err());
        assert!(s.job_events(job.id).is_empty());
    }
}
