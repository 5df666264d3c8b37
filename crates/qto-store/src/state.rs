// SPDX-License-Identifier: MIT OR Apache-2.0
//! The serializable state value the store guards.

use qto_core::{
    Activity, Artifact, BoqItem, Collaborator, Comment, EmailVerification, Estimate, Invitation,
    Job, JobEvent, Notification, PriceItem, PriceList, Project, Revision, StoredFile, Supplier,
    SupplierPriceItem, Template, User,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Complete persistent state.
///
/// Maps are `BTreeMap` so snapshots serialize deterministically. Append-only
/// collections (`job_events`, `revisions`, `activities`) are plain vectors
/// in emission order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreState {
    /// Accounts by id.
    pub users: BTreeMap<Uuid, User>,
    /// Pending email verifications by account id.
    #[serde(default)]
    pub email_verifications: BTreeMap<Uuid, EmailVerification>,
    /// Projects by id.
    pub projects: BTreeMap<Uuid, Project>,
    /// Uploaded files by id.
    pub files: BTreeMap<Uuid, StoredFile>,
    /// Jobs by id.
    pub jobs: BTreeMap<Uuid, Job>,
    /// Stage events, append-only, globally in emission order.
    pub job_events: Vec<JobEvent>,
    /// BoQ rows by id.
    pub boq_items: BTreeMap<Uuid, BoqItem>,
    /// Edit trail, append-only.
    pub revisions: Vec<Revision>,
    /// Export artifacts by id.
    pub artifacts: BTreeMap<Uuid, Artifact>,
    /// Admin price lists by id.
    pub price_lists: BTreeMap<Uuid, PriceList>,
    /// Admin price items by id.
    pub price_items: BTreeMap<Uuid, PriceItem>,
    /// Suppliers by id.
    pub suppliers: BTreeMap<Uuid, Supplier>,
    /// Supplier rates by id.
    pub supplier_price_items: BTreeMap<Uuid, SupplierPriceItem>,
    /// Memberships by id.
    pub collaborators: BTreeMap<Uuid, Collaborator>,
    /// Invitations by id.
    pub invitations: BTreeMap<Uuid, Invitation>,
    /// Comments by id.
    pub comments: BTreeMap<Uuid, Comment>,
    /// Notifications by id.
    pub notifications: BTreeMap<Uuid, Notification>,
    /// Project activity log, append-only.
    pub activities: Vec<Activity>,
    /// BoQ templates by id.
    pub templates: BTreeMap<Uuid, Template>,
    /// Saved estimates by id.
    pub estimates: BTreeMap<Uuid, Estimate>,
}

impl StoreState {
    /// Events for one job, in emission order.
    pub fn events_for_job(&self, job_id: Uuid) -> Vec<JobEvent> {
        self.job_events
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// BoQ rows for one job, ordered by creation then id for stability.
    pub fn boq_for_job(&self, job_id: Uuid) -> Vec<BoqItem> {
        let mut rows: Vec<BoqItem> = self
            .boq_items
            .values()
            .filter(|i| i.job_id == job_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows
    }

    /// Revisions for one BoQ row, in emission order.
    pub fn revisions_for_item(&self, item_id: Uuid) -> Vec<Revision> {
        self.revisions
            .iter()
            .filter(|r| r.boq_item_id == item_id)
            .cloned()
            .collect()
    }

    /// Look up an account by (lowercased) email.
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        let needle = email.to_ascii_lowercase();
        self.users.values().find(|u| u.email == needle)
    }

    /// Membership row for (project, user), if any.
    pub fn collaborator_for(&self, project_id: Uuid, user_id: Uuid) -> Option<&Collaborator> {
        self.collaborators
            .values()
            .find(|c| c.project_id == project_id && c.user_id == user_id)
    }

    /// The most recently created active admin price list.
    pub fn active_price_list(&self) -> Option<&PriceList> {
        self.price_lists
            .values()
            .filter(|pl| pl.is_active)
            .max_by_key(|pl| pl.created_at)
    }

    /// Admin price items belonging to one list.
    pub fn price_items_for_list(&self, price_list_id: Uuid) -> Vec<&PriceItem> {
        self.price_items
            .values()
            .filter(|pi| pi.price_list_id == price_list_id)
            .collect()
    }

    /// Supplier rates for one supplier.
    pub fn supplier_items_for(&self, supplier_id: Uuid) -> Vec<&SupplierPriceItem> {
        self.supplier_price_items
            .values()
            .filter(|si| si.supplier_id == supplier_id)
            .collect()
    }

    /// Artifacts for one job, newest first.
    pub fn artifacts_for_job(&self, job_id: Uuid) -> Vec<Artifact> {
        let mut out: Vec<Artifact> = self
            .artifacts
            .values()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Remove a project and everything that hangs off it.
    pub fn delete_project_cascade(&mut self, project_id: Uuid) {
        let job_ids: Vec<Uuid> = self
            .jobs
            .values()
            .filter(|j| j.project_id == project_id)
            .map(|j| j.id)
            .collect();
        let item_ids: Vec<Uuid> = self
            .boq_items
            .values()
            .filter(|i| job_ids.contains(&i.job_id))
            .map(|i| i.id)
            .collect();

        self.job_events.retain(|e| !job_ids.contains(&e.job_id));
        self.revisions.retain(|r| !item_ids.contains(&r.boq_item_id));
        self.boq_items.retain(|_, i| !job_ids.contains(&i.job_id));
        self.artifacts.retain(|_, a| !job_ids.contains(&a.job_id));
        self.jobs.retain(|_, j| j.project_id != project_id);
        self.files.retain(|_, f| f.project_id != project_id);
        self.collaborators.retain(|_, c| c.project_id != project_id);
        self.invitations.retain(|_, i| i.project_id != project_id);
        self.comments.retain(|_, c| c.project_id != project_id);
        self.notifications.retain(|_, n| n.project_id != project_id);
        self.activities.retain(|a| a.project_id != project_id);
        self.estimates.retain(|_, e| e.project_id != project_id);
        self.projects.remove(&project_id);
    }
}
