// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collaboration: memberships, invitations, comments, notifications.
//!
//! Invitations are token-based: the raw token is returned exactly once
//! (for mail delivery) while only its SHA-256 hash is stored. Membership
//! changes and comments are recorded as activities, turned into
//! notifications for the project owner, and fanned out on the project
//! channel.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Duration;
use qto_auth::token::{random_token, token_hash};
use qto_broker::EventBus;
use qto_core::{
    Activity, AuditId, Clock, Collaborator, Comment, CommentContext, Invitation,
    InvitationStatus, Notification, Project, ProjectId, Role, UserId, channel,
};
use qto_error::{Error, Result};
use qto_mail::{Mail, Mailer};
use qto_store::Store;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// The collaboration service and its collaborators.
pub struct CollabService {
    store: Store,
    broker: Arc<dyn EventBus>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    invitation_expiry_days: i64,
}

impl CollabService {
    /// Wire the service.
    pub fn new(
        store: Store,
        broker: Arc<dyn EventBus>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        invitation_expiry_days: i64,
    ) -> Self {
        Self {
            store,
            broker,
            mailer,
            clock,
            invitation_expiry_days,
        }
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    /// List memberships; any member may read them.
    pub fn list_collaborators(&self, project_id: ProjectId, actor: UserId) -> Result<Vec<Collaborator>> {
        qto_rbac::require_project_access(&self.store, project_id, actor, Role::Viewer)?;
        Ok(self.store.collaborators_for_project(project_id))
    }

    /// Directly add a member (owner only). Ownership is not grantable.
    pub fn add_collaborator(
        &self,
        project_id: ProjectId,
        actor: UserId,
        user_id: UserId,
        role: Role,
    ) -> Result<Collaborator> {
        let (project, _) =
            qto_rbac::require_project_access(&self.store, project_id, actor, Role::Owner)?;
        if role == Role::Owner {
            return Err(Error::validation_field("role", "ownership is not grantable"));
        }
        self.store.user_get(user_id)?;
        if project.owner_id == user_id {
            return Err(Error::conflict("user is already a collaborator"));
        }

        let now = self.clock.now();
        let collab = self.store.collaborator_insert(Collaborator {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            role,
            invited_by: actor,
            invited_at: now,
            accepted_at: Some(now),
        })?;

        self.record(
            &project,
            Some(actor),
            "collaborator.added",
            serde_json::json!({"user_id": user_id, "role": role}),
        );
        Ok(collab)
    }

    /// Change a member's role (owner only).
    pub fn change_role(
        &self,
        project_id: ProjectId,
        actor: UserId,
        collaborator_id: Uuid,
        role: Role,
    ) -> Result<Collaborator> {
        let (project, _) =
            qto_rbac::require_project_access(&self.store, project_id, actor, Role::Owner)?;
        if role == Role::Owner {
            return Err(Error::validation_field("role", "ownership is not grantable"));
        }
        let existing = self.store.collaborator_find(collaborator_id, project_id)?;
        let updated = self.store.collaborator_set_role(existing.id, role)?;
        self.record(
            &project,
            Some(actor),
            "collaborator.role_changed",
            serde_json::json!({"user_id": updated.user_id, "role": role}),
        );
        Ok(updated)
    }

    /// Remove a member (owner only).
    pub fn remove_collaborator(
        &self,
        project_id: ProjectId,
        actor: UserId,
        collaborator_id: Uuid,
    ) -> Result<()> {
        let (project, _) =
            qto_rbac::require_project_access(&self.store, project_id, actor, Role::Owner)?;
        let existing = self.store.collaborator_find(collaborator_id, project_id)?;
        self.store.collaborator_remove(existing.id)?;
        self.record(
            &project,
            Some(actor),
            "collaborator.removed",
            serde_json::json!({"user_id": existing.user_id}),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Invitations
    // -----------------------------------------------------------------------

    /// Invite an address to the project (editor or above).
    ///
    /// Returns the invitation and the raw token — the one and only time
    /// it exists outside the recipient's mailbox.
    pub fn invite(
        &self,
        project_id: ProjectId,
        actor: UserId,
        email: &str,
        role: Role,
    ) -> Result<(Invitation, String)> {
        let (project, actor_role) =
            qto_rbac::require_project_access(&self.store, project_id, actor, Role::Editor)?;
        debug_assert!(qto_rbac::can_invite(actor_role));
        if !Role::invitable().contains(&role) {
            return Err(Error::validation_field(
                "role",
                "the owner role cannot be granted via invitation",
            ));
        }
        let email = email.trim().to_ascii_lowercase();
        if !email.contains('@') {
            return Err(Error::validation_field("email", "invalid email address"));
        }
        if let Some(invitee) = self.store.user_by_email(&email) {
            if invitee.id == project.owner_id
                || self.store.collaborator_for(project_id, invitee.id).is_some()
            {
                return Err(Error::conflict("user is already a collaborator"));
            }
        }

        let raw = random_token();
        let now = self.clock.now();
        let invitation = self.store.invitation_insert(Invitation {
            id: Uuid::new_v4(),
            project_id,
            email: email.clone(),
            role,
            token_hash: token_hash(&raw),
            status: InvitationStatus::Pending,
            invited_by: actor,
            invited_at: now,
            expires_at: now + Duration::days(self.invitation_expiry_days),
        })?;

        let inviter_name = self
            .store
            .user_get(actor)
            .map(|u| u.full_name)
            .unwrap_or_else(|_| "A team member".into());
        if let Err(err) = self.mailer.send(Mail {
            to: email,
            subject: format!("Invitation to collaborate on {}", project.name),
            body: format!(
                "{inviter_name} invited you as {role} on \"{}\".\n\nAccept with this token: {raw}\n",
                project.name
            ),
        }) {
            // The invitation stands even when the mail bounces; the inviter
            // still holds the token from this response.
            warn!(invitation_id = %invitation.id, error = %err, "invitation mail not delivered");
        }

        self.record(
            &project,
            Some(actor),
            "invitation.created",
            serde_json::json!({"email": invitation.email, "role": role}),
        );
        Ok((invitation, raw))
    }

    /// List a project's invitations (editor or above).
    pub fn list_invitations(&self, project_id: ProjectId, actor: UserId) -> Result<Vec<Invitation>> {
        qto_rbac::require_project_access(&self.store, project_id, actor, Role::Editor)?;
        Ok(self.store.invitations_for_project(project_id))
    }

    /// Revoke a pending invitation (owner only).
    pub fn revoke_invitation(
        &self,
        project_id: ProjectId,
        actor: UserId,
        invitation_id: Uuid,
    ) -> Result<Invitation> {
        let (project, _) =
            qto_rbac::require_project_access(&self.store, project_id, actor, Role::Owner)?;
        let invitation = self.store.invitation_get(invitation_id)?;
        if invitation.project_id != project_id {
            return Err(Error::not_found(format!("invitation {invitation_id}")));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(Error::conflict("invitation is no longer pending"));
        }
        let revoked = self
            .store
            .invitation_update(invitation_id, |i| i.status = InvitationStatus::Revoked)?;
        self.record(
            &project,
            Some(actor),
            "invitation.revoked",
            serde_json::json!({"email": revoked.email}),
        );
        Ok(revoked)
    }

    /// Accept an invitation as an authenticated user holding the raw
    /// token.
    pub fn accept_invitation(
        &self,
        raw_token: &str,
        user_id: UserId,
    ) -> Result<(Invitation, Collaborator)> {
        let (invitation, collab) = self.store.invitation_accept(&token_hash(raw_token), user_id)?;
        if let Ok(project) = self.store.project_get(invitation.project_id) {
            self.record(
                &project,
                Some(user_id),
                "invitation.accepted",
                serde_json::json!({"email": invitation.email, "role": invitation.role}),
            );
        }
        Ok((invitation, collab))
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    /// Add a comment (any member).
    pub fn add_comment(
        &self,
        project_id: ProjectId,
        actor: UserId,
        context: CommentContext,
        context_id: &str,
        body: &str,
        parent_id: Option<AuditId>,
    ) -> Result<Comment> {
        let (project, role) =
            qto_rbac::require_project_access(&self.store, project_id, actor, Role::Viewer)?;
        debug_assert!(qto_rbac::can_comment(role));
        if body.trim().is_empty() {
            return Err(Error::validation_field("body", "comment cannot be empty"));
        }
        if let Some(parent) = parent_id {
            let parent_comment = self
                .store
                .read(|s| s.comments.get(&parent).cloned())
                .ok_or_else(|| Error::not_found(format!("comment {parent}")))?;
            if parent_comment.project_id != project_id {
                return Err(Error::not_found(format!("comment {parent}")));
            }
        }

        let comment = self.store.comment_insert(Comment {
            id: Uuid::new_v4(),
            project_id,
            context,
            context_id: context_id.to_string(),
            author_id: actor,
            body: body.trim().to_string(),
            parent_id,
            created_at: self.clock.now(),
            updated_at: None,
        })?;

        self.record(
            &project,
            Some(actor),
            "comment.created",
            serde_json::json!({"comment_id": comment.id, "context": context}),
        );
        Ok(comment)
    }

    /// List a project's comments (any member).
    pub fn list_comments(&self, project_id: ProjectId, actor: UserId) -> Result<Vec<Comment>> {
        qto_rbac::require_project_access(&self.store, project_id, actor, Role::Viewer)?;
        Ok(self.store.comments_for_project(project_id))
    }

    // -----------------------------------------------------------------------
    // Activities & notifications
    // -----------------------------------------------------------------------

    /// Activity log of a project (any member).
    pub fn list_activities(&self, project_id: ProjectId, actor: UserId) -> Result<Vec<Activity>> {
        qto_rbac::require_project_access(&self.store, project_id, actor, Role::Viewer)?;
        Ok(self.store.activities_for_project(project_id))
    }

    /// Notifications of the calling user.
    pub fn list_notifications(&self, user_id: UserId) -> Vec<Notification> {
        self.store.notifications_for_user(user_id)
    }

    /// Mark one notification read.
    pub fn mark_notification_read(&self, user_id: UserId, notification_id: AuditId) -> Result<()> {
        let now = self.clock.now();
        self.store.tx(|s| {
            let n = s
                .notifications
                .get_mut(&notification_id)
                .filter(|n| n.user_id == user_id)
                .ok_or_else(|| Error::not_found(format!("notification {notification_id}")))?;
            n.read_at = Some(now);
            Ok(())
        })
    }

    /// Record an activity, notify the project owner, and fan out on the
    /// project channel. Best-effort: a failed audit write is logged, not
    /// propagated.
    fn record(
        &self,
        project: &Project,
        actor: Option<UserId>,
        kind: &str,
        payload: serde_json::Value,
    ) {
        let now = self.clock.now();
        let activity = Activity {
            id: Uuid::new_v4(),
            project_id: project.id,
            actor_id: actor,
            kind: kind.to_string(),
            payload: payload.clone(),
            created_at: now,
        };
        if let Err(err) = self.store.activity_append(activity) {
            warn!(project_id = %project.id, kind, error = %err, "activity not recorded");
        }

        if actor != Some(project.owner_id) {
            let notification = Notification {
                id: Uuid::new_v4(),
                user_id: project.owner_id,
                project_id: project.id,
                kind: kind.to_string(),
                payload: payload.clone(),
                created_at: now,
                read_at: None,
            };
            if let Err(err) = self.store.notification_insert(notification) {
                warn!(project_id = %project.id, kind, error = %err, "notification not recorded");
            }
        }

        self.broker.publish(
            &channel::project(project.id),
            serde_json::json!({
                "type": kind,
                "project_id": project.id,
                "actor_id": actor,
                "payload": payload,
                "ts": now,
            }),
        );
    }
}
