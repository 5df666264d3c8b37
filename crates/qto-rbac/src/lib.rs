// SPDX-License-Identifier: MIT OR Apache-2.0
//! Role-based access control over project membership.
//!
//! Membership derives from project ownership (implicit `owner` role) or a
//! collaborator row. Every mutating operation in the system funnels through
//! [`require_project_access`]; nothing else is allowed to compare roles.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use qto_core::{Project, ProjectId, Role, UserId};
use qto_error::{Error, Result};
use qto_store::Store;

/// Resolve the caller's role on a project, if they are a member.
pub fn role_for(store: &Store, project_id: ProjectId, user_id: UserId) -> Option<Role> {
    let project = store.read(|s| s.projects.get(&project_id).cloned())?;
    if project.owner_id == user_id {
        return Some(Role::Owner);
    }
    store
        .collaborator_for(project_id, user_id)
        .map(|c| c.role)
}

/// Authorize `user_id` on `project_id` with at least `min_role`.
///
/// - Unknown project → `NotFound`.
/// - Non-member → `NotFound` as well: read paths must not reveal whether a
///   project exists to outsiders.
/// - Member below `min_role` → `Forbidden`, naming both roles.
///
/// Returns the project together with the caller's actual role so handlers
/// can make finer-grained decisions without a second lookup.
pub fn require_project_access(
    store: &Store,
    project_id: ProjectId,
    user_id: UserId,
    min_role: Role,
) -> Result<(Project, Role)> {
    let project = store.project_get(project_id)?;

    let role = if project.owner_id == user_id {
        Role::Owner
    } else {
        match store.collaborator_for(project_id, user_id) {
            Some(c) => c.role,
            None => return Err(Error::not_found(format!("project {project_id}"))),
        }
    };

    if !role.satisfies(min_role) {
        return Err(Error::Forbidden(format!(
            "insufficient permissions: your role is {role}, required {min_role}"
        )));
    }

    Ok((project, role))
}

/// True when `role` may invite collaborators.
pub fn can_invite(role: Role) -> bool {
    role.satisfies(Role::Editor)
}

/// True when `role` may change another member's role.
pub fn can_change_roles(role: Role) -> bool {
    role == Role::Owner
}

/// True when `role` may remove a collaborator.
pub fn can_remove_collaborator(role: Role) -> bool {
    role == Role::Owner
}

/// True when `role` may edit project resources.
pub fn can_edit(role: Role) -> bool {
    role.satisfies(Role::Editor)
}

/// True when `role` may comment.
pub fn can_comment(role: Role) -> bool {
    role.satisfies(Role::Viewer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qto_core::{Collaborator, ProjectStatus, SystemClock};
    use std::sync::Arc;
    use uuid::Uuid;

    fn fixture() -> (Store, Project, UserId) {
        let store = Store::in_memory(Arc::new(SystemClock));
        let owner = Uuid::new_v4();
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "Bridge".into(),
            description: String::new(),
            start_date: None,
            end_date: None,
            status: ProjectStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.project_insert(project.clone()).unwrap();
        (store, project, owner)
    }

    fn add_member(store: &Store, project: &Project, role: Role) -> UserId {
        let user = Uuid::new_v4();
        store
            .collaborator_insert(Collaborator {
                id: Uuid::new_v4(),
                project_id: project.id,
                user_id: user,
                role,
                invited_by: project.owner_id,
                invited_at: Utc::now(),
                accepted_at: Some(Utc::now()),
            })
            .unwrap();
        user
    }

    #[test]
    fn owner_is_implicit_member() {
        let (store, project, owner) = fixture();
        let (_, role) =
            require_project_access(&store, project.id, owner, Role::Owner).unwrap();
        assert_eq!(role, Role::Owner);
    }

    #[test]
    fn editor_gate_admits_owner_and_editor_only() {
        // Invariant 8: min=editor admits owner and editor, rejects viewer
        // and non-member.
        let (store, project, owner) = fixture();
        let editor = add_member(&store, &project, Role::Editor);
        let viewer = add_member(&store, &project, Role::Viewer);
        let outsider = Uuid::new_v4();

        assert!(require_project_access(&store, project.id, owner, Role::Editor).is_ok());
        assert!(require_project_access(&store, project.id, editor, Role::Editor).is_ok());
        assert!(matches!(
            require_project_access(&store, project.id, viewer, Role::Editor),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            require_project_access(&store, project.id, outsider, Role::Editor),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn missing_project_is_not_found() {
        let (store, _, owner) = fixture();
        assert!(matches!(
            require_project_access(&store, Uuid::new_v4(), owner, Role::Viewer),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn non_member_cannot_probe_existence() {
        let (store, project, _) = fixture();
        let outsider = Uuid::new_v4();
        let on_real = require_project_access(&store, project.id, outsider, Role::Viewer);
        let on_fake = require_project_access(&store, Uuid::new_v4(), outsider, Role::Viewer);
        // Both answers are NotFound; an outsider cannot tell them apart.
        assert!(matches!(on_real, Err(Error::NotFound(_))));
        assert!(matches!(on_fake, Err(Error::NotFound(_))));
    }

    #[test]
    fn role_for_reports_membership() {
        let (store, project, owner) = fixture();
        let viewer = add_member(&store, &project, Role::Viewer);
        assert_eq!(role_for(&store, project.id, owner), Some(Role::Owner));
        assert_eq!(role_for(&store, project.id, viewer), Some(Role::Viewer));
        assert_eq!(role_for(&store, project.id, Uuid::new_v4()), None);
    }

    #[test]
    fn capability_predicates() {
        assert!(can_invite(Role::Editor));
        assert!(!can_invite(Role::Viewer));
        assert!(can_change_roles(Role::Owner));
        assert!(!can_change_roles(Role::Editor));
        assert!(can_remove_collaborator(Role::Owner));
        assert!(!can_remove_collaborator(Role::Editor));
        assert!(can_edit(Role::Owner));
        assert!(!can_edit(Role::Viewer));
        assert!(can_comment(Role::Viewer));
    }
}
