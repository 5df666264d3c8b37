// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered project roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Project-scoped role with a strict ordering: `owner > editor > viewer`.
///
/// The numeric rank is what every permission check compares; never compare
/// role names directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access to project resources.
    Viewer,
    /// May edit BoQ rows, invite collaborators, and run jobs.
    Editor,
    /// Full control, including membership management.
    Owner,
}

impl Role {
    /// Numeric rank used for ordered comparison.
    pub fn rank(self) -> u8 {
        match self {
            Self::Viewer => 1,
            Self::Editor => 2,
            Self::Owner => 3,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
        }
    }

    /// Returns `true` when `self` meets or exceeds `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Roles that may be granted through an invitation token.
    ///
    /// `owner` is deliberately absent; ownership is never transferred via
    /// invitation.
    pub fn invitable() -> &'static [Role] {
        &[Role::Viewer, Role::Editor]
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "owner" => Ok(Self::Owner),
            other => Err(format!("unknown role: {other}")),
        }
    }
}
