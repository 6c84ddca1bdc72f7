//! Flow permission model.
//!
//! Five independent ownership lists are attached to each flow: read, write,
//! execute, delete, and assign-permission. Each predicate is pure membership
//! logic over an already-resolved user identity; a super-user bypasses all
//! five lists.

use crate::error::FlowError;
use millrace_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An already-resolved user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Super-users bypass every permission list.
    pub super_user: bool,
}

impl User {
    /// Creates a regular user.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            super_user: false,
        }
    }

    /// Creates a super-user.
    #[must_use]
    pub fn super_user(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            super_user: true,
        }
    }
}

/// One of the five permission role categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionRole {
    /// May see the flow.
    Read,
    /// May modify the flow.
    Write,
    /// May trigger runs of the flow.
    Execute,
    /// May delete the flow.
    Delete,
    /// May grant and revoke the other roles.
    AssignPermission,
}

impl PermissionRole {
    /// Returns the wire name of this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Delete => "delete",
            Self::AssignPermission => "assign_permission",
        }
    }
}

impl fmt::Display for PermissionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionRole {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "execute" => Ok(Self::Execute),
            "delete" => Ok(Self::Delete),
            "assign_permission" => Ok(Self::AssignPermission),
            other => Err(FlowError::UnknownRole {
                role: other.to_string(),
            }),
        }
    }
}

/// The five ownership lists attached to a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    /// Users who may see the flow.
    pub read: Vec<UserId>,
    /// Users who may modify the flow.
    pub write: Vec<UserId>,
    /// Users who may trigger runs.
    pub execute: Vec<UserId>,
    /// Users who may delete the flow.
    pub delete: Vec<UserId>,
    /// Users who may grant and revoke roles.
    pub assign_permission: Vec<UserId>,
}

impl PermissionSet {
    /// Creates a set granting all five roles to a single user.
    #[must_use]
    pub fn grant_all(user_id: UserId) -> Self {
        Self {
            read: vec![user_id],
            write: vec![user_id],
            execute: vec![user_id],
            delete: vec![user_id],
            assign_permission: vec![user_id],
        }
    }

    fn list(&self, role: PermissionRole) -> &Vec<UserId> {
        match role {
            PermissionRole::Read => &self.read,
            PermissionRole::Write => &self.write,
            PermissionRole::Execute => &self.execute,
            PermissionRole::Delete => &self.delete,
            PermissionRole::AssignPermission => &self.assign_permission,
        }
    }

    fn list_mut(&mut self, role: PermissionRole) -> &mut Vec<UserId> {
        match role {
            PermissionRole::Read => &mut self.read,
            PermissionRole::Write => &mut self.write,
            PermissionRole::Execute => &mut self.execute,
            PermissionRole::Delete => &mut self.delete,
            PermissionRole::AssignPermission => &mut self.assign_permission,
        }
    }

    /// Returns true if the user id appears in the role's list.
    #[must_use]
    pub fn contains(&self, role: PermissionRole, user_id: UserId) -> bool {
        self.list(role).contains(&user_id)
    }

    /// Adds a user to a role's list. Idempotent.
    pub fn add(&mut self, role: PermissionRole, user_id: UserId) {
        let list = self.list_mut(role);
        if !list.contains(&user_id) {
            list.push(user_id);
        }
    }

    /// Removes a user from a role's list. Idempotent.
    pub fn remove(&mut self, role: PermissionRole, user_id: UserId) {
        self.list_mut(role).retain(|id| *id != user_id);
    }

    /// True iff the user may see the flow.
    #[must_use]
    pub fn can_read(&self, user: &User) -> bool {
        user.super_user || self.contains(PermissionRole::Read, user.id)
    }

    /// True iff the user may modify the flow.
    #[must_use]
    pub fn can_write(&self, user: &User) -> bool {
        user.super_user || self.contains(PermissionRole::Write, user.id)
    }

    /// True iff the user may trigger runs of the flow.
    #[must_use]
    pub fn can_execute(&self, user: &User) -> bool {
        user.super_user || self.contains(PermissionRole::Execute, user.id)
    }

    /// True iff the user may delete the flow.
    #[must_use]
    pub fn can_delete(&self, user: &User) -> bool {
        user.super_user || self.contains(PermissionRole::Delete, user.id)
    }

    /// True iff the user may grant and revoke roles.
    #[must_use]
    pub fn can_assign_permission(&self, user: &User) -> bool {
        user.super_user || self.contains(PermissionRole::AssignPermission, user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_all_covers_five_lists() {
        let user_id = UserId::new();
        let set = PermissionSet::grant_all(user_id);
        let user = User::new(user_id, "creator");

        assert!(set.can_read(&user));
        assert!(set.can_write(&user));
        assert!(set.can_execute(&user));
        assert!(set.can_delete(&user));
        assert!(set.can_assign_permission(&user));
    }

    #[test]
    fn add_remove_roundtrip() {
        let user_id = UserId::new();
        let user = User::new(user_id, "reader");
        let mut set = PermissionSet::default();

        assert!(!set.can_read(&user));
        set.add(PermissionRole::Read, user_id);
        assert!(set.can_read(&user));
        // Reading does not imply any other role.
        assert!(!set.can_write(&user));

        set.remove(PermissionRole::Read, user_id);
        assert!(!set.can_read(&user));
    }

    #[test]
    fn add_is_idempotent() {
        let user_id = UserId::new();
        let mut set = PermissionSet::default();
        set.add(PermissionRole::Execute, user_id);
        set.add(PermissionRole::Execute, user_id);
        assert_eq!(set.execute.len(), 1);
    }

    #[test]
    fn super_user_bypasses_all_lists() {
        let set = PermissionSet::default();
        let root = User::super_user(UserId::new(), "root");

        assert!(set.can_read(&root));
        assert!(set.can_write(&root));
        assert!(set.can_execute(&root));
        assert!(set.can_delete(&root));
        assert!(set.can_assign_permission(&root));
    }

    #[test]
    fn role_from_str() {
        assert_eq!(
            "assign_permission".parse::<PermissionRole>().unwrap(),
            PermissionRole::AssignPermission
        );
        let err = "owner".parse::<PermissionRole>().unwrap_err();
        assert!(err.to_string().contains("unknown permission role"));
    }

    #[test]
    fn permission_set_serde_roundtrip() {
        let mut set = PermissionSet::default();
        set.add(PermissionRole::Read, UserId::new());
        set.add(PermissionRole::Write, UserId::new());

        let json = serde_json::to_string(&set).expect("serialize");
        let parsed: PermissionSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, set);
    }
}
