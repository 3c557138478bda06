//! Role-based access control.
//!
//! `AccessControl` is request-scoped: group and permission memberships are
//! read once per instance and cached. Entities reference each other by id
//! only; resolution is always an explicit query here, never a lazy field.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::db::{Database, Group};
use crate::error::AuthError;

/// True when `granted` covers `wanted`, including the `scope.*` wildcard.
fn wildcard_match(granted: &str, wanted: &str) -> bool {
    match granted.strip_suffix(".*") {
        Some(scope) => wanted.split_once('.').is_some_and(|(s, _)| s == scope),
        None => granted == wanted,
    }
}

/// Panics unless the permission string has the `scope.action` shape.
/// A malformed permission name is caller misuse, not user input.
fn require_dotted(permission: &str) {
    assert!(
        permission.contains('.'),
        "permission '{}' must be of the form scope.action",
        permission
    );
}

pub struct AccessControl {
    db: Database,
    clock: Arc<dyn Clock>,
    user_id: i64,
    groups: Option<Vec<Group>>,
    direct: Option<Vec<String>>,
    group_permissions: Option<HashMap<i64, Vec<String>>>,
}

impl AccessControl {
    pub fn new(db: Database, clock: Arc<dyn Clock>, user_id: i64) -> Self {
        Self {
            db,
            clock,
            user_id,
            groups: None,
            direct: None,
            group_permissions: None,
        }
    }

    /// Load group memberships once. Repeated calls within the instance do
    /// not hit storage again.
    async fn populate_groups(&mut self) -> Result<&[Group], AuthError> {
        if self.groups.is_none() {
            let groups = self
                .db
                .acl()
                .groups_of_user(self.user_id, self.clock.now())
                .await?;
            self.groups = Some(groups);
        }
        Ok(self.groups.as_deref().unwrap_or_default())
    }

    /// Load direct grants and the per-group permission matrix once.
    async fn populate_permissions(&mut self) -> Result<(), AuthError> {
        if self.direct.is_none() {
            let direct = self
                .db
                .acl()
                .permissions_of_user(self.user_id, self.clock.now())
                .await?;
            self.direct = Some(direct);
        }
        if self.group_permissions.is_none() {
            self.populate_groups().await?;
            let mut matrix = HashMap::new();
            let group_ids: Vec<i64> = self
                .groups
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|g| g.id)
                .collect();
            for group_id in group_ids {
                let perms = self
                    .db
                    .acl()
                    .permissions_of_group(group_id, self.clock.now())
                    .await?;
                matrix.insert(group_id, perms);
            }
            self.group_permissions = Some(matrix);
        }
        Ok(())
    }

    /// Whether the user holds the permission. Resolution order: direct
    /// exact grant, then each group's exact grant, then each group's
    /// wildcard. First match wins.
    ///
    /// Panics when `permission` lacks a `.` separator.
    pub async fn can(&mut self, permission: &str) -> Result<bool, AuthError> {
        require_dotted(permission);
        self.populate_permissions().await?;

        if self
            .direct
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|granted| granted == permission)
        {
            return Ok(true);
        }

        let matrix = self.group_permissions.as_ref().expect("populated above");
        for group in self.groups.as_deref().unwrap_or_default() {
            let Some(granted) = matrix.get(&group.id) else {
                continue;
            };
            if granted.iter().any(|g| g == permission) {
                return Ok(true);
            }
        }
        for group in self.groups.as_deref().unwrap_or_default() {
            let Some(granted) = matrix.get(&group.id) else {
                continue;
            };
            if granted.iter().any(|g| wildcard_match(g, permission)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the user holds any of the permissions.
    pub async fn can_any(&mut self, permissions: &[&str]) -> Result<bool, AuthError> {
        for permission in permissions {
            if self.can(permission).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the user belongs to the named group.
    pub async fn in_group(&mut self, name: &str) -> Result<bool, AuthError> {
        Ok(self.populate_groups().await?.iter().any(|g| g.name == name))
    }

    /// Current group names, cached.
    pub async fn groups(&mut self) -> Result<Vec<String>, AuthError> {
        Ok(self
            .populate_groups()
            .await?
            .iter()
            .map(|g| g.name.clone())
            .collect())
    }

    /// Add the user to a group. Unknown names are an error naming the
    /// value; an existing membership is a no-op.
    pub async fn add_group(&mut self, name: &str) -> Result<(), AuthError> {
        let group = self
            .db
            .acl()
            .group_by_name(name)
            .await?
            .ok_or_else(|| AuthError::UnknownGroup(name.to_string()))?;

        self.populate_groups().await?;
        let cached = self.groups.as_mut().expect("populated above");
        if cached.iter().any(|g| g.id == group.id) {
            return Ok(());
        }
        cached.push(group.clone());
        cached.sort_by(|a, b| a.name.cmp(&b.name));
        // cache mutated; matrix entry appears on next populate
        if let Some(matrix) = self.group_permissions.as_mut() {
            let perms = self
                .db
                .acl()
                .permissions_of_group(group.id, self.clock.now())
                .await?;
            matrix.insert(group.id, perms);
        }

        self.db
            .acl()
            .add_user_to_group(self.user_id, group.id, None)
            .await?;
        Ok(())
    }

    /// Remove the user from a group.
    pub async fn remove_group(&mut self, name: &str) -> Result<(), AuthError> {
        let group = self
            .db
            .acl()
            .group_by_name(name)
            .await?
            .ok_or_else(|| AuthError::UnknownGroup(name.to_string()))?;

        self.populate_groups().await?;
        if let Some(cached) = self.groups.as_mut() {
            cached.retain(|g| g.id != group.id);
        }
        if let Some(matrix) = self.group_permissions.as_mut() {
            matrix.remove(&group.id);
        }

        self.db
            .acl()
            .remove_user_from_group(self.user_id, group.id)
            .await?;
        Ok(())
    }

    /// Replace the user's group memberships with exactly `names`,
    /// inserting and deleting only the difference.
    pub async fn sync_groups(&mut self, names: &[&str]) -> Result<(), AuthError> {
        let mut wanted = Vec::with_capacity(names.len());
        for name in names {
            let group = self
                .db
                .acl()
                .group_by_name(name)
                .await?
                .ok_or_else(|| AuthError::UnknownGroup(name.to_string()))?;
            wanted.push(group);
        }

        let current = self.populate_groups().await?.to_vec();
        let to_add: Vec<Group> = wanted
            .iter()
            .filter(|w| !current.iter().any(|c| c.id == w.id))
            .cloned()
            .collect();
        let to_remove: Vec<Group> = current
            .iter()
            .filter(|c| !wanted.iter().any(|w| w.id == c.id))
            .cloned()
            .collect();

        let mut cache = wanted;
        cache.sort_by(|a, b| a.name.cmp(&b.name));
        self.groups = Some(cache);
        self.group_permissions = None;

        for group in to_add {
            self.db
                .acl()
                .add_user_to_group(self.user_id, group.id, None)
                .await?;
        }
        for group in to_remove {
            self.db
                .acl()
                .remove_user_from_group(self.user_id, group.id)
                .await?;
        }
        Ok(())
    }

    /// Grant a permission directly to the user.
    pub async fn add_permission(&mut self, name: &str) -> Result<(), AuthError> {
        require_dotted(name);
        let permission = self
            .db
            .acl()
            .permission_by_name(name)
            .await?
            .ok_or_else(|| AuthError::UnknownPermission(name.to_string()))?;

        self.populate_permissions().await?;
        let cached = self.direct.as_mut().expect("populated above");
        if cached.iter().any(|p| p == name) {
            return Ok(());
        }
        cached.push(name.to_string());
        cached.sort();

        self.db
            .acl()
            .grant_user_permission(self.user_id, permission.id, None)
            .await?;
        Ok(())
    }

    /// Revoke a direct permission grant.
    pub async fn remove_permission(&mut self, name: &str) -> Result<(), AuthError> {
        let permission = self
            .db
            .acl()
            .permission_by_name(name)
            .await?
            .ok_or_else(|| AuthError::UnknownPermission(name.to_string()))?;

        if let Some(cached) = self.direct.as_mut() {
            cached.retain(|p| p != name);
        }
        self.db
            .acl()
            .revoke_user_permission(self.user_id, permission.id)
            .await?;
        Ok(())
    }

    /// Replace the user's direct grants with exactly `names`.
    pub async fn sync_permissions(&mut self, names: &[&str]) -> Result<(), AuthError> {
        let mut wanted = Vec::with_capacity(names.len());
        for name in names {
            require_dotted(name);
            let permission = self
                .db
                .acl()
                .permission_by_name(name)
                .await?
                .ok_or_else(|| AuthError::UnknownPermission(name.to_string()))?;
            wanted.push(permission);
        }

        self.populate_permissions().await?;
        let current = self.direct.clone().unwrap_or_default();
        let to_add: Vec<_> = wanted
            .iter()
            .filter(|w| !current.iter().any(|c| c == &w.name))
            .cloned()
            .collect();
        let to_remove: Vec<&str> = current
            .iter()
            .filter(|c| !wanted.iter().any(|w| &w.name == *c))
            .map(|s| s.as_str())
            .collect();

        let mut cache: Vec<String> = wanted.iter().map(|p| p.name.clone()).collect();
        cache.sort();
        self.direct = Some(cache);

        for permission in to_add {
            self.db
                .acl()
                .grant_user_permission(self.user_id, permission.id, None)
                .await?;
        }
        for name in to_remove {
            let permission = self
                .db
                .acl()
                .permission_by_name(name)
                .await?
                .ok_or_else(|| AuthError::UnknownPermission(name.to_string()))?;
            self.db
                .acl()
                .revoke_user_permission(self.user_id, permission.id)
                .await?;
        }
        Ok(())
    }
}
