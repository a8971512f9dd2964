//! Role, permission, and user storage.
//!
//! Permission-set replacement is wholesale (delete-all then insert) inside
//! one transaction, matching the API contract.

use chrono::Utc;
use libsql::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::roles::model::{Permission, Role, RoleInput, RoleUpdate, User, UserInput};

use super::db::{Store, count_on, parse_datetime, parse_optional_uuid, parse_uuid};

fn row_to_role(row: &libsql::Row) -> Result<Role> {
    let id: String = row.get(0)?;
    let is_active: i64 = row.get(3)?;
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    Ok(Role {
        id: parse_uuid(&id),
        name: row.get(1)?,
        description: row.get(2)?,
        is_active: is_active != 0,
        permissions: None,
        user_count: None,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_permission(row: &libsql::Row) -> Result<Permission> {
    let id: String = row.get(0)?;
    Ok(Permission {
        id: parse_uuid(&id),
        name: row.get(1)?,
        category: row.get(2)?,
    })
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    let id: String = row.get(0)?;
    let role_id: Option<String> = row.get(3).ok();
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    Ok(User {
        id: parse_uuid(&id),
        email: row.get(1)?,
        display_name: row.get(2)?,
        role_id: parse_optional_uuid(&role_id),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Insert permission links for a role, validating each id resolves.
async fn insert_permission_links(
    conn: &Connection,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> Result<()> {
    for pid in permission_ids {
        let affected = conn
            .execute(
                "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) \
                 SELECT ?1, id FROM permissions WHERE id = ?2",
                params![role_id.to_string(), pid.to_string()],
            )
            .await?;
        if affected == 0 {
            // Distinguish unknown permission from a duplicate in the input
            let exists = count_on(
                conn,
                "SELECT COUNT(*) FROM permissions WHERE id = ?1",
                params![pid.to_string()],
            )
            .await?;
            if exists == 0 {
                return Err(Error::Validation(format!("Unknown permission id: {pid}")));
            }
        }
    }
    Ok(())
}

impl Store {
    /// Create a role with an initial permission set.
    pub async fn create_role(&self, input: &RoleInput) -> Result<Role> {
        input.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        self.with_write_slot(async {
            let duplicate = self
                .count(
                    "SELECT COUNT(*) FROM roles WHERE name = ?1",
                    params![input.name.clone()],
                )
                .await?;
            if duplicate > 0 {
                return Err(Error::Conflict(format!(
                    "Role name already in use: {}",
                    input.name
                )));
            }

            let tx = self.conn().transaction().await?;
            tx.execute(
                "INSERT INTO roles (id, name, description, is_active, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    input.name.clone(),
                    input.description.clone(),
                    input.is_active as i64,
                    now.clone(),
                    now.clone(),
                ],
            )
            .await?;
            insert_permission_links(&tx, id, &input.permission_ids).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(role_id = %id, name = %input.name, "Role created");
        self.get_role(id, true, true).await
    }

    /// Get a role, optionally including its permissions and user count.
    pub async fn get_role(
        &self,
        id: Uuid,
        include_permissions: bool,
        include_user_count: bool,
    ) -> Result<Role> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, description, is_active, created_at, updated_at \
                 FROM roles WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        let mut role = match rows.next().await? {
            Some(row) => row_to_role(&row)?,
            None => return Err(Error::not_found("Role", id)),
        };

        if include_permissions {
            role.permissions = Some(self.role_permissions(id).await?);
        }
        if include_user_count {
            role.user_count = Some(
                self.count(
                    "SELECT COUNT(*) FROM users WHERE role_id = ?1",
                    params![id.to_string()],
                )
                .await?,
            );
        }
        Ok(role)
    }

    /// List all roles (permissions included, user counts included).
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, description, is_active, created_at, updated_at \
                 FROM roles ORDER BY name",
                (),
            )
            .await?;
        let mut ids = Vec::new();
        let mut roles = Vec::new();
        while let Some(row) = rows.next().await? {
            let role = row_to_role(&row)?;
            ids.push(role.id);
            roles.push(role);
        }
        for (role, id) in roles.iter_mut().zip(ids) {
            role.permissions = Some(self.role_permissions(id).await?);
            role.user_count = Some(
                self.count(
                    "SELECT COUNT(*) FROM users WHERE role_id = ?1",
                    params![id.to_string()],
                )
                .await?,
            );
        }
        Ok(roles)
    }

    async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT p.id, p.name, p.category FROM permissions p \
                 JOIN role_permissions rp ON rp.permission_id = p.id \
                 WHERE rp.role_id = ?1 ORDER BY p.name",
                params![role_id.to_string()],
            )
            .await?;
        let mut permissions = Vec::new();
        while let Some(row) = rows.next().await? {
            permissions.push(row_to_permission(&row)?);
        }
        Ok(permissions)
    }

    /// Update a role. A present `permission_ids` replaces the permission
    /// set wholesale within the same transaction.
    pub async fn update_role(&self, id: Uuid, update: &RoleUpdate) -> Result<Role> {
        update.validate()?;
        let current = self.get_role(id, false, false).await?;

        self.with_write_slot(async {
            if let Some(name) = &update.name {
                let duplicate = self
                    .count(
                        "SELECT COUNT(*) FROM roles WHERE name = ?1 AND id != ?2",
                        params![name.clone(), id.to_string()],
                    )
                    .await?;
                if duplicate > 0 {
                    return Err(Error::Conflict(format!("Role name already in use: {name}")));
                }
            }

            let name = update.name.clone().unwrap_or(current.name);
            let description = update.description.clone().unwrap_or(current.description);
            let is_active = update.is_active.unwrap_or(current.is_active);
            let now = Utc::now().to_rfc3339();

            let tx = self.conn().transaction().await?;
            tx.execute(
                "UPDATE roles SET name = ?1, description = ?2, is_active = ?3, updated_at = ?4 \
                 WHERE id = ?5",
                params![name, description, is_active as i64, now, id.to_string()],
            )
            .await?;

            if let Some(permission_ids) = &update.permission_ids {
                tx.execute(
                    "DELETE FROM role_permissions WHERE role_id = ?1",
                    params![id.to_string()],
                )
                .await?;
                insert_permission_links(&tx, id, permission_ids).await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.get_role(id, true, true).await
    }

    /// Delete a role. Fails while any user still references it.
    pub async fn delete_role(&self, id: Uuid) -> Result<()> {
        // Existence check first so a missing role reads as 404, not 400
        self.get_role(id, false, false).await?;

        let users = self
            .count(
                "SELECT COUNT(*) FROM users WHERE role_id = ?1",
                params![id.to_string()],
            )
            .await?;
        if users > 0 {
            return Err(Error::InUse(format!(
                "Role is assigned to {users} user(s) and cannot be deleted"
            )));
        }

        self.with_write_slot(async {
            let tx = self.conn().transaction().await?;
            tx.execute(
                "DELETE FROM role_permissions WHERE role_id = ?1",
                params![id.to_string()],
            )
            .await?;
            tx.execute("DELETE FROM roles WHERE id = ?1", params![id.to_string()])
                .await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(role_id = %id, "Role deleted");
        Ok(())
    }

    /// List the fixed permission catalog.
    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, category FROM permissions ORDER BY category, name",
                (),
            )
            .await?;
        let mut permissions = Vec::new();
        while let Some(row) = rows.next().await? {
            permissions.push(row_to_permission(&row)?);
        }
        Ok(permissions)
    }

    // ── Users ───────────────────────────────────────────────────────

    /// Create a user, optionally assigned to a role.
    pub async fn create_user(&self, input: &UserInput) -> Result<User> {
        input.validate()?;
        if let Some(role_id) = input.role_id {
            self.get_role(role_id, false, false).await?;
        }
        let duplicate = self
            .count(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                params![input.email.clone()],
            )
            .await?;
        if duplicate > 0 {
            return Err(Error::Conflict(format!(
                "User email already in use: {}",
                input.email
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (id, email, display_name, role_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    input.email.clone(),
                    input.display_name.clone(),
                    input.role_id.map(|r| r.to_string()),
                    now.clone(),
                    now,
                ],
            )
            .await?;
        self.get_user(id).await
    }

    /// Get a user by id.
    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, email, display_name, role_id, created_at, updated_at \
                 FROM users WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_user(&row),
            None => Err(Error::not_found("User", id)),
        }
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, email, display_name, role_id, created_at, updated_at \
                 FROM users ORDER BY display_name",
                (),
            )
            .await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    /// Assign (or clear) a user's role.
    pub async fn set_user_role(&self, id: Uuid, role_id: Option<Uuid>) -> Result<User> {
        if let Some(role_id) = role_id {
            self.get_role(role_id, false, false).await?;
        }
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE users SET role_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![role_id.map(|r| r.to_string()), now, id.to_string()],
            )
            .await?;
        if affected == 0 {
            return Err(Error::not_found("User", id));
        }
        self.get_user(id).await
    }

    /// Delete a user.
    pub async fn delete_user(&self, id: Uuid) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])
            .await?;
        if affected == 0 {
            return Err(Error::not_found("User", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_permissions() -> (Store, Vec<Permission>) {
        let store = Store::new_memory().await.unwrap();
        let permissions = store.list_permissions().await.unwrap();
        assert!(!permissions.is_empty());
        (store, permissions)
    }

    fn role_input(name: &str, permission_ids: Vec<Uuid>) -> RoleInput {
        RoleInput {
            name: name.into(),
            description: String::new(),
            is_active: true,
            permission_ids,
        }
    }

    #[tokio::test]
    async fn create_role_with_permissions() {
        let (store, perms) = store_with_permissions().await;
        let ids: Vec<Uuid> = perms.iter().take(3).map(|p| p.id).collect();
        let role = store.create_role(&role_input("Broker", ids.clone())).await.unwrap();

        let got: Vec<Uuid> = role
            .permissions
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        let mut expected = ids.clone();
        expected.sort();
        let mut got_sorted = got.clone();
        got_sorted.sort();
        assert_eq!(got_sorted, expected);
        assert_eq!(role.user_count, Some(0));
    }

    #[tokio::test]
    async fn duplicate_role_name_conflicts() {
        let (store, _) = store_with_permissions().await;
        store.create_role(&role_input("Broker", vec![])).await.unwrap();
        let err = store
            .create_role(&role_input("Broker", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_permission_rejected_and_role_not_created() {
        let (store, _) = store_with_permissions().await;
        let err = store
            .create_role(&role_input("Broker", vec![Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // The whole create rolled back
        let count = store
            .count("SELECT COUNT(*) FROM roles", ())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn permission_replace_round_trips() {
        let (store, perms) = store_with_permissions().await;
        let first: Vec<Uuid> = perms.iter().take(2).map(|p| p.id).collect();
        let role = store.create_role(&role_input("Admin", first)).await.unwrap();

        let replacement: Vec<Uuid> = perms.iter().skip(2).take(4).map(|p| p.id).collect();
        let updated = store
            .update_role(
                role.id,
                &RoleUpdate {
                    permission_ids: Some(replacement.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut got: Vec<Uuid> = updated
            .permissions
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        got.sort();
        let mut expected = replacement;
        expected.sort();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn update_without_permission_ids_keeps_set() {
        let (store, perms) = store_with_permissions().await;
        let ids: Vec<Uuid> = perms.iter().take(2).map(|p| p.id).collect();
        let role = store.create_role(&role_input("Admin", ids.clone())).await.unwrap();

        let updated = store
            .update_role(
                role.id,
                &RoleUpdate {
                    description: Some("Full access".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "Full access");
        assert_eq!(updated.permissions.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_role_with_users_fails_and_leaves_role_intact() {
        let (store, perms) = store_with_permissions().await;
        let ids: Vec<Uuid> = perms.iter().take(2).map(|p| p.id).collect();
        let role = store.create_role(&role_input("Agent", ids)).await.unwrap();

        store
            .create_user(&UserInput {
                email: "pat@example.com".into(),
                display_name: "Pat".into(),
                role_id: Some(role.id),
            })
            .await
            .unwrap();

        let err = store.delete_role(role.id).await.unwrap_err();
        assert!(matches!(err, Error::InUse(_)));

        // Role and its permissions unchanged
        let still_there = store.get_role(role.id, true, true).await.unwrap();
        assert_eq!(still_there.permissions.unwrap().len(), 2);
        assert_eq!(still_there.user_count, Some(1));
    }

    #[tokio::test]
    async fn delete_role_without_users_succeeds() {
        let (store, _) = store_with_permissions().await;
        let role = store.create_role(&role_input("Temp", vec![])).await.unwrap();
        store.delete_role(role.id).await.unwrap();
        assert!(store.get_role(role.id, false, false).await.is_err());
    }

    #[tokio::test]
    async fn delete_missing_role_is_not_found() {
        let (store, _) = store_with_permissions().await;
        let err = store.delete_role(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn user_role_reassignment() {
        let (store, _) = store_with_permissions().await;
        let role = store.create_role(&role_input("Agent", vec![])).await.unwrap();
        let user = store
            .create_user(&UserInput {
                email: "pat@example.com".into(),
                display_name: "Pat".into(),
                role_id: None,
            })
            .await
            .unwrap();
        assert!(user.role_id.is_none());

        let user = store.set_user_role(user.id, Some(role.id)).await.unwrap();
        assert_eq!(user.role_id, Some(role.id));

        let user = store.set_user_role(user.id, None).await.unwrap();
        assert!(user.role_id.is_none());
    }
}
