//! Role and permission data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One entry in the fixed permission catalog (seeded at migration time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub category: String,
}

/// A role grouping a set of permissions. Role names are unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_active: bool,
    /// Populated when `include_permissions` is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
    /// Populated when `include_user_count` is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

fn default_true() -> bool {
    true
}

impl RoleInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Role name must not be empty".into()));
        }
        Ok(())
    }
}

/// A back-office user account holding a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInput {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role_id: Option<Uuid>,
}

impl UserInput {
    pub fn validate(&self) -> Result<()> {
        if !self.email.contains('@') {
            return Err(Error::Validation(format!(
                "Invalid email address: {}",
                self.email
            )));
        }
        if self.display_name.trim().is_empty() {
            return Err(Error::Validation("Display name must not be empty".into()));
        }
        Ok(())
    }
}

/// Request body for updating a role. Absent fields are left unchanged;
/// a present `permission_ids` replaces the role's permission set wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub permission_ids: Option<Vec<Uuid>>,
}

impl RoleUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("Role name must not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_input_rejects_empty_name() {
        let input = RoleInput {
            name: "".into(),
            description: String::new(),
            is_active: true,
            permission_ids: Vec::new(),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn role_update_rejects_blank_rename() {
        let update = RoleUpdate {
            name: Some("   ".into()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn role_update_absent_fields_ok() {
        let update: RoleUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.validate().is_ok());
        assert!(update.permission_ids.is_none());
    }

    #[test]
    fn role_serializes_without_optional_includes() {
        let role = Role {
            id: Uuid::new_v4(),
            name: "Broker".into(),
            description: String::new(),
            is_active: true,
            permissions: None,
            user_count: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&role).unwrap();
        assert!(!json.contains("permissions"));
        assert!(!json.contains("user_count"));
    }
}
