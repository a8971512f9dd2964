//! Agent data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Employment status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Active,
    Suspended,
    Terminated,
}

/// A brokerage agent.
///
/// Commission split, banking, and emergency contact are free-form JSON
/// blobs: their shape is owned by the UI and varies per brokerage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_split: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banking_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub commission_split: Option<serde_json::Value>,
    #[serde(default)]
    pub banking_info: Option<serde_json::Value>,
    #[serde(default)]
    pub emergency_contact: Option<serde_json::Value>,
}

impl AgentInput {
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(Error::Validation("Agent name must not be empty".into()));
        }
        if !self.email.contains('@') {
            return Err(Error::Validation(format!(
                "Invalid email address: {}",
                self.email
            )));
        }
        Ok(())
    }
}

/// Request body for updating an agent. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub commission_split: Option<serde_json::Value>,
    #[serde(default)]
    pub banking_info: Option<serde_json::Value>,
    #[serde(default)]
    pub emergency_contact: Option<serde_json::Value>,
}

impl AgentUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(Error::Validation(format!("Invalid email address: {email}")));
            }
        }
        Ok(())
    }
}
