//! Agent storage.

use chrono::Utc;
use libsql::params;
use tracing::debug;
use uuid::Uuid;

use crate::agents::model::{Agent, AgentInput, AgentStatus, AgentUpdate};
use crate::error::{Error, Result};

use super::db::{Store, parse_datetime, parse_optional_json};

const AGENT_COLUMNS: &str = "id, first_name, last_name, email, phone, license_number, status, \
     commission_split, banking_info, emergency_contact, created_at, updated_at";

fn status_to_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Active => "active",
        AgentStatus::Suspended => "suspended",
        AgentStatus::Terminated => "terminated",
    }
}

fn str_to_status(s: &str) -> AgentStatus {
    match s {
        "suspended" => AgentStatus::Suspended,
        "terminated" => AgentStatus::Terminated,
        _ => AgentStatus::Active,
    }
}

fn row_to_agent(row: &libsql::Row) -> Result<Agent> {
    let id: String = row.get(0)?;
    let phone: Option<String> = row.get(4).ok();
    let license_number: Option<String> = row.get(5).ok();
    let status: String = row.get(6)?;
    let commission_split: Option<String> = row.get(7).ok();
    let banking_info: Option<String> = row.get(8).ok();
    let emergency_contact: Option<String> = row.get(9).ok();
    let created: String = row.get(10)?;
    let updated: String = row.get(11)?;

    Ok(Agent {
        id: super::db::parse_uuid(&id),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone,
        license_number,
        status: str_to_status(&status),
        commission_split: parse_optional_json(&commission_split),
        banking_info: parse_optional_json(&banking_info),
        emergency_contact: parse_optional_json(&emergency_contact),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn json_column(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

impl Store {
    /// Create a new agent.
    pub async fn create_agent(&self, input: &AgentInput) -> Result<Agent> {
        input.validate()?;
        let duplicate = self
            .count(
                "SELECT COUNT(*) FROM agents WHERE email = ?1",
                params![input.email.clone()],
            )
            .await?;
        if duplicate > 0 {
            return Err(Error::Conflict(format!(
                "Agent email already in use: {}",
                input.email
            )));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO agents (id, first_name, last_name, email, phone, license_number, \
                 status, commission_split, banking_info, emergency_contact, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id.to_string(),
                    input.first_name.clone(),
                    input.last_name.clone(),
                    input.email.clone(),
                    input.phone.clone(),
                    input.license_number.clone(),
                    status_to_str(input.status),
                    json_column(&input.commission_split),
                    json_column(&input.banking_info),
                    json_column(&input.emergency_contact),
                    now.clone(),
                    now,
                ],
            )
            .await?;
        debug!(agent_id = %id, "Agent created");
        self.get_agent(id).await
    }

    /// Get an agent by id.
    pub async fn get_agent(&self, id: Uuid) -> Result<Agent> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_agent(&row),
            None => Err(Error::not_found("Agent", id)),
        }
    }

    /// List all agents, most recently created first.
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at DESC"),
                (),
            )
            .await?;
        let mut agents = Vec::new();
        while let Some(row) = rows.next().await? {
            agents.push(row_to_agent(&row)?);
        }
        Ok(agents)
    }

    /// Update an agent; absent fields are left unchanged.
    pub async fn update_agent(&self, id: Uuid, update: &AgentUpdate) -> Result<Agent> {
        update.validate()?;
        let mut agent = self.get_agent(id).await?;

        if let Some(v) = &update.first_name {
            agent.first_name = v.clone();
        }
        if let Some(v) = &update.last_name {
            agent.last_name = v.clone();
        }
        if let Some(v) = &update.email {
            agent.email = v.clone();
        }
        if update.phone.is_some() {
            agent.phone = update.phone.clone();
        }
        if update.license_number.is_some() {
            agent.license_number = update.license_number.clone();
        }
        if let Some(v) = update.status {
            agent.status = v;
        }
        if update.commission_split.is_some() {
            agent.commission_split = update.commission_split.clone();
        }
        if update.banking_info.is_some() {
            agent.banking_info = update.banking_info.clone();
        }
        if update.emergency_contact.is_some() {
            agent.emergency_contact = update.emergency_contact.clone();
        }

        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE agents SET first_name = ?1, last_name = ?2, email = ?3, phone = ?4, \
                 license_number = ?5, status = ?6, commission_split = ?7, banking_info = ?8, \
                 emergency_contact = ?9, updated_at = ?10 WHERE id = ?11",
                params![
                    agent.first_name.clone(),
                    agent.last_name.clone(),
                    agent.email.clone(),
                    agent.phone.clone(),
                    agent.license_number.clone(),
                    status_to_str(agent.status),
                    json_column(&agent.commission_split),
                    json_column(&agent.banking_info),
                    json_column(&agent.emergency_contact),
                    now,
                    id.to_string(),
                ],
            )
            .await?;
        self.get_agent(id).await
    }

    /// Delete an agent. Tasks and onboarding records cascade.
    pub async fn delete_agent(&self, id: Uuid) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM agents WHERE id = ?1", params![id.to_string()])
            .await?;
        if affected == 0 {
            return Err(Error::not_found("Agent", id));
        }
        debug!(agent_id = %id, "Agent deleted");
        Ok(())
    }
}
