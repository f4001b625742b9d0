//! API keys, the audit trail and agent locks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Id, Validate, ValidationResult, check};
use crate::search::{SearchDocument, SearchKind, join_content};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing, default)]
    pub key_hash: String,
    pub active: bool,
    pub last_used_date: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub agent_id: Option<Id>,
}

impl ApiKey {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|expires| expires > now)
    }

    pub fn search_document(&self) -> SearchDocument {
        SearchDocument::new(
            SearchKind::ApiKey,
            self.id,
            &self.name,
            join_content([
                Some(self.name.as_str()),
                self.description.as_deref(),
                Some(self.created_by.as_str()),
            ]),
        )
    }
}

/// Row written by storage; the caller computes the hash
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub name: String,
    pub description: Option<String>,
    pub key_hash: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub agent_id: Option<Id>,
}

/// Admin request for a new key
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueApiKey {
    pub name: String,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Validate for IssueApiKey {
    fn validate(&self) -> ValidationResult {
        check::required("name", &self.name, 100)?;
        check::opt_len("description", self.description.as_ref(), 500)
    }
}

/// The one response that carries the plaintext key
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedApiKey {
    #[serde(flatten)]
    pub key: ApiKey,
    pub api_key: String,
}

// ============================================================================
// Audit trail
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Register,
    IssueKey,
    DeactivateKey,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Register => "REGISTER",
            AuditAction::IssueKey => "ISSUE_KEY",
            AuditAction::DeactivateKey => "DEACTIVATE_KEY",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditTrail {
    pub action: String,
    pub entity_name: String,
    pub entity_id: Id,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub performed_by: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub id: Id,
    #[serde(flatten)]
    pub fields: NewAuditTrail,
}

impl AuditTrail {
    pub fn search_document(&self) -> SearchDocument {
        let f = &self.fields;
        let name = format!("{} {}", f.action, f.entity_name);
        SearchDocument::new(
            SearchKind::AuditTrail,
            self.id,
            &name,
            join_content([
                Some(f.action.as_str()),
                Some(f.entity_name.as_str()),
                Some(f.performed_by.as_str()),
                f.ip_address.as_deref(),
            ]),
        )
    }
}

/// Who performed a write and from where
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn system() -> Self {
        Self::named("system")
    }
}

// ============================================================================
// Agent locks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLock {
    pub id: Id,
    pub agent_id: Id,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
