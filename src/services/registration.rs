//! Agent self-registration

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use super::audit::{AuditService, snapshot};
use super::credentials::{generate_agent_key, hash_key};
use super::error::ServiceResult;
use crate::model::{
    AGENT_STATUS_REGISTERED, Actor, AuditAction, Entity, Id, NewAgent, NewApiKey, NewDatacenter, NewRegion, Validate,
    ValidationError, datacenter_code,
};
use crate::storage::{SearchIndex, SqliteBackend, TopologyStore};

pub const REGION_TAG: &str = "region";
pub const DATACENTER_TAG: &str = "datacenter";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgent {
    pub name: String,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub os_type: Option<String>,
    pub os_version: Option<String>,
    pub agent_version: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RegisterAgent {
    fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// The region and datacenter names carried in the tags
    pub fn placement(&self) -> Result<(&str, &str), ValidationError> {
        match (self.tag(REGION_TAG), self.tag(DATACENTER_TAG)) {
            (Some(region), Some(datacenter)) => Ok((region, datacenter)),
            _ => Err(ValidationError::new("", "Region and datacenter tags are required")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub agent_id: Id,
    pub api_key: String,
    pub region: String,
    pub datacenter: String,
    pub status: String,
    pub message: String,
}

/// The region and datacenter created on first sight must pass the same
/// checks as the admin API
fn validate_placement(region: &str, datacenter: &str) -> Result<(), ValidationError> {
    NewRegion::named(region)
        .validate()
        .map_err(|e| ValidationError::new(REGION_TAG, e.message))?;

    if datacenter_code(datacenter).is_empty() {
        return Err(ValidationError::new(
            DATACENTER_TAG,
            "must contain at least one ASCII letter or digit",
        ));
    }
    NewDatacenter::named(datacenter, None)
        .validate()
        .map_err(|e| ValidationError::new(DATACENTER_TAG, e.message))
}

#[derive(Clone)]
pub struct RegistrationService {
    storage: Arc<SqliteBackend>,
    audit: AuditService,
}

impl RegistrationService {
    pub fn new(storage: Arc<SqliteBackend>, audit: AuditService) -> Self {
        Self { storage, audit }
    }

    /// Finds or creates the region and datacenter named in the tags, then
    /// creates the agent and its key in one transaction
    #[instrument(skip_all, fields(agent = %request.name))]
    pub async fn register(&self, request: RegisterAgent, actor: &Actor) -> ServiceResult<RegistrationResponse> {
        let (region_name, datacenter_name) = request.placement()?;
        validate_placement(region_name, datacenter_name)?;

        let tags = serde_json::to_value(&request.tags).unwrap_or(Value::Null);
        let agent = NewAgent {
            name: request.name.clone(),
            hostname: request.hostname.clone(),
            ip_address: request.ip_address.clone(),
            os_type: request.os_type.clone(),
            os_version: request.os_version.clone(),
            agent_version: request.agent_version.clone(),
            last_seen_at: None,
            status: Some(AGENT_STATUS_REGISTERED.to_string()),
            tags: Some(tags),
            datacenter_id: None,
            region_id: None,
        };
        agent.validate()?;

        let plaintext = generate_agent_key();
        let now = Utc::now();
        let key = NewApiKey {
            name: format!("agent:{}", request.name),
            description: Some(format!("Registration key for agent {}", request.name)),
            key_hash: hash_key(&plaintext),
            expires_at: None,
            created_by: actor.name.clone(),
            created_date: now,
            agent_id: None,
        };

        let registration = self
            .storage
            .register_agent(region_name, datacenter_name, agent, key)
            .await?;

        let documents = [
            registration.region.search_document(),
            registration.datacenter.search_document(),
            registration.agent.search_document(),
            Some(registration.api_key.search_document()),
        ];
        for document in documents.iter().flatten() {
            self.storage.index_document(document).await?;
        }

        let agent_id = registration.agent.id;
        self.audit
            .record(
                AuditAction::Register,
                "Agent",
                agent_id,
                None,
                snapshot(&registration.agent),
                actor,
            )
            .await?;

        info!(
            "registered agent {} in {}/{}",
            agent_id, registration.region.fields.name, registration.datacenter.fields.name
        );

        Ok(RegistrationResponse {
            agent_id,
            api_key: plaintext,
            region: registration.region.fields.name,
            datacenter: registration.datacenter.fields.name,
            status: AGENT_STATUS_REGISTERED.to_string(),
            message: "Agent registered successfully".to_string(),
        })
    }
}
