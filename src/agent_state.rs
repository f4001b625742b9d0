//! Identity the agent keeps across restarts
//!
//! The state file is written after registration and after the agent's own
//! instance is created. An agent that finds an `agentId` in it skips
//! registration.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Id;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub agent_id: Option<Id>,
    pub api_key: Option<String>,
    pub instance_id: Option<Id>,
    pub region: Option<String>,
    pub datacenter: Option<String>,
}

impl AgentState {
    /// `<data dir>/inframirror/agent-state.json`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = dirs::data_local_dir().ok_or_else(|| anyhow!("no local data directory on this platform"))?;
        Ok(base.join("inframirror").join("agent-state.json"))
    }

    /// A missing file is an empty state
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("no agent state at {}", path.display());
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("corrupt agent state in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        // temp file, then rename over the old state
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;

        debug!("saved agent state to {}", path.display());
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.agent_id.is_some() && self.api_key.is_some()
    }
}
