//! Search over the inventory.
//!
//! Full text and prefix queries run against the SQLite FTS5 table
//! `search_documents`; fuzzy queries score candidate documents in process
//! with trigram similarity (see [`trigram`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Id;

pub mod query;
pub mod trigram;

pub use query::{MAX_QUERY_LENGTH, SearchQuery};

/// Minimum best-field similarity for a fuzzy hit
pub const FUZZY_THRESHOLD: f64 = 0.3;

/// Maximum number of tokens in a highlight snippet
pub const SNIPPET_TOKENS: u32 = 50;

pub const HIGHLIGHT_START: &str = "<mark>";
pub const HIGHLIGHT_END: &str = "</mark>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Region,
    Datacenter,
    Agent,
    Instance,
    HttpMonitor,
    MonitoredService,
    StatusPage,
    ApiKey,
    AuditTrail,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Region => "region",
            SearchKind::Datacenter => "datacenter",
            SearchKind::Agent => "agent",
            SearchKind::Instance => "instance",
            SearchKind::HttpMonitor => "http_monitor",
            SearchKind::MonitoredService => "monitored_service",
            SearchKind::StatusPage => "status_page",
            SearchKind::ApiKey => "api_key",
            SearchKind::AuditTrail => "audit_trail",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Every term must match; the last one as a prefix
    FullText,
    /// Every term matches as a prefix
    Prefix,
    /// Trigram similarity against each indexed field
    Fuzzy,
}

/// The text indexed for one record
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    pub kind: SearchKind,
    pub entity_id: Id,
    pub name: String,
    /// Indexed fields joined with `\n`
    pub content: String,
}

impl SearchDocument {
    pub fn new(kind: SearchKind, entity_id: Id, name: &str, content: String) -> Self {
        Self {
            kind,
            entity_id,
            name: name.to_string(),
            content,
        }
    }

    /// The name followed by every content line
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.content.lines())
    }
}

/// Joins the present, non-blank fields with newlines
pub fn join_content<'a>(fields: impl IntoIterator<Item = Option<&'a str>>) -> String {
    fields
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A ranked match; larger `rank` is better
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub kind: SearchKind,
    pub id: Id,
    pub name: String,
    pub rank: f64,
    pub highlight: Option<String>,
}
