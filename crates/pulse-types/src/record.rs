//! Record, metadata, and history model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata bag attached to a record: keys unique per record, values are
/// arbitrary JSON and must round-trip through serde_json exactly.
pub type MetaMap = HashMap<String, serde_json::Value>;

/// Triage state of a record. Closed set; every record has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    New,
    InProgress,
    Resolved,
    Closed,
    Spam,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::New,
        Status::InProgress,
        Status::Resolved,
        Status::Closed,
        Status::Spam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::InProgress => "in_progress",
            Status::Resolved => "resolved",
            Status::Closed => "closed",
            Status::Spam => "spam",
        }
    }

    /// Human label for vocabulary endpoints and admin surfaces.
    pub fn label(self) -> &'static str {
        match self {
            Status::New => "New",
            Status::InProgress => "In progress",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
            Status::Spam => "Spam",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        Status::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage priority. Defaults to medium at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Priority> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored event or feedback submission.
///
/// Timestamps are RFC 3339 strings; `updated_at >= created_at` and
/// `updated_at` advances on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter_id: Option<String>,
    pub category: String,
    pub rating: Option<u8>,
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable audit-log line describing a change to a record.
/// Append-only; cascade-deleted with the parent record, never individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who made the change; "system" when unattributed.
    pub actor: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<Status>,
    pub created_at: String,
}

impl HistoryEntry {
    /// Entry appended when a record is first stored.
    pub fn created(now: &str) -> Self {
        HistoryEntry {
            actor: "system".to_string(),
            message: "created".to_string(),
            old_status: None,
            new_status: Some(Status::New),
            created_at: now.to_string(),
        }
    }

    /// Entry appended when a status transition is applied.
    pub fn status_changed(old: Status, new: Status, actor: &str, now: &str) -> Self {
        HistoryEntry {
            actor: actor.to_string(),
            message: format!("status changed from {} to {}", old, new),
            old_status: Some(old),
            new_status: Some(new),
            created_at: now.to_string(),
        }
    }
}

/// Normalized record-creation payload, produced by the validator.
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub submitter_id: Option<String>,
    pub category: String,
    pub rating: Option<u8>,
    pub body: Option<String>,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    pub meta: MetaMap,
}

/// Partial update: only supplied fields mutate. A status change additionally
/// appends a history entry in the store.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub category: Option<String>,
    pub body: Option<String>,
    pub status: Option<Status>,
    pub assignee_id: Option<String>,
    pub priority: Option<Priority>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.body.is_none()
            && self.status.is_none()
            && self.assignee_id.is_none()
            && self.priority.is_none()
    }
}

/// Record with its metadata and history embedded, for detail views.
#[derive(Debug, Clone, Serialize)]
pub struct RecordDetail {
    #[serde(flatten)]
    pub record: Record,
    pub meta: MetaMap,
    pub history: Vec<HistoryEntry>,
}
