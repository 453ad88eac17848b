//! Session data model.
//!
//! One browsing-context interval is a session; the status document indexes
//! every session the context has seen and names the current one. Documents
//! are stored JSON-encoded under the `swt-status` / `swt-session-<id>` keys.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage key for the [`SessionStatus`] document.
pub const STATUS_KEY: &str = "swt-status";

/// Storage key for one session's [`SessionData`] document.
pub fn session_key(session_id: &str) -> String {
    format!("swt-session-{session_id}")
}

/// Snapshot of the page environment, captured when a session starts and again
/// when it is rolled over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub url: String,
    pub pathname: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cookie_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub screen_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub screen_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub screen_avail_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub screen_avail_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub screen_color_depth: Option<u32>,
    pub window_inner_width: f64,
    pub window_inner_height: f64,
    pub window_scroll_x: f64,
    pub window_scroll_y: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_scroll_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_scroll_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub history_length: Option<u32>,
    pub date: DateTime<Utc>,
}

/// Session-start snapshot: the environment plus caller-supplied key/value
/// data attached at `new_session` time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    #[serde(flatten)]
    pub context: ContextSnapshot,
    pub data: BTreeMap<String, serde_json::Value>,
}

/// One entry in the status document's `sessions` sequence. `end` is set
/// exactly once, when the session is superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: String,
    pub start: SessionStart,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<ContextSnapshot>,
}

/// Index of every session created in this browsing context, insertion order
/// = creation order. `id` names the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: String,
    pub sessions: Vec<SessionEntry>,
}

impl SessionStatus {
    /// The entry for the currently active session, if present.
    pub fn current_entry(&self) -> Option<&SessionEntry> {
        self.sessions.iter().find(|s| s.id == self.id)
    }
}

/// Full record for one session: identity plus the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub start: SessionStart,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end: Option<ContextSnapshot>,
    pub log: Vec<super::Event>,
}
