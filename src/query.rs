//! Cross-window query documents.
//!
//! The dashboard window interrogates the tracked window over an opaque
//! message channel; this module only produces the response document for a
//! given command document. Transport and window plumbing live with the
//! host.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::{SessionData, SessionStatus};
use crate::store::SessionStore;

pub const MESSAGE_TYPE_COMMAND: &str = "swt-command";
pub const MESSAGE_TYPE_RESPONSE: &str = "swt-response";

pub const COMMAND_GET_STATUS: &str = "get-swt-status";
pub const COMMAND_GET_SESSIONS: &str = "get-swt-sessions";
pub const COMMAND_GET_SESSION: &str = "get-swt-session";

/// Incoming command document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
}

impl CommandMessage {
    pub fn get_status() -> Self {
        Self {
            message_type: MESSAGE_TYPE_COMMAND.to_string(),
            command: COMMAND_GET_STATUS.to_string(),
            session_id: None,
        }
    }

    pub fn get_sessions() -> Self {
        Self {
            message_type: MESSAGE_TYPE_COMMAND.to_string(),
            command: COMMAND_GET_SESSIONS.to_string(),
            session_id: None,
        }
    }

    pub fn get_session(session_id: &str) -> Self {
        Self {
            message_type: MESSAGE_TYPE_COMMAND.to_string(),
            command: COMMAND_GET_SESSION.to_string(),
            session_id: Some(session_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Status(Option<SessionStatus>),
    Sessions(Vec<SessionData>),
    Session(Option<SessionData>),
}

/// Outgoing response document, mirroring the command it answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub command: String,
    pub data: ResponseData,
}

/// Answer one command by reading the store. Unknown commands produce no
/// response; the diagnostic is the only trace.
pub async fn respond(store: &SessionStore, command: &CommandMessage) -> Option<ResponseMessage> {
    if command.message_type != MESSAGE_TYPE_COMMAND {
        return None;
    }

    let data = match command.command.as_str() {
        COMMAND_GET_STATUS => ResponseData::Status(store.status().await),
        COMMAND_GET_SESSIONS => ResponseData::Sessions(store.all_sessions().await),
        COMMAND_GET_SESSION => {
            let record = match &command.session_id {
                Some(session_id) => store.session_record(session_id).await,
                None => None,
            };
            ResponseData::Session(record)
        }
        other => {
            warn!("unknown command: {other}");
            return None;
        }
    };

    Some(ResponseMessage {
        message_type: MESSAGE_TYPE_RESPONSE,
        command: command.command.clone(),
        data,
    })
}
