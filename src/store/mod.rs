//! Session ownership and log persistence.
//!
//! The store is the only writer of the persisted status/session documents.
//! All mutation funnels through `new_session` and `append`, each a single
//! read-modify-write step under one lock, so rollover can never interleave
//! with an append.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::models::{
    session_key, Event, SessionData, SessionEntry, SessionStart, SessionStatus, STATUS_KEY,
};
use crate::page::PageContext;

mod kv;
mod sqlite;

pub use kv::{KeyValueStore, MemoryKv};
pub use sqlite::SqliteKv;

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    ctx: Arc<dyn PageContext>,
    op_lock: Arc<Mutex<()>>,
    subscribers: Arc<StdMutex<Vec<mpsc::UnboundedSender<Event>>>>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, ctx: Arc<dyn PageContext>) -> Self {
        Self {
            kv,
            ctx,
            op_lock: Arc::new(Mutex::new(())),
            subscribers: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Register for every entry appended after this call. Used by the
    /// outbound buffer; closed receivers are pruned on the next notify.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(tx);
        rx
    }

    /// The status document, or `None` for a fresh browsing context.
    pub async fn status(&self) -> Option<SessionStatus> {
        self.read_status().await
    }

    /// Start a new session, rolling over the current one if present.
    /// Returns the new session id.
    pub async fn new_session(
        &self,
        data: BTreeMap<String, serde_json::Value>,
    ) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        self.new_session_inner(data).await
    }

    /// The current session's full record, creating a session first if this
    /// context has none yet.
    pub async fn current_session(&self) -> Option<SessionData> {
        let _guard = self.op_lock.lock().await;
        self.resolve_current_inner().await
    }

    /// A session's full record by id (current session when `None`). A fresh
    /// context lazily gets a session before the lookup, mirroring the
    /// current-session path.
    pub async fn session(&self, session_id: Option<&str>) -> Option<SessionData> {
        let _guard = self.op_lock.lock().await;

        let status = match self.read_status().await {
            Some(status) => status,
            None => {
                let id = self.new_session_inner(BTreeMap::new()).await.ok()?;
                SessionStatus {
                    id,
                    sessions: Vec::new(),
                }
            }
        };

        let id = session_id.unwrap_or(&status.id);
        self.read_session(id).await
    }

    /// Read-only lookup of one session record, with no lazy session
    /// creation. Backs the cross-window query surface.
    pub async fn session_record(&self, session_id: &str) -> Option<SessionData> {
        self.read_session(session_id).await
    }

    /// Append one entry to the current session's log, persist it, and
    /// notify subscribers. When no session can be resolved the entry is
    /// dropped and the failure reported.
    pub async fn append(&self, event: Event) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        let mut session = match self.resolve_current_inner().await {
            Some(session) => session,
            None => {
                error!(
                    "failed to get or create a session; dropping {} event",
                    event.type_name()
                );
                bail!("no session available for append");
            }
        };

        session.log.push(event.clone());
        self.write_session(&session).await?;
        self.notify(&event);
        Ok(())
    }

    /// Every session record referenced by the status document, skipping
    /// entries whose record cannot be loaded.
    pub async fn all_sessions(&self) -> Vec<SessionData> {
        let Some(status) = self.read_status().await else {
            return Vec::new();
        };

        let mut sessions = Vec::with_capacity(status.sessions.len());
        for entry in &status.sessions {
            match self.read_session(&entry.id).await {
                Some(record) => sessions.push(record),
                None => warn!("session record {} missing, skipping", entry.id),
            }
        }
        sessions
    }

    async fn resolve_current_inner(&self) -> Option<SessionData> {
        let status = match self.read_status().await {
            Some(status) => status,
            None => {
                let id = self.new_session_inner(BTreeMap::new()).await.ok()?;
                return self.read_session(&id).await;
            }
        };
        self.read_session(&status.id).await
    }

    async fn new_session_inner(
        &self,
        data: BTreeMap<String, serde_json::Value>,
    ) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let status = self.read_status().await;
        let mut sessions = status
            .as_ref()
            .map(|s| s.sessions.clone())
            .unwrap_or_default();
        let snapshot = self.ctx.environment();

        // Roll the outgoing session over: stamp the same snapshot onto its
        // record and its un-ended status entry.
        if let Some(status) = &status {
            if status.id != session_id {
                if let Some(mut outgoing) = self.read_session(&status.id).await {
                    outgoing.end = Some(snapshot.clone());
                    self.write_session(&outgoing).await?;
                }
                if let Some(entry) = sessions
                    .iter_mut()
                    .find(|s| s.id == status.id && s.end.is_none())
                {
                    entry.end = Some(snapshot.clone());
                }
            }
        }

        let start = SessionStart {
            context: snapshot,
            data,
        };

        sessions.retain(|s| s.id != session_id);
        sessions.push(SessionEntry {
            id: session_id.clone(),
            start: start.clone(),
            end: None,
        });

        self.write_status(&SessionStatus {
            id: session_id.clone(),
            sessions,
        })
        .await?;

        self.write_session(&SessionData {
            id: session_id.clone(),
            start,
            end: None,
            log: Vec::new(),
        })
        .await?;

        info!("started session {session_id}");
        Ok(session_id)
    }

    fn notify(&self, event: &Event) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn read_status(&self) -> Option<SessionStatus> {
        self.read_doc(STATUS_KEY).await
    }

    async fn read_session(&self, session_id: &str) -> Option<SessionData> {
        self.read_doc(&session_key(session_id)).await
    }

    async fn read_doc<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("storage read for {key} failed: {err:#}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(err) => {
                // A corrupt document is indistinguishable from an absent one
                // downstream; lazy creation takes over.
                warn!("stored document {key} is malformed, treating as absent: {err}");
                None
            }
        }
    }

    async fn write_status(&self, status: &SessionStatus) -> Result<()> {
        let raw = serde_json::to_string(status).context("failed to encode status document")?;
        self.kv
            .set(STATUS_KEY, &raw)
            .await
            .context("failed to persist status document")
    }

    async fn write_session(&self, session: &SessionData) -> Result<()> {
        let raw = serde_json::to_string(session).context("failed to encode session document")?;
        self.kv
            .set(&session_key(&session.id), &raw)
            .await
            .with_context(|| format!("failed to persist session {}", session.id))
    }
}
