//! webtrail: session-scoped web behavior capture and replay.
//!
//! The engine normalizes window/document signals into an append-only
//! per-session event log, tracks element lifecycle against a mutating page,
//! optionally streams batches to a remote collector, and refolds any log
//! into a deterministic state timeline for replay and analytics.

pub mod capture;
pub mod config;
pub mod models;
pub mod page;
pub mod query;
pub mod replay;
pub mod store;
pub mod testing;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::time::Duration;

use capture::{CaptureDispatcher, ElementTracker, HttpSink, OutboundBuffer};
pub use config::TrackerConfig;
use page::PageContext;
use query::{CommandMessage, ResponseMessage};
use store::{KeyValueStore, SessionStore};

/// One capture engine instance for one browsing context. The host owns it
/// explicitly and routes signals into [`dispatcher`](Self::dispatcher) and
/// [`elements`](Self::elements); no ambient global is involved.
pub struct Tracker {
    config: TrackerConfig,
    store: SessionStore,
    elements: ElementTracker,
    dispatcher: Arc<CaptureDispatcher>,
    outbound: Option<OutboundBuffer>,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        kv: Arc<dyn KeyValueStore>,
        ctx: Arc<dyn PageContext>,
    ) -> Self {
        let store = SessionStore::new(kv, ctx.clone());
        let elements = ElementTracker::new(store.clone(), ctx.clone(), &config);
        let dispatcher = Arc::new(CaptureDispatcher::new(
            store.clone(),
            ctx,
            elements.clone(),
            &config,
        ));

        Self {
            config,
            store,
            elements,
            dispatcher,
            outbound: None,
        }
    }

    /// Start capturing: spawn the outbound buffer when a sink is
    /// configured, and make sure the context has a current session.
    pub async fn run(&mut self) -> Result<()> {
        if self.outbound.is_none() {
            if let Some(post_url) = self.config.post_url.clone() {
                let sink = Arc::new(HttpSink::new(post_url, self.config.token.clone()));
                let rx = self.store.subscribe();
                self.outbound = Some(OutboundBuffer::spawn(
                    rx,
                    sink,
                    Duration::from_millis(self.config.post_buffer_ms),
                ));
            }
        }

        if self.store.status().await.is_none() {
            self.store.new_session(BTreeMap::new()).await?;
        }

        Ok(())
    }

    /// Stop the outbound loop. Capture into the store keeps working.
    pub fn shutdown(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            outbound.shutdown();
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn elements(&self) -> &ElementTracker {
        &self.elements
    }

    pub fn dispatcher(&self) -> &Arc<CaptureDispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Answer a cross-window query against this tracker's store.
    pub async fn respond(&self, command: &CommandMessage) -> Option<ResponseMessage> {
        query::respond(&self.store, command).await
    }

    // Configuration adjustments. Sink settings take effect on the next
    // `run`; selector changes apply to elements processed from now on.

    pub fn set_post_url(&mut self, url: &str) {
        self.config.post_url = Some(url.to_string());
    }

    pub fn set_token(&mut self, token: &str) {
        self.config.token = Some(token.to_string());
    }

    pub fn set_post_buffer_time(&mut self, ms: u64) {
        self.config.post_buffer_ms = ms;
    }

    pub fn set_script_url(&mut self, url: &str) {
        self.config.script_url = url.to_string();
    }

    pub fn set_open_dashboard_delay(&mut self, ms: u64) {
        self.config.open_dashboard_delay_ms = ms;
    }

    pub fn add_target_selector(&mut self, selector: &str) {
        if !self
            .config
            .target_query_selector
            .iter()
            .any(|s| s == selector)
        {
            self.config.target_query_selector.push(selector.to_string());
        }
        self.elements.add_selector(selector);
    }

    pub fn remove_target_selector(&mut self, selector: &str) {
        self.config.target_query_selector.retain(|s| s != selector);
        self.elements.remove_selector(selector);
    }
}
