//! Outbound event batching.
//!
//! Buffers appended entries over a configurable window and ships each batch
//! to the configured sink as one unit. Delivery is fire-and-forget: a slow
//! or failing send never stalls capture, and a failed batch is dropped.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::Event;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, batch: Vec<Event>) -> Result<()>;
}

/// POSTs batches as a JSON array to the configured collector endpoint. The
/// token, when present, goes into `Authorization` verbatim. Non-2xx
/// responses are ignored.
pub struct HttpSink {
    client: reqwest::Client,
    post_url: String,
    token: Option<String>,
}

impl HttpSink {
    pub fn new(post_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            post_url,
            token,
        }
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn deliver(&self, batch: Vec<Event>) -> Result<()> {
        let mut request = self.client.post(&self.post_url).json(&batch);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .context("failed to send event batch")?;
        if !response.status().is_success() {
            debug!("collector responded {}", response.status());
        }
        Ok(())
    }
}

/// Subscription-driven buffer between the session store and the sink.
pub struct OutboundBuffer {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl OutboundBuffer {
    /// Spawn the buffering loop. A zero window flushes as entries arrive,
    /// batching whatever is already queued; otherwise batches flush on each
    /// window boundary.
    pub fn spawn(
        rx: mpsc::UnboundedReceiver<Event>,
        sink: Arc<dyn EventSink>,
        window: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            if window.is_zero() {
                run_immediate(rx, sink, token).await;
            } else {
                run_windowed(rx, sink, window, token).await;
            }
        });

        Self { handle, cancel }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for OutboundBuffer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

async fn run_immediate(
    mut rx: mpsc::UnboundedReceiver<Event>,
    sink: Arc<dyn EventSink>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(first) = maybe else { break };
                let mut batch = vec![first];
                while let Ok(next) = rx.try_recv() {
                    batch.push(next);
                }
                dispatch(&sink, batch);
            }
            _ = token.cancelled() => break,
        }
    }
}

async fn run_windowed(
    mut rx: mpsc::UnboundedReceiver<Event>,
    sink: Arc<dyn EventSink>,
    window: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buffer: Vec<Event> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    dispatch(&sink, std::mem::take(&mut buffer));
                }
            }
            maybe = rx.recv() => {
                match maybe {
                    Some(event) => buffer.push(event),
                    None => {
                        if !buffer.is_empty() {
                            dispatch(&sink, std::mem::take(&mut buffer));
                        }
                        break;
                    }
                }
            }
            _ = token.cancelled() => break,
        }
    }
}

fn dispatch(sink: &Arc<dyn EventSink>, batch: Vec<Event>) {
    let sink = sink.clone();
    tokio::spawn(async move {
        let count = batch.len();
        if let Err(err) = sink.deliver(batch).await {
            warn!("dropping undelivered batch of {count} events: {err:#}");
        }
    });
}
