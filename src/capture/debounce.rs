//! Trailing-edge debounce primitive.
//!
//! Every debounced signal stream in the capture layer runs through one
//! `Debouncer`: each new occurrence aborts the pending timer and
//! reschedules, so only the last occurrence inside a quiet window fires.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

type Callback<T> = Arc<dyn Fn(T) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct Debouncer<T> {
    window: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
    callback: Callback<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(window: Duration, callback: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            window,
            pending: Arc::new(Mutex::new(None)),
            callback: Arc::new(move |value| Box::pin(callback(value))),
        }
    }

    /// Record one occurrence. Cancels any pending emission and schedules a
    /// new one for `window` from now, carrying this occurrence's value. A
    /// zero window fires on the next scheduler turn.
    pub fn signal(&self, value: T) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let window = self.window;
        let callback = self.callback.clone();
        *pending = Some(tokio::spawn(async move {
            if !window.is_zero() {
                sleep(window).await;
            }
            callback(value).await;
        }));
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}
