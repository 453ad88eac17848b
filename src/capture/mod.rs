//! Capture layer: debounce primitive, element lifecycle tracking, signal
//! dispatch, and outbound batching.

pub mod debounce;
pub mod dispatcher;
pub mod elements;
pub mod outbound;

pub use debounce::Debouncer;
pub use dispatcher::CaptureDispatcher;
pub use elements::ElementTracker;
pub use outbound::{EventSink, HttpSink, OutboundBuffer};

use crate::models::Event;
use crate::store::SessionStore;

/// Append an entry, absorbing failures: a dropped event is reported and
/// capture moves on.
pub(crate) async fn record(store: &SessionStore, event: Event) {
    if let Err(err) = store.append(event).await {
        log::warn!("event dropped: {err:#}");
    }
}
