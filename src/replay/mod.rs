//! Replay layer: deterministic reconstruction of on-page state from a raw
//! event log, plus grouping/filtering projections for analytics.

pub mod groups;
pub mod timeline;

pub use groups::{filter_flat_session_logs, filter_session_logs, group_by_pathname};
pub use timeline::{
    state_timeline_by_session, state_timelines, LogFilter, StateTimeline, TrackedElementState,
    MOUSE_SENTINEL,
};
