//! Tracker configuration with tunable capture thresholds.

/// Configuration consumed from the embedding environment. Field-for-field
/// this is the recognized option surface; anything the host does not set
/// falls back to the defaults below.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// URL the tracker script itself was loaded from; handed to the
    /// dashboard shell when it bootstraps a viewer window.
    pub script_url: String,

    /// Credential sent verbatim in the `Authorization` header of outbound
    /// batches.
    pub token: Option<String>,

    /// Outbound sink endpoint. Absent disables outbound buffering entirely.
    pub post_url: Option<String>,

    /// Ordered selector rules deciding which elements are tracked.
    pub target_query_selector: Vec<String>,

    /// Delay before the dashboard shell injects its viewer script;
    /// recognized here, consumed by the external dashboard.
    pub open_dashboard_delay_ms: u64,

    /// Outbound batching window. Zero flushes as events arrive.
    pub post_buffer_ms: u64,

    /// Coalescing window for element resize observations.
    pub element_resize_debounce_ms: u64,

    pub mousemove_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
    pub resize_debounce_ms: u64,

    /// Debounce for user-driven history navigation (back/forward).
    pub change_state_debounce_ms: u64,

    /// Intersection ratio at which visibility flips.
    pub intersection_threshold: f64,

    /// Minimum per-axis pointer travel before a drag gesture starts.
    pub drag_threshold_px: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            script_url: String::new(),
            token: None,
            post_url: None,
            target_query_selector: Vec::new(),
            open_dashboard_delay_ms: 0,
            post_buffer_ms: 0,
            element_resize_debounce_ms: 100,
            mousemove_debounce_ms: 100,
            scroll_debounce_ms: 100,
            resize_debounce_ms: 100,
            change_state_debounce_ms: 100,
            intersection_threshold: 0.1,
            drag_threshold_px: 10.0,
        }
    }
}
