//! Window/document signal dispatch.
//!
//! Translates raw, high-frequency host signals into normalized log entries,
//! debouncing per signal before they reach the session store. Debounced
//! entries read location/geometry at fire time, after the quiet period, so
//! they describe the page as it settled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;

use crate::config::TrackerConfig;
use crate::models::{ErrorDetail, ErrorKind, Event, PointerTarget};
use crate::page::PageContext;
use crate::store::SessionStore;

use super::debounce::Debouncer;
use super::elements::ElementTracker;
use super::record;
use tokio::time::Duration;

#[derive(Default)]
struct DragState {
    origin: Option<(f64, f64)>,
    dragging: bool,
}

type MouseMoveSignal = (f64, f64, Option<PointerTarget>);

pub struct CaptureDispatcher {
    store: SessionStore,
    ctx: Arc<dyn PageContext>,
    drag_threshold_px: f64,
    mousemove: Debouncer<MouseMoveSignal>,
    scroll: Debouncer<()>,
    resize: Debouncer<()>,
    change_state: Debouncer<()>,
    drag: StdMutex<DragState>,
    loaded: AtomicBool,
}

impl CaptureDispatcher {
    pub fn new(
        store: SessionStore,
        ctx: Arc<dyn PageContext>,
        tracker: ElementTracker,
        config: &TrackerConfig,
    ) -> Self {
        let mousemove = {
            let store = store.clone();
            let ctx = ctx.clone();
            Debouncer::new(
                Duration::from_millis(config.mousemove_debounce_ms),
                move |(mouse_x, mouse_y, target): MouseMoveSignal| {
                    let store = store.clone();
                    let ctx = ctx.clone();
                    async move {
                        let event = Event::DocumentMousemove {
                            mouse_x,
                            mouse_y,
                            target,
                            viewport: ctx.viewport(),
                            date: Utc::now(),
                        };
                        record(&store, event).await;
                    }
                },
            )
        };

        let scroll = {
            let store = store.clone();
            let ctx = ctx.clone();
            let tracker = tracker.clone();
            Debouncer::new(
                Duration::from_millis(config.scroll_debounce_ms),
                move |_: ()| {
                    let store = store.clone();
                    let ctx = ctx.clone();
                    let tracker = tracker.clone();
                    async move {
                        let event = Event::WindowScroll {
                            viewport: ctx.viewport(),
                            date: Utc::now(),
                        };
                        record(&store, event).await;
                        tracker.check_positions().await;
                    }
                },
            )
        };

        let resize = {
            let store = store.clone();
            let ctx = ctx.clone();
            let tracker = tracker.clone();
            Debouncer::new(
                Duration::from_millis(config.resize_debounce_ms),
                move |_: ()| {
                    let store = store.clone();
                    let ctx = ctx.clone();
                    let tracker = tracker.clone();
                    async move {
                        let event = Event::WindowResize {
                            viewport: ctx.viewport(),
                            date: Utc::now(),
                        };
                        record(&store, event).await;
                        tracker.check_positions().await;
                    }
                },
            )
        };

        let change_state = {
            let store = store.clone();
            let ctx = ctx.clone();
            Debouncer::new(
                Duration::from_millis(config.change_state_debounce_ms),
                move |_: ()| {
                    let store = store.clone();
                    let ctx = ctx.clone();
                    async move {
                        record(&store, change_state_event(ctx.as_ref())).await;
                    }
                },
            )
        };

        Self {
            store,
            ctx,
            drag_threshold_px: config.drag_threshold_px,
            mousemove,
            scroll,
            resize,
            change_state,
            drag: StdMutex::new(DragState::default()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Document became interactive. Emitted once; element tracking starts
    /// after this.
    pub async fn on_document_loaded(&self) {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return;
        }

        let location = self.ctx.location();
        let event = Event::DocumentLoaded {
            url: location.url,
            pathname: location.pathname,
            viewport: self.ctx.viewport(),
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }

    /// Document-level click, recorded immediately.
    pub async fn on_click(&self, mouse_x: f64, mouse_y: f64, target: Option<PointerTarget>) {
        let event = Event::DocumentClick {
            mouse_x,
            mouse_y,
            target,
            viewport: self.ctx.viewport(),
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }

    pub fn on_mouse_move(&self, mouse_x: f64, mouse_y: f64, target: Option<PointerTarget>) {
        self.mousemove.signal((mouse_x, mouse_y, target));
    }

    pub fn on_scroll(&self) {
        self.scroll.signal(());
    }

    pub fn on_resize(&self) {
        self.resize.signal(());
    }

    /// User-driven history navigation (back/forward), debounced.
    pub fn on_history_state(&self) {
        self.change_state.signal(());
    }

    /// Programmatic navigation interception (push/replace), recorded
    /// immediately with the same event type as history navigation.
    pub async fn on_navigation_intercepted(&self) {
        record(&self.store, change_state_event(self.ctx.as_ref())).await;
    }

    pub fn on_pointer_down(&self, x: f64, y: f64) {
        let mut drag = self.drag.lock().unwrap_or_else(|p| p.into_inner());
        drag.origin = Some((x, y));
    }

    /// Pointer travel; starts a drag gesture once either axis exceeds the
    /// threshold, exactly once per gesture.
    pub async fn on_pointer_move(&self, x: f64, y: f64) {
        let start = {
            let mut drag = self.drag.lock().unwrap_or_else(|p| p.into_inner());
            let Some((origin_x, origin_y)) = drag.origin else {
                return;
            };
            if drag.dragging {
                None
            } else {
                let dx = (x - origin_x).abs();
                let dy = (y - origin_y).abs();
                if dx > self.drag_threshold_px || dy > self.drag_threshold_px {
                    drag.dragging = true;
                    Some((origin_x, origin_y))
                } else {
                    None
                }
            }
        };

        if let Some((start_x, start_y)) = start {
            let event = Event::DocumentDragStart {
                start_x,
                start_y,
                viewport: self.ctx.viewport(),
                date: Utc::now(),
            };
            record(&self.store, event).await;
        }
    }

    /// Pointer release; ends the gesture and resets the origin. Emits
    /// drag-end only if drag-start fired.
    pub async fn on_pointer_up(&self, x: f64, y: f64) {
        let was_dragging = {
            let mut drag = self.drag.lock().unwrap_or_else(|p| p.into_inner());
            let was_dragging = drag.dragging;
            drag.dragging = false;
            drag.origin = None;
            was_dragging
        };

        if was_dragging {
            let event = Event::DocumentDragEnd {
                end_x: x,
                end_y: y,
                viewport: self.ctx.viewport(),
                date: Utc::now(),
            };
            record(&self.store, event).await;
        }
    }

    /// Runtime error surfaced by the host.
    pub async fn on_error(&self, detail: ErrorDetail) {
        let event = Event::SwtError {
            error_type: ErrorKind::Error,
            data: detail,
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }

    /// Unhandled promise/future rejection surfaced by the host.
    pub async fn on_unhandled_rejection(&self, reason: impl Into<String>) {
        let event = Event::SwtError {
            error_type: ErrorKind::UnhandledRejection,
            data: ErrorDetail {
                reason: Some(reason.into()),
                ..ErrorDetail::default()
            },
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }
}

fn change_state_event(ctx: &dyn PageContext) -> Event {
    let location = ctx.location();
    Event::WindowChangeState {
        url: location.url,
        pathname: location.pathname,
        viewport: ctx.viewport(),
        date: Utc::now(),
    }
}
