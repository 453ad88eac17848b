//! Event data model.
//!
//! Every observation the capture layer records is one `Event` variant. The
//! `type` discriminator and field names are the wire format shared with the
//! dashboard and the remote collector, so they are stable strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Viewport-relative element geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn same_size(&self, other: &Rect) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn same_position(&self, other: &Rect) -> bool {
        self.x == other.x && self.y == other.y
    }
}

/// Window/document geometry stamped onto every captured event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub window_inner_width: f64,
    pub window_inner_height: f64,
    pub window_scroll_x: f64,
    pub window_scroll_y: f64,
    pub document_scroll_width: f64,
    pub document_scroll_height: f64,
}

/// Snapshot of the element under a document-level pointer event. `id` is the
/// element's DOM id, not a tracking identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerTarget {
    pub tag_name: String,
    pub id: String,
    pub dataset: BTreeMap<String, String>,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Error,
    #[serde(rename = "unhandledrejection")]
    UnhandledRejection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub colno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

/// One normalized observation of user or environment activity.
///
/// Element-scoped variants carry the element's tracking identifier in `id`;
/// `swt-element-layout-change` covers both size changes (resize-observer
/// path) and position-only changes (scroll/resize re-check path) under the
/// single type, which downstream consumers rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Event {
    DocumentLoaded {
        url: String,
        pathname: String,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    WindowChangeState {
        url: String,
        pathname: String,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    DocumentClick {
        mouse_x: f64,
        mouse_y: f64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target: Option<PointerTarget>,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    DocumentMousemove {
        mouse_x: f64,
        mouse_y: f64,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target: Option<PointerTarget>,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    WindowScroll {
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    WindowResize {
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    DocumentDragStart {
        start_x: f64,
        start_y: f64,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    DocumentDragEnd {
        end_x: f64,
        end_y: f64,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtElementClick {
        tag_name: String,
        id: String,
        mouse_x: f64,
        mouse_y: f64,
        dataset: BTreeMap<String, String>,
        rect: Rect,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtElementVisible {
        tag_name: String,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_selector: Option<String>,
        dataset: BTreeMap<String, String>,
        rect: Rect,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtElementInvisible {
        tag_name: String,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_selector: Option<String>,
        dataset: BTreeMap<String, String>,
        rect: Rect,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtElementBind {
        tag_name: String,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_selector: Option<String>,
        dataset: BTreeMap<String, String>,
        rect: Rect,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtElementUnbind {
        tag_name: String,
        id: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        target_selector: Option<String>,
        dataset: BTreeMap<String, String>,
        rect: Rect,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtElementLayoutChange {
        tag_name: String,
        id: String,
        dataset: BTreeMap<String, String>,
        rect: Rect,
        #[serde(flatten)]
        viewport: Viewport,
        date: DateTime<Utc>,
    },
    SwtError {
        error_type: ErrorKind,
        data: ErrorDetail,
        date: DateTime<Utc>,
    },
}

impl Event {
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Event::DocumentLoaded { date, .. }
            | Event::WindowChangeState { date, .. }
            | Event::DocumentClick { date, .. }
            | Event::DocumentMousemove { date, .. }
            | Event::WindowScroll { date, .. }
            | Event::WindowResize { date, .. }
            | Event::DocumentDragStart { date, .. }
            | Event::DocumentDragEnd { date, .. }
            | Event::SwtElementClick { date, .. }
            | Event::SwtElementVisible { date, .. }
            | Event::SwtElementInvisible { date, .. }
            | Event::SwtElementBind { date, .. }
            | Event::SwtElementUnbind { date, .. }
            | Event::SwtElementLayoutChange { date, .. }
            | Event::SwtError { date, .. } => *date,
        }
    }

    /// Window/document geometry carried by the event, absent only for
    /// `swt-error`.
    pub fn viewport(&self) -> Option<&Viewport> {
        match self {
            Event::DocumentLoaded { viewport, .. }
            | Event::WindowChangeState { viewport, .. }
            | Event::DocumentClick { viewport, .. }
            | Event::DocumentMousemove { viewport, .. }
            | Event::WindowScroll { viewport, .. }
            | Event::WindowResize { viewport, .. }
            | Event::DocumentDragStart { viewport, .. }
            | Event::DocumentDragEnd { viewport, .. }
            | Event::SwtElementClick { viewport, .. }
            | Event::SwtElementVisible { viewport, .. }
            | Event::SwtElementInvisible { viewport, .. }
            | Event::SwtElementBind { viewport, .. }
            | Event::SwtElementUnbind { viewport, .. }
            | Event::SwtElementLayoutChange { viewport, .. } => Some(viewport),
            Event::SwtError { .. } => None,
        }
    }

    /// True for the events that change the current URL (`document-loaded`
    /// and `window-change-state`).
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Event::DocumentLoaded { .. } | Event::WindowChangeState { .. }
        )
    }

    /// Pathname carried by navigation events, absent otherwise.
    pub fn pathname(&self) -> Option<&str> {
        match self {
            Event::DocumentLoaded { pathname, .. }
            | Event::WindowChangeState { pathname, .. } => Some(pathname),
            _ => None,
        }
    }

    /// Full URL carried by navigation events, absent otherwise.
    pub fn url(&self) -> Option<&str> {
        match self {
            Event::DocumentLoaded { url, .. } | Event::WindowChangeState { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Event::DocumentLoaded { .. } => "document-loaded",
            Event::WindowChangeState { .. } => "window-change-state",
            Event::DocumentClick { .. } => "document-click",
            Event::DocumentMousemove { .. } => "document-mousemove",
            Event::WindowScroll { .. } => "window-scroll",
            Event::WindowResize { .. } => "window-resize",
            Event::DocumentDragStart { .. } => "document-drag-start",
            Event::DocumentDragEnd { .. } => "document-drag-end",
            Event::SwtElementClick { .. } => "swt-element-click",
            Event::SwtElementVisible { .. } => "swt-element-visible",
            Event::SwtElementInvisible { .. } => "swt-element-invisible",
            Event::SwtElementBind { .. } => "swt-element-bind",
            Event::SwtElementUnbind { .. } => "swt-element-unbind",
            Event::SwtElementLayoutChange { .. } => "swt-element-layout-change",
            Event::SwtError { .. } => "swt-error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn viewport() -> Viewport {
        Viewport {
            window_inner_width: 1280.0,
            window_inner_height: 720.0,
            window_scroll_x: 0.0,
            window_scroll_y: 40.0,
            document_scroll_width: 1280.0,
            document_scroll_height: 2400.0,
        }
    }

    #[test]
    fn click_event_uses_wire_discriminator_and_flattened_geometry() {
        let event = Event::DocumentClick {
            mouse_x: 10.0,
            mouse_y: 20.0,
            target: None,
            viewport: viewport(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "document-click");
        assert_eq!(json["windowInnerWidth"], 1280.0);
        assert_eq!(json["windowScrollY"], 40.0);
        assert_eq!(json["mouseX"], 10.0);
        assert!(json.get("target").is_none());

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn error_event_has_no_viewport() {
        let event = Event::SwtError {
            error_type: ErrorKind::UnhandledRejection,
            data: ErrorDetail {
                reason: Some("boom".into()),
                ..ErrorDetail::default()
            },
            date: Utc::now(),
        };

        assert!(event.viewport().is_none());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "swt-error");
        assert_eq!(json["errorType"], "unhandledrejection");
        assert_eq!(json["data"]["reason"], "boom");
    }

    #[test]
    fn element_bind_round_trips_with_tracking_id() {
        let mut dataset = BTreeMap::new();
        dataset.insert("swtId".to_string(), "e1".to_string());

        let event = Event::SwtElementBind {
            tag_name: "DIV".into(),
            id: "e1".into(),
            target_selector: Some(".cta".into()),
            dataset,
            rect: Rect::new(4.0, 8.0, 120.0, 40.0),
            viewport: viewport(),
            date: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.type_name(), "swt-element-bind");
        assert!(!back.is_navigation());
    }
}
