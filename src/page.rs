//! Host-platform seam.
//!
//! The engine never touches a real DOM. The host (browser bridge, webview,
//! or the bundled simulator) implements [`PageContext`] for window-level
//! state and hands elements across as [`PageElement`] trait objects. Native
//! mutation/intersection/resize observers reduce to three notification
//! entry points on the capture layer; where no native observer exists the
//! host may poll.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{ContextSnapshot, Rect, Viewport};

/// Attribute carrying an element's stable tracking identifier.
pub const TRACKING_ID_ATTR: &str = "data-swt-id";

/// Attribute recording which configured selector rule matched the element.
pub const TARGET_SELECTOR_ATTR: &str = "data-swt-target-selector";

/// Current document location.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLocation {
    pub url: String,
    pub pathname: String,
}

/// Window-level state of the tracked browsing context.
pub trait PageContext: Send + Sync {
    fn location(&self) -> PageLocation;

    /// Current window/document geometry, read at event-emission time.
    fn viewport(&self) -> Viewport;

    /// Full environment snapshot for session start/end records, stamped
    /// with the current time.
    fn environment(&self) -> ContextSnapshot;
}

/// Handle to a live element in the host document.
///
/// `element_key` must be stable for the lifetime of the element and unique
/// within the document; it stands in for element identity and keys the
/// tracker's registration map.
pub trait PageElement: Send + Sync {
    fn element_key(&self) -> u64;

    fn tag_name(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;

    fn set_attr(&self, name: &str, value: &str);

    /// Whether the element matches a selector rule.
    fn matches(&self, selector: &str) -> bool;

    /// Snapshot of the element's custom data attributes.
    fn dataset(&self) -> BTreeMap<String, String>;

    /// Current viewport-relative geometry.
    fn bounding_rect(&self) -> Rect;

    /// Every descendant element, document order.
    fn descendants(&self) -> Vec<ElementHandle>;
}

pub type ElementHandle = Arc<dyn PageElement>;

/// One entry from the host's intersection observation, already reduced to
/// "crossed the configured ratio threshold".
#[derive(Clone)]
pub struct IntersectionChange {
    pub element: ElementHandle,
    pub is_intersecting: bool,
}
