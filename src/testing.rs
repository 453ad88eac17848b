//! In-process page fakes.
//!
//! Backs the unit/integration tests and the `simulate` binary with a
//! scriptable [`PageContext`]/[`PageElement`] pair, so the whole capture
//! path can run without a host platform.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::models::{ContextSnapshot, Rect, Viewport};
use crate::page::{ElementHandle, PageContext, PageElement, PageLocation};

struct PageState {
    url: String,
    pathname: String,
    viewport: Viewport,
}

/// Scriptable window context: tests mutate location/geometry between
/// signals the way a live page would.
pub struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(url: &str, pathname: &str) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.to_string(),
                pathname: pathname.to_string(),
                viewport: Viewport {
                    window_inner_width: 1280.0,
                    window_inner_height: 720.0,
                    window_scroll_x: 0.0,
                    window_scroll_y: 0.0,
                    document_scroll_width: 1280.0,
                    document_scroll_height: 2400.0,
                },
            }),
        }
    }

    pub fn navigate(&self, url: &str, pathname: &str) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.url = url.to_string();
        state.pathname = pathname.to_string();
    }

    pub fn set_scroll(&self, x: f64, y: f64) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.viewport.window_scroll_x = x;
        state.viewport.window_scroll_y = y;
    }

    pub fn set_inner_size(&self, width: f64, height: f64) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.viewport.window_inner_width = width;
        state.viewport.window_inner_height = height;
    }
}

impl PageContext for FakePage {
    fn location(&self) -> PageLocation {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        PageLocation {
            url: state.url.clone(),
            pathname: state.pathname.clone(),
        }
    }

    fn viewport(&self) -> Viewport {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.viewport
    }

    fn environment(&self) -> ContextSnapshot {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        ContextSnapshot {
            url: state.url.clone(),
            pathname: state.pathname.clone(),
            user_agent: Some("webtrail-simulated".into()),
            app_name: None,
            vendor: None,
            platform: None,
            language: Some("en-US".into()),
            is_online: Some(true),
            cookie_enabled: Some(true),
            screen_width: Some(1920.0),
            screen_height: Some(1080.0),
            screen_avail_width: Some(1920.0),
            screen_avail_height: Some(1055.0),
            screen_color_depth: Some(24),
            window_inner_width: state.viewport.window_inner_width,
            window_inner_height: state.viewport.window_inner_height,
            window_scroll_x: state.viewport.window_scroll_x,
            window_scroll_y: state.viewport.window_scroll_y,
            document_scroll_width: Some(state.viewport.document_scroll_width),
            document_scroll_height: Some(state.viewport.document_scroll_height),
            referrer: None,
            history_length: Some(1),
            date: Utc::now(),
        }
    }
}

struct ElementState {
    attrs: BTreeMap<String, String>,
    selectors: Vec<String>,
    rect: Rect,
    children: Vec<ElementHandle>,
}

/// Scriptable element handle. `dataset()` derives from `data-*` attributes
/// the way the DOM does (kebab-case suffix camelized).
pub struct FakeElement {
    key: u64,
    tag: String,
    state: Mutex<ElementState>,
}

impl FakeElement {
    pub fn new(key: u64, tag: &str) -> Arc<Self> {
        Arc::new(Self {
            key,
            tag: tag.to_string(),
            state: Mutex::new(ElementState {
                attrs: BTreeMap::new(),
                selectors: Vec::new(),
                rect: Rect::new(0.0, 0.0, 100.0, 50.0),
                children: Vec::new(),
            }),
        })
    }

    pub fn set_rect(&self, rect: Rect) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).rect = rect;
    }

    /// Declare that this element matches a selector rule.
    pub fn add_matching_selector(&self, selector: &str) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .selectors
            .push(selector.to_string());
    }

    pub fn remove_attr(&self, name: &str) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .attrs
            .remove(name);
    }

    pub fn add_child(&self, child: ElementHandle) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .children
            .push(child);
    }
}

fn camelize_data_attr(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

impl PageElement for FakeElement {
    fn element_key(&self) -> u64 {
        self.key
    }

    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .attrs
            .get(name)
            .cloned()
    }

    fn set_attr(&self, name: &str, value: &str) {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    fn matches(&self, selector: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .selectors
            .iter()
            .any(|s| s == selector)
    }

    fn dataset(&self) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .attrs
            .iter()
            .filter_map(|(name, value)| {
                name.strip_prefix("data-")
                    .map(|rest| (camelize_data_attr(rest), value.clone()))
            })
            .collect()
    }

    fn bounding_rect(&self) -> Rect {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).rect
    }

    fn descendants(&self) -> Vec<ElementHandle> {
        let children = {
            let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.children.clone()
        };
        let mut all = Vec::new();
        for child in children {
            all.push(child.clone());
            all.extend(child.descendants());
        }
        all
    }
}
