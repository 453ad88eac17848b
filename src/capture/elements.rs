//! Element lifecycle tracking.
//!
//! Decides which elements are tracked, assigns stable tracking identifiers,
//! and turns observer notifications into bind/unbind/visible/invisible/
//! layout-change entries. The registration map is in-memory only and owned
//! exclusively by this tracker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Duration;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::models::{Event, Rect};
use crate::page::{
    ElementHandle, IntersectionChange, PageContext, TARGET_SELECTOR_ATTR,
    TRACKING_ID_ATTR,
};
use crate::store::SessionStore;

use super::debounce::Debouncer;
use super::record;

struct Registration {
    element: ElementHandle,
    tracking_id: String,
    rect: Rect,
}

#[derive(Clone)]
pub struct ElementTracker {
    store: SessionStore,
    ctx: Arc<dyn PageContext>,
    intersection_threshold: f64,
    selectors: Arc<StdMutex<Vec<String>>>,
    registry: Arc<Mutex<HashMap<u64, Registration>>>,
    resize_debounce: Arc<StdMutex<Option<Debouncer<Vec<ElementHandle>>>>>,
}

impl ElementTracker {
    pub fn new(
        store: SessionStore,
        ctx: Arc<dyn PageContext>,
        config: &TrackerConfig,
    ) -> Self {
        let tracker = Self {
            store,
            ctx,
            intersection_threshold: config.intersection_threshold,
            selectors: Arc::new(StdMutex::new(config.target_query_selector.clone())),
            registry: Arc::new(Mutex::new(HashMap::new())),
            resize_debounce: Arc::new(StdMutex::new(None)),
        };

        let for_callback = tracker.clone();
        let debouncer = Debouncer::new(
            Duration::from_millis(config.element_resize_debounce_ms),
            move |entries: Vec<ElementHandle>| {
                let tracker = for_callback.clone();
                async move {
                    tracker.handle_resize(entries).await;
                }
            },
        );
        *tracker
            .resize_debounce
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(debouncer);

        tracker
    }

    /// Intersection ratio the host observer should report threshold
    /// crossings at.
    pub fn intersection_threshold(&self) -> f64 {
        self.intersection_threshold
    }

    pub fn selectors(&self) -> Vec<String> {
        self.selectors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn add_selector(&self, selector: &str) {
        let mut selectors = self.selectors.lock().unwrap_or_else(|p| p.into_inner());
        if !selectors.iter().any(|s| s == selector) {
            selectors.push(selector.to_string());
        }
    }

    pub fn remove_selector(&self, selector: &str) {
        self.selectors
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|s| s != selector);
    }

    pub async fn tracked_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Sweep a document that may already contain tracked or trackable
    /// elements (startup, or a freshly loaded subtree root).
    pub async fn process_existing(&self, root: &ElementHandle) {
        self.process_for_tracking(root.clone()).await;
        for element in root.descendants() {
            self.process_for_tracking(element).await;
        }
    }

    /// Ensure an already-identified element is bound, or assign an
    /// identifier if a selector rule matches. Elements matching no rule are
    /// left untouched.
    pub async fn process_for_tracking(&self, element: ElementHandle) {
        if element.attr(TRACKING_ID_ATTR).is_some() {
            self.bind(element).await;
            return;
        }

        let matched = {
            let selectors = self.selectors.lock().unwrap_or_else(|p| p.into_inner());
            selectors.iter().find(|s| element.matches(s)).cloned()
        };

        if let Some(selector) = matched {
            element.set_attr(TRACKING_ID_ATTR, &Uuid::new_v4().to_string());
            element.set_attr(TARGET_SELECTOR_ATTR, &selector);
            self.bind(element).await;
        }
    }

    /// Register the element and emit `swt-element-bind`. Binding an already
    /// registered element is a no-op.
    pub async fn bind(&self, element: ElementHandle) {
        let Some(tracking_id) = element.attr(TRACKING_ID_ATTR) else {
            return;
        };

        let rect = element.bounding_rect();
        {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(&element.element_key()) {
                return;
            }
            registry.insert(
                element.element_key(),
                Registration {
                    element: element.clone(),
                    tracking_id: tracking_id.clone(),
                    rect,
                },
            );
        }

        let event = Event::SwtElementBind {
            tag_name: element.tag_name(),
            id: tracking_id,
            target_selector: element.attr(TARGET_SELECTOR_ATTR),
            dataset: element.dataset(),
            rect,
            viewport: self.ctx.viewport(),
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }

    /// Deregister the element and emit `swt-element-unbind`. A no-op when
    /// the element was never bound. The reported id comes from the
    /// registration, so it survives attribute removal.
    pub async fn unbind(&self, element: &ElementHandle) {
        let registration = {
            let mut registry = self.registry.lock().await;
            registry.remove(&element.element_key())
        };
        let Some(registration) = registration else {
            return;
        };

        let event = Event::SwtElementUnbind {
            tag_name: element.tag_name(),
            id: registration.tracking_id,
            target_selector: element.attr(TARGET_SELECTOR_ATTR),
            dataset: element.dataset(),
            rect: element.bounding_rect(),
            viewport: self.ctx.viewport(),
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }

    /// Click delivered on a tracked element. Skipped silently when the
    /// tracking identifier is gone.
    pub async fn on_element_click(&self, element: &ElementHandle, mouse_x: f64, mouse_y: f64) {
        let Some(tracking_id) = element.attr(TRACKING_ID_ATTR) else {
            return;
        };

        let event = Event::SwtElementClick {
            tag_name: element.tag_name(),
            id: tracking_id,
            mouse_x,
            mouse_y,
            dataset: element.dataset(),
            rect: element.bounding_rect(),
            viewport: self.ctx.viewport(),
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }

    /// Threshold crossings from the host's intersection observation.
    pub async fn on_intersection(&self, changes: Vec<IntersectionChange>) {
        for change in changes {
            let Some(tracking_id) = change.element.attr(TRACKING_ID_ATTR) else {
                continue;
            };

            let tag_name = change.element.tag_name();
            let target_selector = change.element.attr(TARGET_SELECTOR_ATTR);
            let dataset = change.element.dataset();
            let rect = change.element.bounding_rect();
            let viewport = self.ctx.viewport();
            let date = Utc::now();

            let event = if change.is_intersecting {
                Event::SwtElementVisible {
                    tag_name,
                    id: tracking_id,
                    target_selector,
                    dataset,
                    rect,
                    viewport,
                    date,
                }
            } else {
                Event::SwtElementInvisible {
                    tag_name,
                    id: tracking_id,
                    target_selector,
                    dataset,
                    rect,
                    viewport,
                    date,
                }
            };
            record(&self.store, event).await;
        }
    }

    /// Box-size observations from the host. Coalesced; only the last batch
    /// inside the quiet window is evaluated.
    pub fn on_box_resize(&self, elements: Vec<ElementHandle>) {
        let debounce = self.resize_debounce.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(debouncer) = debounce.as_ref() {
            debouncer.signal(elements);
        }
    }

    async fn handle_resize(&self, elements: Vec<ElementHandle>) {
        let mut changed = Vec::new();
        {
            let mut registry = self.registry.lock().await;
            for element in &elements {
                if element.attr(TRACKING_ID_ATTR).is_none() {
                    continue;
                }
                let Some(registration) = registry.get_mut(&element.element_key()) else {
                    continue;
                };

                let new_rect = element.bounding_rect();
                if !new_rect.same_size(&registration.rect) {
                    registration.rect = new_rect;
                    changed.push((
                        element.clone(),
                        registration.tracking_id.clone(),
                        new_rect,
                    ));
                }
            }
        }

        for (element, tracking_id, rect) in changed {
            self.emit_layout_change(&element, tracking_id, rect).await;
        }
    }

    /// Re-read geometry for every registration; position-only changes emit
    /// the same layout-change type as size changes. Driven by the
    /// dispatcher after debounced scroll/resize.
    pub async fn check_positions(&self) {
        let mut moved = Vec::new();
        {
            let mut registry = self.registry.lock().await;
            for registration in registry.values_mut() {
                if registration.element.attr(TRACKING_ID_ATTR).is_none() {
                    continue;
                }

                let new_rect = registration.element.bounding_rect();
                if !new_rect.same_position(&registration.rect) {
                    registration.rect = new_rect;
                    moved.push((
                        registration.element.clone(),
                        registration.tracking_id.clone(),
                        new_rect,
                    ));
                }
            }
        }

        for (element, tracking_id, rect) in moved {
            self.emit_layout_change(&element, tracking_id, rect).await;
        }
    }

    /// Subtree insertion: evaluate the root and every descendant.
    pub async fn on_subtree_added(&self, root: ElementHandle) {
        self.process_existing(&root).await;
    }

    /// Subtree removal: unbind the root and every descendant that carries a
    /// tracking identifier.
    pub async fn on_subtree_removed(&self, root: ElementHandle) {
        if root.attr(TRACKING_ID_ATTR).is_some() {
            self.unbind(&root).await;
        }
        for element in root.descendants() {
            if element.attr(TRACKING_ID_ATTR).is_some() {
                self.unbind(&element).await;
            }
        }
    }

    /// Tracking-identifier attribute transition on a live element.
    pub async fn on_tracking_id_changed(
        &self,
        element: ElementHandle,
        old: Option<&str>,
        new: Option<&str>,
    ) {
        match (old, new) {
            (Some(_), None) => {
                self.unbind(&element).await;
                // The element may still match a selector rule and re-enter
                // tracking under a fresh identifier.
                self.process_for_tracking(element).await;
            }
            (None, Some(_)) => self.bind(element).await,
            (Some(old_id), Some(new_id)) if old_id != new_id => {
                self.unbind(&element).await;
                self.bind(element).await;
            }
            _ => {}
        }
    }

    async fn emit_layout_change(&self, element: &ElementHandle, tracking_id: String, rect: Rect) {
        let event = Event::SwtElementLayoutChange {
            tag_name: element.tag_name(),
            id: tracking_id,
            dataset: element.dataset(),
            rect,
            viewport: self.ctx.viewport(),
            date: Utc::now(),
        };
        record(&self.store, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;
    use crate::testing::{FakeElement, FakePage};
    use tokio::time::sleep;

    fn fixture() -> (ElementTracker, SessionStore) {
        let ctx = Arc::new(FakePage::new("https://example.test/a", "/a"));
        let store = SessionStore::new(Arc::new(MemoryKv::new()), ctx.clone());
        let config = TrackerConfig {
            target_query_selector: vec![".track".into()],
            element_resize_debounce_ms: 100,
            ..TrackerConfig::default()
        };
        let tracker = ElementTracker::new(store.clone(), ctx, &config);
        (tracker, store)
    }

    async fn log_types(store: &SessionStore) -> Vec<&'static str> {
        store
            .current_session()
            .await
            .map(|s| s.log.iter().map(Event::type_name).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn matching_element_gets_identifier_and_bind_event() {
        let (tracker, store) = fixture();
        let element = FakeElement::new(1, "DIV");
        element.add_matching_selector(".track");

        tracker.process_for_tracking(element.clone()).await;

        assert!(element.attr(TRACKING_ID_ATTR).is_some());
        assert_eq!(
            element.attr(TARGET_SELECTOR_ATTR).as_deref(),
            Some(".track")
        );
        assert_eq!(tracker.tracked_count().await, 1);
        assert_eq!(log_types(&store).await, vec!["swt-element-bind"]);
    }

    #[tokio::test]
    async fn non_matching_element_is_left_untouched() {
        let (tracker, store) = fixture();
        let element = FakeElement::new(1, "DIV");

        tracker.process_for_tracking(element.clone()).await;

        assert!(element.attr(TRACKING_ID_ATTR).is_none());
        assert_eq!(tracker.tracked_count().await, 0);
        assert!(log_types(&store).await.is_empty());
    }

    #[tokio::test]
    async fn bind_is_idempotent_per_element() {
        let (tracker, store) = fixture();
        let element = FakeElement::new(1, "DIV");
        element.set_attr(TRACKING_ID_ATTR, "e1");

        let element: ElementHandle = element;
        tracker.bind(element.clone()).await;
        tracker.bind(element.clone()).await;

        assert_eq!(tracker.tracked_count().await, 1);
        assert_eq!(log_types(&store).await, vec!["swt-element-bind"]);
    }

    #[tokio::test]
    async fn bind_then_unbind_restores_the_registry() {
        let (tracker, store) = fixture();
        let element: ElementHandle = FakeElement::new(1, "DIV");
        element.set_attr(TRACKING_ID_ATTR, "e1");

        assert_eq!(tracker.tracked_count().await, 0);
        tracker.bind(element.clone()).await;
        tracker.unbind(&element).await;
        assert_eq!(tracker.tracked_count().await, 0);

        assert_eq!(
            log_types(&store).await,
            vec!["swt-element-bind", "swt-element-unbind"]
        );
    }

    #[tokio::test]
    async fn unbind_without_registration_is_a_noop() {
        let (tracker, store) = fixture();
        let element: ElementHandle = FakeElement::new(1, "DIV");
        element.set_attr(TRACKING_ID_ATTR, "e1");

        tracker.unbind(&element).await;

        assert!(log_types(&store).await.is_empty());
    }

    #[tokio::test]
    async fn unbind_after_attribute_removal_reports_the_registered_id() {
        let (tracker, store) = fixture();
        let fake = FakeElement::new(1, "DIV");
        fake.set_attr(TRACKING_ID_ATTR, "e1");
        let element: ElementHandle = fake.clone();

        tracker.bind(element.clone()).await;
        fake.remove_attr(TRACKING_ID_ATTR);
        tracker.unbind(&element).await;

        let session = store.current_session().await.unwrap();
        match &session.log[1] {
            Event::SwtElementUnbind { id, .. } => assert_eq!(id, "e1"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn intersection_changes_emit_visibility_events() {
        let (tracker, store) = fixture();
        let element: ElementHandle = {
            let fake = FakeElement::new(1, "DIV");
            fake.set_attr(TRACKING_ID_ATTR, "e1");
            fake
        };
        tracker.bind(element.clone()).await;

        tracker
            .on_intersection(vec![IntersectionChange {
                element: element.clone(),
                is_intersecting: true,
            }])
            .await;
        tracker
            .on_intersection(vec![IntersectionChange {
                element: element.clone(),
                is_intersecting: false,
            }])
            .await;

        assert_eq!(
            log_types(&store).await,
            vec![
                "swt-element-bind",
                "swt-element-visible",
                "swt-element-invisible"
            ]
        );
    }

    #[tokio::test]
    async fn intersection_without_identifier_is_skipped() {
        let (tracker, store) = fixture();
        let element: ElementHandle = FakeElement::new(1, "DIV");

        tracker
            .on_intersection(vec![IntersectionChange {
                element,
                is_intersecting: true,
            }])
            .await;

        assert!(log_types(&store).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resize_observations_coalesce_into_one_layout_change() {
        let (tracker, store) = fixture();
        let fake = FakeElement::new(1, "DIV");
        fake.set_attr(TRACKING_ID_ATTR, "e1");
        fake.set_rect(Rect::new(0.0, 0.0, 100.0, 50.0));
        let element: ElementHandle = fake.clone();
        tracker.bind(element.clone()).await;

        for width in [110.0, 120.0, 130.0] {
            fake.set_rect(Rect::new(0.0, 0.0, width, 50.0));
            tracker.on_box_resize(vec![element.clone()]);
            sleep(Duration::from_millis(10)).await;
        }

        sleep(Duration::from_millis(150)).await;

        let session = store.current_session().await.unwrap();
        let layout_changes: Vec<_> = session
            .log
            .iter()
            .filter(|e| e.type_name() == "swt-element-layout-change")
            .collect();
        assert_eq!(layout_changes.len(), 1);
        match layout_changes[0] {
            Event::SwtElementLayoutChange { rect, .. } => assert_eq!(rect.width, 130.0),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_size_emits_nothing_after_debounce() {
        let (tracker, store) = fixture();
        let fake = FakeElement::new(1, "DIV");
        fake.set_attr(TRACKING_ID_ATTR, "e1");
        let element: ElementHandle = fake.clone();
        tracker.bind(element.clone()).await;

        tracker.on_box_resize(vec![element.clone()]);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(log_types(&store).await, vec!["swt-element-bind"]);
    }

    #[tokio::test]
    async fn position_only_change_reuses_the_layout_change_type() {
        let (tracker, store) = fixture();
        let fake = FakeElement::new(1, "DIV");
        fake.set_attr(TRACKING_ID_ATTR, "e1");
        fake.set_rect(Rect::new(0.0, 0.0, 100.0, 50.0));
        let element: ElementHandle = fake.clone();
        tracker.bind(element).await;

        fake.set_rect(Rect::new(0.0, 40.0, 100.0, 50.0));
        tracker.check_positions().await;
        // Second pass with no movement stays quiet.
        tracker.check_positions().await;

        assert_eq!(
            log_types(&store).await,
            vec!["swt-element-bind", "swt-element-layout-change"]
        );
    }

    #[tokio::test]
    async fn removed_subtree_unbinds_descendants() {
        let (tracker, store) = fixture();
        let root = FakeElement::new(1, "DIV");
        let child = FakeElement::new(2, "BUTTON");
        child.add_matching_selector(".track");
        root.add_child(child.clone());

        tracker.on_subtree_added(root.clone()).await;
        assert_eq!(tracker.tracked_count().await, 1);

        tracker.on_subtree_removed(root).await;
        assert_eq!(tracker.tracked_count().await, 0);

        assert_eq!(
            log_types(&store).await,
            vec!["swt-element-bind", "swt-element-unbind"]
        );
    }

    #[tokio::test]
    async fn identifier_value_change_rebinds_under_the_new_id() {
        let (tracker, store) = fixture();
        let fake = FakeElement::new(1, "DIV");
        fake.set_attr(TRACKING_ID_ATTR, "old-id");
        let element: ElementHandle = fake.clone();
        tracker.bind(element.clone()).await;

        fake.set_attr(TRACKING_ID_ATTR, "new-id");
        tracker
            .on_tracking_id_changed(element, Some("old-id"), Some("new-id"))
            .await;

        let session = store.current_session().await.unwrap();
        let ids: Vec<(&'static str, String)> = session
            .log
            .iter()
            .map(|e| match e {
                Event::SwtElementBind { id, .. } => ("bind", id.clone()),
                Event::SwtElementUnbind { id, .. } => ("unbind", id.clone()),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(
            ids,
            vec![
                ("bind", "old-id".to_string()),
                ("unbind", "old-id".to_string()),
                ("bind", "new-id".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn identifier_removal_reevaluates_selector_rules() {
        let (tracker, _store) = fixture();
        let fake = FakeElement::new(1, "DIV");
        fake.set_attr(TRACKING_ID_ATTR, "manual");
        fake.add_matching_selector(".track");
        let element: ElementHandle = fake.clone();
        tracker.bind(element.clone()).await;

        fake.remove_attr(TRACKING_ID_ATTR);
        tracker
            .on_tracking_id_changed(element.clone(), Some("manual"), None)
            .await;

        // Still matches a rule, so it re-entered tracking with a fresh id.
        let new_id = element.attr(TRACKING_ID_ATTR).unwrap();
        assert_ne!(new_id, "manual");
        assert_eq!(tracker.tracked_count().await, 1);
    }
}
