//! State-timeline reconstruction.
//!
//! Folds a session's chronologically sorted log into one on-page state
//! snapshot per event. Pure: same log in, same timeline out, no hidden
//! state, safe to re-run.

use serde::Serialize;

use crate::models::{Event, Rect, SessionData};

/// Mouse position before any pointer event has been observed.
pub const MOUSE_SENTINEL: (f64, f64) = (-999.0, -999.0);

/// Predicate over `(event, session)` restricting which log entries
/// participate in a fold.
pub type LogFilter<'a> = dyn Fn(&Event, &SessionData) -> bool + 'a;

/// One tracked element's last-known state as of a timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedElementState {
    pub id: String,
    pub tag_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    pub visible: bool,
    pub rect: Rect,
}

/// Reconstructed on-page state as of one specific event, plus that event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTimeline {
    pub id: String,
    pub pathname: String,
    pub url: String,
    pub window_inner_width: f64,
    pub window_inner_height: f64,
    pub mouse_x: f64,
    pub mouse_y: f64,
    pub window_scroll_x: f64,
    pub window_scroll_y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_scroll_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_scroll_height: Option<f64>,
    pub swt_elements: Vec<TrackedElementState>,
    pub log: Event,
}

/// Fold each session's sorted log into its timeline, sessions ordered by
/// start date. Returns `(session id, timeline)` pairs in that order.
pub fn state_timeline_by_session(
    sessions: &[SessionData],
    filter: Option<&LogFilter<'_>>,
) -> Vec<(String, Vec<StateTimeline>)> {
    let mut ordered: Vec<&SessionData> = sessions.iter().collect();
    ordered.sort_by_key(|s| s.start.context.date);

    ordered
        .into_iter()
        .map(|session| (session.id.clone(), fold_session(session, filter)))
        .collect()
}

/// All sessions' timelines flattened and re-sorted by event date for
/// chronological cross-session views.
pub fn state_timelines(
    sessions: &[SessionData],
    filter: Option<&LogFilter<'_>>,
) -> Vec<StateTimeline> {
    let mut all: Vec<StateTimeline> = state_timeline_by_session(sessions, filter)
        .into_iter()
        .flat_map(|(_, timeline)| timeline)
        .collect();
    all.sort_by_key(|entry| entry.log.date());
    all
}

fn fold_session(session: &SessionData, filter: Option<&LogFilter<'_>>) -> Vec<StateTimeline> {
    let start = &session.start.context;
    let mut pathname = start.pathname.clone();
    let mut url = start.url.clone();
    let mut window_inner_width = start.window_inner_width;
    let mut window_inner_height = start.window_inner_height;
    let (mut mouse_x, mut mouse_y) = MOUSE_SENTINEL;
    let mut window_scroll_x = start.window_scroll_x;
    let mut window_scroll_y = start.window_scroll_y;
    let mut document_scroll_width = start.document_scroll_width;
    let mut document_scroll_height = start.document_scroll_height;
    let mut elements: Vec<TrackedElementState> = Vec::new();

    let mut sorted: Vec<&Event> = session.log.iter().collect();
    sorted.sort_by_key(|event| event.date());

    let mut timeline = Vec::with_capacity(sorted.len());
    for event in sorted {
        if let Some(filter) = filter {
            if !filter(event, session) {
                continue;
            }
        }

        if let Some(viewport) = event.viewport() {
            window_inner_width = viewport.window_inner_width;
            window_inner_height = viewport.window_inner_height;
            window_scroll_x = viewport.window_scroll_x;
            window_scroll_y = viewport.window_scroll_y;
            document_scroll_width = Some(viewport.document_scroll_width);
            document_scroll_height = Some(viewport.document_scroll_height);
        }

        if let (Some(event_pathname), Some(event_url)) = (event.pathname(), event.url()) {
            pathname = event_pathname.to_string();
            url = event_url.to_string();
        }

        // A fresh document has no bound elements yet.
        if matches!(event, Event::DocumentLoaded { .. }) {
            elements.clear();
        }

        match event {
            Event::DocumentClick {
                mouse_x: x,
                mouse_y: y,
                ..
            }
            | Event::DocumentMousemove {
                mouse_x: x,
                mouse_y: y,
                ..
            }
            | Event::SwtElementClick {
                mouse_x: x,
                mouse_y: y,
                ..
            } => {
                mouse_x = *x;
                mouse_y = *y;
            }
            Event::DocumentDragStart {
                start_x, start_y, ..
            } => {
                mouse_x = *start_x;
                mouse_y = *start_y;
            }
            Event::DocumentDragEnd { end_x, end_y, .. } => {
                mouse_x = *end_x;
                mouse_y = *end_y;
            }
            _ => {}
        }

        match event {
            Event::SwtElementBind {
                id,
                tag_name,
                target_selector,
                rect,
                ..
            } => {
                if !elements.iter().any(|el| el.id == *id) {
                    elements.push(TrackedElementState {
                        id: id.clone(),
                        tag_name: tag_name.clone(),
                        target_selector: target_selector.clone(),
                        visible: false,
                        rect: *rect,
                    });
                }
            }
            Event::SwtElementUnbind { id, .. } => {
                elements.retain(|el| el.id != *id);
            }
            Event::SwtElementVisible { id, rect, .. } => {
                if let Some(el) = elements.iter_mut().find(|el| el.id == *id) {
                    el.visible = true;
                    el.rect = *rect;
                }
            }
            Event::SwtElementInvisible { id, rect, .. } => {
                if let Some(el) = elements.iter_mut().find(|el| el.id == *id) {
                    el.visible = false;
                    el.rect = *rect;
                }
            }
            Event::SwtElementLayoutChange { id, rect, .. }
            | Event::SwtElementClick { id, rect, .. } => {
                if let Some(el) = elements.iter_mut().find(|el| el.id == *id) {
                    el.rect = *rect;
                }
            }
            _ => {}
        }

        timeline.push(StateTimeline {
            id: session.id.clone(),
            pathname: pathname.clone(),
            url: url.clone(),
            window_inner_width,
            window_inner_height,
            mouse_x,
            mouse_y,
            window_scroll_x,
            window_scroll_y,
            document_scroll_width,
            document_scroll_height,
            swt_elements: elements.clone(),
            log: event.clone(),
        });
    }

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::test_support::{
        bind, change_state, loaded, session_at, visible, unbind, ts,
    };

    fn scenario_session() -> SessionData {
        session_at(
            "s1",
            "/a",
            0,
            vec![
                loaded("/a", ts(1)),
                bind("e1", ts(2)),
                visible("e1", ts(3)),
                change_state("/b", ts(4)),
                unbind("e1", ts(5)),
            ],
        )
    }

    #[test]
    fn element_lifecycle_folds_through_navigation() {
        let session = scenario_session();
        let timeline = state_timelines(&[session], None);

        assert_eq!(timeline.len(), 5);

        assert_eq!(timeline[0].pathname, "/a");
        assert!(timeline[0].swt_elements.is_empty());

        assert_eq!(timeline[1].swt_elements.len(), 1);
        assert!(!timeline[1].swt_elements[0].visible);

        assert_eq!(timeline[2].swt_elements[0].id, "e1");
        assert!(timeline[2].swt_elements[0].visible);

        assert_eq!(timeline[3].pathname, "/b");
        assert_eq!(timeline[3].swt_elements.len(), 1);

        assert!(timeline[4].swt_elements.is_empty());
    }

    #[test]
    fn fold_is_deterministic() {
        let sessions = vec![scenario_session()];
        let first = state_timelines(&sessions, None);
        let second = state_timelines(&sessions, None);
        assert_eq!(first, second);
    }

    #[test]
    fn mouse_starts_at_the_sentinel_and_follows_pointer_events() {
        let session = session_at(
            "s1",
            "/a",
            0,
            vec![
                loaded("/a", ts(1)),
                crate::replay::test_support::click(30.0, 40.0, ts(2)),
                crate::replay::test_support::drag_start(50.0, 60.0, ts(3)),
                crate::replay::test_support::drag_end(70.0, 80.0, ts(4)),
            ],
        );

        let timeline = state_timelines(&[session], None);
        assert_eq!((timeline[0].mouse_x, timeline[0].mouse_y), MOUSE_SENTINEL);
        assert_eq!((timeline[1].mouse_x, timeline[1].mouse_y), (30.0, 40.0));
        assert_eq!((timeline[2].mouse_x, timeline[2].mouse_y), (50.0, 60.0));
        assert_eq!((timeline[3].mouse_x, timeline[3].mouse_y), (70.0, 80.0));
    }

    #[test]
    fn reload_clears_bound_elements() {
        let session = session_at(
            "s1",
            "/a",
            0,
            vec![
                loaded("/a", ts(1)),
                bind("e1", ts(2)),
                loaded("/a", ts(3)),
            ],
        );

        let timeline = state_timelines(&[session], None);
        assert_eq!(timeline[1].swt_elements.len(), 1);
        assert!(timeline[2].swt_elements.is_empty());
    }

    #[test]
    fn duplicate_bind_and_unknown_updates_are_ignored() {
        let session = session_at(
            "s1",
            "/a",
            0,
            vec![
                bind("e1", ts(1)),
                bind("e1", ts(2)),
                visible("ghost", ts(3)),
            ],
        );

        let timeline = state_timelines(&[session], None);
        assert_eq!(timeline[1].swt_elements.len(), 1);
        assert_eq!(timeline[2].swt_elements.len(), 1);
        assert!(!timeline[2].swt_elements[0].visible);
    }

    #[test]
    fn out_of_order_log_is_resorted_by_date() {
        let session = session_at(
            "s1",
            "/a",
            0,
            vec![unbind("e1", ts(3)), bind("e1", ts(1)), visible("e1", ts(2))],
        );

        let timeline = state_timelines(&[session], None);
        let types: Vec<_> = timeline.iter().map(|t| t.log.type_name()).collect();
        assert_eq!(
            types,
            vec![
                "swt-element-bind",
                "swt-element-visible",
                "swt-element-unbind"
            ]
        );
        assert!(timeline[2].swt_elements.is_empty());
    }

    #[test]
    fn cross_session_view_interleaves_by_event_date() {
        let early = session_at("s1", "/a", 0, vec![loaded("/a", ts(1)), loaded("/a", ts(5))]);
        let late = session_at("s2", "/b", 2, vec![loaded("/b", ts(3))]);

        let timeline = state_timelines(&[late, early], None);
        let ids: Vec<_> = timeline.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s1"]);
    }

    #[test]
    fn filter_limits_the_fold_to_matching_entries() {
        let session = scenario_session();
        let filter = |event: &Event, _: &SessionData| event.type_name() != "swt-element-visible";

        let by_session = state_timeline_by_session(&[session], Some(&filter as &LogFilter<'_>));
        assert_eq!(by_session.len(), 1);
        let (_, timeline) = &by_session[0];
        assert_eq!(timeline.len(), 4);
        // With the visible event filtered out, e1 stays invisible.
        assert!(!timeline[1].swt_elements[0].visible);
    }
}
