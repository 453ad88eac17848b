//! Log grouping and filtering utilities over the same fold primitives.

use crate::models::{Event, SessionData};

use super::timeline::LogFilter;

/// Group log entries by the pathname active at each entry's time, tracking
/// navigation events as path changes. Groups appear in first-seen order.
pub fn group_by_pathname(
    sessions: &[SessionData],
    filter: Option<&LogFilter<'_>>,
) -> Vec<(String, Vec<Event>)> {
    let mut groups: Vec<(String, Vec<Event>)> = Vec::new();

    for session in sessions {
        let mut current_pathname = session.start.context.pathname.clone();

        let mut sorted: Vec<&Event> = session.log.iter().collect();
        sorted.sort_by_key(|event| event.date());

        for event in sorted {
            if let Some(pathname) = event.pathname() {
                current_pathname = pathname.to_string();
            }

            if let Some(filter) = filter {
                if !filter(event, session) {
                    continue;
                }
            }

            match groups.iter_mut().find(|(path, _)| *path == current_pathname) {
                Some((_, entries)) => entries.push(event.clone()),
                None => groups.push((current_pathname.clone(), vec![event.clone()])),
            }
        }
    }

    groups
}

/// Restrict each session's log to entries matching the predicate, dropping
/// sessions left with an empty log.
pub fn filter_session_logs(
    sessions: &[SessionData],
    filter: &LogFilter<'_>,
) -> Vec<SessionData> {
    sessions
        .iter()
        .filter_map(|session| {
            let log: Vec<Event> = session
                .log
                .iter()
                .filter(|event| filter(event, session))
                .cloned()
                .collect();

            if log.is_empty() {
                None
            } else {
                Some(SessionData {
                    id: session.id.clone(),
                    start: session.start.clone(),
                    end: session.end.clone(),
                    log,
                })
            }
        })
        .collect()
}

/// All matching entries across every session, flattened in log order.
pub fn filter_flat_session_logs(
    sessions: &[SessionData],
    filter: &LogFilter<'_>,
) -> Vec<Event> {
    sessions
        .iter()
        .flat_map(|session| {
            session
                .log
                .iter()
                .filter(|event| filter(event, session))
                .cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::test_support::{change_state, click, loaded, session_at, ts};

    #[test]
    fn no_navigation_means_a_single_group() {
        let session = session_at(
            "s1",
            "/x",
            0,
            vec![click(1.0, 1.0, ts(1)), click(2.0, 2.0, ts(2))],
        );

        let groups = group_by_pathname(&[session], None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "/x");
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn navigation_splits_groups_by_active_pathname() {
        let session = session_at(
            "s1",
            "/a",
            0,
            vec![
                click(1.0, 1.0, ts(1)),
                change_state("/b", ts(2)),
                click(2.0, 2.0, ts(3)),
            ],
        );

        let groups = group_by_pathname(&[session], None);
        let paths: Vec<_> = groups.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b"]);
        // The navigation event itself lands in the group it navigated to.
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn filter_applies_after_the_pathname_update() {
        let session = session_at(
            "s1",
            "/a",
            0,
            vec![change_state("/b", ts(1)), click(1.0, 1.0, ts(2))],
        );

        let only_clicks =
            |event: &Event, _: &SessionData| event.type_name() == "document-click";
        let groups = group_by_pathname(&[session], Some(&only_clicks as &LogFilter<'_>));

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "/b");
        assert_eq!(groups[0].1.len(), 1);
    }

    #[test]
    fn sessions_with_no_matching_entries_are_dropped() {
        let with_clicks = session_at("s1", "/a", 0, vec![click(1.0, 1.0, ts(1)), loaded("/a", ts(2))]);
        let without = session_at("s2", "/b", 1, vec![loaded("/b", ts(3))]);

        let only_clicks =
            |event: &Event, _: &SessionData| event.type_name() == "document-click";
        let filtered = filter_session_logs(&[with_clicks, without], &only_clicks);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "s1");
        assert_eq!(filtered[0].log.len(), 1);
    }

    #[test]
    fn flat_filter_crosses_session_boundaries() {
        let first = session_at("s1", "/a", 0, vec![click(1.0, 1.0, ts(1))]);
        let second = session_at("s2", "/b", 1, vec![click(2.0, 2.0, ts(2)), loaded("/b", ts(3))]);

        let only_clicks =
            |event: &Event, _: &SessionData| event.type_name() == "document-click";
        let flat = filter_flat_session_logs(&[first, second], &only_clicks);

        assert_eq!(flat.len(), 2);
    }
}
