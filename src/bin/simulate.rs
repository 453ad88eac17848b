//! Scripted capture session against the in-process simulated page.
//!
//! Drives signals through the dispatcher and element tracker into the
//! store, then refolds the recorded log and prints the reconstructed
//! timeline. Run with `RUST_LOG=info` for engine logging.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::time::{sleep, Duration};

use webtrail::capture::ElementTracker;
use webtrail::models::Rect;
use webtrail::page::{ElementHandle, IntersectionChange};
use webtrail::replay::{group_by_pathname, state_timelines};
use webtrail::store::MemoryKv;
use webtrail::testing::{FakeElement, FakePage};
use webtrail::{Tracker, TrackerConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("webtrail simulator starting up...");

    let page = Arc::new(FakePage::new("https://shop.example/", "/"));
    let config = TrackerConfig {
        target_query_selector: vec![".cta".into()],
        ..TrackerConfig::default()
    };
    let mut tracker = Tracker::new(config, Arc::new(MemoryKv::new()), page.clone());
    tracker.run().await?;

    let mut session_data = BTreeMap::new();
    session_data.insert("variant".to_string(), serde_json::json!("B"));
    tracker.store().new_session(session_data).await?;

    let dispatcher = tracker.dispatcher().clone();
    let elements: &ElementTracker = tracker.elements();

    // The page finishes loading with a call-to-action button on it.
    dispatcher.on_document_loaded().await;
    let button = FakeElement::new(1, "BUTTON");
    button.add_matching_selector(".cta");
    button.set_rect(Rect::new(40.0, 500.0, 200.0, 48.0));
    let button_handle: ElementHandle = button.clone();
    elements.on_subtree_added(button_handle.clone()).await;

    // The visitor moves toward the button; only the settled position is
    // recorded.
    for x in [100.0, 180.0, 260.0, 340.0] {
        dispatcher.on_mouse_move(x, 520.0, None);
        sleep(Duration::from_millis(20)).await;
    }
    sleep(Duration::from_millis(150)).await;

    // Scrolling brings the button into view and shifts its rect.
    page.set_scroll(0.0, 300.0);
    button.set_rect(Rect::new(40.0, 200.0, 200.0, 48.0));
    dispatcher.on_scroll();
    sleep(Duration::from_millis(150)).await;
    elements
        .on_intersection(vec![IntersectionChange {
            element: button_handle.clone(),
            is_intersecting: true,
        }])
        .await;

    // A click on the button, then a drag gesture elsewhere on the page.
    dispatcher.on_click(120.0, 220.0, None).await;
    elements.on_element_click(&button_handle, 120.0, 220.0).await;
    dispatcher.on_pointer_down(400.0, 300.0);
    dispatcher.on_pointer_move(430.0, 300.0).await;
    dispatcher.on_pointer_up(460.0, 310.0).await;

    // Client-side navigation to the checkout page unloads the button.
    page.navigate("https://shop.example/checkout", "/checkout");
    dispatcher.on_navigation_intercepted().await;
    elements.on_subtree_removed(button_handle).await;

    let sessions = tracker.store().all_sessions().await;
    let timeline = state_timelines(&sessions, None);

    println!("captured {} sessions", sessions.len());
    for entry in &timeline {
        println!(
            "{} {:<25} path={:<10} mouse=({:>6.1},{:>6.1}) tracked={}",
            entry.log.date().format("%H:%M:%S%.3f"),
            entry.log.type_name(),
            entry.pathname,
            entry.mouse_x,
            entry.mouse_y,
            entry.swt_elements.len(),
        );
    }

    for (pathname, entries) in group_by_pathname(&sessions, None) {
        println!("{pathname}: {} events", entries.len());
    }

    tracker.shutdown();
    Ok(())
}
