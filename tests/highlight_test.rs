//! Highlight expiry and debug badge refresh, on a paused clock

mod support;

use browser_surface::geometry::Rect;
use browser_surface::highlight::{HighlightConfig, Highlighter};
use browser_surface::page::{OverlayLayer, PageChange};
use browser_surface::snapshot::SnapshotEngine;
use std::sync::Arc;
use std::time::Duration;
use support::{login_page, FakePage};

fn highlighter(page: &Arc<FakePage>) -> (Arc<SnapshotEngine>, Highlighter) {
    let engine = Arc::new(SnapshotEngine::new(page.clone()));
    let highlighter = Highlighter::new(page.clone(), engine.clone(), HighlightConfig::default());
    (engine, highlighter)
}

#[tokio::test(start_paused = true)]
async fn test_highlight_expires_after_two_seconds() {
    let page = FakePage::new(login_page());
    let (engine, highlighter) = highlighter(&page);
    engine.generate(300).await.unwrap();

    assert!(highlighter.highlight(2).await.unwrap());
    let boxes = page.overlay(OverlayLayer::Highlight).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!((boxes[0].bounds.x, boxes[0].bounds.y), (10, 150));
    assert_eq!(boxes[0].label, None);

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert!(page.overlay(OverlayLayer::Highlight).is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(page.overlay(OverlayLayer::Highlight).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_new_highlight_replaces_and_restarts_expiry() {
    let page = FakePage::new(login_page());
    let (engine, highlighter) = highlighter(&page);
    engine.generate(300).await.unwrap();

    highlighter.highlight(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    highlighter.highlight(3).await.unwrap();

    let boxes = page.overlay(OverlayLayer::Highlight).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].bounds.y, 200);

    // The first highlight's expiry would have fired here.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(page.overlay(OverlayLayer::Highlight).is_some());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(page.overlay(OverlayLayer::Highlight).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_highlight_unresolvable_ref() {
    let page = FakePage::new(login_page());
    let (engine, highlighter) = highlighter(&page);
    engine.generate(300).await.unwrap();

    assert!(!highlighter.highlight(42).await.unwrap());
    assert!(page.overlay(OverlayLayer::Highlight).is_none());

    page.detach(engine.resolve(1).await.unwrap());
    assert!(!highlighter.highlight(1).await.unwrap());
    assert!(page.overlay(OverlayLayer::Highlight).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_debug_badges_follow_page_changes() {
    let page = FakePage::new(login_page());
    let (engine, highlighter) = highlighter(&page);

    assert_eq!(highlighter.toggle_debug(true).await.unwrap(), 3);
    assert!(highlighter.is_debug_enabled().await);
    assert!(page.is_watching());
    assert_eq!(engine.current().await.len(), 3);

    let badges = page.overlay(OverlayLayer::Debug).unwrap();
    let labels: Vec<_> = badges.iter().map(|b| b.label.clone().unwrap()).collect();
    assert_eq!(labels, vec!["1", "2", "3"]);
    assert_eq!(page.draw_count(OverlayLayer::Debug), 1);

    let submit = engine.resolve(3).await.unwrap();
    page.move_element(submit, Rect::new(10.0, 260.0, 120.0, 30.0));
    for _ in 0..5 {
        page.emit(PageChange::Mutation);
    }
    page.emit(PageChange::Scroll);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(page.draw_count(OverlayLayer::Debug), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(page.draw_count(OverlayLayer::Debug), 2);
    let badges = page.overlay(OverlayLayer::Debug).unwrap();
    assert_eq!(badges[2].bounds.y, 260);

    assert_eq!(highlighter.toggle_debug(false).await.unwrap(), 0);
    assert!(!highlighter.is_debug_enabled().await);
    assert!(!page.is_watching());
    assert!(page.overlay(OverlayLayer::Debug).is_none());

    page.emit(PageChange::Resize);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(page.draw_count(OverlayLayer::Debug), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debug_skips_detached_and_collapsed_elements() {
    let page = FakePage::new(login_page());
    let (engine, highlighter) = highlighter(&page);

    highlighter.toggle_debug(true).await.unwrap();
    page.detach(engine.resolve(1).await.unwrap());
    page.move_element(
        engine.resolve(2).await.unwrap(),
        Rect::new(10.0, 150.0, 0.0, 0.0),
    );
    page.emit(PageChange::Mutation);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let badges = page.overlay(OverlayLayer::Debug).unwrap();
    assert_eq!(badges.len(), 1);
    assert_eq!(badges[0].label.as_deref(), Some("3"));
}
