//! Channel requests answered by a page session

mod support;

use base64::{engine::general_purpose, Engine as _};
use browser_surface::session::{PageSession, SessionOptions};
use serde_json::json;
use std::sync::Arc;
use support::{login_page, Call, FakePage};

fn session(page: &Arc<FakePage>) -> PageSession {
    PageSession::new(page.clone(), page.clone(), SessionOptions::default())
}

#[tokio::test]
async fn test_snapshot_then_execute() {
    let page = FakePage::new(login_page());
    let session = session(&page);

    let response = session.handle(&json!({"action": "getSnapshot"})).await;
    assert_eq!(response["success"], true);
    let elements = response["data"]["elements"].as_array().unwrap();
    let refs: Vec<u64> = elements.iter().map(|e| e["ref"].as_u64().unwrap()).collect();
    assert_eq!(refs, vec![1, 2, 3]);
    assert_eq!(elements[2]["role"], "button");
    assert_eq!(elements[2]["tag"], "BUTTON");
    assert_eq!(
        elements[2]["bounds"],
        json!({"x": 10, "y": 200, "width": 120, "height": 30})
    );

    let response = session
        .handle(&json!({
            "action": "execute",
            "command": {"type": "click_element", "ref": 3}
        }))
        .await;
    assert_eq!(response, json!({"success": true}));
    assert_eq!(
        page.clicks(),
        vec![page.handle_of("data-test", "submit").0]
    );

    let response = session
        .handle(&json!({
            "action": "execute",
            "command": {"type": "click_element", "ref": 999}
        }))
        .await;
    assert_eq!(
        response,
        json!({"success": false, "error": "Element with ref 999 not found"})
    );
}

#[tokio::test]
async fn test_snapshot_limit() {
    let page = FakePage::new(login_page());
    let session = session(&page);

    let response = session
        .handle(&json!({"action": "getSnapshot", "limit": 0}))
        .await;
    assert_eq!(response["data"]["elements"], json!([]));

    let response = session
        .handle(&json!({"action": "getSnapshot", "limit": 1}))
        .await;
    assert_eq!(response["data"]["elements"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejects_unknown_requests() {
    let page = FakePage::new(login_page());
    let session = session(&page);

    let response = session.handle(&json!({"action": "bogus"})).await;
    assert_eq!(
        response,
        json!({"success": false, "error": "Unknown action type: bogus"})
    );

    let response = session.handle(&json!({"hello": "world"})).await;
    assert_eq!(response["success"], false);

    let response = session
        .handle(&json!({"action": "execute", "command": {"type": "fly"}}))
        .await;
    assert_eq!(
        response,
        json!({"success": false, "error": "Unknown action type: fly"})
    );
}

#[tokio::test]
async fn test_metrics_and_scroll_queries() {
    let page = FakePage::tall(1280.0, 2000.0, 800.0);
    let session = session(&page);

    let response = session.handle(&json!({"action": "getMetrics"})).await;
    assert_eq!(
        response["data"],
        json!({
            "width": 1280.0,
            "height": 2000.0,
            "viewportWidth": 1280.0,
            "viewportHeight": 800.0,
            "devicePixelRatio": 1.0
        })
    );

    let response = session
        .handle(&json!({"action": "scrollTo", "x": 0, "y": 450}))
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(page.calls(), vec![Call::ScrollTo(0.0, 450.0)]);

    let response = session.handle(&json!({"action": "getScrollPosition"})).await;
    assert_eq!(response["data"], json!({"x": 0.0, "y": 450.0}));

    page.set_metrics(None);
    let response = session.handle(&json!({"action": "getMetrics"})).await;
    assert_eq!(response["success"], false);
    assert!(response["error"]
        .as_str()
        .unwrap()
        .contains("metrics unavailable"));
}

#[tokio::test]
async fn test_context_degrades_to_empty_text() {
    let page = FakePage::new(login_page());
    let session = session(&page);

    let response = session
        .handle(&json!({"action": "getContext", "maxLength": 5000}))
        .await;
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["title"], "Sign in");
    assert_eq!(response["data"]["url"], "https://example.com/login");
    assert!(response["data"]["text"]
        .as_str()
        .unwrap()
        .contains("Please sign in"));

    *page.capture_document_fails.lock().unwrap() = true;
    let response = session.handle(&json!({"action": "getContext"})).await;
    assert_eq!(
        response,
        json!({
            "success": true,
            "data": {"text": "", "title": "Sign in", "url": "https://example.com/login"}
        })
    );
}

#[tokio::test]
async fn test_highlight_and_debug_requests() {
    let page = FakePage::new(login_page());
    let session = session(&page);

    let response = session
        .handle(&json!({"action": "highlight", "ref": 1}))
        .await;
    assert_eq!(response["data"], json!({"highlighted": false}));

    let response = session
        .handle(&json!({"action": "toggleDebug", "enabled": true}))
        .await;
    assert_eq!(response["data"], json!({"enabled": true, "badges": 3}));

    let response = session
        .handle(&json!({"action": "highlight", "ref": 1}))
        .await;
    assert_eq!(response["data"], json!({"highlighted": true}));

    let response = session
        .handle(&json!({"action": "toggleDebug", "enabled": false}))
        .await;
    assert_eq!(response["data"], json!({"enabled": false, "badges": 0}));
}

#[tokio::test(start_paused = true)]
async fn test_viewport_screenshot_retries() {
    let page = FakePage::new(login_page());
    page.fail_capture(1);
    page.fail_capture(2);
    let session = session(&page);

    let response = session
        .handle(&json!({"action": "captureScreenshot"}))
        .await;
    assert_eq!(response["success"], true, "{}", response);
    assert_eq!(response["data"]["mode"], "viewport");
    assert!(response["data"]["dataUrl"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
    assert!(response["data"]["timestamp"].is_string());

    let page = FakePage::new(login_page());
    for attempt in 1..=3 {
        page.fail_capture(attempt);
    }
    let session = self::session(&page);
    let response = session
        .handle(&json!({"action": "captureScreenshot", "fullPage": false}))
        .await;
    assert_eq!(response["success"], false);
    assert!(response["error"].as_str().unwrap().contains("rate limited"));
}

#[tokio::test(start_paused = true)]
async fn test_full_page_screenshot_is_stitched() {
    let page = FakePage::tall(64.0, 160.0, 64.0);
    let session = session(&page);

    let response = session
        .handle(&json!({"action": "captureScreenshot", "fullPage": true}))
        .await;
    assert_eq!(response["success"], true, "{}", response);
    assert_eq!(response["data"]["mode"], "full_page");
    assert_eq!(response["data"]["tiles"], 3);
    assert_eq!(response["data"]["fallbackReason"], json!(null));

    let data_url = response["data"]["dataUrl"].as_str().unwrap();
    let encoded = data_url.strip_prefix("data:image/jpeg;base64,").unwrap();
    let bytes = general_purpose::STANDARD.decode(encoded).unwrap();
    let image = image::load_from_memory(&bytes).unwrap();
    assert_eq!((image.width(), image.height()), (64, 160));
}

#[tokio::test(start_paused = true)]
async fn test_highlight_waits_for_full_page_capture() {
    let page = FakePage::tall(64.0, 160.0, 64.0);
    let session = Arc::new(session(&page));

    let capture = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .handle(&json!({"action": "captureScreenshot", "fullPage": true}))
                .await
        }
    });
    while !page.calls().contains(&Call::ScrollTo(0.0, 0.0)) {
        tokio::task::yield_now().await;
    }
    assert!(page.captures().is_empty());

    let response = session
        .handle(&json!({"action": "highlight", "ref": 1}))
        .await;
    assert_eq!(response["data"], json!({"highlighted": false}));
    assert_eq!(page.captures(), vec![0.0, 64.0, 128.0]);

    let response = capture.await.unwrap();
    assert_eq!(response["data"]["mode"], "full_page", "{}", response);
}
