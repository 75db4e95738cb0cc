//! Chrome DevTools Protocol implementation of the page seams
//!
//! Element handles are CDP backend node ids. They are resolved to remote
//! objects on every use, so a handle whose element has been removed simply
//! stops resolving.

// spider_chrome re-exports chromiumoxide API
use crate::dom::capture::{decode_snapshot, CaptureSnapshotResponse, SNAPSHOT_STYLES};
use crate::dom::{Document, NodeHandle};
use crate::error::{BrowserError, Result};
use crate::geometry::{Rect, Viewport};
use crate::page::{
    ImageFormat, OverlayBox, OverlayLayer, PageChange, PageDriver, PageMetrics, ScrollPosition,
    ViewportCapture,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chromiumoxide::cdp::browser_protocol::{dom, dom_snapshot, page as cdp_page};
use chromiumoxide::cdp::js_protocol::runtime;
use chromiumoxide::page::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Name of the page binding the change watcher reports through.
const CHANGE_BINDING: &str = "__browserSurfaceChange";

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

const VIEWPORT_SCRIPT: &str = "({ width: window.innerWidth, height: window.innerHeight })";

const METRICS_SCRIPT: &str = r#"({
    width: document.documentElement.scrollWidth,
    height: document.documentElement.scrollHeight,
    viewportWidth: window.innerWidth,
    viewportHeight: window.innerHeight,
    devicePixelRatio: window.devicePixelRatio
})"#;

const SCROLL_POSITION_SCRIPT: &str = "({ x: window.scrollX, y: window.scrollY })";

const CLICK_FUNCTION: &str = "function() { this.click(); }";

const TYPE_FUNCTION: &str = r#"function(text) {
    this.focus();
    this.value = text;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
}"#;

const BOUNDS_FUNCTION: &str = r#"function() {
    if (!this.isConnected) return null;
    const r = this.getBoundingClientRect();
    return { x: r.left, y: r.top, width: r.width, height: r.height };
}"#;

// Called as `(DRAW_OVERLAY)(layer, boxes)`.
const DRAW_OVERLAY: &str = r#"(layer, boxes) => {
    const id = '__browser_surface_' + layer;
    let root = document.getElementById(id);
    if (!root) {
        root = document.createElement('div');
        root.id = id;
        root.setAttribute('data-browser-agent-ui', layer);
        root.style.cssText = 'position:fixed;inset:0;pointer-events:none;z-index:2147483647;';
        document.documentElement.appendChild(root);
    }
    root.replaceChildren();
    const highlight = layer === 'highlight';
    for (const b of boxes) {
        const box = document.createElement('div');
        box.setAttribute('data-browser-agent-ui', layer);
        box.style.cssText =
            `position:fixed;left:${b.bounds.x}px;top:${b.bounds.y}px;` +
            `width:${b.bounds.width}px;height:${b.bounds.height}px;box-sizing:border-box;` +
            (highlight
                ? 'border:3px solid #ff6b00;border-radius:3px;background:rgba(255,107,0,0.12);'
                : 'border:1px dashed #e0245e;');
        if (b.label) {
            const badge = document.createElement('span');
            badge.setAttribute('data-browser-agent-ui', layer);
            badge.textContent = b.label;
            badge.style.cssText =
                'position:absolute;top:-1px;left:-1px;padding:0 3px;' +
                'font:bold 10px/14px monospace;color:#fff;background:#e0245e;';
            box.appendChild(badge);
        }
        root.appendChild(box);
    }
    return boxes.length;
}"#;

// Called as `(CLEAR_OVERLAY)(layer)`.
const CLEAR_OVERLAY: &str = r#"(layer) => {
    const root = document.getElementById('__browser_surface_' + layer);
    if (root) root.remove();
    return true;
}"#;

const WATCH_SCRIPT: &str = r#"(() => {
    if (window.__browserSurfaceWatch) return true;
    const notify = (kind) => {
        try { window.__browserSurfaceChange(kind); } catch (e) {}
    };
    const isAgentUi = (node) => {
        const el = node && (node.nodeType === 1 ? node : node.parentElement);
        return !!(el && el.closest && el.closest('[data-browser-agent-ui]'));
    };
    const relevant = (r) => {
        if (isAgentUi(r.target)) return false;
        if (r.type !== 'childList') return true;
        const nodes = [...r.addedNodes, ...r.removedNodes];
        return nodes.length === 0 || !nodes.every(isAgentUi);
    };
    const observer = new MutationObserver((records) => {
        if (records.some(relevant)) notify('mutation');
    });
    observer.observe(document.documentElement, { childList: true, subtree: true, attributes: true });
    const onScroll = () => notify('scroll');
    const onResize = () => notify('resize');
    window.addEventListener('scroll', onScroll, { capture: true, passive: true });
    window.addEventListener('resize', onResize);
    window.__browserSurfaceWatch = { observer, onScroll, onResize };
    return true;
})()"#;

const UNWATCH_SCRIPT: &str = r#"(() => {
    const watch = window.__browserSurfaceWatch;
    if (!watch) return false;
    watch.observer.disconnect();
    window.removeEventListener('scroll', watch.onScroll, { capture: true });
    window.removeEventListener('resize', watch.onResize);
    delete window.__browserSurfaceWatch;
    return true;
})()"#;

/// Add `https://` to scheme-less URLs.
pub fn normalize_url(url: &str) -> String {
    const SCHEMES: &[&str] = &["http://", "https://", "file://", "about:", "data:"];
    if SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        url.to_string()
    } else {
        log::debug!("Normalizing URL: {} -> https://{}", url, url);
        format!("https://{}", url)
    }
}

/// A Chrome tab driven over CDP.
#[derive(Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Evaluate an expression and deserialize its value.
    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::Decode(format!("Failed to deserialize result: {}", e)))
    }

    /// Run `function` with `this` bound to the element behind `handle`.
    async fn call_on(&self, handle: NodeHandle, function: &str, args: Vec<Value>) -> Result<Value> {
        let params: dom::ResolveNodeParams =
            serde_json::from_value(json!({ "backendNodeId": handle.0 }))?;
        let resolved = self
            .page
            .execute(params)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("node {}: {}", handle.0, e)))?;
        let object_id = resolved.result.object.object_id.clone().ok_or_else(|| {
            BrowserError::ElementNotFound(format!("node {} has no remote object", handle.0))
        })?;

        let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
        let params: runtime::CallFunctionOnParams = serde_json::from_value(json!({
            "functionDeclaration": function,
            "objectId": object_id,
            "arguments": arguments,
            "returnByValue": true,
            "awaitPromise": true,
        }))?;
        let response = self.page.execute(params).await?;

        if let Some(details) = &response.result.exception_details {
            return Err(BrowserError::ScriptFailed(details.text.clone()));
        }
        Ok(response.result.result.value.clone().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn capture_document(&self) -> Result<Document> {
        let viewport: Viewport = self.evaluate(VIEWPORT_SCRIPT).await?;

        let result = self
            .page
            .execute(dom_snapshot::CaptureSnapshotParams {
                computed_styles: SNAPSHOT_STYLES.iter().map(|s| s.to_string()).collect(),
                include_dom_rects: Some(false),
                include_paint_order: Some(false),
                include_blended_background_colors: Some(false),
                include_text_color_opacities: Some(false),
            })
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to capture DOM snapshot: {}", e)))?;

        let response: CaptureSnapshotResponse =
            serde_json::from_value(serde_json::to_value(result.result)?)?;
        decode_snapshot(&response, viewport)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let url = normalize_url(url);
        log::info!("Navigating to {}", url);

        let mut loads = self
            .page
            .event_listener::<cdp_page::EventLoadEventFired>()
            .await?;

        let params = cdp_page::NavigateParams::builder()
            .url(&url)
            .build()
            .map_err(|e| BrowserError::NavigationFailed(format!("Invalid URL {}: {}", url, e)))?;

        let response = self.page.execute(params).await.map_err(|e| {
            if e.to_string().contains("oneshot canceled") {
                BrowserError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e))
            }
        })?;

        if let Some(error_text) = &response.result.error_text {
            return Err(BrowserError::NavigationFailed(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        // Same-document navigations never fire a load event.
        if response.result.loader_id.is_none() {
            return Ok(());
        }

        match tokio::time::timeout(LOAD_TIMEOUT, loads.next()).await {
            Ok(Some(_)) => log::debug!("Load event fired for {}", url),
            Ok(None) => log::warn!("Load event stream closed while loading {}", url),
            Err(_) => {
                return Err(BrowserError::NavigationFailed(format!(
                    "Timed out after {}s waiting for {} to load",
                    LOAD_TIMEOUT.as_secs(),
                    url
                )))
            }
        }
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?
            .ok_or(BrowserError::NoPage)
    }

    async fn title(&self) -> Result<String> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn metrics(&self) -> Result<PageMetrics> {
        self.evaluate(METRICS_SCRIPT).await
    }

    async fn scroll_position(&self) -> Result<ScrollPosition> {
        self.evaluate(SCROLL_POSITION_SCRIPT).await
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        let script = format!("window.scrollTo({}, {})", x, y);
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, handle: NodeHandle) -> Result<()> {
        self.call_on(handle, CLICK_FUNCTION, Vec::new()).await?;
        Ok(())
    }

    async fn type_text(&self, handle: NodeHandle, text: &str) -> Result<()> {
        self.call_on(handle, TYPE_FUNCTION, vec![json!(text)]).await?;
        Ok(())
    }

    async fn element_bounds(&self, handle: NodeHandle) -> Result<Option<Rect>> {
        match self.call_on(handle, BOUNDS_FUNCTION, Vec::new()).await {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(serde_json::from_value(value)?)),
            // The backend node id no longer resolves: the element is gone.
            Err(BrowserError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn draw_overlay(&self, layer: OverlayLayer, boxes: &[OverlayBox]) -> Result<()> {
        let script = format!(
            "({})({}, {})",
            DRAW_OVERLAY,
            serde_json::to_string(layer.as_str())?,
            serde_json::to_string(boxes)?
        );
        let drawn: usize = self.evaluate(&script).await?;
        log::trace!("Drew {} {} overlay boxes", drawn, layer.as_str());
        Ok(())
    }

    async fn clear_overlay(&self, layer: OverlayLayer) -> Result<()> {
        let script = format!(
            "({})({})",
            CLEAR_OVERLAY,
            serde_json::to_string(layer.as_str())?
        );
        let _: bool = self.evaluate(&script).await?;
        Ok(())
    }

    async fn watch_changes(&self) -> Result<BoxStream<'static, PageChange>> {
        let params: runtime::AddBindingParams =
            serde_json::from_value(json!({ "name": CHANGE_BINDING }))?;
        self.page.execute(params).await?;

        let events = self
            .page
            .event_listener::<runtime::EventBindingCalled>()
            .await?;
        let _: bool = self.evaluate(WATCH_SCRIPT).await?;

        Ok(events
            .filter_map(|event| async move {
                if event.name == CHANGE_BINDING {
                    PageChange::parse(&event.payload)
                } else {
                    None
                }
            })
            .boxed())
    }

    async fn unwatch_changes(&self) -> Result<()> {
        let _: bool = self.evaluate(UNWATCH_SCRIPT).await?;
        let params: runtime::RemoveBindingParams =
            serde_json::from_value(json!({ "name": CHANGE_BINDING }))?;
        self.page.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl ViewportCapture for CdpPage {
    async fn capture_visible(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let params = match format {
            ImageFormat::Png => json!({ "format": "png" }),
            ImageFormat::Jpeg { quality } => json!({ "format": "jpeg", "quality": quality }),
        };
        let params: cdp_page::CaptureScreenshotParams = serde_json::from_value(params)?;

        let response = self
            .page
            .execute(params)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?;

        general_purpose::STANDARD
            .decode(&response.data)
            .map_err(|e| BrowserError::Screenshot(format!("Failed to decode screenshot data: {}", e)))
    }
}
