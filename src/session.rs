//! Page session
//!
//! Wires one page's snapshot engine, overlays, action executor and capture
//! pipeline together and answers channel requests for it.

use crate::actions::{ActionDefaults, ActionExecutor, ActionResult};
use crate::capture::{CaptureConfig, CapturedImage, FullPageCapture};
use crate::channel::PageRequest;
use crate::compositor::{ImageCompositor, DEFAULT_COMPOSITE_QUALITY};
use crate::content::{truncate_text, DomContentExtractor, DEFAULT_MAX_CONTENT_LENGTH};
use crate::error::{ActionError, BrowserError, Result};
use crate::highlight::{
    HighlightConfig, Highlighter, DEFAULT_HIGHLIGHT_DURATION, DEFAULT_REFRESH_DEBOUNCE,
};
use crate::page::{
    CompositingSurface, ContentExtractor, ImageFormat, PageDriver, SurfaceFactory,
    ViewportCapture,
};
use crate::snapshot::{SnapshotEngine, DEFAULT_SNAPSHOT_LIMIT};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const VIEWPORT_CAPTURE_ATTEMPTS: u32 = 3;
const VIEWPORT_RETRY_BACKOFF: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub snapshot_limit: usize,
    pub content_max_length: usize,
    pub highlight_duration: Duration,
    pub debug_refresh_debounce: Duration,
    pub capture: CaptureConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            content_max_length: DEFAULT_MAX_CONTENT_LENGTH,
            highlight_duration: DEFAULT_HIGHLIGHT_DURATION,
            debug_refresh_debounce: DEFAULT_REFRESH_DEBOUNCE,
            capture: CaptureConfig::default(),
        }
    }
}

pub struct PageSession {
    driver: Arc<dyn PageDriver>,
    engine: Arc<SnapshotEngine>,
    highlighter: Arc<Highlighter>,
    executor: ActionExecutor,
    content: Arc<dyn ContentExtractor>,
    capture: FullPageCapture,
    options: SessionOptions,
    /// Serializes everything that reads or scrolls the page as a whole
    page_lock: Mutex<()>,
}

impl PageSession {
    /// Session with the DOM content extractor and the in-process compositor.
    pub fn new(
        driver: Arc<dyn PageDriver>,
        capturer: Arc<dyn ViewportCapture>,
        options: SessionOptions,
    ) -> Self {
        let content = Arc::new(DomContentExtractor::new(driver.clone()));
        let quality = match options.capture.composite_format {
            ImageFormat::Jpeg { quality } => quality,
            ImageFormat::Png => DEFAULT_COMPOSITE_QUALITY,
        };
        let surfaces: Arc<dyn SurfaceFactory> = Arc::new(move || {
            Box::new(ImageCompositor::with_quality(quality)) as Box<dyn CompositingSurface>
        });
        Self::with_parts(driver, capturer, content, surfaces, options)
    }

    pub fn with_parts(
        driver: Arc<dyn PageDriver>,
        capturer: Arc<dyn ViewportCapture>,
        content: Arc<dyn ContentExtractor>,
        surfaces: Arc<dyn SurfaceFactory>,
        options: SessionOptions,
    ) -> Self {
        let engine = Arc::new(SnapshotEngine::new(driver.clone()));
        let highlighter = Arc::new(Highlighter::new(
            driver.clone(),
            engine.clone(),
            HighlightConfig {
                duration: options.highlight_duration,
                refresh_debounce: options.debug_refresh_debounce,
                snapshot_limit: options.snapshot_limit,
            },
        ));
        let executor = ActionExecutor::new(
            driver.clone(),
            engine.clone(),
            highlighter.clone(),
            content.clone(),
            ActionDefaults {
                content_max_length: options.content_max_length,
                element_limit: options.snapshot_limit,
            },
        );
        let capture = FullPageCapture::new(
            driver.clone(),
            capturer,
            surfaces,
            options.capture.clone(),
        );

        Self {
            driver,
            engine,
            highlighter,
            executor,
            content,
            capture,
            options,
            page_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<SnapshotEngine> {
        &self.engine
    }

    pub fn highlighter(&self) -> &Arc<Highlighter> {
        &self.highlighter
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Answer one raw channel request.
    ///
    /// `execute` answers with the action result itself; every other request
    /// is wrapped as `{ success: true, data }` or `{ success: false, error }`.
    pub async fn handle(&self, request: &Value) -> Value {
        let result = match PageRequest::parse(request) {
            Ok(PageRequest::Execute { command }) => {
                let _page = self.page_lock.lock().await;
                self.executor.execute(&command).await
            }
            Ok(request) => {
                let name = request.name();
                match self.dispatch(request).await {
                    Ok(data) => ActionResult::ok(Some(data)),
                    Err(e) => {
                        log::error!("Request {} failed: {}", name, e);
                        ActionResult::failure(e.to_string())
                    }
                }
            }
            Err(e) => {
                log::warn!("Rejected request: {}", e);
                ActionResult::failure(e.to_string())
            }
        };

        serde_json::to_value(result).unwrap_or_else(|e| {
            json!({ "success": false, "error": format!("Failed to encode response: {}", e) })
        })
    }

    pub async fn dispatch(&self, request: PageRequest) -> std::result::Result<Value, ActionError> {
        log::debug!("Handling {:?}", request);

        let data = match request {
            PageRequest::GetContext { max_length } => {
                let max_length = max_length.unwrap_or(self.options.content_max_length);
                self.context(max_length).await
            }
            PageRequest::GetSnapshot { limit } => {
                let _page = self.page_lock.lock().await;
                let snapshot = self
                    .engine
                    .generate(limit.unwrap_or(self.options.snapshot_limit))
                    .await?;
                serde_json::to_value(snapshot).map_err(BrowserError::from)?
            }
            PageRequest::GetMetrics => {
                serde_json::to_value(self.driver.metrics().await?).map_err(BrowserError::from)?
            }
            PageRequest::GetScrollPosition => {
                serde_json::to_value(self.driver.scroll_position().await?)
                    .map_err(BrowserError::from)?
            }
            PageRequest::ScrollTo { x, y } => {
                self.driver.scroll_to(x, y).await?;
                json!({ "x": x, "y": y })
            }
            PageRequest::Highlight { ref_id } => {
                let _page = self.page_lock.lock().await;
                let found = self.highlighter.highlight(ref_id).await?;
                json!({ "highlighted": found })
            }
            PageRequest::Execute { command } => {
                let _page = self.page_lock.lock().await;
                serde_json::to_value(self.executor.execute(&command).await)
                    .map_err(BrowserError::from)?
            }
            PageRequest::ToggleDebug { enabled } => {
                let _page = self.page_lock.lock().await;
                let badges = self.highlighter.toggle_debug(enabled).await?;
                json!({ "enabled": enabled, "badges": badges })
            }
            PageRequest::CaptureScreenshot { full_page } => {
                let _page = self.page_lock.lock().await;
                let image = if full_page {
                    self.capture.capture().await?
                } else {
                    self.capture_viewport().await?
                };
                screenshot_json(&image)
            }
        };
        Ok(data)
    }

    /// Readable page text; degrades to empty text instead of failing.
    async fn context(&self, max_length: usize) -> Value {
        match self.content.extract(max_length).await {
            Ok(content) => json!({
                "text": truncate_text(&content.text, max_length),
                "title": content.title,
                "url": content.url,
            }),
            Err(e) => {
                log::warn!("Content extraction failed: {}", e);
                let title = self.driver.title().await.unwrap_or_default();
                let url = self.driver.url().await.unwrap_or_default();
                json!({ "text": "", "title": title, "url": url })
            }
        }
    }

    async fn capture_viewport(&self) -> Result<CapturedImage> {
        let mut attempt = 1;
        loop {
            match self.capture.capture_viewport().await {
                Ok(image) => return Ok(image),
                Err(e) if attempt < VIEWPORT_CAPTURE_ATTEMPTS => {
                    log::warn!(
                        "Viewport capture attempt {}/{} failed: {}",
                        attempt,
                        VIEWPORT_CAPTURE_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(VIEWPORT_RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn screenshot_json(image: &CapturedImage) -> Value {
    json!({
        "dataUrl": image.data_url(),
        "mode": image.mode,
        "tiles": image.tiles,
        "fallbackReason": image.fallback_reason,
        "timestamp": image.captured_at.to_rfc3339(),
    })
}
