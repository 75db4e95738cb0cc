//! In-memory page used by the integration tests
//!
//! `FakePage` serves a fixed `Document`, records every call made through
//! the page seams and lets a test inject failures.

#![allow(dead_code)]

use async_trait::async_trait;
use browser_surface::dom::{Document, ElementSpec, NodeHandle};
use browser_surface::error::{BrowserError, Result};
use browser_surface::geometry::{Rect, Viewport};
use browser_surface::page::{
    CompositingSurface, ImageFormat, OverlayBox, OverlayLayer, PageChange, PageDriver,
    PageMetrics, ScrollPosition, SurfaceFactory, ViewportCapture,
};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Navigate(String),
    ScrollTo(f64, f64),
    /// Viewport capture taken at this vertical scroll offset
    Capture(f64),
    Click(i64),
    Type(i64, String),
}

pub struct FakePage {
    pub doc: Mutex<Document>,
    pub metrics: Mutex<Option<PageMetrics>>,
    pub scroll: Mutex<ScrollPosition>,
    pub scroll_read_fails: Mutex<bool>,
    pub calls: Mutex<Vec<Call>>,
    /// Values set through `type_text`, by handle
    pub values: Mutex<HashMap<i64, String>>,
    /// Events dispatched on elements, by handle
    pub events: Mutex<Vec<(i64, &'static str)>>,
    pub overlays: Mutex<HashMap<OverlayLayer, Vec<OverlayBox>>>,
    pub overlay_draws: Mutex<Vec<OverlayLayer>>,
    /// Handles whose elements have been removed from the page
    pub detached: Mutex<HashSet<i64>>,
    /// 1-based indices of viewport captures that fail
    pub failing_captures: Mutex<HashSet<usize>>,
    pub capture_count: Mutex<usize>,
    pub capture_document_fails: Mutex<bool>,
    changes: Mutex<Option<mpsc::UnboundedSender<PageChange>>>,
}

impl FakePage {
    pub fn new(doc: Document) -> Arc<Self> {
        let viewport = doc.viewport;
        Arc::new(Self {
            doc: Mutex::new(doc),
            metrics: Mutex::new(Some(PageMetrics {
                width: viewport.width,
                height: viewport.height,
                viewport_width: viewport.width,
                viewport_height: viewport.height,
                device_pixel_ratio: 1.0,
            })),
            scroll: Mutex::new(ScrollPosition::default()),
            scroll_read_fails: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
            values: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            overlays: Mutex::new(HashMap::new()),
            overlay_draws: Mutex::new(Vec::new()),
            detached: Mutex::new(HashSet::new()),
            failing_captures: Mutex::new(HashSet::new()),
            capture_count: Mutex::new(0),
            capture_document_fails: Mutex::new(false),
            changes: Mutex::new(None),
        })
    }

    /// A page of the given scroll height with a `width` x `viewport_height` window.
    pub fn tall(width: f64, height: f64, viewport_height: f64) -> Arc<Self> {
        let page = Self::new(Document::new(Viewport::new(width, viewport_height)));
        page.set_metrics(Some(PageMetrics {
            width,
            height,
            viewport_width: width,
            viewport_height,
            device_pixel_ratio: 1.0,
        }));
        page
    }

    pub fn set_metrics(&self, metrics: Option<PageMetrics>) {
        *self.metrics.lock().unwrap() = metrics;
    }

    pub fn set_scroll(&self, x: f64, y: f64) {
        *self.scroll.lock().unwrap() = ScrollPosition { x, y };
    }

    pub fn scroll(&self) -> ScrollPosition {
        *self.scroll.lock().unwrap()
    }

    pub fn fail_capture(&self, index: usize) {
        self.failing_captures.lock().unwrap().insert(index);
    }

    pub fn detach(&self, handle: NodeHandle) {
        self.detached.lock().unwrap().insert(handle.0);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn captures(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Capture(y) => Some(y),
                _ => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Click(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    pub fn overlay(&self, layer: OverlayLayer) -> Option<Vec<OverlayBox>> {
        self.overlays.lock().unwrap().get(&layer).cloned()
    }

    pub fn draw_count(&self, layer: OverlayLayer) -> usize {
        self.overlay_draws
            .lock()
            .unwrap()
            .iter()
            .filter(|l| **l == layer)
            .count()
    }

    pub fn is_watching(&self) -> bool {
        self.changes.lock().unwrap().is_some()
    }

    /// Report a page change to the current watcher, if any.
    pub fn emit(&self, change: PageChange) {
        if let Some(tx) = self.changes.lock().unwrap().as_ref() {
            let _ = tx.unbounded_send(change);
        }
    }

    /// Move an element, as a layout change would.
    pub fn move_element(&self, handle: NodeHandle, rect: Rect) {
        let mut doc = self.doc.lock().unwrap();
        if let Some(id) = doc.find_handle(handle) {
            if let Some(el) = doc.element_mut(id) {
                el.rect = Some(rect);
            }
        }
    }

    /// Handle of the first element carrying `attr="value"`.
    pub fn handle_of(&self, attr: &str, value: &str) -> NodeHandle {
        let doc = self.doc.lock().unwrap();
        doc.descendants(doc.root())
            .into_iter()
            .find(|id| doc.element(*id).and_then(|el| el.attr(attr)) == Some(value))
            .and_then(|id| doc.handle(id))
            .expect("element with attribute")
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn capture_document(&self) -> Result<Document> {
        if *self.capture_document_fails.lock().unwrap() {
            return Err(BrowserError::Other("page is gone".to_string()));
        }
        Ok(self.doc.lock().unwrap().clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Navigate(url.to_string()));
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.doc.lock().unwrap().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.doc.lock().unwrap().title.clone())
    }

    async fn metrics(&self) -> Result<PageMetrics> {
        self.metrics
            .lock()
            .unwrap()
            .ok_or_else(|| BrowserError::ScriptFailed("metrics unavailable".to_string()))
    }

    async fn scroll_position(&self) -> Result<ScrollPosition> {
        if *self.scroll_read_fails.lock().unwrap() {
            return Err(BrowserError::ScriptFailed("scroll unavailable".to_string()));
        }
        Ok(self.scroll())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.set_scroll(x, y);
        self.calls.lock().unwrap().push(Call::ScrollTo(x, y));
        Ok(())
    }

    async fn click(&self, handle: NodeHandle) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Click(handle.0));
        Ok(())
    }

    async fn type_text(&self, handle: NodeHandle, text: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Type(handle.0, text.to_string()));
        self.values
            .lock()
            .unwrap()
            .insert(handle.0, text.to_string());
        let mut events = self.events.lock().unwrap();
        events.push((handle.0, "input"));
        events.push((handle.0, "change"));
        Ok(())
    }

    async fn element_bounds(&self, handle: NodeHandle) -> Result<Option<Rect>> {
        if self.detached.lock().unwrap().contains(&handle.0) {
            return Ok(None);
        }
        let doc = self.doc.lock().unwrap();
        Ok(doc
            .find_handle(handle)
            .and_then(|id| doc.element(id))
            .and_then(|el| el.rect))
    }

    async fn draw_overlay(&self, layer: OverlayLayer, boxes: &[OverlayBox]) -> Result<()> {
        self.overlays.lock().unwrap().insert(layer, boxes.to_vec());
        self.overlay_draws.lock().unwrap().push(layer);
        Ok(())
    }

    async fn clear_overlay(&self, layer: OverlayLayer) -> Result<()> {
        self.overlays.lock().unwrap().remove(&layer);
        Ok(())
    }

    async fn watch_changes(&self) -> Result<BoxStream<'static, PageChange>> {
        let (tx, rx) = mpsc::unbounded();
        *self.changes.lock().unwrap() = Some(tx);
        Ok(rx.boxed())
    }

    async fn unwatch_changes(&self) -> Result<()> {
        self.changes.lock().unwrap().take();
        Ok(())
    }
}

#[async_trait]
impl ViewportCapture for FakePage {
    async fn capture_visible(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let index = {
            let mut count = self.capture_count.lock().unwrap();
            *count += 1;
            *count
        };
        if self.failing_captures.lock().unwrap().contains(&index) {
            return Err(BrowserError::Screenshot(format!(
                "capture {} rate limited",
                index
            )));
        }
        let y = self.scroll().y;
        self.calls.lock().unwrap().push(Call::Capture(y));
        Ok(encoded_tile(format))
    }
}

/// A small solid image in the requested format.
pub fn encoded_tile(format: ImageFormat) -> Vec<u8> {
    let tile = image::RgbImage::from_pixel(4, 4, image::Rgb([30, 60, 90]));
    let mut bytes = Vec::new();
    let format = match format {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpeg { .. } => image::ImageFormat::Jpeg,
    };
    image::DynamicImage::ImageRgb8(tile)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode tile");
    bytes
}

#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub inits: Vec<(u32, u32)>,
    /// `(x, y, width, height)` per submitted tile
    pub draws: Vec<(i64, i64, u32, u32)>,
    pub results: usize,
}

struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

#[async_trait]
impl CompositingSurface for RecordingSurface {
    async fn init(&mut self, width: u32, height: u32) -> Result<()> {
        self.log.lock().unwrap().inits.push((width, height));
        Ok(())
    }

    async fn draw(&mut self, _image: &[u8], x: i64, y: i64, width: u32, height: u32) -> Result<()> {
        self.log.lock().unwrap().draws.push((x, y, width, height));
        Ok(())
    }

    async fn get_result(&mut self) -> Result<Vec<u8>> {
        self.log.lock().unwrap().results += 1;
        Ok(b"composite".to_vec())
    }
}

/// Surface factory whose surfaces all write to one shared log.
pub fn recording_surfaces() -> (Arc<dyn SurfaceFactory>, Arc<Mutex<SurfaceLog>>) {
    let log = Arc::new(Mutex::new(SurfaceLog::default()));
    let shared = log.clone();
    let factory: Arc<dyn SurfaceFactory> = Arc::new(move || {
        Box::new(RecordingSurface {
            log: shared.clone(),
        }) as Box<dyn CompositingSurface>
    });
    (factory, log)
}

/// Sign-in form: a link, a text input and a submit button, plus a hidden
/// button and one far below the fold.
pub fn login_page() -> Document {
    let mut doc = Document::new(Viewport::new(1024.0, 768.0));
    doc.url = "https://example.com/login".to_string();
    doc.title = "Sign in".to_string();
    let body = doc.body().expect("body");

    doc.append(
        body,
        ElementSpec::new("nav")
            .rect(0.0, 0.0, 1024.0, 40.0)
            .child(
                ElementSpec::new("a")
                    .attr("href", "/")
                    .attr("data-test", "home")
                    .rect(10.0, 10.0, 60.0, 20.0)
                    .text("Home"),
            ),
    );
    doc.append(
        body,
        ElementSpec::new("form")
            .rect(0.0, 100.0, 1024.0, 300.0)
            .child(
                ElementSpec::new("p")
                    .rect(10.0, 100.0, 600.0, 20.0)
                    .text("Please sign in to continue."),
            )
            .child(
                ElementSpec::new("input")
                    .attr("type", "email")
                    .attr("placeholder", "Email address")
                    .attr("data-test", "email")
                    .rect(10.0, 150.0, 300.0, 30.0),
            )
            .child(
                ElementSpec::new("button")
                    .attr("type", "submit")
                    .attr("data-test", "submit")
                    .rect(10.0, 200.0, 120.0, 30.0)
                    .text("Sign in"),
            )
            .child(
                ElementSpec::new("button")
                    .attr("data-test", "hidden")
                    .display("none")
                    .text("Secret"),
            ),
    );
    doc.append(
        body,
        ElementSpec::new("button")
            .attr("data-test", "below-fold")
            .rect(10.0, 2000.0, 120.0, 30.0)
            .text("Load more"),
    );
    doc
}
