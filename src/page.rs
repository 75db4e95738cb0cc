//! Page seams
//!
//! Everything the engine needs from a live page goes through the traits in
//! this module. [`crate::browser::page::CdpPage`] implements them over the
//! Chrome DevTools Protocol; tests use in-memory fakes.

use crate::dom::{Document, NodeHandle};
use crate::error::Result;
use crate::geometry::{Bounds, Rect};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Document scroll size and window size, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub width: f64,
    pub height: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub device_pixel_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Independent overlay layers; clearing one leaves the other in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayLayer {
    /// Short-lived box around the element an action is about to touch
    Highlight,
    /// Persistent ref badges
    Debug,
}

impl OverlayLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayLayer::Highlight => "highlight",
            OverlayLayer::Debug => "debug",
        }
    }
}

/// One box drawn over the page, optionally labeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayBox {
    pub bounds: Bounds,
    pub label: Option<String>,
}

/// Page activity that can invalidate drawn overlay positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageChange {
    Scroll,
    Resize,
    Mutation,
}

impl PageChange {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scroll" => Some(PageChange::Scroll),
            "resize" => Some(PageChange::Resize),
            "mutation" => Some(PageChange::Mutation),
            _ => None,
        }
    }
}

/// Encoding requested from a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u8 },
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Readable text of a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub text: String,
    pub title: String,
    pub url: String,
}

/// Operations on a live page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Capture the current element tree with styles and layout.
    async fn capture_document(&self) -> Result<Document>;

    /// Start loading `url`. Returns once the request has been issued.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Address of the loaded document.
    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn metrics(&self) -> Result<PageMetrics>;

    async fn scroll_position(&self) -> Result<ScrollPosition>;

    /// Scroll to absolute document coordinates.
    async fn scroll_to(&self, x: f64, y: f64) -> Result<()>;

    /// Dispatch a synthetic activation on the element.
    async fn click(&self, handle: NodeHandle) -> Result<()>;

    /// Focus the element, set its value and fire `input` then `change`.
    async fn type_text(&self, handle: NodeHandle, text: &str) -> Result<()>;

    /// Current viewport-relative box, or `None` once the element is detached.
    async fn element_bounds(&self, handle: NodeHandle) -> Result<Option<Rect>>;

    /// Replace the contents of an overlay layer.
    async fn draw_overlay(&self, layer: OverlayLayer, boxes: &[OverlayBox]) -> Result<()>;

    async fn clear_overlay(&self, layer: OverlayLayer) -> Result<()>;

    /// Subscribe to scroll, resize and DOM mutation notifications.
    ///
    /// Mutations caused by the overlays themselves are not reported.
    async fn watch_changes(&self) -> Result<BoxStream<'static, PageChange>>;

    async fn unwatch_changes(&self) -> Result<()>;
}

/// Single-viewport screenshot primitive.
#[async_trait]
pub trait ViewportCapture: Send + Sync {
    async fn capture_visible(&self, format: ImageFormat) -> Result<Vec<u8>>;
}

/// Canvas that stitches tiles into one image.
///
/// A surface serves exactly one capture session.
#[async_trait]
pub trait CompositingSurface: Send {
    async fn init(&mut self, width: u32, height: u32) -> Result<()>;

    /// Place an encoded tile at `(x, y)`, scaled to `width` x `height`.
    async fn draw(&mut self, image: &[u8], x: i64, y: i64, width: u32, height: u32) -> Result<()>;

    async fn get_result(&mut self) -> Result<Vec<u8>>;
}

/// Produces a fresh surface for each capture session.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self) -> Box<dyn CompositingSurface>;
}

impl<F> SurfaceFactory for F
where
    F: Fn() -> Box<dyn CompositingSurface> + Send + Sync,
{
    fn create(&self) -> Box<dyn CompositingSurface> {
        self()
    }
}

/// Readable-text extraction, possibly with site-specific strategies.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// `max_length` is a hint; the returned text may be longer and is
    /// truncated by the caller.
    async fn extract(&self, max_length: usize) -> Result<PageContent>;
}
