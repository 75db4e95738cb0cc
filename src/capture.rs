//! Full-page capture
//!
//! Produces one image of a page taller than the viewport by scrolling
//! through it, capturing each viewport-sized tile and stitching the tiles
//! on a compositing surface.
//!
//! ```text
//! Idle -> MeasuringPage -> (ViewportOnly | Tiling) -> Compositing -> Restoring -> Done
//! ```
//!
//! Anything that goes wrong on the way degrades to a plain viewport capture;
//! a partial composite is never returned. The original scroll position is
//! restored on every exit path.

use crate::error::{BrowserError, CaptureError, Result};
use crate::page::{ImageFormat, PageDriver, PageMetrics, ScrollPosition, SurfaceFactory, ViewportCapture};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Pages taller than this are never tiled
    pub max_page_height: f64,
    /// Wait after each scroll so the page can re-render (also keeps the
    /// capture rate under the host's limit)
    pub settle_delay: Duration,
    /// Hard bound on the number of tiles
    pub max_iterations: usize,
    pub tile_format: ImageFormat,
    /// Format of single-viewport captures, including fallbacks
    pub viewport_format: ImageFormat,
    /// Encoding of the stitched result
    pub composite_format: ImageFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_page_height: 10_000.0,
            settle_delay: Duration::from_millis(500),
            max_iterations: 50,
            tile_format: ImageFormat::Png,
            viewport_format: ImageFormat::Jpeg { quality: 50 },
            composite_format: ImageFormat::Jpeg { quality: 80 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// One capture of the visible viewport
    Viewport,
    /// Tiles stitched into a full-page image
    FullPage,
}

/// An encoded image plus how it was produced.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub mode: CaptureMode,
    pub tiles: usize,
    /// Why a full-page request ended up as a viewport capture
    pub fallback_reason: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    fn viewport(data: Vec<u8>, format: ImageFormat, fallback_reason: Option<String>) -> Self {
        Self {
            data,
            format,
            mode: CaptureMode::Viewport,
            tiles: 1,
            fallback_reason,
            captured_at: Utc::now(),
        }
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// Restores a saved scroll position when the capture session ends.
///
/// Call [`ScrollGuard::restore`] on every normal exit; if the guard is
/// dropped without it (cancelled future, panic) the restore is spawned
/// instead.
pub struct ScrollGuard {
    driver: Arc<dyn PageDriver>,
    original: ScrollPosition,
    restored: bool,
}

impl ScrollGuard {
    pub fn new(driver: Arc<dyn PageDriver>, original: ScrollPosition) -> Self {
        Self {
            driver,
            original,
            restored: false,
        }
    }

    pub fn original(&self) -> ScrollPosition {
        self.original
    }

    pub async fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.driver.scroll_to(self.original.x, self.original.y).await
    }
}

impl Drop for ScrollGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        let driver = self.driver.clone();
        let ScrollPosition { x, y } = self.original;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = driver.scroll_to(x, y).await {
                        log::warn!("Could not restore scroll position: {}", e);
                    }
                });
            }
            Err(_) => log::warn!("No runtime to restore scroll position ({}, {})", x, y),
        }
    }
}

pub struct FullPageCapture {
    driver: Arc<dyn PageDriver>,
    capturer: Arc<dyn ViewportCapture>,
    surfaces: Arc<dyn SurfaceFactory>,
    config: CaptureConfig,
}

impl FullPageCapture {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        capturer: Arc<dyn ViewportCapture>,
        surfaces: Arc<dyn SurfaceFactory>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            driver,
            capturer,
            surfaces,
            config,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture the whole page, degrading to the visible viewport when the
    /// page cannot or should not be tiled.
    ///
    /// Only fails when even the viewport capture fails.
    pub async fn capture(&self) -> Result<CapturedImage> {
        log::debug!("Capture: measuring page");
        let (metrics, original) = match self.measure().await {
            Ok(measured) => measured,
            Err(e) => return self.fallback(e).await,
        };

        if metrics.height > self.config.max_page_height {
            return self
                .fallback(CaptureError::TooTall {
                    height: metrics.height,
                    limit: self.config.max_page_height,
                })
                .await;
        }

        if metrics.height <= metrics.viewport_height {
            log::debug!("Capture: page fits the viewport, single capture");
            let format = self.config.viewport_format;
            let data = self.capturer.capture_visible(format).await?;
            return Ok(CapturedImage::viewport(data, format, None));
        }

        let guard = ScrollGuard::new(self.driver.clone(), original);
        let tiled = self.tile(&metrics).await;

        log::debug!("Capture: restoring scroll to ({}, {})", original.x, original.y);
        if let Err(e) = guard.restore().await {
            log::warn!("Could not restore scroll position: {}", e);
        }

        match tiled {
            Ok((data, tiles)) => {
                log::info!(
                    "Captured full page {}x{} in {} tiles",
                    metrics.width,
                    metrics.height,
                    tiles
                );
                Ok(CapturedImage {
                    data,
                    format: self.config.composite_format,
                    mode: CaptureMode::FullPage,
                    tiles,
                    fallback_reason: None,
                    captured_at: Utc::now(),
                })
            }
            Err(e) => self.fallback(e).await,
        }
    }

    /// Capture only the visible viewport.
    pub async fn capture_viewport(&self) -> Result<CapturedImage> {
        let format = self.config.viewport_format;
        let data = self.capturer.capture_visible(format).await?;
        Ok(CapturedImage::viewport(data, format, None))
    }

    async fn measure(&self) -> std::result::Result<(PageMetrics, ScrollPosition), CaptureError> {
        let original = self
            .driver
            .scroll_position()
            .await
            .map_err(|e| CaptureError::Measurement(format!("scroll position: {}", e)))?;
        let metrics = self
            .driver
            .metrics()
            .await
            .map_err(|e| CaptureError::Measurement(format!("metrics: {}", e)))?;

        if !(metrics.viewport_height > 0.0 && metrics.width > 0.0 && metrics.height > 0.0) {
            return Err(CaptureError::Measurement(format!(
                "unusable page metrics {:?}",
                metrics
            )));
        }
        Ok((metrics, original))
    }

    async fn tile(&self, metrics: &PageMetrics) -> std::result::Result<(Vec<u8>, usize), CaptureError> {
        let mut surface = self.surfaces.create();
        surface
            .init(metrics.width.round() as u32, metrics.height.round() as u32)
            .await
            .map_err(|e| CaptureError::Composite(e.to_string()))?;

        let tile_width = metrics.viewport_width.round() as u32;
        let tile_height = metrics.viewport_height.round() as u32;
        let mut y = 0.0;
        let mut iterations = 0;

        log::debug!("Capture: tiling {}px page", metrics.height);
        while y < metrics.height && iterations < self.config.max_iterations {
            iterations += 1;

            self.driver
                .scroll_to(0.0, y)
                .await
                .map_err(|e| tile_error(y, e))?;
            tokio::time::sleep(self.config.settle_delay).await;

            let data = self
                .capturer
                .capture_visible(self.config.tile_format)
                .await
                .map_err(|e| tile_error(y, e))?;
            surface
                .draw(&data, 0, y.round() as i64, tile_width, tile_height)
                .await
                .map_err(|e| tile_error(y, e))?;

            y += metrics.viewport_height;
        }

        log::debug!("Capture: compositing {} tiles", iterations);
        let data = surface
            .get_result()
            .await
            .map_err(|e| CaptureError::Composite(e.to_string()))?;
        Ok((data, iterations))
    }

    async fn fallback(&self, reason: CaptureError) -> Result<CapturedImage> {
        log::warn!("Full-page capture abandoned, using viewport: {}", reason);
        let format = self.config.viewport_format;
        let data = self.capturer.capture_visible(format).await?;
        Ok(CapturedImage::viewport(data, format, Some(reason.to_string())))
    }
}

fn tile_error(offset: f64, e: BrowserError) -> CaptureError {
    CaptureError::Tile {
        offset,
        reason: e.to_string(),
    }
}
