//! In-process compositing surface
//!
//! Stitches viewport tiles into one canvas with the `image` crate and
//! encodes the result as JPEG.

use crate::error::{BrowserError, Result};
use crate::page::CompositingSurface;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

pub const DEFAULT_COMPOSITE_QUALITY: u8 = 80;

pub struct ImageCompositor {
    canvas: Option<RgbaImage>,
    quality: u8,
}

impl ImageCompositor {
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_COMPOSITE_QUALITY)
    }

    pub fn with_quality(quality: u8) -> Self {
        Self {
            canvas: None,
            quality: quality.clamp(1, 100),
        }
    }

    fn canvas_mut(&mut self) -> Result<&mut RgbaImage> {
        self.canvas
            .as_mut()
            .ok_or_else(|| BrowserError::Screenshot("compositing surface not initialized".to_string()))
    }
}

impl Default for ImageCompositor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompositingSurface for ImageCompositor {
    async fn init(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BrowserError::Screenshot(format!(
                "invalid canvas size {}x{}",
                width, height
            )));
        }
        self.canvas = Some(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])));
        Ok(())
    }

    async fn draw(&mut self, image: &[u8], x: i64, y: i64, width: u32, height: u32) -> Result<()> {
        let tile = image::load_from_memory(image)
            .map_err(|e| BrowserError::Screenshot(format!("Failed to decode tile: {}", e)))?
            .to_rgba8();

        // Screenshots come in device pixels; the canvas is in CSS pixels.
        let tile = if tile.dimensions() == (width, height) {
            tile
        } else {
            imageops::resize(&tile, width.max(1), height.max(1), FilterType::Triangle)
        };

        imageops::replace(self.canvas_mut()?, &tile, x, y);
        Ok(())
    }

    async fn get_result(&mut self) -> Result<Vec<u8>> {
        let quality = self.quality;
        let canvas = self.canvas_mut()?;
        let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();

        let mut bytes = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
            .map_err(|e| BrowserError::Screenshot(format!("Failed to encode composite: {}", e)))?;

        log::debug!(
            "Encoded {}x{} composite ({} bytes)",
            rgb.width(),
            rgb.height(),
            bytes.len()
        );
        Ok(bytes)
    }
}
