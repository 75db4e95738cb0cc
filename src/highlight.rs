//! Highlight and debug overlays
//!
//! Draws boxes over live elements so a human watching the browser can see
//! what the agent is about to touch (`highlight`) or every ref of the
//! current snapshot (`toggle_debug`).

use crate::error::Result;
use crate::geometry::Bounds;
use crate::page::{OverlayBox, OverlayLayer, PageDriver};
use crate::refs::RefTable;
use crate::snapshot::SnapshotEngine;
use crate::timer::{CancellableTimer, Debouncer};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_secs(2);
pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone)]
pub struct HighlightConfig {
    /// How long a highlight box stays on screen
    pub duration: Duration,
    /// Coalescing window for debug badge refreshes
    pub refresh_debounce: Duration,
    /// Snapshot limit used when debug mode is switched on
    pub snapshot_limit: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_HIGHLIGHT_DURATION,
            refresh_debounce: DEFAULT_REFRESH_DEBOUNCE,
            snapshot_limit: crate::snapshot::DEFAULT_SNAPSHOT_LIMIT,
        }
    }
}

pub struct Highlighter {
    driver: Arc<dyn PageDriver>,
    engine: Arc<SnapshotEngine>,
    config: HighlightConfig,
    expiry: Mutex<CancellableTimer>,
    debug: Mutex<Option<JoinHandle<()>>>,
}

impl Highlighter {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        engine: Arc<SnapshotEngine>,
        config: HighlightConfig,
    ) -> Self {
        Self {
            driver,
            engine,
            config,
            expiry: Mutex::new(CancellableTimer::new()),
            debug: Mutex::new(None),
        }
    }

    /// Outline the element behind `ref_id` for a short while.
    ///
    /// Any previous highlight is removed first. Returns false when the ref
    /// does not resolve or its element is gone from the page.
    pub async fn highlight(&self, ref_id: u32) -> Result<bool> {
        let mut expiry = self.expiry.lock().await;
        expiry.cancel();
        self.driver.clear_overlay(OverlayLayer::Highlight).await?;

        let Some(handle) = self.engine.resolve(ref_id).await else {
            log::debug!("Highlight skipped, ref {} not in table", ref_id);
            return Ok(false);
        };
        let Some(rect) = self.driver.element_bounds(handle).await? else {
            log::debug!("Highlight skipped, ref {} is detached", ref_id);
            return Ok(false);
        };

        let overlay = OverlayBox {
            bounds: Bounds::from_rect(&rect),
            label: None,
        };
        self.driver
            .draw_overlay(OverlayLayer::Highlight, &[overlay])
            .await?;

        let driver = self.driver.clone();
        expiry.schedule(self.config.duration, async move {
            if let Err(e) = driver.clear_overlay(OverlayLayer::Highlight).await {
                log::warn!("Failed to clear expired highlight: {}", e);
            }
        });

        Ok(true)
    }

    /// Switch the persistent ref badges on or off.
    ///
    /// Enabling takes a fresh snapshot (replacing the ref table), draws a
    /// badge per entry and keeps the badges in place across scrolling,
    /// resizing and DOM changes until disabled. Returns the number of
    /// badges drawn.
    pub async fn toggle_debug(&self, enabled: bool) -> Result<usize> {
        let mut debug = self.debug.lock().await;

        if let Some(task) = debug.take() {
            task.abort();
            if let Err(e) = self.driver.unwatch_changes().await {
                log::warn!("Failed to remove page change listeners: {}", e);
            }
        }

        if !enabled {
            self.driver.clear_overlay(OverlayLayer::Debug).await?;
            log::info!("Debug overlay disabled");
            return Ok(0);
        }

        self.engine.generate(self.config.snapshot_limit).await?;
        let table = self.engine.current().await;
        let drawn = render_badges(&*self.driver, &*table).await?;

        let mut changes = self.driver.watch_changes().await?;
        let driver = self.driver.clone();
        let engine = self.engine.clone();
        let window = self.config.refresh_debounce;

        *debug = Some(tokio::spawn(async move {
            let mut debouncer = Debouncer::new(window);
            while let Some(change) = changes.next().await {
                log::trace!("Page change {:?}, scheduling badge refresh", change);
                let driver = driver.clone();
                let engine = engine.clone();
                debouncer.call(async move {
                    let table = engine.current().await;
                    if let Err(e) = render_badges(&*driver, &*table).await {
                        log::warn!("Debug badge refresh failed: {}", e);
                    }
                });
            }
            log::debug!("Page change stream closed");
        }));

        log::info!("Debug overlay enabled with {} badges", drawn);
        Ok(drawn)
    }

    pub async fn is_debug_enabled(&self) -> bool {
        self.debug.lock().await.is_some()
    }
}

impl Drop for Highlighter {
    fn drop(&mut self) {
        if let Some(task) = self.debug.get_mut().take() {
            task.abort();
        }
    }
}

/// Redraw one badge per ref at its element's live position. Elements that
/// are detached or collapsed to zero size are left out.
async fn render_badges(driver: &dyn PageDriver, table: &RefTable) -> Result<usize> {
    let mut badges = Vec::with_capacity(table.len());

    for (ref_id, handle) in table.iter() {
        let rect = match driver.element_bounds(handle).await {
            Ok(Some(rect)) => rect,
            Ok(None) => continue,
            Err(e) => {
                log::debug!("Skipping badge for ref {}: {}", ref_id, e);
                continue;
            }
        };
        let bounds = Bounds::from_rect(&rect);
        if bounds.is_empty() {
            continue;
        }
        badges.push(OverlayBox {
            bounds,
            label: Some(ref_id.to_string()),
        });
    }

    driver.draw_overlay(OverlayLayer::Debug, &badges).await?;
    Ok(badges.len())
}
