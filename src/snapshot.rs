//! Snapshot engine
//!
//! Walks a captured [`Document`] and lists its visible interactive elements,
//! assigning each a ref. Every run produces a new [`RefTable`] that replaces
//! the previous one.

use crate::classify::is_interactive;
use crate::dom::{Document, NodeHandle, NodeId};
use crate::error::Result;
use crate::geometry::{is_style_hidden, is_visible, Bounds};
use crate::naming::{accessible_name, element_role};
use crate::page::PageDriver;
use crate::refs::{RefTable, RefTableBuilder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_SNAPSHOT_LIMIT: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(rename = "ref")]
    pub ref_id: u32,
    pub role: String,
    pub name: String,
    pub tag: String,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub elements: Vec<SnapshotEntry>,
}

/// Build a snapshot of `doc` holding at most `limit` entries.
///
/// Traversal is pre-order from `<body>`: an element comes before its light
/// children, which come before the children of its open shadow root. The
/// walk stops entirely once `limit` entries are collected.
pub fn generate_snapshot(doc: &Document, limit: usize, generation: u64) -> (Snapshot, RefTable) {
    let mut refs = RefTableBuilder::new(generation);
    let mut elements = Vec::new();

    if limit == 0 {
        return (Snapshot { elements }, refs.build());
    }

    let start = doc
        .body()
        .or_else(|| doc.document_element())
        .unwrap_or_else(|| doc.root());
    let mut stack: Vec<NodeId> = vec![start];

    while let Some(id) = stack.pop() {
        let Some(el) = doc.element(id) else {
            continue;
        };

        if el.is_agent_ui() {
            continue;
        }
        if el.style.as_ref().is_some_and(is_style_hidden) {
            continue;
        }

        if is_interactive(el) && is_visible(el.style.as_ref(), el.rect.as_ref(), &doc.viewport) {
            let Some(handle) = doc.handle(id) else {
                continue;
            };
            let ref_id = refs.assign(handle);
            elements.push(SnapshotEntry {
                ref_id,
                role: element_role(doc, id),
                name: accessible_name(doc, id),
                tag: el.tag_name.clone(),
                bounds: el.rect.as_ref().map(Bounds::from_rect).unwrap_or_default(),
            });

            if elements.len() >= limit {
                break;
            }
        }

        // Pushed in reverse so shadow children pop after light children.
        if let Some(shadow) = doc.open_shadow_root(id) {
            stack.extend(doc.element_children(shadow).collect::<Vec<_>>().into_iter().rev());
        }
        stack.extend(doc.element_children(id).collect::<Vec<_>>().into_iter().rev());
    }

    (Snapshot { elements }, refs.build())
}

/// Owns the current ref table of one page.
pub struct SnapshotEngine {
    driver: Arc<dyn PageDriver>,
    table: RwLock<Arc<RefTable>>,
    generation: AtomicU64,
}

impl SnapshotEngine {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver,
            table: RwLock::new(Arc::new(RefTable::empty(0))),
            generation: AtomicU64::new(0),
        }
    }

    /// Capture the page, rebuild the ref table and return the new entries.
    pub async fn generate(&self, limit: usize) -> Result<Snapshot> {
        let doc = self.driver.capture_document().await?;
        let generation = self.next_generation();
        let (snapshot, table) = generate_snapshot(&doc, limit, generation);

        log::debug!(
            "Snapshot generation {} of {}: {} elements (limit {})",
            generation,
            doc.url,
            snapshot.elements.len(),
            limit
        );

        *self.table.write().await = Arc::new(table);
        Ok(snapshot)
    }

    /// The table produced by the most recent snapshot.
    pub async fn current(&self) -> Arc<RefTable> {
        self.table.read().await.clone()
    }

    pub async fn resolve(&self, ref_id: u32) -> Option<NodeHandle> {
        self.current().await.get(ref_id)
    }

    /// Drop every ref, e.g. after the page navigates away.
    pub async fn invalidate(&self) {
        let generation = self.next_generation();
        *self.table.write().await = Arc::new(RefTable::empty(generation));
        log::debug!("Ref table invalidated (generation {})", generation);
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}
