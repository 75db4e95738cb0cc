//! DOMSnapshot decoding
//!
//! Turns the response of CDP's `DOMSnapshot.captureSnapshot` into a
//! [`Document`]. The response is a string table plus parallel arrays; node
//! `i` is described by the `i`-th entry of every node array, and rendered
//! nodes additionally have a layout entry pointing back at them.

use super::{ComputedStyle, Document, ElementData, NodeHandle, NodeId, NodeKind, ShadowRootMode};
use crate::error::{BrowserError, Result};
use crate::geometry::{Rect, Viewport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Computed style properties requested from the snapshot, in layout order.
pub const SNAPSHOT_STYLES: [&str; 4] = ["display", "visibility", "opacity", "cursor"];

const ELEMENT_NODE: i64 = 1;
const TEXT_NODE: i64 = 3;
const DOCUMENT_NODE: i64 = 9;
const DOCUMENT_FRAGMENT_NODE: i64 = 11;

/// CDP DOMSnapshot captureSnapshot response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSnapshotResponse {
    /// Array of document snapshots (the main frame first, then iframes)
    pub documents: Vec<DocumentSnapshot>,

    /// String table - all strings are stored as indexes into this array
    pub strings: Vec<String>,
}

/// A snapshot of a single document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(rename = "documentURL")]
    pub document_url: i64,

    pub title: i64,

    pub nodes: NodeTreeSnapshot,

    pub layout: LayoutTreeSnapshot,

    #[serde(rename = "scrollOffsetX", default)]
    pub scroll_offset_x: Option<f64>,

    #[serde(rename = "scrollOffsetY", default)]
    pub scroll_offset_y: Option<f64>,
}

/// DOM node tree as parallel arrays
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTreeSnapshot {
    #[serde(rename = "parentIndex", default)]
    pub parent_index: Option<Vec<i64>>,

    #[serde(rename = "nodeType", default)]
    pub node_type: Option<Vec<i64>>,

    /// Set for shadow root fragments: `open`, `closed` or `user-agent`
    #[serde(rename = "shadowRootType", default)]
    pub shadow_root_type: Option<RareStringData>,

    #[serde(rename = "nodeName", default)]
    pub node_name: Option<Vec<i64>>,

    #[serde(rename = "nodeValue", default)]
    pub node_value: Option<Vec<i64>>,

    #[serde(rename = "backendNodeId", default)]
    pub backend_node_id: Option<Vec<i64>>,

    /// Flattened `[name, value, name, value, ...]` string indexes per node
    #[serde(default)]
    pub attributes: Option<Vec<Vec<i64>>>,

    #[serde(rename = "inputValue", default)]
    pub input_value: Option<RareStringData>,
}

/// Layout tree: one entry per node that has a layout object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutTreeSnapshot {
    #[serde(rename = "nodeIndex")]
    pub node_index: Vec<i64>,

    /// Computed style string indexes, ordered as [`SNAPSHOT_STYLES`]
    pub styles: Vec<Vec<i64>>,

    /// `[x, y, width, height]` in document coordinates
    pub bounds: Vec<Vec<f64>>,
}

/// Sparse string data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RareStringData {
    pub index: Vec<i64>,
    pub value: Vec<i64>,
}

impl RareStringData {
    fn to_map(&self) -> HashMap<usize, i64> {
        self.index
            .iter()
            .zip(self.value.iter())
            .filter_map(|(i, v)| usize::try_from(*i).ok().map(|i| (i, *v)))
            .collect()
    }
}

struct StringTable<'a>(&'a [String]);

impl<'a> StringTable<'a> {
    fn get(&self, index: i64) -> Option<&'a str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
    }
}

struct LayoutEntry {
    style: ComputedStyle,
    rect: Option<Rect>,
}

/// Decode the main-frame document of a snapshot response.
///
/// Layout boxes are shifted by the document's scroll offset so they end up
/// relative to the viewport. Nodes that cannot be decoded are skipped along
/// with their subtrees; they never abort the whole decode.
pub fn decode_snapshot(response: &CaptureSnapshotResponse, viewport: Viewport) -> Result<Document> {
    let snapshot = response
        .documents
        .first()
        .ok_or_else(|| BrowserError::Decode("snapshot contains no documents".to_string()))?;
    let strings = StringTable(&response.strings);

    let url = strings.get(snapshot.document_url).unwrap_or_default();
    let mut doc = Document::empty(url, viewport);
    doc.title = strings
        .get(snapshot.title)
        .unwrap_or_default()
        .trim()
        .to_string();

    let nodes = &snapshot.nodes;
    let parents = nodes.parent_index.as_deref().unwrap_or_default();
    let types = nodes.node_type.as_deref().unwrap_or_default();
    let names = nodes.node_name.as_deref().unwrap_or_default();
    let values = nodes.node_value.as_deref().unwrap_or_default();
    let backend_ids = nodes.backend_node_id.as_deref().unwrap_or_default();
    let attributes = nodes.attributes.as_deref().unwrap_or_default();
    let shadow_types = nodes
        .shadow_root_type
        .as_ref()
        .map(RareStringData::to_map)
        .unwrap_or_default();
    let input_values = nodes
        .input_value
        .as_ref()
        .map(RareStringData::to_map)
        .unwrap_or_default();

    let layout = decode_layout(
        &snapshot.layout,
        &strings,
        -snapshot.scroll_offset_x.unwrap_or(0.0),
        -snapshot.scroll_offset_y.unwrap_or(0.0),
    );

    let mut arena: Vec<Option<NodeId>> = vec![None; types.len()];
    let mut skipped = 0usize;

    for (i, node_type) in types.iter().enumerate() {
        let handle = NodeHandle(backend_ids.get(i).copied().unwrap_or(-1));
        let parent = parents
            .get(i)
            .and_then(|p| usize::try_from(*p).ok())
            .and_then(|p| arena.get(p).copied().flatten());

        if *node_type == DOCUMENT_NODE && parent.is_none() {
            arena[i] = Some(doc.root());
            continue;
        }

        let Some(parent) = parent else {
            skipped += 1;
            continue;
        };

        arena[i] = match *node_type {
            ELEMENT_NODE => {
                let Some(tag) = names.get(i).and_then(|n| strings.get(*n)) else {
                    log::warn!("Skipping element {} with no tag name", i);
                    skipped += 1;
                    continue;
                };
                let mut element = ElementData::new(tag);
                element.tag_name = tag.to_string();
                element.attributes = decode_attributes(attributes.get(i), &strings);
                element.value = input_values
                    .get(&i)
                    .and_then(|v| strings.get(*v))
                    .map(str::to_string);
                match layout.get(&i) {
                    Some(entry) => {
                        element.style = Some(entry.style.clone());
                        element.rect = entry.rect;
                    }
                    None => {
                        element.style = None;
                        element.rect = None;
                    }
                }
                Some(doc.push_node(Some(parent), NodeKind::Element(element), handle))
            }
            TEXT_NODE => {
                let content = values
                    .get(i)
                    .and_then(|v| strings.get(*v))
                    .unwrap_or_default()
                    .to_string();
                let rendered = layout.contains_key(&i);
                Some(doc.push_node(
                    Some(parent),
                    NodeKind::Text { content, rendered },
                    handle,
                ))
            }
            DOCUMENT_FRAGMENT_NODE => match shadow_types.get(&i).and_then(|v| strings.get(*v)) {
                Some(mode) => Some(doc.push_shadow_root(parent, ShadowRootMode::parse(mode), handle)),
                // template contents and other detached fragments
                None => None,
            },
            _ => None,
        };
    }

    if skipped > 0 {
        log::warn!("Skipped {} undecodable snapshot nodes", skipped);
    }
    log::debug!(
        "Decoded snapshot document {} ({} nodes, {} laid out)",
        doc.url,
        doc.len(),
        layout.len()
    );

    Ok(doc)
}

fn decode_layout(
    layout: &LayoutTreeSnapshot,
    strings: &StringTable<'_>,
    dx: f64,
    dy: f64,
) -> HashMap<usize, LayoutEntry> {
    let mut entries = HashMap::new();

    for (i, node_index) in layout.node_index.iter().enumerate() {
        let Ok(node_index) = usize::try_from(*node_index) else {
            continue;
        };

        let style_values = layout.styles.get(i).map(Vec::as_slice).unwrap_or_default();
        let style_at = |slot: usize, fallback: &str| {
            style_values
                .get(slot)
                .and_then(|idx| strings.get(*idx))
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let style = ComputedStyle {
            display: style_at(0, "block"),
            visibility: style_at(1, "visible"),
            opacity: style_at(2, "1"),
            cursor: style_at(3, "auto"),
        };

        let rect = layout.bounds.get(i).and_then(|b| match b.as_slice() {
            [x, y, width, height, ..] => Some(Rect::new(*x, *y, *width, *height).translate(dx, dy)),
            _ => None,
        });

        entries.entry(node_index).or_insert(LayoutEntry { style, rect });
    }

    entries
}

fn decode_attributes(pairs: Option<&Vec<i64>>, strings: &StringTable<'_>) -> Vec<(String, String)> {
    let Some(pairs) = pairs else {
        return Vec::new();
    };

    pairs
        .chunks_exact(2)
        .filter_map(|pair| {
            let name = strings.get(pair[0])?;
            let value = strings.get(pair[1]).unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}
