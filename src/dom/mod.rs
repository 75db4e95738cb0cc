//! Arena document model
//!
//! A captured, read-only view of a page's element tree (light DOM plus open
//! shadow trees) together with the computed style and layout box of every
//! rendered element. Nodes live in a flat arena and refer to each other by
//! [`NodeId`]; each node also carries a [`NodeHandle`], a weak back-reference
//! to the live element it was captured from.

pub mod capture;

use crate::geometry::{Rect, Viewport};
use serde::{Deserialize, Serialize};

/// Marker attribute carried by every element this crate injects into a page.
pub const AGENT_UI_ATTRIBUTE: &str = "data-browser-agent-ui";

/// Index of a node inside one [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Weak handle to a live page element (the CDP backend node id).
///
/// Holding a handle keeps nothing alive; resolving it against the page may
/// fail once the element has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowRootMode {
    Open,
    Closed,
    UserAgent,
}

impl ShadowRootMode {
    pub fn parse(value: &str) -> Self {
        match value {
            "open" => ShadowRootMode::Open,
            "closed" => ShadowRootMode::Closed,
            _ => ShadowRootMode::UserAgent,
        }
    }
}

/// The subset of computed style the oracles look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: String,
    pub cursor: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: "1".to_string(),
            cursor: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElementData {
    /// Tag name as the DOM reports it (`BUTTON`, `A`, ...)
    pub tag_name: String,
    pub attributes: Vec<(String, String)>,
    /// Live form value, when the element has one
    pub value: Option<String>,
    /// `None` when the element has no layout object (not rendered)
    pub style: Option<ComputedStyle>,
    /// Layout box relative to the viewport
    pub rect: Option<Rect>,
}

impl ElementData {
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_ascii_uppercase(),
            attributes: Vec::new(),
            value: None,
            style: Some(ComputedStyle::default()),
            rect: None,
        }
    }

    pub fn local_name(&self) -> String {
        self.tag_name.to_ascii_lowercase()
    }

    pub fn is_tag(&self, name: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Lowercased `type` of an `<input>`, defaulting to `text`.
    pub fn input_type(&self) -> Option<String> {
        if !self.is_tag("input") {
            return None;
        }
        let kind = self
            .attr("type")
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text".to_string());
        Some(kind)
    }

    /// True for the system's own injected overlay elements.
    pub fn is_agent_ui(&self) -> bool {
        self.has_attr(AGENT_UI_ATTRIBUTE)
    }

    fn is_block(&self) -> bool {
        const BLOCK_TAGS: &[&str] = &[
            "address", "article", "aside", "blockquote", "details", "dialog", "dd", "div", "dl",
            "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4",
            "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section",
            "summary", "table", "tr", "ul",
        ];
        BLOCK_TAGS.iter().any(|tag| self.is_tag(tag))
    }

    fn is_textless(&self) -> bool {
        ["script", "style", "noscript", "template", "head"]
            .iter()
            .any(|tag| self.is_tag(tag))
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text { content: String, rendered: bool },
    ShadowRoot(ShadowRootMode),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub shadow_root: Option<NodeId>,
    pub handle: NodeHandle,
}

/// A captured page: node arena plus the document-level facts the engine needs.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
}

impl Document {
    /// An arena holding only the document node.
    pub fn empty(url: &str, viewport: Viewport) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            url: url.to_string(),
            title: String::new(),
            viewport,
        };
        doc.push_node(None, NodeKind::Document, NodeHandle(0));
        doc
    }

    /// A minimal `html > (head, body)` document whose body fills the viewport.
    pub fn new(viewport: Viewport) -> Self {
        let mut doc = Self::empty("about:blank", viewport);
        let root = doc.root();
        let page = Rect::new(0.0, 0.0, viewport.width, viewport.height);

        let mut html = ElementData::new("html");
        html.rect = Some(page);
        let html = doc.push_element(root, html);

        let mut head = ElementData::new("head");
        head.style = None;
        doc.push_element(html, head);

        let mut body = ElementData::new("body");
        body.rect = Some(page);
        doc.push_element(html, body);
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn handle(&self, id: NodeId) -> Option<NodeHandle> {
        self.node(id).map(|n| n.handle)
    }

    /// Look up a node by its live handle.
    pub fn find_handle(&self, handle: NodeHandle) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.handle == handle)
            .map(NodeId)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.element(*child).is_some())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// The shadow root attached to `host`, if page script could see it.
    pub fn open_shadow_root(&self, host: NodeId) -> Option<NodeId> {
        let root = self.node(host)?.shadow_root?;
        match self.node(root).map(|n| &n.kind) {
            Some(NodeKind::ShadowRoot(ShadowRootMode::Open)) => Some(root),
            _ => None,
        }
    }

    /// `<html>`: the first element child of the document node.
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root()).next()
    }

    pub fn body(&self) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html)
            .find(|id| self.element(*id).is_some_and(|el| el.is_tag("body")))
    }

    /// The document or shadow root whose tree contains `id`.
    pub fn containing_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(node) = self.node(current) {
            match node.kind {
                NodeKind::Document | NodeKind::ShadowRoot(_) => return current,
                _ => {}
            }
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        self.root()
    }

    /// `getElementById` scoped to one tree (does not descend into shadow roots).
    pub fn find_by_id(&self, scope: NodeId, element_id: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(el) = self.element(id) {
                if el.attr("id") == Some(element_id) {
                    return Some(id);
                }
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        None
    }

    /// Light-tree descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// All descendant text, rendered or not (`textContent`).
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(Node {
                kind: NodeKind::Text { content, .. },
                ..
            }) = self.node(node)
            {
                out.push_str(content);
            }
        }
        out
    }

    /// Rendered text with block-level line breaks (`innerText`).
    ///
    /// An element that is not rendered itself yields its raw text content,
    /// as `innerText` does in the browser.
    pub fn inner_text(&self, id: NodeId) -> String {
        if self.element(id).is_some() && !self.is_rendered(id) {
            return self.text_content(id);
        }
        self.inner_text_excluding(id, |_, _| false)
    }

    /// [`Document::inner_text`] with every subtree rooted at an element for
    /// which `exclude` returns true left out.
    pub fn inner_text_excluding<F>(&self, id: NodeId, exclude: F) -> String
    where
        F: Fn(NodeId, &ElementData) -> bool,
    {
        enum Visit {
            Enter(NodeId),
            Exit,
        }

        let mut out = String::new();
        let mut stack = vec![Visit::Enter(id)];

        while let Some(visit) = stack.pop() {
            let node_id = match visit {
                Visit::Enter(node_id) => node_id,
                Visit::Exit => {
                    push_break(&mut out);
                    continue;
                }
            };
            let Some(node) = self.node(node_id) else {
                continue;
            };

            match &node.kind {
                NodeKind::Text { content, rendered } => {
                    if *rendered {
                        push_collapsed(&mut out, content);
                    }
                    continue;
                }
                NodeKind::Element(el) => {
                    let hidden = el
                        .style
                        .as_ref()
                        .is_some_and(|style| style.display == "none");
                    if node_id != id && (el.is_textless() || hidden || exclude(node_id, el)) {
                        continue;
                    }
                    if el.is_tag("br") {
                        push_break(&mut out);
                        out.push('\n');
                        continue;
                    }
                    if el.is_block() {
                        push_break(&mut out);
                        stack.push(Visit::Exit);
                    }
                }
                NodeKind::Document | NodeKind::ShadowRoot(_) => {}
            }

            stack.extend(node.children.iter().rev().map(|c| Visit::Enter(*c)));
        }

        out.trim().to_string()
    }

    pub(crate) fn push_node(
        &mut self,
        parent: Option<NodeId>,
        kind: NodeKind,
        handle: NodeHandle,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            shadow_root: None,
            handle,
        });
        if let Some(parent) = parent {
            if let Some(node) = self.nodes.get_mut(parent.0) {
                node.children.push(id);
            }
        }
        id
    }

    fn next_handle(&self) -> NodeHandle {
        NodeHandle(self.nodes.len() as i64 + 1)
    }

    /// Append an element under `parent`.
    pub fn push_element(&mut self, parent: NodeId, element: ElementData) -> NodeId {
        let handle = self.next_handle();
        self.push_node(Some(parent), NodeKind::Element(element), handle)
    }

    /// Append a text node under `parent`.
    pub fn push_text(&mut self, parent: NodeId, content: &str) -> NodeId {
        let rendered = self.is_rendered(parent);
        let handle = self.next_handle();
        self.push_node(
            Some(parent),
            NodeKind::Text {
                content: content.to_string(),
                rendered,
            },
            handle,
        )
    }

    /// Attach a shadow root to `host`, replacing any previous one.
    pub fn attach_shadow(&mut self, host: NodeId, mode: ShadowRootMode) -> NodeId {
        let handle = self.next_handle();
        self.push_shadow_root(host, mode, handle)
    }

    pub(crate) fn push_shadow_root(
        &mut self,
        host: NodeId,
        mode: ShadowRootMode,
        handle: NodeHandle,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::ShadowRoot(mode),
            parent: Some(host),
            children: Vec::new(),
            shadow_root: None,
            handle,
        });
        if let Some(node) = self.nodes.get_mut(host.0) {
            node.shadow_root = Some(id);
        }
        id
    }

    /// Append a whole element subtree described by `spec`.
    pub fn append(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let ElementSpec {
            element,
            children,
            shadow,
        } = spec;
        let id = self.push_element(parent, element);
        self.append_children(id, children);
        if let Some(shadow_children) = shadow {
            let root = self.attach_shadow(id, ShadowRootMode::Open);
            self.append_children(root, shadow_children);
        }
        id
    }

    fn append_children(&mut self, parent: NodeId, children: Vec<SpecChild>) {
        for child in children {
            match child {
                SpecChild::Element(spec) => {
                    self.append(parent, spec);
                }
                SpecChild::Text(text) => {
                    self.push_text(parent, &text);
                }
            }
        }
    }

    /// False when `id` or an element ancestor has no layout or is `display: none`.
    fn is_rendered(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if let Some(el) = self.element(node_id) {
                match &el.style {
                    None => return false,
                    Some(style) if style.display == "none" => return false,
                    _ => {}
                }
            }
            current = self.parent(node_id);
        }
        true
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !(out.is_empty() || out.ends_with(' ') || out.ends_with('\n')) {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}

fn push_break(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

enum SpecChild {
    Element(ElementSpec),
    Text(String),
}

/// Declarative description of an element subtree, for building documents
/// by hand.
///
/// ```
/// use browser_surface::dom::{Document, ElementSpec};
/// use browser_surface::geometry::Viewport;
///
/// let mut doc = Document::new(Viewport::new(1024.0, 768.0));
/// let body = doc.body().unwrap();
/// doc.append(
///     body,
///     ElementSpec::new("button").rect(0.0, 0.0, 100.0, 30.0).text("Submit"),
/// );
/// ```
pub struct ElementSpec {
    element: ElementData,
    children: Vec<SpecChild>,
    shadow: Option<Vec<SpecChild>>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            element: ElementData::new(tag),
            children: Vec::new(),
            shadow: None,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.element
            .attributes
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(SpecChild::Text(text.to_string()));
        self
    }

    pub fn child(mut self, spec: ElementSpec) -> Self {
        self.children.push(SpecChild::Element(spec));
        self
    }

    /// Add a child inside this element's open shadow root.
    pub fn shadow_child(mut self, spec: ElementSpec) -> Self {
        self.shadow
            .get_or_insert_with(Vec::new)
            .push(SpecChild::Element(spec));
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.element.rect = Some(Rect::new(x, y, width, height));
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.element.value = Some(value.to_string());
        self
    }

    pub fn display(mut self, display: &str) -> Self {
        self.style_mut().display = display.to_string();
        self
    }

    pub fn visibility(mut self, visibility: &str) -> Self {
        self.style_mut().visibility = visibility.to_string();
        self
    }

    pub fn opacity(mut self, opacity: &str) -> Self {
        self.style_mut().opacity = opacity.to_string();
        self
    }

    pub fn cursor(mut self, cursor: &str) -> Self {
        self.style_mut().cursor = cursor.to_string();
        self
    }

    /// Drop the layout object entirely, as for elements the engine never laid out.
    pub fn unrendered(mut self) -> Self {
        self.element.style = None;
        self.element.rect = None;
        self
    }

    fn style_mut(&mut self) -> &mut ComputedStyle {
        self.element
            .style
            .get_or_insert_with(ComputedStyle::default)
    }
}
