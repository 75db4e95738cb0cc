//! Readable page content
//!
//! Pulls the text an agent would want to read out of a captured document.
//! A handful of sites get dedicated strategies; everything else goes through
//! a generic extractor that drops page chrome and prefers the main content
//! region.

pub mod selector;

use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::page::{ContentExtractor, PageContent, PageDriver};
use async_trait::async_trait;
use selector::Selector;
use std::sync::Arc;

pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 15000;
pub const TRUNCATION_MARKER: &str = "... [truncated]";

const YOUTUBE_DESCRIPTION_LIMIT: usize = 1000;
const WHATSAPP_MESSAGE_LIMIT: usize = 1000;

const UNWANTED: &str = "script, style, noscript, iframe, svg, \
    [style*=\"display: none\"], [style*=\"display:none\"], [hidden], .hidden, \
    [aria-hidden=\"true\"], header, footer, nav, .sidebar, #sidebar";
const MAIN_CONTENT: &str = "main, article, .content, #content, .post, .article";

type SiteStrategy = fn(&Document) -> Option<String>;

const SITE_STRATEGIES: &[(&str, SiteStrategy)] = &[
    ("web.whatsapp.com", extract_whatsapp),
    ("youtube.com", extract_youtube),
    ("twitter.com", extract_tweets),
    ("x.com", extract_tweets),
];

/// Extracts content from the document captured by a [`PageDriver`].
pub struct DomContentExtractor {
    driver: Arc<dyn PageDriver>,
}

impl DomContentExtractor {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl ContentExtractor for DomContentExtractor {
    /// Always returns the full text; the length hint is applied by callers.
    async fn extract(&self, _max_length: usize) -> Result<PageContent> {
        let doc = self.driver.capture_document().await?;
        Ok(PageContent {
            text: extract_text(&doc),
            title: doc.title.clone(),
            url: doc.url.clone(),
        })
    }
}

/// Readable text of `doc`, preferring a site-specific strategy when one
/// applies and produces something.
pub fn extract_text(doc: &Document) -> String {
    let host = hostname(&doc.url);

    for (site, strategy) in SITE_STRATEGIES {
        if host.contains(site) {
            if let Some(text) = strategy(doc) {
                log::debug!("Used site-specific extractor for {}", site);
                return text;
            }
        }
    }

    log::debug!("Used generic extractor for {}", host);
    extract_generic(doc)
}

/// Cut `text` to `max_length` characters, appending [`TRUNCATION_MARKER`]
/// when anything was removed.
pub fn truncate_text(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

fn hostname(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    host.trim_start_matches("www.").to_ascii_lowercase()
}

fn selector(source: &str) -> Option<Selector> {
    let parsed = Selector::parse(source);
    if parsed.is_none() {
        log::warn!("Unsupported selector: {}", source);
    }
    parsed
}

fn text_of(doc: &Document, id: NodeId) -> String {
    doc.inner_text(id)
}

fn first_text(doc: &Document, source: &str) -> Option<String> {
    let id = selector(source)?.query(doc, doc.root())?;
    Some(text_of(doc, id)).filter(|t| !t.is_empty())
}

fn extract_tweets(doc: &Document) -> Option<String> {
    let tweets: Vec<String> = selector("[data-testid=\"tweetText\"]")?
        .query_all(doc, doc.root())
        .into_iter()
        .map(|id| text_of(doc, id))
        .collect();

    if tweets.is_empty() {
        None
    } else {
        Some(tweets.join("\n---\n"))
    }
}

fn extract_youtube(doc: &Document) -> Option<String> {
    let mut out = String::new();

    if let Some(title) = first_text(doc, "h1.ytd-video-primary-info-renderer, h1.title") {
        out.push_str(&format!("Video: {}\n", title));
    }
    if let Some(channel) = first_text(doc, "#channel-name a, .ytd-channel-name a") {
        out.push_str(&format!("Channel: {}\n", channel));
    }
    if let Some(description) = first_text(doc, "#description-inline-expander, #description") {
        let description: String = description.chars().take(YOUTUBE_DESCRIPTION_LIMIT).collect();
        out.push_str(&format!("Description: {}\n", description));
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn extract_whatsapp(doc: &Document) -> Option<String> {
    let root = doc.root();
    let mut messages = Vec::new();

    if let Some(header) = selector("header span[title]").and_then(|s| s.query(doc, root)) {
        if let Some(title) = doc.element(header).and_then(|el| el.attr("title")) {
            messages.push(format!("Chat with: {}", title));
        }
    }

    let message_selector =
        selector("[data-pre-plain-text], .message-in, .message-out, [class*=\"message\"]")?;
    for id in message_selector.query_all(doc, root) {
        let text = text_of(doc, id);
        let length = text.chars().count();
        if length == 0 || length >= WHATSAPP_MESSAGE_LIMIT {
            continue;
        }
        match doc.element(id).and_then(|el| el.attr("data-pre-plain-text")) {
            Some(prefix) => messages.push(format!("{} {}", prefix, text)),
            None => messages.push(text),
        }
    }

    if messages.len() < 5 {
        let chat_area = ["[data-tab=\"8\"]", ".copyable-area", "[role=\"application\"]"]
            .iter()
            .filter_map(|source| selector(source)?.query(doc, root))
            .next();
        if let Some(area) = chat_area {
            let all_text = text_of(doc, area);
            if !all_text.is_empty() {
                messages.push("--- Chat Content ---".to_string());
                messages.push(all_text);
            }
        }
    }

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("\n"))
    }
}

/// Body text without scripts, hidden nodes and page chrome, restricted to
/// the main content region when the page marks one.
pub fn extract_generic(doc: &Document) -> String {
    let Some(body) = doc.body() else {
        return String::new();
    };
    let Some(unwanted) = selector(UNWANTED) else {
        return String::new();
    };

    let is_removed = |id: NodeId| {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == body {
                return false;
            }
            if unwanted.matches(doc, node) {
                return true;
            }
            current = doc.parent(node);
        }
        false
    };

    let source = selector(MAIN_CONTENT)
        .and_then(|main| {
            main.query_all(doc, body)
                .into_iter()
                .find(|id| !is_removed(*id))
        })
        .unwrap_or(body);

    let text = doc.inner_text_excluding(source, |id, _| unwanted.matches(doc, id));
    normalize_whitespace(&text)
}

/// Tabs become spaces, runs of spaces collapse, and three or more line
/// breaks (with only whitespace between them) shrink to one blank line.
pub fn normalize_whitespace(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len());
    for ch in text.chars() {
        let ch = if ch == '\t' { ' ' } else { ch };
        if ch == ' ' && spaced.ends_with(' ') {
            continue;
        }
        spaced.push(ch);
    }

    let mut out = String::with_capacity(spaced.len());
    let mut chars = spaced.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\n' {
            out.push(ch);
            continue;
        }

        // Consume the whitespace run starting at this newline.
        let mut run = String::from('\n');
        while let Some(next) = chars.next_if(|c| c.is_whitespace()) {
            run.push(next);
        }
        if run.matches('\n').count() >= 3 {
            out.push_str("\n\n");
        } else {
            out.push_str(&run);
        }
    }

    out.trim().to_string()
}
