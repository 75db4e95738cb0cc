//! Accessible names and roles
//!
//! Produces the human-readable label and the semantic role reported for
//! each snapshot entry.

use crate::dom::{Document, NodeId};

/// Resolve the accessible name of an element.
///
/// Sources are tried in a fixed order and the first non-empty trimmed value
/// wins: `aria-label`, `aria-labelledby`, `alt`, `title`, `placeholder`,
/// `value` (button-like inputs only), rendered text, then raw text content.
/// Returns an empty string when none of them yield anything.
pub fn accessible_name(doc: &Document, id: NodeId) -> String {
    let Some(el) = doc.element(id) else {
        return String::new();
    };

    if let Some(label) = non_empty(el.attr("aria-label")) {
        return label;
    }

    if let Some(ids) = el.attr("aria-labelledby") {
        if let Some(label) = labelled_by(doc, id, ids) {
            return label;
        }
    }

    for attr in ["alt", "title", "placeholder"] {
        if let Some(value) = non_empty(el.attr(attr)) {
            return value;
        }
    }

    let button_like = matches!(
        el.input_type().as_deref(),
        Some("button") | Some("submit") | Some("reset")
    );
    if button_like {
        let value = el.value.as_deref().or_else(|| el.attr("value"));
        if let Some(value) = non_empty(value) {
            return value;
        }
    }

    if let Some(text) = non_empty(Some(&collapse_whitespace(&doc.inner_text(id)))) {
        return text;
    }

    doc.text_content(id).trim().to_string()
}

/// Label text from an `aria-labelledby` id list, looked up in the tree that
/// contains the element so labels inside a shadow root resolve locally.
fn labelled_by(doc: &Document, id: NodeId, ids: &str) -> Option<String> {
    let scope = doc.containing_root(id);
    let parts: Vec<String> = ids
        .split_whitespace()
        .filter_map(|label_id| doc.find_by_id(scope, label_id))
        .map(|label| collapse_whitespace(&doc.inner_text(label)))
        .filter(|text| !text.is_empty())
        .collect();

    non_empty(Some(&parts.join(" ")))
}

/// The explicit ARIA role, or one inferred from the tag and input type.
pub fn element_role(doc: &Document, id: NodeId) -> String {
    let Some(el) = doc.element(id) else {
        return String::new();
    };

    if let Some(role) = non_empty(el.attr("role")) {
        return role;
    }

    let tag = el.local_name();
    match tag.as_str() {
        "a" => "link".to_string(),
        "button" => "button".to_string(),
        "input" => match el.input_type().as_deref() {
            Some("checkbox") => "checkbox".to_string(),
            Some("radio") => "radio".to_string(),
            Some("button") | Some("submit") | Some("reset") | Some("image") => "button".to_string(),
            _ => "textbox".to_string(),
        },
        "textarea" => "textbox".to_string(),
        "select" => "combobox".to_string(),
        _ => tag,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
