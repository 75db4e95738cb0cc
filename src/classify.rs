//! Interactivity classification
//!
//! Decides whether an element is an actionable target. This is a pure
//! function of the element's tag, attributes and computed cursor.

use crate::dom::ElementData;

/// ARIA roles that mark an element as a control on their own.
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "textbox",
    "combobox",
    "searchbox",
    "slider",
    "spinbutton",
];

/// Composite-widget roles whose items are usually clickable.
pub const EXTENDED_ROLES: &[&str] = &["option", "switch", "gridcell", "treeitem", "listitem"];

/// Returns true when the element should become a snapshot target.
///
/// Elements injected by this crate's own overlays are never interactive.
pub fn is_interactive(element: &ElementData) -> bool {
    if element.is_agent_ui() {
        return false;
    }

    matches_semantic_selector(element)
        || element.has_attr("onclick")
        || has_pointer_cursor(element)
}

fn matches_semantic_selector(element: &ElementData) -> bool {
    if element.is_tag("a") && element.has_attr("href") {
        return true;
    }

    if ["button", "input", "select", "textarea"]
        .iter()
        .any(|tag| element.is_tag(tag))
    {
        return true;
    }

    if let Some(role) = element.attr("role") {
        let role = role.trim().to_ascii_lowercase();
        if INTERACTIVE_ROLES.contains(&role.as_str()) || EXTENDED_ROLES.contains(&role.as_str()) {
            return true;
        }
    }

    has_focus_index(element)
}

fn has_focus_index(element: &ElementData) -> bool {
    element
        .attr("tabindex")
        .and_then(|value| value.trim().parse::<i64>().ok())
        .is_some_and(|index| index >= 0)
}

// Heuristic: prone to false positives on decorative elements that inherit
// `cursor: pointer` from a clickable ancestor.
fn has_pointer_cursor(element: &ElementData) -> bool {
    if element.is_tag("html") || element.is_tag("body") {
        return false;
    }

    element
        .style
        .as_ref()
        .is_some_and(|style| style.cursor == "pointer")
}
