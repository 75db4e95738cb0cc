//! Page messaging channel
//!
//! Requests arrive as JSON objects tagged by `action`. Parsing is strict
//! about the tag and lenient about optional fields; see
//! [`PageSession::handle`](crate::session::PageSession::handle) for the
//! response envelope.

use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REQUEST_ACTIONS: &[&str] = &[
    "getContext",
    "getSnapshot",
    "getMetrics",
    "getScrollPosition",
    "scrollTo",
    "highlight",
    "execute",
    "toggleDebug",
    "captureScreenshot",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageRequest {
    GetContext {
        #[serde(default, rename = "maxLength", alias = "max_length")]
        max_length: Option<usize>,
    },
    GetSnapshot {
        #[serde(default)]
        limit: Option<usize>,
    },
    GetMetrics,
    GetScrollPosition,
    ScrollTo {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Highlight {
        #[serde(rename = "ref", alias = "ref_id")]
        ref_id: u32,
    },
    /// Run an action command; the payload is parsed by the executor so
    /// malformed commands come back as action failures.
    Execute { command: Value },
    ToggleDebug { enabled: bool },
    CaptureScreenshot {
        #[serde(default, rename = "fullPage", alias = "full_page")]
        full_page: bool,
    },
}

impl PageRequest {
    pub fn parse(value: &Value) -> Result<Self, ActionError> {
        let tag = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidCommand("missing request action".to_string()))?;

        if !REQUEST_ACTIONS.contains(&tag) {
            return Err(ActionError::UnknownAction(tag.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| ActionError::InvalidCommand(format!("{}: {}", tag, e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageRequest::GetContext { .. } => "getContext",
            PageRequest::GetSnapshot { .. } => "getSnapshot",
            PageRequest::GetMetrics => "getMetrics",
            PageRequest::GetScrollPosition => "getScrollPosition",
            PageRequest::ScrollTo { .. } => "scrollTo",
            PageRequest::Highlight { .. } => "highlight",
            PageRequest::Execute { .. } => "execute",
            PageRequest::ToggleDebug { .. } => "toggleDebug",
            PageRequest::CaptureScreenshot { .. } => "captureScreenshot",
        }
    }
}
