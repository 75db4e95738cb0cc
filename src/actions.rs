//! Action executor
//!
//! Runs ref-targeted commands against the page and reports a structured
//! result. Nothing here propagates an error to the caller: every failure
//! becomes `{ success: false, error }`.

use crate::content::{truncate_text, DEFAULT_MAX_CONTENT_LENGTH};
use crate::dom::NodeHandle;
use crate::error::{ActionError, BrowserError};
use crate::highlight::Highlighter;
use crate::page::{ContentExtractor, PageDriver};
use crate::snapshot::{SnapshotEngine, DEFAULT_SNAPSHOT_LIMIT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Command tags the executor understands.
pub const ACTION_TYPES: &[&str] = &[
    "navigate_to",
    "click_element",
    "type_text",
    "scroll_to",
    "get_page_content",
    "get_interactive_elements",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionCommand {
    NavigateTo {
        url: String,
    },
    ClickElement {
        #[serde(rename = "ref", alias = "ref_id")]
        ref_id: u32,
    },
    TypeText {
        #[serde(rename = "ref", alias = "ref_id")]
        ref_id: u32,
        text: String,
    },
    ScrollTo {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    GetPageContent {
        #[serde(default, alias = "maxLength")]
        max_length: Option<usize>,
    },
    GetInteractiveElements {
        #[serde(default)]
        limit: Option<usize>,
    },
}

impl ActionCommand {
    /// Parse a raw command object.
    ///
    /// The `type` tag is checked first so an unrecognized command is
    /// reported as such rather than as a malformed one.
    pub fn parse(value: &Value) -> Result<Self, ActionError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidCommand("missing action type".to_string()))?;

        if !ACTION_TYPES.contains(&tag) {
            return Err(ActionError::UnknownAction(tag.to_string()));
        }

        serde_json::from_value(value.clone())
            .map_err(|e| ActionError::InvalidCommand(format!("{}: {}", tag, e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionCommand::NavigateTo { .. } => "navigate_to",
            ActionCommand::ClickElement { .. } => "click_element",
            ActionCommand::TypeText { .. } => "type_text",
            ActionCommand::ScrollTo { .. } => "scroll_to",
            ActionCommand::GetPageContent { .. } => "get_page_content",
            ActionCommand::GetInteractiveElements { .. } => "get_interactive_elements",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionDefaults {
    pub content_max_length: usize,
    pub element_limit: usize,
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            content_max_length: DEFAULT_MAX_CONTENT_LENGTH,
            element_limit: DEFAULT_SNAPSHOT_LIMIT,
        }
    }
}

pub struct ActionExecutor {
    driver: Arc<dyn PageDriver>,
    engine: Arc<SnapshotEngine>,
    highlighter: Arc<Highlighter>,
    content: Arc<dyn ContentExtractor>,
    defaults: ActionDefaults,
}

impl ActionExecutor {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        engine: Arc<SnapshotEngine>,
        highlighter: Arc<Highlighter>,
        content: Arc<dyn ContentExtractor>,
        defaults: ActionDefaults,
    ) -> Self {
        Self {
            driver,
            engine,
            highlighter,
            content,
            defaults,
        }
    }

    /// Parse and run a raw command object.
    pub async fn execute(&self, command: &Value) -> ActionResult {
        match ActionCommand::parse(command) {
            Ok(command) => self.run(command).await,
            Err(e) => {
                log::warn!("Rejected action: {}", e);
                ActionResult::failure(e.to_string())
            }
        }
    }

    pub async fn run(&self, command: ActionCommand) -> ActionResult {
        let name = command.name();
        log::debug!("Executing {:?}", command);

        match self.dispatch(command).await {
            Ok(data) => ActionResult::ok(data),
            Err(e) => {
                log::error!("Action {} failed: {}", name, e);
                ActionResult::failure(e.to_string())
            }
        }
    }

    async fn dispatch(&self, command: ActionCommand) -> Result<Option<Value>, ActionError> {
        match command {
            ActionCommand::NavigateTo { url } => {
                self.engine.invalidate().await;
                let driver = self.driver.clone();
                tokio::spawn(async move {
                    if let Err(e) = driver.navigate(&url).await {
                        log::error!("Navigation to {} failed: {}", url, e);
                    }
                });
                Ok(None)
            }
            ActionCommand::ClickElement { ref_id } => {
                let handle = self.target(ref_id).await?;
                self.driver.click(handle).await?;
                Ok(None)
            }
            ActionCommand::TypeText { ref_id, text } => {
                let handle = self.target(ref_id).await?;
                self.driver.type_text(handle, &text).await?;
                Ok(None)
            }
            ActionCommand::ScrollTo { x, y } => {
                self.driver.scroll_to(x, y).await?;
                Ok(None)
            }
            ActionCommand::GetPageContent { max_length } => {
                let max_length = max_length.unwrap_or(self.defaults.content_max_length);
                let content = self.content.extract(max_length).await?;
                Ok(Some(json!({
                    "text": truncate_text(&content.text, max_length),
                    "title": content.title,
                    "url": content.url,
                })))
            }
            ActionCommand::GetInteractiveElements { limit } => {
                let limit = limit.unwrap_or(self.defaults.element_limit);
                let snapshot = self.engine.generate(limit).await?;
                let elements = serde_json::to_value(snapshot.elements).map_err(BrowserError::from)?;
                Ok(Some(elements))
            }
        }
    }

    /// Resolve a ref and outline its element before it is acted on.
    async fn target(&self, ref_id: u32) -> Result<NodeHandle, ActionError> {
        let handle = self
            .engine
            .resolve(ref_id)
            .await
            .ok_or(ActionError::ElementNotFound(ref_id))?;

        if let Err(e) = self.highlighter.highlight(ref_id).await {
            log::warn!("Could not highlight ref {}: {}", ref_id, e);
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ActionCommand::parse(&json!({"type": "click_element", "ref": 3})).unwrap(),
            ActionCommand::ClickElement { ref_id: 3 }
        );
        assert_eq!(
            ActionCommand::parse(&json!({"type": "type_text", "ref_id": 1, "text": "hi"})).unwrap(),
            ActionCommand::TypeText {
                ref_id: 1,
                text: "hi".to_string()
            }
        );
        assert_eq!(
            ActionCommand::parse(&json!({"type": "scroll_to", "y": 500})).unwrap(),
            ActionCommand::ScrollTo { x: 0.0, y: 500.0 }
        );
        assert_eq!(
            ActionCommand::parse(&json!({"type": "get_page_content", "maxLength": 10})).unwrap(),
            ActionCommand::GetPageContent {
                max_length: Some(10)
            }
        );
        assert_eq!(
            ActionCommand::parse(&json!({"type": "get_interactive_elements"})).unwrap(),
            ActionCommand::GetInteractiveElements { limit: None }
        );
    }

    #[test]
    fn test_unknown_and_malformed_commands() {
        let err = ActionCommand::parse(&json!({"type": "invalid_action"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action type: invalid_action");

        let err = ActionCommand::parse(&json!({"ref": 1})).unwrap_err();
        assert!(matches!(err, ActionError::InvalidCommand(_)));

        let err = ActionCommand::parse(&json!({"type": "click_element"})).unwrap_err();
        assert!(err.to_string().contains("click_element"));
    }

    #[test]
    fn test_result_serialization() {
        let ok = serde_json::to_value(ActionResult::ok(None)).unwrap();
        assert_eq!(ok, json!({"success": true}));

        let failed = serde_json::to_value(ActionResult::failure("Element with ref 9 not found")).unwrap();
        assert_eq!(
            failed,
            json!({"success": false, "error": "Element with ref 9 not found"})
        );
    }
}
