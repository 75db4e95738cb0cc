use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("No page available")]
    NoPage,

    #[error("Script execution failed: {0}")]
    ScriptFailed(String),

    #[error("Failed to decode page data: {0}")]
    Decode(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for BrowserError {
    fn from(e: serde_json::Error) -> Self {
        BrowserError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Failures reported by the action executor.
///
/// Every variant is recoverable; the executor folds them into a failed
/// [`ActionResult`](crate::actions::ActionResult) instead of propagating them.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Element with ref {0} not found")]
    ElementNotFound(u32),

    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Reasons a full-page capture session abandons tiling.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Page measurement failed: {0}")]
    Measurement(String),

    #[error("Page height {height}px exceeds the {limit}px full-page limit")]
    TooTall { height: f64, limit: f64 },

    #[error("Tile capture at offset {offset} failed: {reason}")]
    Tile { offset: f64, reason: String },

    #[error("Compositing failed: {0}")]
    Composite(String),
}
