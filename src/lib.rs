pub mod actions;
pub mod browser;
pub mod capture;
pub mod channel;
pub mod classify;
pub mod compositor;
pub mod content;
pub mod dom;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod naming;
pub mod page;
pub mod refs;
pub mod session;
pub mod snapshot;
pub mod timer;

//  Re-export commonly used items
pub use actions::{ActionCommand, ActionExecutor, ActionResult};
pub use browser::chrome::{ChromeDriver, ConnectionMode};
pub use browser::page::CdpPage;
pub use capture::{CaptureConfig, CaptureMode, CapturedImage, FullPageCapture};
pub use channel::PageRequest;
pub use error::{ActionError, BrowserError, CaptureError};
pub use highlight::Highlighter;
pub use page::{
    CompositingSurface, ContentExtractor, ImageFormat, PageDriver, PageMetrics, ScrollPosition,
    ViewportCapture,
};
pub use session::{PageSession, SessionOptions};
pub use snapshot::{Snapshot, SnapshotEngine, SnapshotEntry};
