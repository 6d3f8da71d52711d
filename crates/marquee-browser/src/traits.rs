//! Browser control surface.
//!
//! The orchestration layer in `marquee-runtime` is written against these
//! traits only. [`crate::cdp`] implements them over the DevTools protocol;
//! tests implement them with recording fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::BrowserError;
use crate::options::LaunchOptions;

// ─────────────────────────────────────────────────────────────────────────────
// Page events
// ─────────────────────────────────────────────────────────────────────────────

/// One frame of a remote stack trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Script URL.
    pub url: String,
    /// Function name; empty for anonymous code.
    pub function_name: String,
    /// Zero-based line number.
    pub line_number: u32,
    /// Zero-based column number.
    pub column_number: u32,
}

/// A console message forwarded from a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserLog {
    /// Console API kind (`log`, `info`, `warning`, `error`, `debug`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Formatted message text.
    pub text: String,
    /// Call site, innermost first.
    pub stack_trace: Vec<StackFrame>,
}

/// Asynchronous notifications from a page.
#[derive(Clone, Debug, PartialEq)]
pub enum PageEvent {
    /// `console.*` was called.
    Console(BrowserLog),
    /// An exception escaped to the top level (uncaught error or rejection).
    Exception {
        /// Exception description.
        message: String,
        /// Stack trace as text, when the runtime reported one.
        stack: Option<String>,
    },
    /// The renderer process crashed.
    Crashed,
    /// The page target was closed or its connection dropped.
    Closed,
}

/// Page viewport.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// CSS pixels.
    pub width: u32,
    /// CSS pixels.
    pub height: u32,
    /// Device pixel ratio.
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            device_scale_factor: 1.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Launches new browser instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a browser and return a connected handle.
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Browser>, BrowserError>;
}

/// A running browser instance.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a fresh blank page.
    async fn new_page(&self) -> Result<Arc<dyn Page>, BrowserError>;

    /// Close every page and shut the browser down.
    async fn close(&self) -> Result<(), BrowserError>;

    /// Whether the control connection is still alive.
    fn is_connected(&self) -> bool;
}

/// One page (tab) of a browser.
#[async_trait]
pub trait Page: Send + Sync {
    /// Stable identifier for logging.
    fn id(&self) -> &str;

    /// Evaluate `expression`, awaiting a returned promise, and return the
    /// result by value.
    ///
    /// `frame` selects a child frame by id; `None` targets the main frame.
    /// A thrown exception or rejected promise becomes
    /// [`BrowserError::Evaluation`].
    async fn evaluate(&self, expression: &str, frame: Option<&str>) -> Result<Value, BrowserError>;

    /// Run `source` in every new document before any of its own scripts.
    async fn add_script_on_new_document(&self, source: &str) -> Result<(), BrowserError>;

    /// Navigate and wait for the load event.
    ///
    /// Returns the HTTP status of the main document when the network layer
    /// reported one (`None` for `file:`/`data:` URLs).
    async fn navigate(&self, url: &str) -> Result<Option<u16>, BrowserError>;

    /// Upper bound for a single [`Page::evaluate`] or [`Page::navigate`].
    ///
    /// Implementations without their own command timeout ignore it.
    fn set_default_timeout(&self, _timeout: Duration) {}

    /// Resize the page viewport.
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), BrowserError>;

    /// Subscribe to page events. Each receiver sees events sent after it was
    /// created.
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;

    /// Close the page. Closing an already closed page is a no-op.
    async fn close(&self) -> Result<(), BrowserError>;
}
