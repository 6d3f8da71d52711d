//! Thin Chrome DevTools Protocol client.
//!
//! One WebSocket per browser. Pages are flat-mode target sessions: every
//! command carries the page's `sessionId` and events are routed back to the
//! page that owns it. Only the commands discovery needs are implemented.

mod browser;
mod connection;
mod page;

#[cfg(test)]
mod fake;

pub use browser::{CdpBrowser, ChromeLauncher};
pub use page::CdpPage;
