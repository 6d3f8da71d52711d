//! Browser control surface for marquee.
//!
//! This crate provides:
//! - The [`Browser`]/[`Page`]/[`BrowserLauncher`] traits the orchestration layer is written against
//! - Chrome discovery on Linux and macOS
//! - [`ChromiumOptions`] → command-line flag translation
//! - A thin CDP client ([`cdp`]) implementing the traits over one WebSocket per browser

#![deny(unsafe_code)]

pub mod cdp;
pub mod chrome;
pub mod error;
pub mod options;
pub mod traits;

pub use cdp::{CdpBrowser, ChromeLauncher};
pub use error::BrowserError;
pub use options::{ChromiumOptions, GlRenderer, LaunchOptions};
pub use traits::{
    Browser, BrowserLauncher, BrowserLog, Page, PageEvent, StackFrame, Viewport,
};
