//! # marquee-runtime
//!
//! Composition discovery and validation over a remote browser.
//!
//! - **Resources**: browser sessions and pooled content servers, each paired
//!   with an idempotent release action, drained per call by a
//!   [`resources::CleanupCoordinator`]
//! - **Exchange**: [`exchange::RemoteQueryChannel`] for page round trips,
//!   raced against the page's [`exchange::FaultSignal`]; the readiness gate
//! - **Protocol**: the bundle contract (injected globals, remote operations,
//!   site version)
//! - **Discovery**: inject props → switch mode → wait for ready → query
//! - **Validator**: select one composition, apply dimension overrides
//! - **Service**: [`CompositionService`] and the process-wide free functions
//!
//! ## Crate Position
//!
//! Top layer. Depends on: marquee-core, marquee-settings, marquee-browser,
//! marquee-server.

#![deny(unsafe_code)]

pub mod discovery;
pub mod errors;
pub mod exchange;
pub mod options;
pub mod protocol;
pub mod resources;
pub mod service;
pub mod validator;

pub use discovery::{DiscoveryState, DiscoveryStep};
pub use errors::DiscoveryError;
pub use exchange::BrowserLogCallback;
pub use options::{DEFAULT_TIMEOUT_MS, DiscoveryOptions, validate_timeout};
pub use service::{CompositionService, default_service, discover_compositions, validate_composition};

pub use marquee_browser::{BrowserLog, ChromiumOptions};
pub use marquee_core::{CompositionMetadata, DimensionOverrides, LogLevel};
pub use marquee_server::BundleLocation;
