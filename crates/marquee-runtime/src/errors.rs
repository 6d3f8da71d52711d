//! Discovery error types.

use marquee_browser::BrowserError;
use marquee_core::CompositionError;
use marquee_server::ServerError;

use crate::discovery::DiscoveryStep;

/// Errors from discovering or validating compositions.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The caller's timeout is not a positive finite number.
    #[error("timeoutInMilliseconds must be a positive finite number, but got {value}")]
    InvalidTimeout {
        /// The rejected value.
        value: f64,
    },

    /// Could not launch a browser or open a page.
    #[error("could not acquire a browser session: {0}")]
    SessionAcquisition(#[source] BrowserError),

    /// Could not start a content server for the bundle.
    #[error("could not serve bundle {bundle}: {source}")]
    ServerStart {
        /// Bundle location.
        bundle: String,
        /// Underlying server error.
        source: ServerError,
    },

    /// The bundle page did not load.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// Page URL.
        url: String,
        /// HTTP status or network error.
        reason: String,
    },

    /// The page loaded but does not expose a composition registry.
    #[error("{url} is not a valid bundle: window.getStaticCompositions is not a function")]
    InvalidBundle {
        /// Page URL.
        url: String,
    },

    /// The bundle was built for a different protocol version.
    #[error(
        "incompatible bundle at {url}: expected site version {expected}, got {}",
        actual.as_deref().unwrap_or("none")
    )]
    IncompatibleBundle {
        /// Page URL.
        url: String,
        /// Version this runtime speaks.
        expected: &'static str,
        /// Version the bundle reported.
        actual: Option<String>,
    },

    /// The bundle never signalled readiness.
    #[error("bundle did not signal readiness within {timeout_ms}ms")]
    ReadinessTimeout {
        /// Total call budget.
        timeout_ms: u64,
    },

    /// A discovery step ran past the call deadline.
    #[error("discovery step \"{step}\" timed out after {timeout_ms}ms")]
    DiscoveryTimeout {
        /// Step that was running.
        step: DiscoveryStep,
        /// Total call budget.
        timeout_ms: u64,
    },

    /// A function invoked in the page threw or rejected.
    #[error("{operation} failed in the page: {message}")]
    RemoteOperation {
        /// Operation name.
        operation: String,
        /// Exception message.
        message: String,
        /// Remote stack trace.
        stack: Option<String>,
    },

    /// The page failed on its own (uncaught exception, crash) mid-call.
    #[error("page error: {message}")]
    RemotePage {
        /// Fault description.
        message: String,
        /// Remote stack trace.
        stack: Option<String>,
    },

    /// No composition with the requested id.
    #[error(
        "could not find composition with id \"{id}\". Available compositions: {}",
        if available.is_empty() { "none".to_owned() } else { available.join(", ") }
    )]
    CompositionNotFound {
        /// Requested id.
        id: String,
        /// Ids the bundle did report.
        available: Vec<String>,
    },

    /// Two compositions share an id.
    #[error("multiple compositions with id \"{id}\" are registered")]
    DuplicateComposition {
        /// The repeated id.
        id: String,
    },

    /// A composition has invalid metadata.
    #[error(transparent)]
    InvalidComposition(#[from] CompositionError),

    /// The page answered with something we could not interpret.
    #[error("unexpected response from page: {0}")]
    Protocol(String),

    /// Browser transport failure.
    #[error("browser transport error: {0}")]
    Transport(#[from] BrowserError),
}

impl DiscoveryError {
    /// Coarse classification for callers.
    ///
    /// - `"composition"`: the request or the bundle's registry is wrong
    /// - `"environment"`: the browser, server or code running in the page broke
    /// - `"timeout"`: the call budget ran out
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidTimeout { .. }
            | Self::InvalidBundle { .. }
            | Self::IncompatibleBundle { .. }
            | Self::CompositionNotFound { .. }
            | Self::DuplicateComposition { .. }
            | Self::InvalidComposition(_) => "composition",
            Self::ReadinessTimeout { .. } | Self::DiscoveryTimeout { .. } => "timeout",
            Self::SessionAcquisition(_)
            | Self::ServerStart { .. }
            | Self::Navigation { .. }
            | Self::RemoteOperation { .. }
            | Self::RemotePage { .. }
            | Self::Protocol(_)
            | Self::Transport(_) => "environment",
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ReadinessTimeout { .. } | Self::DiscoveryTimeout { .. } | Self::Transport(_)
        )
    }

    /// Whether the page's execution context was replaced under the call.
    pub fn is_context_destroyed(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_context_destroyed(),
            Self::RemoteOperation { message, .. } => BrowserError::Cdp(message.clone()).is_context_destroyed(),
            _ => false,
        }
    }
}
