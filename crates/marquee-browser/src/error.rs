//! Browser-specific error types.

use thiserror::Error;

/// CDP error messages that mean "the page navigated under us"; the operation
/// can be repeated against the new document.
const CONTEXT_DESTROYED_MESSAGES: &[&str] = &[
    "Execution context was destroyed",
    "Cannot find context with specified id",
    "Cannot use context after it was destroyed",
];

/// Errors from browser automation operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to launch the Chrome browser process.
    #[error("failed to launch browser: {context}")]
    LaunchFailed {
        /// What went wrong during launch.
        context: String,
    },

    /// Chrome executable not found on the system.
    #[error("Chrome not found; install Google Chrome or set MARQUEE_CHROME_PATH")]
    ChromeNotFound,

    /// Failed to attach to an already running browser.
    #[error("failed to connect to browser at {url}: {reason}")]
    ConnectFailed {
        /// DevTools WebSocket URL.
        url: String,
        /// Why it failed.
        reason: String,
    },

    /// Navigation to a URL failed.
    #[error("navigation failed for {url}: {reason}")]
    NavigationFailed {
        /// The URL that failed to load.
        url: String,
        /// Why it failed.
        reason: String,
    },

    /// Evaluated JavaScript threw or rejected.
    #[error("evaluation failed: {message}")]
    Evaluation {
        /// Exception message.
        message: String,
        /// Remote stack trace, when available.
        stack: Option<String>,
    },

    /// Operation timed out.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },

    /// The browser connection or the page is gone.
    #[error("browser connection closed")]
    Closed,

    /// CDP protocol error.
    #[error("CDP error: {0}")]
    Cdp(String),
}

impl BrowserError {
    /// Whether this error means the execution context was replaced by a
    /// navigation, so the same operation may succeed when repeated.
    pub fn is_context_destroyed(&self) -> bool {
        let message = match self {
            Self::Cdp(message) | Self::Evaluation { message, .. } => message,
            _ => return false,
        };
        CONTEXT_DESTROYED_MESSAGES
            .iter()
            .any(|needle| message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failed_display() {
        let err = BrowserError::LaunchFailed {
            context: "binary not executable".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to launch browser: binary not executable"
        );
    }

    #[test]
    fn navigation_failed_display() {
        let err = BrowserError::NavigationFailed {
            url: "http://127.0.0.1:3000/index.html".into(),
            reason: "net::ERR_CONNECTION_REFUSED".into(),
        };
        assert!(err.to_string().contains("127.0.0.1:3000"));
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
    }

    #[test]
    fn timeout_display() {
        let err = BrowserError::Timeout {
            timeout_ms: 5000,
            context: "Page.navigate".into(),
        };
        assert!(err.to_string().contains("5000ms"));
        assert!(err.to_string().contains("Page.navigate"));
    }

    #[test]
    fn context_destroyed_is_detected() {
        let err = BrowserError::Cdp("Execution context was destroyed, most likely because of a navigation.".into());
        assert!(err.is_context_destroyed());
        let err = BrowserError::Evaluation {
            message: "Cannot find context with specified id".into(),
            stack: None,
        };
        assert!(err.is_context_destroyed());
    }

    #[test]
    fn other_errors_are_not_context_destroyed() {
        assert!(!BrowserError::Closed.is_context_destroyed());
        assert!(!BrowserError::Cdp("Target closed".into()).is_context_destroyed());
        let err = BrowserError::Evaluation {
            message: "ReferenceError: foo is not defined".into(),
            stack: None,
        };
        assert!(!err.is_context_destroyed());
    }

    #[test]
    fn chrome_not_found_display() {
        assert!(BrowserError::ChromeNotFound.to_string().contains("Chrome not found"));
    }
}
