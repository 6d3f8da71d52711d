//! Content server errors.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from starting or stopping a content server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bundle directory does not exist.
    #[error("bundle directory not found: {}", path.display())]
    BundleNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Could not bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Could not resolve the bound address.
    #[error("server socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The server task ended abnormally.
    #[error("server on {addr} stopped abnormally: {reason}")]
    Stopped {
        /// Address the server listened on.
        addr: SocketAddr,
        /// What went wrong.
        reason: String,
    },
}
