//! Content server seam used by the runtime's server pool.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServerError;
use crate::location::BundleLocation;

/// What a running server exposes to the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServedBundle {
    /// Base URL the page navigates to (without `index.html`).
    pub serve_url: String,
    /// Port of the local asset proxy.
    pub proxy_port: u16,
    /// `bundle.js.map` next to the bundle, when present.
    pub source_map: Option<PathBuf>,
}

/// Starts content servers.
#[async_trait]
pub trait ContentServerFactory: Send + Sync {
    /// Start serving `location`. `port` pins the listening port; `None` picks
    /// the configured default.
    async fn start(
        &self,
        location: &BundleLocation,
        port: Option<u16>,
    ) -> Result<Arc<dyn ContentServer>, ServerError>;
}

/// A running content server.
#[async_trait]
pub trait ContentServer: Send + Sync {
    /// Endpoint details.
    fn info(&self) -> &ServedBundle;

    /// Stop serving. `force` drops open connections instead of draining them.
    async fn stop(&self, force: bool) -> Result<(), ServerError>;
}
