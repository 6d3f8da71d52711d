//! Axum-backed [`ContentServerFactory`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::location::BundleLocation;
use crate::router::build_router;
use crate::traits::{ContentServer, ContentServerFactory, ServedBundle};

/// How long a non-forced stop waits for open connections to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts one [`StaticServer`] per call.
#[derive(Clone, Debug)]
pub struct StaticServerFactory {
    host: String,
    default_port: u16,
    client: reqwest::Client,
}

impl StaticServerFactory {
    /// Bind servers on `host`; `default_port` 0 means any free port.
    pub fn new(host: impl Into<String>, default_port: u16) -> Self {
        Self {
            host: host.into(),
            default_port,
            client: reqwest::Client::new(),
        }
    }
}

impl Default for StaticServerFactory {
    fn default() -> Self {
        Self::new("127.0.0.1", 0)
    }
}

#[async_trait]
impl ContentServerFactory for StaticServerFactory {
    async fn start(
        &self,
        location: &BundleLocation,
        port: Option<u16>,
    ) -> Result<Arc<dyn ContentServer>, ServerError> {
        let server = StaticServer::start(
            location,
            &self.host,
            port.unwrap_or(self.default_port),
            self.client.clone(),
        )
        .await?;
        Ok(Arc::new(server))
    }
}

/// A local HTTP server for one bundle location.
pub struct StaticServer {
    info: ServedBundle,
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StaticServer {
    /// Bind and start serving.
    #[tracing::instrument(skip(location, client), fields(bundle = %location))]
    pub async fn start(
        location: &BundleLocation,
        host: &str,
        port: u16,
        client: reqwest::Client,
    ) -> Result<Self, ServerError> {
        let root = match location {
            BundleLocation::Directory(path) => {
                if !path.is_dir() {
                    return Err(ServerError::BundleNotFound { path: path.clone() });
                }
                Some(path.clone())
            }
            BundleLocation::Url(_) => None,
        };
        let source_map = root
            .as_ref()
            .map(|dir| dir.join("bundle.js.map"))
            .filter(|map| map.is_file());

        let bind_addr = format!("{host}:{port}");
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;

        let serve_url = match location {
            BundleLocation::Url(url) => url.clone(),
            BundleLocation::Directory(_) => format!("http://{host}:{}", addr.port()),
        };

        let router = build_router(root, client);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::warn!(%addr, error = %e, "content server exited with error");
            }
        });

        tracing::info!(%addr, serve_url, "content server started");
        Ok(Self {
            info: ServedBundle {
                serve_url,
                proxy_port: addr.port(),
                source_map,
            },
            addr,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// Bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ContentServer for StaticServer {
    fn info(&self) -> &ServedBundle {
        &self.info
    }

    async fn stop(&self, force: bool) -> Result<(), ServerError> {
        self.shutdown.cancel();
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        if force {
            task.abort();
            tracing::debug!(addr = %self.addr, "content server aborted");
            return Ok(());
        }
        let abort = task.abort_handle();
        match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
            Ok(Ok(())) => {
                tracing::debug!(addr = %self.addr, "content server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Stopped {
                addr: self.addr,
                reason: e.to_string(),
            }),
            Err(_) => {
                abort.abort();
                tracing::warn!(addr = %self.addr, "content server did not drain in time, aborted");
                Ok(())
            }
        }
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
