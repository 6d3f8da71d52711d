//! Shared content servers, keyed by bundle location.

use std::collections::HashMap;
use std::sync::Arc;

use marquee_server::{BundleLocation, ContentServer, ContentServerFactory};
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::handle::{Ownership, ReleaseAction, ResourceHandle};
use crate::errors::DiscoveryError;

type ServerCell = Arc<OnceCell<Arc<dyn ContentServer>>>;

struct PoolEntry {
    cell: ServerCell,
    refs: usize,
}

struct PoolInner {
    factory: Arc<dyn ContentServerFactory>,
    entries: Mutex<HashMap<String, PoolEntry>>,
}

/// Reference-counted content servers shared by overlapping calls.
///
/// The first caller for a location starts the server; concurrent callers wait
/// for that same start. Each release drops one reference, and the release
/// that brings the count to zero stops the server if its caller asked for
/// teardown. Without teardown the idle server stays pooled for the next call.
#[derive(Clone)]
pub struct ServerPool {
    inner: Arc<PoolInner>,
}

impl ServerPool {
    /// Create servers through `factory`.
    pub fn new(factory: Arc<dyn ContentServerFactory>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of locations with a live or starting server.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether no server is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a server for `location`.
    ///
    /// A `supplied` server is returned as borrowed with a no-op release.
    #[tracing::instrument(skip(self, supplied), fields(bundle = %location))]
    pub async fn acquire(
        &self,
        location: &BundleLocation,
        port: Option<u16>,
        supplied: Option<Arc<dyn ContentServer>>,
        teardown: bool,
    ) -> Result<ResourceHandle<Ownership<Arc<dyn ContentServer>>>, DiscoveryError> {
        if let Some(server) = supplied {
            return Ok(ResourceHandle::new(
                Ownership::Borrowed(server),
                ReleaseAction::noop("borrowed content server"),
            ));
        }

        let key = location.reuse_key();
        let cell = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| PoolEntry {
                cell: Arc::new(OnceCell::new()),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.cell)
        };
        // gives the reference back if this future is dropped mid-start
        let pending = PendingRef {
            inner: &self.inner,
            key: &key,
            cell: &cell,
            armed: true,
        };

        let started = cell
            .get_or_try_init(|| async {
                tracing::debug!("starting content server");
                self.inner.factory.start(location, port).await
            })
            .await;

        match started {
            Ok(server) => {
                let server = Arc::clone(server);
                pending.disarm();
                let release = self.release_action(key, &cell, teardown);
                Ok(ResourceHandle::new(Ownership::Owned(server), release))
            }
            Err(source) => {
                drop(pending);
                Err(DiscoveryError::ServerStart {
                    bundle: location.to_string(),
                    source,
                })
            }
        }
    }

    fn release_action(&self, key: String, cell: &ServerCell, teardown: bool) -> ReleaseAction {
        let inner = Arc::clone(&self.inner);
        let cell = Arc::clone(cell);
        ReleaseAction::new("content server", move || async move {
            if inner.drop_ref(&key, &cell, teardown) {
                if let Some(server) = cell.get() {
                    server.stop(true).await?;
                    tracing::debug!(bundle = %key, "content server stopped");
                }
            }
            Ok(())
        })
    }
}

struct PendingRef<'a> {
    inner: &'a PoolInner,
    key: &'a str,
    cell: &'a ServerCell,
    armed: bool,
}

impl PendingRef<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRef<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.inner.drop_ref(self.key, self.cell, true);
        }
    }
}

impl PoolInner {
    /// Drop one reference. Returns `true` when the entry was removed from
    /// the pool: the count hit zero and either `teardown` was requested or
    /// the server never started.
    fn drop_ref(&self, key: &str, cell: &ServerCell, teardown: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if !Arc::ptr_eq(&entry.cell, cell) {
            return false;
        }
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 || (!teardown && cell.initialized()) {
            return false;
        }
        let _ = entries.remove(key);
        true
    }
}
