//! Public entry points.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use marquee_browser::{BrowserLauncher, ChromeLauncher};
use marquee_core::{CompositionMetadata, DimensionOverrides, RawComposition};
use marquee_server::{BundleLocation, ContentServerFactory, StaticServerFactory};
use marquee_settings::{MarqueeSettings, get_settings};

use crate::discovery::{DiscoveryParams, run_discovery};
use crate::errors::DiscoveryError;
use crate::exchange::{
    FaultSignal, RemoteQueryChannel, SourceMapContext, spawn_console_forwarder, spawn_fault_listener,
};
use crate::options::DiscoveryOptions;
use crate::resources::{CleanupCoordinator, ServerPool, SessionProvider};
use crate::validator::{select_composition, validate_all};

/// Discovers and validates compositions of served bundles.
///
/// Holds the browser launcher and the shared content server pool; every call
/// acquires its own page and releases everything it acquired before
/// returning.
pub struct CompositionService {
    sessions: SessionProvider,
    servers: ServerPool,
    settings: MarqueeSettings,
}

impl CompositionService {
    /// Service launching browsers through `launcher` and serving bundles
    /// through `servers`.
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        servers: Arc<dyn ContentServerFactory>,
        settings: MarqueeSettings,
    ) -> Self {
        Self {
            sessions: SessionProvider::new(launcher),
            servers: ServerPool::new(servers),
            settings,
        }
    }

    /// Chrome launcher and local axum server, configured from `settings`.
    pub fn from_settings(settings: MarqueeSettings) -> Self {
        let servers = StaticServerFactory::new(settings.server.host.clone(), settings.server.port);
        Self::new(Arc::new(ChromeLauncher), Arc::new(servers), settings)
    }

    /// The settings the service was built with.
    pub fn settings(&self) -> &MarqueeSettings {
        &self.settings
    }

    /// The shared content servers.
    pub fn server_pool(&self) -> &ServerPool {
        &self.servers
    }

    /// Every composition the bundle defines, validated.
    #[tracing::instrument(skip_all, fields(bundle = %bundle))]
    pub async fn discover_compositions(
        &self,
        bundle: &BundleLocation,
        options: &DiscoveryOptions,
    ) -> Result<Vec<CompositionMetadata>, DiscoveryError> {
        let compositions = validate_all(self.discover(bundle, options).await?)?;
        tracing::info!(count = compositions.len(), "compositions discovered");
        Ok(compositions)
    }

    /// The composition `id`, with `overrides` applied and validated.
    #[tracing::instrument(skip_all, fields(bundle = %bundle, composition_id = id))]
    pub async fn validate_composition(
        &self,
        bundle: &BundleLocation,
        id: &str,
        overrides: DimensionOverrides,
        options: &DiscoveryOptions,
    ) -> Result<CompositionMetadata, DiscoveryError> {
        let composition = select_composition(self.discover(bundle, options).await?, id, &overrides)?;
        tracing::info!(%composition, "composition validated");
        Ok(composition)
    }

    async fn discover(
        &self,
        bundle: &BundleLocation,
        options: &DiscoveryOptions,
    ) -> Result<Vec<RawComposition>, DiscoveryError> {
        let timeout = options.timeout()?;
        let mut cleanup = CleanupCoordinator::new();
        let result = self.discover_in(&mut cleanup, bundle, options, timeout).await;
        cleanup.drain().await;
        if let Err(ref e) = result {
            tracing::warn!(error = %e, category = e.category(), "discovery failed");
        }
        result
    }

    async fn discover_in(
        &self,
        cleanup: &mut CleanupCoordinator,
        bundle: &BundleLocation,
        options: &DiscoveryOptions,
        timeout: Duration,
    ) -> Result<Vec<RawComposition>, DiscoveryError> {
        let session = self
            .sessions
            .acquire(
                options.browser.clone(),
                &options.launch_options(&self.settings),
                options.device_scale_factor,
            )
            .await?;
        cleanup.register(session.release_action());
        let page = Arc::clone(&session.resource().page);
        page.set_default_timeout(timeout);

        let fault = FaultSignal::new();
        cleanup.register(spawn_fault_listener(&page, fault.clone()));
        if let Some(forwarder) =
            spawn_console_forwarder(&page, options.on_browser_log.clone(), options.log_level)
        {
            cleanup.register(forwarder);
        }

        let server = self
            .servers
            .acquire(bundle, options.port, options.server.clone(), true)
            .await?;
        cleanup.register(server.release_action());
        let served = server.resource().get().info();
        tracing::debug!(
            serve_url = %served.serve_url,
            proxy_port = served.proxy_port,
            source_map = ?served.source_map,
            owned = server.resource().is_owned(),
            "bundle served"
        );

        let source_map = match &served.source_map {
            Some(path) => SourceMapContext::load(path).await,
            None => None,
        };
        let channel = RemoteQueryChannel::new(page, fault).with_source_map(source_map);
        let params = DiscoveryParams {
            input_props: &options.input_props,
            env_variables: &options.env_variables,
            serve_url: &served.serve_url,
            proxy_port: served.proxy_port,
            timeout,
            poll_interval: Duration::from_millis(self.settings.discovery.ready_poll_interval_ms),
            injection_retries: self.settings.discovery.injection_retries,
        };
        run_discovery(&channel, &params).await
    }
}

static DEFAULT_SERVICE: OnceLock<CompositionService> = OnceLock::new();

/// Process-wide service built from the global settings.
pub fn default_service() -> &'static CompositionService {
    DEFAULT_SERVICE.get_or_init(|| CompositionService::from_settings(get_settings().clone()))
}

/// [`CompositionService::discover_compositions`] on the [`default_service`].
pub async fn discover_compositions(
    bundle: &BundleLocation,
    options: &DiscoveryOptions,
) -> Result<Vec<CompositionMetadata>, DiscoveryError> {
    default_service().discover_compositions(bundle, options).await
}

/// [`CompositionService::validate_composition`] on the [`default_service`].
pub async fn validate_composition(
    bundle: &BundleLocation,
    id: &str,
    overrides: DimensionOverrides,
    options: &DiscoveryOptions,
) -> Result<CompositionMetadata, DiscoveryError> {
    default_service()
        .validate_composition(bundle, id, overrides, options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_settings_starts_with_an_empty_pool() {
        let service = CompositionService::from_settings(MarqueeSettings::default());
        assert!(service.server_pool().is_empty());
        assert_eq!(service.settings().discovery.ready_poll_interval_ms, 50);
    }

    #[tokio::test]
    async fn invalid_timeout_is_rejected_before_launching() {
        let service = CompositionService::from_settings(MarqueeSettings::default());
        let options = DiscoveryOptions::default().with_timeout(-5.0);
        let err = service
            .discover_compositions(&BundleLocation::parse("/nonexistent/bundle"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidTimeout { value } if value < 0.0));
        assert!(service.server_pool().is_empty());
    }
}
