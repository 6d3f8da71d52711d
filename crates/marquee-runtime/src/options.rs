//! Per-call discovery options.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use marquee_browser::{Browser, ChromiumOptions, LaunchOptions};
use marquee_core::LogLevel;
use marquee_server::ContentServer;
use marquee_settings::MarqueeSettings;
use serde_json::{Map, Value};

use crate::errors::DiscoveryError;
use crate::exchange::BrowserLogCallback;

/// Default call budget in milliseconds.
pub const DEFAULT_TIMEOUT_MS: f64 = 30_000.0;

/// Options for one discovery or validation call.
#[derive(Clone)]
pub struct DiscoveryOptions {
    /// Props handed to the bundle as `remotion_inputProps`.
    pub input_props: Map<String, Value>,
    /// Variables handed to the bundle as `remotion_envVariables`.
    pub env_variables: BTreeMap<String, String>,
    /// Call budget. Must be a positive finite number.
    pub timeout_in_milliseconds: f64,
    /// Chromium switches for a launched browser.
    pub chromium_options: ChromiumOptions,
    /// Browser executable for a launched browser.
    pub browser_executable: Option<PathBuf>,
    /// Browser to open the page in. Never closed by the call.
    pub browser: Option<Arc<dyn Browser>>,
    /// Content server to use. Never stopped by the call.
    pub server: Option<Arc<dyn ContentServer>>,
    /// Port for a server started by the call.
    pub port: Option<u16>,
    /// Device pixel ratio of the page.
    pub device_scale_factor: f64,
    /// Verbosity; only affects logging.
    pub log_level: LogLevel,
    /// Receives the page's console output.
    pub on_browser_log: Option<BrowserLogCallback>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            input_props: Map::new(),
            env_variables: BTreeMap::new(),
            timeout_in_milliseconds: DEFAULT_TIMEOUT_MS,
            chromium_options: ChromiumOptions::default(),
            browser_executable: None,
            browser: None,
            server: None,
            port: None,
            device_scale_factor: 1.0,
            log_level: LogLevel::default(),
            on_browser_log: None,
        }
    }
}

impl fmt::Debug for DiscoveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryOptions")
            .field("input_props", &self.input_props)
            .field("env_variables", &self.env_variables.keys().collect::<Vec<_>>())
            .field("timeout_in_milliseconds", &self.timeout_in_milliseconds)
            .field("chromium_options", &self.chromium_options)
            .field("browser_executable", &self.browser_executable)
            .field("browser", &self.browser.is_some())
            .field("server", &self.server.is_some())
            .field("port", &self.port)
            .field("device_scale_factor", &self.device_scale_factor)
            .field("log_level", &self.log_level)
            .field("on_browser_log", &self.on_browser_log.is_some())
            .finish()
    }
}

impl DiscoveryOptions {
    /// Defaults taken from `settings`.
    pub fn from_settings(settings: &MarqueeSettings) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let timeout = settings.discovery.default_timeout_ms as f64;
        Self {
            timeout_in_milliseconds: timeout,
            browser_executable: settings.browser.executable.as_ref().map(PathBuf::from),
            port: (settings.server.port != 0).then_some(settings.server.port),
            ..Self::default()
        }
    }

    /// Set the input props.
    #[must_use]
    pub fn with_input_props(mut self, props: Map<String, Value>) -> Self {
        self.input_props = props;
        self
    }

    /// Set the call budget.
    #[must_use]
    pub fn with_timeout(mut self, milliseconds: f64) -> Self {
        self.timeout_in_milliseconds = milliseconds;
        self
    }

    /// Open the page in `browser` instead of launching one.
    #[must_use]
    pub fn with_browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Use `server` instead of starting one.
    #[must_use]
    pub fn with_server(mut self, server: Arc<dyn ContentServer>) -> Self {
        self.server = Some(server);
        self
    }

    /// Forward console output to `callback`.
    #[must_use]
    pub fn with_browser_log(mut self, callback: BrowserLogCallback) -> Self {
        self.on_browser_log = Some(callback);
        self
    }

    /// The validated call budget.
    pub fn timeout(&self) -> Result<Duration, DiscoveryError> {
        validate_timeout(self.timeout_in_milliseconds)
    }

    /// Launch options for a browser started by this call.
    pub fn launch_options(&self, settings: &MarqueeSettings) -> LaunchOptions {
        LaunchOptions {
            executable: self
                .browser_executable
                .clone()
                .or_else(|| settings.browser.executable.as_ref().map(PathBuf::from)),
            chromium: self.chromium_options.clone(),
            headless: settings.browser.headless,
            launch_timeout: Duration::from_millis(settings.browser.launch_timeout_ms),
            command_timeout: Duration::from_millis(settings.browser.command_timeout_ms),
        }
    }
}

/// Check a caller-supplied timeout: any positive finite number of
/// milliseconds.
pub fn validate_timeout(milliseconds: f64) -> Result<Duration, DiscoveryError> {
    if !milliseconds.is_finite() || milliseconds <= 0.0 {
        return Err(DiscoveryError::InvalidTimeout { value: milliseconds });
    }
    Duration::try_from_secs_f64(milliseconds / 1000.0)
        .map_err(|_| DiscoveryError::InvalidTimeout { value: milliseconds })
}
