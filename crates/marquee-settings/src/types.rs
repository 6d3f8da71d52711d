//! Settings schema with compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarqueeSettings {
    /// Browser launch settings.
    pub browser: BrowserSettings,
    /// Discovery protocol settings.
    pub discovery: DiscoverySettings,
    /// Content server settings.
    pub server: ServerSettings,
}

/// How the browser is found and launched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
    /// Explicit Chrome/Chromium executable; searched for when unset.
    pub executable: Option<String>,
    /// Run without a visible window.
    pub headless: bool,
    /// How long to wait for the DevTools endpoint after spawning Chrome.
    pub launch_timeout_ms: u64,
    /// Per-command CDP response timeout.
    pub command_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            launch_timeout_ms: 5_000,
            command_timeout_ms: 30_000,
        }
    }
}

/// Discovery protocol tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoverySettings {
    /// Default per-call timeout when the caller does not pass one.
    pub default_timeout_ms: u64,
    /// Interval between readiness flag polls.
    pub ready_poll_interval_ms: u64,
    /// How often prop injection is retried on a destroyed execution context.
    pub injection_retries: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            ready_poll_interval_ms: 50,
            injection_retries: 2,
        }
    }
}

/// Local content server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` = auto-assign).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
        }
    }
}
