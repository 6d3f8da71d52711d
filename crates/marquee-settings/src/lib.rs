//! # marquee-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`MarqueeSettings::default()`]
//! 2. **User file**: `~/.marquee/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `MARQUEE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<MarqueeSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loaded on first access; falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static MarqueeSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            MarqueeSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: MarqueeSettings) -> std::result::Result<(), MarqueeSettings> {
    SETTINGS.set(settings)
}
