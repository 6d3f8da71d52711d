//! Browser launch options.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// OpenGL backend passed to Chrome's `--use-gl`/`--use-angle` flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GlRenderer {
    /// ANGLE with the platform default backend.
    Angle,
    /// Native EGL.
    Egl,
    /// CPU rasterization.
    Swiftshader,
    /// ANGLE on top of SwiftShader.
    Swangle,
    /// ANGLE on Vulkan.
    Vulkan,
    /// ANGLE on EGL.
    AngleEgl,
}

impl GlRenderer {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Angle => &["--use-gl=angle", "--use-angle=default"],
            Self::Egl => &["--use-gl=egl"],
            Self::Swiftshader => &["--use-gl=swiftshader"],
            Self::Swangle => &["--use-gl=angle", "--use-angle=swiftshader"],
            Self::Vulkan => &[
                "--use-angle=vulkan",
                "--use-vulkan=swiftshader",
                "--disable-vulkan-fallback-to-gl-for-testing",
                "--ignore-gpu-blocklist",
                "--enable-features=Vulkan,UseSkiaRenderer",
            ],
            Self::AngleEgl => &["--use-gl=angle", "--use-angle=gles-egl"],
        }
    }
}

/// Chromium behavior switches a caller may set per call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChromiumOptions {
    /// Accept invalid TLS certificates.
    pub ignore_certificate_errors: bool,
    /// Disable same-origin policy.
    pub disable_web_security: bool,
    /// GL backend; Chrome's default when unset.
    pub gl: Option<GlRenderer>,
    /// Run headless (`None` = use settings).
    pub headless: Option<bool>,
    /// Override the user agent string.
    pub user_agent: Option<String>,
    /// Allow multiple renderer processes on Linux.
    pub enable_multi_process_on_linux: bool,
}

/// Everything needed to launch one browser.
#[derive(Clone, Debug)]
pub struct LaunchOptions {
    /// Executable override; discovered when `None`.
    pub executable: Option<PathBuf>,
    /// Per-call Chromium switches.
    pub chromium: ChromiumOptions,
    /// Headless default when `chromium.headless` is unset.
    pub headless: bool,
    /// How long to wait for the DevTools endpoint.
    pub launch_timeout: Duration,
    /// Per-command response timeout.
    pub command_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            chromium: ChromiumOptions::default(),
            headless: true,
            launch_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl LaunchOptions {
    /// Command-line flags for Chrome, excluding the debugging port.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--no-first-run",
            "--no-default-browser-check",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-background-timer-throttling",
            "--disable-renderer-backgrounding",
            "--disable-backgrounding-occluded-windows",
            "--autoplay-policy=no-user-gesture-required",
            "--window-size=1280,720",
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();

        if self.chromium.headless.unwrap_or(self.headless) {
            args.push("--headless=new".into());
        }
        if self.chromium.ignore_certificate_errors {
            args.push("--ignore-certificate-errors".into());
        }
        if self.chromium.disable_web_security {
            args.push("--disable-web-security".into());
        }
        if let Some(gl) = self.chromium.gl {
            args.extend(gl.args().iter().map(|s| (*s).to_owned()));
        }
        if let Some(ref ua) = self.chromium.user_agent {
            args.push(format!("--user-agent={ua}"));
        }
        if cfg!(target_os = "linux") && !self.chromium.enable_multi_process_on_linux {
            args.push("--single-process".into());
        }
        args
    }
}
