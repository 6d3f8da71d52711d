//! Chrome binary discovery.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Known Chrome binary locations, in search priority order.
const KNOWN_PATHS: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/homebrew/bin/chromium",
    "/usr/local/bin/chromium",
];

/// Find a Chrome or Chromium binary.
///
/// Search order:
/// 1. `explicit` (from options or settings)
/// 2. `MARQUEE_CHROME_PATH`, then `CHROME_PATH`
/// 3. Well-known install locations
///
/// Returns `None` if no executable is found. An explicit path that is not
/// executable falls through to the remaining candidates.
pub fn find_chrome(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
        tracing::debug!(path = %path.display(), "configured browser executable not usable, searching");
    }

    for var in ["MARQUEE_CHROME_PATH", "CHROME_PATH"] {
        if let Ok(env_path) = std::env::var(var) {
            let path = PathBuf::from(&env_path);
            if is_executable(&path) {
                return Some(path);
            }
            tracing::debug!(var, path = %env_path, "env path not executable, falling through");
        }
    }

    let found = search_paths().into_iter().find(|p| is_executable(p));
    if let Some(ref path) = found {
        tracing::debug!(path = %path.display(), "found Chrome binary");
    }
    found
}

/// The ordered list of well-known candidate paths.
pub fn search_paths() -> Vec<PathBuf> {
    KNOWN_PATHS.iter().map(PathBuf::from).collect()
}

fn is_executable(path: &Path) -> bool {
    path.is_file()
        && path
            .metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}
