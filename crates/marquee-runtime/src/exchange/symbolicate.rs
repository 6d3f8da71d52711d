//! Mapping bundle stack frames back to their sources.

use std::path::Path;

use sourcemap::SourceMap;

use crate::errors::DiscoveryError;

/// The source map of a served bundle.
pub struct SourceMapContext {
    map: SourceMap,
    /// File name of the generated script, e.g. `bundle.js`.
    bundle_file: String,
}

impl SourceMapContext {
    /// Parse a source map for the script named `bundle_file`.
    pub fn from_slice(bytes: &[u8], bundle_file: impl Into<String>) -> Result<Self, sourcemap::Error> {
        Ok(Self {
            map: SourceMap::from_slice(bytes)?,
            bundle_file: bundle_file.into(),
        })
    }

    /// Load `bundle.js.map`-style files; the script name is the map's file
    /// name without `.map`.
    ///
    /// Returns `None` (and logs) when the map cannot be read or parsed.
    pub async fn load(path: &Path) -> Option<Self> {
        let bundle_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(".map"))?
            .to_owned();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read source map");
                return None;
            }
        };
        match Self::from_slice(&bytes, bundle_file) {
            Ok(context) => Some(context),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed source map");
                None
            }
        }
    }

    /// Rewrite every `at name (…/bundle.js:L:C)` frame of `stack` to its
    /// original position. Frames of other scripts, and positions the map does
    /// not cover, are left as they are.
    pub fn symbolicate(&self, stack: &str) -> String {
        stack
            .lines()
            .map(|line| self.map_frame(line).unwrap_or_else(|| line.to_owned()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Symbolicate the stack carried by a page-side error.
    pub fn apply(&self, error: DiscoveryError) -> DiscoveryError {
        match error {
            DiscoveryError::RemoteOperation {
                operation,
                message,
                stack,
            } => DiscoveryError::RemoteOperation {
                operation,
                message,
                stack: stack.map(|s| self.symbolicate(&s)),
            },
            DiscoveryError::RemotePage { message, stack } => DiscoveryError::RemotePage {
                message,
                stack: stack.map(|s| self.symbolicate(&s)),
            },
            other => other,
        }
    }

    fn map_frame(&self, line: &str) -> Option<String> {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];
        let frame = trimmed.strip_prefix("at ")?;
        let (name, location) = match frame.strip_suffix(')').and_then(|f| f.rsplit_once(" (")) {
            Some((name, location)) => (Some(name), location),
            None => (None, frame),
        };

        let (rest, column) = location.rsplit_once(':')?;
        let (file, line_number) = rest.rsplit_once(':')?;
        if file.rsplit('/').next() != Some(self.bundle_file.as_str()) {
            return None;
        }
        // Stack positions are 1-based, source map positions 0-based.
        let line_number = line_number.parse::<u32>().ok()?.checked_sub(1)?;
        let column = column.parse::<u32>().ok()?.checked_sub(1)?;

        let token = self.map.lookup_token(line_number, column)?;
        let source = token.get_source()?;
        let name = token.get_name().or(name).unwrap_or("<anonymous>");
        Some(format!(
            "{indent}at {name} ({source}:{}:{})",
            token.get_src_line() + 1,
            token.get_src_col() + 1
        ))
    }
}
