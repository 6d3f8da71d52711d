//! Where a bundle lives.

use std::fmt;
use std::path::PathBuf;

/// A bundle to serve.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BundleLocation {
    /// Already hosted elsewhere.
    Url(String),
    /// A build output directory on disk.
    Directory(PathBuf),
}

impl BundleLocation {
    /// Classify a user-supplied bundle string.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_owned())
        } else {
            Self::Directory(PathBuf::from(raw))
        }
    }

    /// Key under which servers for this location are shared.
    pub fn reuse_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BundleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<&str> for BundleLocation {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_detected() {
        assert_eq!(
            BundleLocation::parse("https://example.com/bundle"),
            BundleLocation::Url("https://example.com/bundle".into())
        );
        assert_eq!(
            BundleLocation::parse("http://localhost:3000"),
            BundleLocation::Url("http://localhost:3000".into())
        );
    }

    #[test]
    fn everything_else_is_a_directory() {
        assert_eq!(
            BundleLocation::parse("./build"),
            BundleLocation::Directory(PathBuf::from("./build"))
        );
        assert_eq!(
            BundleLocation::parse("file:///tmp/build"),
            BundleLocation::Directory(PathBuf::from("file:///tmp/build"))
        );
    }

    #[test]
    fn reuse_key_is_the_location_string() {
        assert_eq!(BundleLocation::parse("/tmp/build").reuse_key(), "/tmp/build");
        assert_eq!(
            BundleLocation::parse("https://cdn.test/b").reuse_key(),
            "https://cdn.test/b"
        );
    }
}
