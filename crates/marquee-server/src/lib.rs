//! Content serving for marquee bundles.
//!
//! A bundle is either a directory on disk (served statically) or an
//! `http(s)://` URL (served as-is). Either way a local server runs so the page
//! can fetch cross-origin assets through `/proxy?src=...`.

#![deny(unsafe_code)]

pub mod error;
pub mod location;
pub mod router;
pub mod server;
pub mod traits;

pub use error::ServerError;
pub use location::BundleLocation;
pub use server::{StaticServer, StaticServerFactory};
pub use traits::{ContentServer, ContentServerFactory, ServedBundle};
