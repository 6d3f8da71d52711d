//! # marquee-core
//!
//! Foundation types and utilities shared by every marquee crate.
//!
//! - **Compositions**: [`composition::CompositionMetadata`] (validated) and
//!   [`composition::RawComposition`] (as reported by a bundle), plus the
//!   dimension/fps/duration checks that turn one into the other
//! - **Overrides**: [`composition::DimensionOverrides`] for caller-forced sizes
//! - **Logging**: [`logging::LogLevel`] and `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod composition;
pub mod logging;

pub use composition::{
    CompositionError, CompositionMetadata, DimensionOverrides, JsNumber, RawComposition,
};
pub use logging::LogLevel;
