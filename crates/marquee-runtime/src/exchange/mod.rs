//! Talking to a live page.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `fault` | `FaultSignal` and the page fault listener |
//! | `channel` | `RemoteQueryChannel`: one operation in, one value out |
//! | `readiness` | Polls the bundle's readiness flag |
//! | `console` | Forwards browser console messages |
//! | `symbolicate` | Maps remote stack frames through the bundle's source map |

pub mod channel;
pub mod console;
pub mod fault;
pub mod readiness;
pub mod symbolicate;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::RemoteQueryChannel;
pub use console::{BrowserLogCallback, spawn_console_forwarder};
pub use fault::{FaultSignal, PageFault, spawn_fault_listener};
pub use readiness::wait_for_ready;
pub use symbolicate::SourceMapContext;
