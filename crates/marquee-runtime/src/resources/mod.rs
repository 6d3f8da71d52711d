//! Acquisition and release of everything a call touches.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `handle` | `ResourceHandle`, `ReleaseAction`, `Ownership` |
//! | `cleanup` | Per-call `CleanupCoordinator`, drained once at settlement |
//! | `session_provider` | Launch or reuse a browser, open a page |
//! | `server_pool` | Refcounted, single-flight content servers per bundle location |

pub mod cleanup;
pub mod handle;
pub mod server_pool;
pub mod session_provider;

pub use cleanup::CleanupCoordinator;
pub use handle::{Ownership, ReleaseAction, ReleaseError, ResourceHandle};
pub use server_pool::ServerPool;
pub use session_provider::{Session, SessionProvider};
