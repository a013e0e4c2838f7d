//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (server.rs):
//!     start() → bind listener → spawn accept loop → Listening
//!
//! Stop (server.rs, shutdown.rs):
//!     stop() → trigger shutdown → stop accepting → drain connections → Stopped
//! ```
//!
//! # Design Decisions
//! - Bind failures revert to the state start was called from
//! - Shutdown has a deadline: connections still open after it are aborted
//! - A stopped server can be started again

pub mod server;
pub mod shutdown;
pub mod state;

pub use server::{Pending, PendingStart, PendingStop, Server, ServerError, ServerHandle, ServerOptions};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use state::ServerState;
