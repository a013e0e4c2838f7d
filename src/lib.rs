//! Deterministic fault-injection HTTP server library.

pub mod behavior;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod session;

pub use behavior::{Behavior, Dispatcher, Fixtures};
pub use config::schema::FaultConfig;
pub use http::HttpServer;
pub use lifecycle::{Server, ServerError, ServerOptions, ServerState, Shutdown};
