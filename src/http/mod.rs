//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1 connection, trace span per request)
//!     → behavior dispatcher
//!         → body.rs (accumulate the request body)
//!         → writer.rs (chunked, backpressure-aware output)
//!     → response.rs (session-backed body)
//!     → Send to client
//! ```

pub mod body;
pub mod response;
pub mod server;
pub mod writer;

pub use body::BodyAccumulator;
pub use response::{ResponseChannel, SessionBody};
pub use server::HttpServer;
pub use writer::{ByteSource, ChunkSink, ChunkedWriter, FixedSource, RandomSource, SinkClosed, WriteStatus};
