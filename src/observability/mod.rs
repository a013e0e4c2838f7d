//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, spans per request)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Metrics endpoint (Prometheus scrape, when enabled)
//! ```
//!
//! # Design Decisions
//! - Session ids flow through every behavior log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
