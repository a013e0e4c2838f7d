//! Server lifecycle states.

use std::fmt;

/// Where a [`Server`](super::Server) is in its lifecycle.
///
/// ```text
/// Created → Starting → Listening → Stopping → Stopped
///              ↑                                 │
///              └─────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Created,
    Starting,
    Listening,
    Stopping,
    Stopped,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
