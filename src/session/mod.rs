//! Request sessions.
//!
//! # Data Flow
//! ```text
//! request accepted
//!     → Accumulating      (body bytes arriving)
//!     → BehaviorSelected  (body complete, behavior about to run)
//!     → Streaming         (response body handed to the connection)
//!     → Closed            (completed, aborted, or the peer went away)
//! ```
//!
//! # Design Decisions
//! - The session owns its [`TimerRegistry`]; closing the session cancels
//!   every timer exactly once whatever caused the close
//! - Dropping a session that was never closed counts as the peer going away

pub mod timers;

use std::fmt;
use std::time::Instant;

use uuid::Uuid;

use crate::behavior::Behavior;
pub use timers::{TimerId, TimerKind, TimerRegistry};

/// Unique identifier for a session, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accumulating,
    BehaviorSelected,
    Streaming,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The response finished normally.
    Completed,
    /// The behavior deliberately dropped the connection.
    Aborted,
    /// Reading the request body failed.
    InboundError,
    /// The response stream was dropped before it finished.
    OutboundClosed,
}

/// Per-request runtime state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    behavior: Behavior,
    state: SessionState,
    timers: TimerRegistry,
    started: Instant,
}

impl Session {
    pub fn new(behavior: Behavior) -> Self {
        let id = SessionId::new();
        tracing::debug!(session = %id, behavior = %behavior, "Session opened");
        crate::observability::metrics::record_session(behavior);
        Self {
            id,
            behavior,
            state: SessionState::Accumulating,
            timers: TimerRegistry::new(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Signal: `len` more body bytes arrived.
    pub fn bytes_received(&self, len: usize) {
        tracing::trace!(session = %self.id, len, "Body bytes received");
    }

    /// Signal: the request body has been fully read.
    pub fn body_complete(&mut self, len: usize) {
        self.transition(SessionState::BehaviorSelected);
        tracing::debug!(session = %self.id, body_len = len, "Body complete");
    }

    /// Signal: a response body is now being produced.
    pub fn streaming(&mut self) {
        self.transition(SessionState::Streaming);
    }

    /// Signal: the session ended. Only the first call has any effect.
    pub fn close(&mut self, cause: CloseCause) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transition(SessionState::Closed);
        let canceled = self.timers.cancel_all();
        tracing::debug!(
            session = %self.id,
            behavior = %self.behavior,
            ?cause,
            timers_canceled = canceled,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Session closed"
        );
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!(session = %self.id, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close(CloseCause::OutboundClosed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn close_cancels_timers_once() {
        let mut session = Session::new(Behavior::NoisyTimeout);
        session.timers().schedule_once(Duration::from_secs(5), || {});
        session.timers().schedule_interval(Duration::from_secs(5), || {});
        assert_eq!(session.timers().active(), 2);

        session.close(CloseCause::Completed);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.timers().active(), 0);

        session.close(CloseCause::OutboundClosed);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn drop_closes_session() {
        let session = Session::new(Behavior::SilentTimeout);
        let timers = session.timers().clone();
        timers.schedule_once(Duration::from_secs(5), || {});

        drop(session);
        assert!(timers.is_closed());
        assert_eq!(timers.active(), 0);
    }

    #[test]
    fn transitions_in_order() {
        let mut session = Session::new(Behavior::Welcome);
        assert_eq!(session.state(), SessionState::Accumulating);
        session.body_complete(0);
        assert_eq!(session.state(), SessionState::BehaviorSelected);
        session.streaming();
        assert_eq!(session.state(), SessionState::Streaming);
    }
}
