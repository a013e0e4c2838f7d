//! Noisy behaviors: stream lines on an interval, then end or drop the connection.
//!
//! ```text
//! t=0        every interval: "I'll stop sending chunks soon!\n"
//! t=duration stop interval, "Last chunk!\n", then abort (rejection) or end (timeout)
//! t=timeout  (timeout only) abort if the response is still open
//! ```
//!
//! The end-of-stream timer and the timeout timer of `/noisytimeout` are not
//! ordered against each other. Whichever reaches the response channel first
//! decides how the client sees the connection close.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::BehaviorConfig;
use crate::http::response::{ResponseChannel, SessionBody};
use crate::session::Session;

pub const NOISY_LINE: &str = "I'll stop sending chunks soon!\n";
pub const LAST_LINE: &str = "Last chunk!\n";

/// How a noisy behavior finishes after its last line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Drop the connection without terminating the body.
    Abort,
    /// End the body normally; a separate deadline may still abort first.
    End,
}

/// Schedule the noisy script on the session's timers and return its body.
pub fn noisy(session: Session, config: &BehaviorConfig, ending: Ending) -> SessionBody {
    let timers = session.timers().clone();
    let (channel, body) = SessionBody::channel(session, config.buffered_chunks);

    // The interval writes through a slot the final timer empties, so no
    // periodic line can land after the last one.
    let lines = Arc::new(Mutex::new(Some(channel.clone())));

    let slot = lines.clone();
    let interval = timers.schedule_interval(Duration::from_millis(config.noisy_interval_ms), move || {
        if let Some(ch) = lock(&slot).as_ref() {
            ch.push(NOISY_LINE);
        }
    });

    let registry = timers.clone();
    timers.schedule_once(Duration::from_millis(config.noisy_duration_ms), move || {
        if let Some(id) = interval {
            registry.cancel(id);
        }
        if let Some(ch) = lock(&lines).take() {
            finish(&ch, ending);
        }
    });

    if ending == Ending::End {
        timers.schedule_once(Duration::from_millis(config.noisy_timeout_ms), move || {
            tracing::debug!("Noisy timeout reached, dropping connection");
            channel.abort();
        });
    }

    body
}

fn lock(slot: &Mutex<Option<ResponseChannel>>) -> MutexGuard<'_, Option<ResponseChannel>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The last line always reaches the peer, even when interval lines were dropped.
fn finish(channel: &ResponseChannel, ending: Ending) {
    match ending {
        Ending::Abort => channel.abort_with(LAST_LINE),
        Ending::End => channel.end_with(LAST_LINE),
    }
}
