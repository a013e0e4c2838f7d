//! Per-session timer and interval registry.
//!
//! Every scheduled callback a behavior needs is spawned through a
//! [`TimerRegistry`] so that one `cancel_all` tears all of them down,
//! whichever way the session ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Identifier of a scheduled timer within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Kind of scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once after a delay.
    Once,
    /// Fires every period, first one period after scheduling.
    Interval,
}

#[derive(Debug)]
struct Entry {
    id: TimerId,
    kind: TimerKind,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Entry>,
    next_id: u64,
    closed: bool,
}

/// Shared handle to a session's timers.
///
/// Clones refer to the same set of timers, so callbacks can capture a clone
/// and cancel a sibling (the noisy behaviors stop their interval this way).
#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` once after `delay`.
    ///
    /// Returns `None` when the registry has already been torn down.
    pub fn schedule_once<F>(&self, delay: Duration, callback: F) -> Option<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(TimerKind::Once, move || {
            tokio::spawn(async move {
                time::sleep(delay).await;
                callback();
            })
        })
    }

    /// Run `callback` every `period` until canceled.
    pub fn schedule_interval<F>(&self, period: Duration, mut callback: F) -> Option<TimerId>
    where
        F: FnMut() + Send + 'static,
    {
        self.register(TimerKind::Interval, move || {
            tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    callback();
                }
            })
        })
    }

    fn register<S>(&self, kind: TimerKind, spawn: S) -> Option<TimerId>
    where
        S: FnOnce() -> tokio::task::JoinHandle<()>,
    {
        let mut inner = self.lock();
        if inner.closed {
            tracing::trace!(?kind, "Registry closed, timer not scheduled");
            return None;
        }
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        let handle = spawn().abort_handle();
        inner.entries.push(Entry { id, kind, handle });
        Some(id)
    }

    /// Cancel a single timer. Returns `false` if it was not registered.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut inner = self.lock();
        match inner.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                let entry = inner.entries.swap_remove(index);
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding timer and refuse new ones.
    ///
    /// Safe to call from every exit path: the first call cancels and clears
    /// each handle, later calls find nothing left and return zero.
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let entries = std::mem::take(&mut inner.entries);
        drop(inner);

        for entry in &entries {
            tracing::trace!(id = entry.id.0, kind = ?entry.kind, "Canceling timer");
            entry.handle.abort();
        }
        if !entries.is_empty() {
            crate::observability::metrics::record_timers_canceled(entries.len());
        }
        entries.len()
    }

    /// Number of timers currently on record.
    pub fn active(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether `cancel_all` has run.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn once_fires() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        registry.schedule_once(Duration::from_millis(10), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interval_stops_after_cancel() {
        let registry = TimerRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        let id = registry
            .schedule_interval(Duration::from_millis(5), move || {
                t.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        time::sleep(Duration::from_millis(40)).await;
        assert!(registry.cancel(id));
        assert!(!registry.cancel(id));
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);

        time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn cancel_all_is_idempotent() {
        let registry = TimerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let f = fired.clone();
            registry.schedule_once(Duration::from_millis(20), move || {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(registry.active(), 3);

        assert_eq!(registry.cancel_all(), 3);
        assert_eq!(registry.cancel_all(), 0);
        assert_eq!(registry.clone().cancel_all(), 0);

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_registry_refuses_new_timers() {
        let registry = TimerRegistry::new();
        registry.cancel_all();
        assert!(registry.is_closed());
        assert!(registry.schedule_once(Duration::from_millis(1), || {}).is_none());
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test]
    async fn callback_can_cancel_sibling() {
        let registry = TimerRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        let interval = registry
            .schedule_interval(Duration::from_millis(5), move || {
                t.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let r = registry.clone();
        registry.schedule_once(Duration::from_millis(30), move || {
            r.cancel(interval);
        });

        time::sleep(Duration::from_millis(60)).await;
        let seen = ticks.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert_eq!(registry.active(), 1);
    }
}
