//! Time-windowed coalescing of high-frequency updates
//!
//! A [`Coalescer`] holds at most one pending value. Every push replaces the
//! pending value and restarts the window; once the window elapses without
//! another push, [`Coalescer::take_due`] hands out the latest value exactly
//! once. The coalescer itself never sleeps: the owner asks for
//! [`Coalescer::deadline`] and wakes up when it passes.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

/// Single-slot "latest value wins" channel with a quiet-period window
#[derive(Debug, Clone)]
pub struct Coalescer<T> {
    window: Duration,
    pending: Option<Pending<T>>,
    closed: bool,
}

impl<T> Coalescer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            closed: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stores `value`, discarding any earlier pending one, and restarts the
    /// window from `now`. Returns `false` once the coalescer is closed.
    pub fn push(&mut self, value: T, now: Instant) -> bool {
        if self.closed {
            return false;
        }
        self.pending = Some(Pending {
            value,
            deadline: now + self.window,
        });
        true
    }

    /// When the pending value becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Takes the pending value if its window has elapsed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.deadline <= now => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    /// Drops the pending value without delivering it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }

    /// Cancels anything pending and refuses further pushes.
    pub fn close(&mut self) {
        self.pending = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
