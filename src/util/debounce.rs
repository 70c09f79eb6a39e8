//! Cancel-and-reschedule debounce for operator input.
//!
//! The debouncer holds no timer of its own: the runtime sleeps until
//! [`Debouncer::deadline`] and then calls [`Debouncer::take_due`]. Every
//! `schedule` replaces the pending value and pushes the deadline out.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Clone, Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    /// Replace any pending value; it fires `delay` after `now`.
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Take the pending value if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if *at <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "debounce_test.rs"]
mod debounce_test;
