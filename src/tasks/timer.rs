//! Cancellable one-shot delay used to advance the carousel.
//!
//! Arming always replaces the previous deadline, so at most one advancement
//! is pending at any time. Each arm hands out a [`TimerTicket`]; a ticket
//! from a cancelled or superseded arm never fires.

use std::future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    generation: u64,
    deadline: Instant,
}

impl TimerTicket {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[derive(Debug, Default)]
pub struct AdvanceTimer {
    generation: u64,
    armed: Option<TimerTicket>,
}

impl AdvanceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now: Instant, after: Duration) -> TimerTicket {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        let ticket = TimerTicket {
            generation: self.generation,
            deadline: now + after,
        };
        self.armed = Some(ticket);
        ticket
    }

    /// Returns whether a pending deadline was dropped.
    pub fn cancel(&mut self) -> bool {
        self.armed.take().is_some()
    }

    pub fn armed(&self) -> Option<TimerTicket> {
        self.armed
    }


    /// Consume `ticket` if it belongs to the live arm.
    pub fn fire(&mut self, ticket: TimerTicket) -> bool {
        if self.armed == Some(ticket) {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

/// Resolve when `ticket` expires; never resolves for `None`.
///
/// Takes the ticket by value so the caller's timer stays free for mutation
/// while this future is polled inside `select!`.
pub async fn expired(ticket: Option<TimerTicket>) -> TimerTicket {
    match ticket {
        Some(ticket) => {
            sleep_until(ticket.deadline).await;
            ticket
        }
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rearm_supersedes_previous_ticket() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();
        let first = timer.arm(now, Duration::from_millis(100));
        let second = timer.arm(now, Duration::from_millis(100));
        assert_ne!(first, second);
        assert!(!timer.fire(first));
        assert!(timer.fire(second));
        assert!(timer.armed().is_none());
    }

    #[test]
    fn cancelled_ticket_never_fires() {
        let now = Instant::now();
        let mut timer = AdvanceTimer::new();
        let ticket = timer.arm(now, Duration::from_millis(5));
        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(!timer.fire(ticket));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_waits_for_deadline() {
        let mut timer = AdvanceTimer::new();
        let start = Instant::now();
        let ticket = timer.arm(start, Duration::from_millis(250));
        let fired = expired(timer.armed()).await;
        assert_eq!(fired, ticket);
        assert!(Instant::now() - start >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_timer_stays_pending() {
        let res = tokio::time::timeout(Duration::from_secs(60), expired(None)).await;
        assert!(res.is_err());
    }
}
