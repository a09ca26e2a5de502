//! Delayed result poll.
//!
//! Holds at most one pending poll. Scheduling a new one replaces the old,
//! and the owner fires it by calling [`PollScheduler::take_due`] from its
//! event loop. Time is always passed in so tests can drive it.

use std::time::{Duration, Instant};

use crate::remote::Ticket;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPoll {
    pub ticket: Ticket,
    pub token: String,
    pub due: Instant,
}

#[derive(Debug, Default)]
pub struct PollScheduler {
    pending: Option<ScheduledPoll>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, ticket: Ticket, token: impl Into<String>, delay: Duration, now: Instant) {
        if let Some(prev) = &self.pending {
            log::debug!("poll {} replaced by {}", prev.ticket, ticket);
        }
        self.pending = Some(ScheduledPoll {
            ticket,
            token: token.into(),
            due: now + delay,
        });
    }

    /// Drop the pending poll, returning it if there was one.
    pub fn cancel(&mut self) -> Option<ScheduledPoll> {
        self.pending.take()
    }

    /// Remove and return the pending poll once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<ScheduledPoll> {
        match &self.pending {
            Some(poll) if poll.due <= now => self.pending.take(),
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
