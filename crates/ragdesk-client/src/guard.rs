//! Stale-response guard.
//!
//! Long requests (voice transcription, large uploads) are never cancelled
//! explicitly. Instead each request takes a [`Ticket`] before it starts, and
//! its response is applied only if no newer ticket was issued meanwhile.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one request, ordered by issue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Issues tickets and tells whether one is still the latest.
#[derive(Debug, Default)]
pub struct RequestGuard {
    latest: AtomicU64,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding every earlier ticket.
    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Whether `ticket`'s response may still be applied.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// Supersede whatever is in flight without starting anything new.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}
