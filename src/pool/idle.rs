use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// An idle connection and the instant it was last handed back.
pub(super) struct IdleEntry<C> {
    pub(super) conn: C,
    pub(super) last_used: Instant,
}

/// Outcome of handing a connection back to the idle list.
pub(super) enum Pushed<C> {
    Kept,
    /// The list overflowed; this is the oldest entry, to be closed by the caller.
    Evicted(C),
    /// The list is closed; the returned connection must be closed by the caller.
    Rejected(C),
}

/// The lock-protected part of the pool. Entries are ordered oldest first, so
/// borrowing pops from the back and eviction/expiry work from the front.
///
/// Nothing here blocks or closes connections; callers close whatever comes
/// back after dropping the lock.
pub(super) struct IdleList<C> {
    entries: VecDeque<IdleEntry<C>>,
    closed: bool,
}

impl<C> IdleList<C> {
    pub(super) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            closed: false,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(super) fn pop_newest(&mut self) -> Option<IdleEntry<C>> {
        self.entries.pop_back()
    }

    pub(super) fn push(&mut self, conn: C, now: Instant, max_idle: usize) -> Pushed<C> {
        if self.closed {
            return Pushed::Rejected(conn);
        }

        self.entries.push_back(IdleEntry {
            conn,
            last_used: now,
        });

        if self.entries.len() > max_idle
            && let Some(oldest) = self.entries.pop_front()
        {
            return Pushed::Evicted(oldest.conn);
        }
        Pushed::Kept
    }

    /// Remove every entry idle for at least `lifetime` as of `now`.
    pub(super) fn take_expired(&mut self, now: Instant, lifetime: Duration) -> Vec<C> {
        let mut expired = Vec::new();
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.last_used) < lifetime {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                expired.push(entry.conn);
            }
        }
        expired
    }

    /// Mark the list closed and hand back everything it held.
    pub(super) fn close(&mut self) -> Vec<C> {
        self.closed = true;
        self.entries.drain(..).map(|entry| entry.conn).collect()
    }
}
