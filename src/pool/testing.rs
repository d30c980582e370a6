//! In-memory connections and dialer for exercising the pool without a server.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Connection, DialError, Dialer, ValidationError, Validator};

/// Shared record of what happened to every fake connection.
#[derive(Default)]
pub(crate) struct Ledger {
    closed: Mutex<Vec<usize>>,
    dead: Mutex<HashSet<usize>>,
    probes: AtomicUsize,
    dial_failing: AtomicBool,
}

impl Ledger {
    pub(crate) fn closed(&self) -> Vec<usize> {
        self.closed.lock().clone()
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Make every future probe of connection `id` fail.
    pub(crate) fn kill(&self, id: usize) {
        self.dead.lock().insert(id);
    }

    pub(crate) fn set_dial_failing(&self, failing: bool) {
        self.dial_failing.store(failing, Ordering::SeqCst);
    }
}

pub(crate) struct FakeConn {
    pub(crate) id: usize,
    ledger: Arc<Ledger>,
}

impl Connection for FakeConn {
    async fn probe(&mut self) -> Result<(), ValidationError> {
        self.ledger.probes.fetch_add(1, Ordering::SeqCst);
        if self.ledger.dead.lock().contains(&self.id) {
            return Err(ValidationError::new(format!("connection {} reset", self.id)));
        }
        Ok(())
    }

    fn close(self) {
        self.ledger.closed.lock().push(self.id);
    }
}

/// Hands out connections numbered from zero.
#[derive(Default)]
pub(crate) struct FakeDialer {
    pub(crate) ledger: Arc<Ledger>,
    next_id: AtomicUsize,
    delay: Option<Duration>,
    dialing: Option<Arc<Notify>>,
}

impl FakeDialer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every dial, signalling `dialing` when one starts.
    pub(crate) fn slow(delay: Duration, dialing: Arc<Notify>) -> Self {
        Self {
            delay: Some(delay),
            dialing: Some(dialing),
            ..Self::default()
        }
    }
}

impl Dialer for FakeDialer {
    type Conn = FakeConn;

    async fn dial(&self) -> Result<FakeConn, DialError> {
        if let Some(dialing) = &self.dialing {
            dialing.notify_one();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.ledger.dial_failing.load(Ordering::SeqCst) {
            return Err(DialError::connect("connection refused"));
        }
        Ok(FakeConn {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            ledger: self.ledger.clone(),
        })
    }
}

/// Validator that parks until told to proceed, then probes as usual.
#[derive(Default)]
pub(crate) struct GatedValidator {
    pub(crate) entered: Arc<Notify>,
    pub(crate) proceed: Arc<Notify>,
}

impl<C: Connection> Validator<C> for GatedValidator {
    async fn validate(&self, conn: &mut C) -> Result<(), ValidationError> {
        self.entered.notify_one();
        self.proceed.notified().await;
        conn.probe().await
    }
}
