//! Lazily validated connection pool.
//!
//! The pool keeps a bounded LIFO of idle connections to a single endpoint.
//! Borrowing reuses the most recently returned connection; one that sat idle
//! past the idle timeout is validated first and replaced if it fails. When
//! nothing idle is usable a fresh connection is dialed.
//!
//! The idle list sits behind one mutex that is only held for push/pop.
//! Dialing, validating and closing always happen with the lock released.
//!
//! Once [`Pool::close`] has run, every later borrow fails with
//! [`PoolError::Closed`], including borrows whose dial was already in flight.
//! Connections handed back after close are closed instead of kept.

mod error;
mod idle;
mod options;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

pub use error::{DialError, DialErrorKind, PoolError, ValidationError};
pub use options::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE, PoolOptions};

use idle::{IdleList, Pushed};

/// A connection the pool can manage.
pub trait Connection: Send + 'static {
    /// Cheap round trip proving the connection still works.
    fn probe(&mut self) -> impl Future<Output = Result<(), ValidationError>> + Send;

    fn close(self)
    where
        Self: Sized,
    {
        drop(self)
    }
}

/// Creates new connections, including any authentication step.
pub trait Dialer: Send + Sync + 'static {
    type Conn: Connection;

    fn dial(&self) -> impl Future<Output = Result<Self::Conn, DialError>> + Send;
}

/// Liveness check run on connections that have been idle too long.
pub trait Validator<C>: Send + Sync + 'static {
    fn validate(&self, conn: &mut C) -> impl Future<Output = Result<(), ValidationError>> + Send;
}

/// Default validator: the connection's own [`Connection::probe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Probe;

impl<C: Connection> Validator<C> for Probe {
    async fn validate(&self, conn: &mut C) -> Result<(), ValidationError> {
        conn.probe().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub dials: u64,
    pub validation_failures: u64,
    pub closed: bool,
}

struct Shared<D: Dialer, V> {
    options: PoolOptions,
    dialer: D,
    validator: V,
    idle: Mutex<IdleList<D::Conn>>,
    in_use: AtomicUsize,
    dials: AtomicU64,
    validation_failures: AtomicU64,
}

/// Shared handle to a connection pool. Clones refer to the same pool.
pub struct Pool<D: Dialer, V = Probe> {
    shared: Arc<Shared<D, V>>,
}

impl<D: Dialer, V> Clone for Pool<D, V> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<D: Dialer> Pool<D, Probe> {
    pub fn new(options: PoolOptions, dialer: D) -> Self {
        Self::with_validator(options, dialer, Probe)
    }
}

impl<D: Dialer, V> Pool<D, V> {
    pub fn with_validator(options: PoolOptions, dialer: D, validator: V) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                dialer,
                validator,
                idle: Mutex::new(IdleList::new()),
                in_use: AtomicUsize::new(0),
                dials: AtomicU64::new(0),
                validation_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn options(&self) -> &PoolOptions {
        &self.shared.options
    }

    /// Hand a borrowed connection back.
    ///
    /// `conn` must have come from this pool's [`acquire`](Self::acquire) and
    /// must not be used afterwards. If the idle list is over capacity the
    /// oldest idle connection is closed; if the pool is closed `conn` itself is.
    pub fn release(&self, conn: D::Conn) {
        self.mark_returned();

        let pushed = self
            .shared
            .idle
            .lock()
            .push(conn, Instant::now(), self.shared.options.max_idle());

        match pushed {
            Pushed::Kept => {}
            Pushed::Evicted(oldest) => {
                tracing::debug!("idle list full, closing oldest connection");
                oldest.close();
            }
            Pushed::Rejected(conn) => {
                tracing::debug!("pool closed, closing returned connection");
                conn.close();
            }
        }
    }

    /// Close a borrowed connection instead of returning it, e.g. after an
    /// I/O error left it in an unknown state.
    pub fn discard(&self, conn: D::Conn) {
        self.mark_returned();
        conn.close();
    }

    /// Close every idle connection and refuse further borrows. Safe to call
    /// more than once and concurrently with borrows.
    pub fn close(&self) {
        let drained = self.shared.idle.lock().close();
        tracing::info!(idle = drained.len(), "closing connection pool");
        for conn in drained {
            conn.close();
        }
    }

    /// Close idle connections older than the configured idle lifetime.
    /// Returns how many were closed; always zero without a lifetime.
    pub fn reap_idle(&self) -> usize {
        let Some(lifetime) = self.shared.options.max_idle_lifetime() else {
            return 0;
        };

        let expired = self.shared.idle.lock().take_expired(Instant::now(), lifetime);
        let count = expired.len();
        for conn in expired {
            conn.close();
        }
        count
    }

    pub fn stats(&self) -> PoolStats {
        let (idle, closed) = {
            let idle = self.shared.idle.lock();
            (idle.len(), idle.is_closed())
        };
        PoolStats {
            idle,
            in_use: self.shared.in_use.load(Ordering::SeqCst),
            dials: self.shared.dials.load(Ordering::SeqCst),
            validation_failures: self.shared.validation_failures.load(Ordering::SeqCst),
            closed,
        }
    }

    fn mark_returned(&self) {
        let _ = self
            .shared
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn mark_checked_out(&self, conn: D::Conn) -> D::Conn {
        self.shared.in_use.fetch_add(1, Ordering::SeqCst);
        conn
    }
}

impl<D: Dialer, V: Validator<D::Conn>> Pool<D, V> {
    /// Borrow a connection. The caller owns it until it is passed back to
    /// [`release`](Self::release) or [`discard`](Self::discard).
    ///
    /// A dial failure is returned immediately; retrying is up to the caller.
    /// Wrap the call in `tokio::time::timeout` to bound how long it may take.
    pub async fn acquire(&self) -> Result<D::Conn, PoolError> {
        let shared = &*self.shared;

        loop {
            let entry = {
                let mut idle = shared.idle.lock();
                if idle.is_closed() {
                    return Err(PoolError::Closed);
                }
                idle.pop_newest()
            };
            let Some(entry) = entry else {
                break;
            };

            let idle_for = entry.last_used.elapsed();
            let mut conn = entry.conn;

            if let Some(lifetime) = shared.options.max_idle_lifetime()
                && idle_for >= lifetime
            {
                tracing::debug!(
                    idle_ms = idle_for.as_millis() as u64,
                    "closing connection past idle lifetime"
                );
                conn.close();
                continue;
            }

            if idle_for < shared.options.idle_timeout() {
                return Ok(self.mark_checked_out(conn));
            }

            match shared.validator.validate(&mut conn).await {
                Ok(()) => return self.check_out_unless_closed(conn),
                Err(e) => {
                    shared.validation_failures.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(
                        idle_ms = idle_for.as_millis() as u64,
                        error = %e,
                        "discarding stale connection"
                    );
                    conn.close();
                }
            }
        }

        let conn = shared.dialer.dial().await?;
        shared.dials.fetch_add(1, Ordering::SeqCst);
        self.check_out_unless_closed(conn)
    }

    /// The pool may have closed while `conn` was being dialed or validated.
    fn check_out_unless_closed(&self, conn: D::Conn) -> Result<D::Conn, PoolError> {
        let closed = self.shared.idle.lock().is_closed();
        if closed {
            conn.close();
            return Err(PoolError::Closed);
        }
        Ok(self.mark_checked_out(conn))
    }

    /// Borrow a connection wrapped in a guard that returns it on drop.
    pub async fn get(&self) -> Result<PooledConnection<D, V>, PoolError> {
        let conn = self.acquire().await?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.clone(),
        })
    }
}

/// A borrowed connection that goes back to its pool when dropped.
pub struct PooledConnection<D: Dialer, V = Probe> {
    conn: Option<D::Conn>,
    pool: Pool<D, V>,
}

impl<D: Dialer, V> PooledConnection<D, V> {
    /// Close the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

impl<D: Dialer, V> Deref for PooledConnection<D, V> {
    type Target = D::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<D: Dialer, V> DerefMut for PooledConnection<D, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<D: Dialer, V> Drop for PooledConnection<D, V> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
