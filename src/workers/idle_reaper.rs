use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::pool::{Dialer, Pool};

const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn a background task that closes idle connections past the pool's idle
/// lifetime. Does nothing when no lifetime is configured.
pub fn spawn_idle_reaper<D: Dialer, V: Send + Sync + 'static>(
    pool: Pool<D, V>,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    let Some(lifetime) = pool.options().max_idle_lifetime() else {
        tracing::info!("idle reaper disabled: no idle lifetime configured");
        return None;
    };
    let interval = (lifetime / 2).max(MIN_REAP_INTERVAL);

    Some(tokio::spawn(async move {
        tracing::info!(interval_ms = interval.as_millis() as u64, "idle reaper started");

        loop {
            if *shutdown.borrow() {
                tracing::info!("idle reaper shutting down");
                return;
            }

            let reaped = pool.reap_idle();
            if reaped > 0 {
                tracing::debug!(reaped, "closed expired idle connections");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::watch;

    use super::spawn_idle_reaper;
    use crate::pool::testing::FakeDialer;
    use crate::pool::{Pool, PoolOptions};

    #[tokio::test]
    async fn disabled_without_idle_lifetime() {
        let pool = Pool::new(PoolOptions::new(), FakeDialer::new());
        let (_tx, rx) = watch::channel(false);

        assert!(spawn_idle_reaper(pool, rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn closes_expired_connections_and_stops_on_shutdown() {
        let dialer = FakeDialer::new();
        let ledger = dialer.ledger.clone();
        let options = PoolOptions::new().with_max_idle_lifetime(Duration::from_secs(10));
        let pool = Pool::new(options, dialer);

        let conn = pool.acquire().await.expect("dial");
        pool.release(conn);

        let (tx, rx) = watch::channel(false);
        let reaper = spawn_idle_reaper(pool.clone(), rx).expect("reaper enabled");

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(ledger.closed(), vec![0]);
        assert_eq!(pool.stats().idle, 0);

        tx.send(true).expect("reaper listening");
        reaper.await.expect("reaper task");
    }
}
