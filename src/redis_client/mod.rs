use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue, RedisError, RedisResult};

use crate::config::Endpoint;
use crate::pool::{Connection, DialError, Dialer, Pool, PoolError, ValidationError};

#[cfg(test)]
pub(crate) mod testing;

pub type RedisPool = Pool<RedisDialer>;

/// Opens authenticated connections to one Redis endpoint.
#[derive(Clone)]
pub struct RedisDialer {
    client: redis::Client,
    address: String,
    password: Option<String>,
    timeout: Duration,
}

impl RedisDialer {
    /// Does not touch the network; connections are opened on first borrow.
    pub fn new(endpoint: &Endpoint, timeout: Duration) -> Result<Self, RedisError> {
        let client = redis::Client::open(endpoint.redis_url())?;
        Ok(Self {
            client,
            address: endpoint.address(),
            password: endpoint.password.clone(),
            timeout,
        })
    }
}

impl Dialer for RedisDialer {
    type Conn = MultiplexedConnection;

    async fn dial(&self) -> Result<MultiplexedConnection, DialError> {
        let connect = self.client.get_multiplexed_async_connection();
        let mut conn = match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(DialError::connect(format!("{}: {}", self.address, e))),
            Err(_) => {
                return Err(DialError::timeout(format!(
                    "{} after {}ms",
                    self.address,
                    self.timeout.as_millis()
                )));
            }
        };

        if let Some(password) = &self.password {
            let auth: RedisResult<()> = redis::cmd("AUTH").arg(password).query_async(&mut conn).await;
            if let Err(e) = auth {
                conn.close();
                return Err(DialError::auth(e.to_string()));
            }
        }

        tracing::debug!(address = %self.address, "opened redis connection");
        Ok(conn)
    }
}

impl Connection for MultiplexedConnection {
    async fn probe(&mut self) -> Result<(), ValidationError> {
        let pong: RedisResult<String> = redis::cmd("PING").query_async(self).await;
        pong.map(|_| ())
            .map_err(|e| ValidationError::new(e.to_string()))
    }
}

#[derive(Debug)]
pub enum QueryError {
    /// No connection could be borrowed.
    Pool(PoolError),
    /// The command reached Redis and failed.
    Redis(RedisError),
}

impl From<PoolError> for QueryError {
    fn from(err: PoolError) -> Self {
        QueryError::Pool(err)
    }
}

impl std::error::Error for QueryError {}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Pool(e) => write!(f, "redis unavailable: {}", e),
            QueryError::Redis(e) => write!(f, "redis error: {}", e),
        }
    }
}

/// Borrow a connection, run one command, and hand the connection back.
///
/// A connection that failed at the transport level is closed rather than
/// returned, so the next borrower doesn't inherit it.
pub async fn query<T: FromRedisValue>(pool: &RedisPool, cmd: &Cmd) -> Result<T, QueryError> {
    let mut conn = pool.get().await?;
    let result: RedisResult<T> = cmd.query_async(&mut *conn).await;

    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            if is_connection_fault(&e) {
                tracing::warn!(error = %e, "closing redis connection after transport error");
                conn.discard();
            }
            Err(QueryError::Redis(e))
        }
    }
}

fn is_connection_fault(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout() || err.is_unrecoverable_error()
}
