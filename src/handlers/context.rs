use axum::extract::{FromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use redis::{Cmd, FromRedisValue};

use crate::AppState;
use crate::redis_client::{self, QueryError, RedisPool};

/// Per-request handle to the shared Redis pool.
///
/// Installed by [`attach_redis`] before the handler runs; handlers take it as
/// an argument instead of reaching into global state.
#[derive(Clone)]
pub struct RedisContext {
    pool: RedisPool,
}

impl RedisContext {
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Run a single command on a pooled connection.
    pub async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, QueryError> {
        redis_client::query(&self.pool, cmd).await
    }
}

/// Middleware that puts a [`RedisContext`] into the request extensions.
pub async fn attach_redis(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(RedisContext {
        pool: state.pool.clone(),
    });
    next.run(request).await
}

impl<S: Send + Sync> FromRequestParts<S> for RedisContext {
    type Rejection = (StatusCode, axum::Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<RedisContext>() {
            Some(ctx) => Ok(ctx.clone()),
            None => {
                tracing::error!("redis context missing, attach_redis middleware not installed");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(serde_json::json!({"error": "redis_context_missing"})),
                ))
            }
        }
    }
}
