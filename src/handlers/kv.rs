use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::context::RedisContext;
use crate::pool::{DialErrorKind, PoolError};
use crate::redis_client::QueryError;

const MAX_KEY_LEN: usize = 256;

/// Keys are 1-256 printable ASCII characters with no whitespace.
pub fn is_valid_key(key: &str) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return false;
    }
    key.bytes().all(|b| b.is_ascii_graphic())
}

fn invalid_key() -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(serde_json::json!({"error": "invalid_key"})),
    )
        .into_response()
}

fn query_failed(key: &str, err: QueryError) -> Response {
    if let QueryError::Pool(PoolError::Dial(dial)) = &err
        && dial.kind() == DialErrorKind::Auth
    {
        tracing::error!(error = %dial, "redis rejected the configured password");
    }

    let (status, label) = match &err {
        QueryError::Pool(_) => (StatusCode::SERVICE_UNAVAILABLE, "redis_unavailable"),
        QueryError::Redis(_) => (StatusCode::BAD_GATEWAY, "redis_error"),
    };
    tracing::warn!(key, error = %err, "redis command failed");
    (status, axum::Json(serde_json::json!({"error": label}))).into_response()
}

/// GET /kv/{key}
pub async fn get_value(ctx: RedisContext, Path(key): Path<String>) -> Response {
    if !is_valid_key(&key) {
        return invalid_key();
    }

    match ctx.query::<Option<String>>(redis::cmd("GET").arg(&key)).await {
        Ok(Some(value)) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"key": key, "value": value})),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({"error": "not_found"})),
        )
            .into_response(),
        Err(e) => query_failed(&key, e),
    }
}

/// PUT /kv/{key} with the raw request body as the value.
pub async fn put_value(ctx: RedisContext, Path(key): Path<String>, body: String) -> Response {
    if !is_valid_key(&key) {
        return invalid_key();
    }

    match ctx.query::<()>(redis::cmd("SET").arg(&key).arg(&body)).await {
        Ok(()) => (StatusCode::OK, axum::Json(serde_json::json!({"ok": true}))).into_response(),
        Err(e) => query_failed(&key, e),
    }
}

/// DELETE /kv/{key}
pub async fn delete_value(ctx: RedisContext, Path(key): Path<String>) -> Response {
    if !is_valid_key(&key) {
        return invalid_key();
    }

    match ctx.query::<i64>(redis::cmd("DEL").arg(&key)).await {
        Ok(removed) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"deleted": removed > 0})),
        )
            .into_response(),
        Err(e) => query_failed(&key, e),
    }
}
