use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::context::RedisContext;

pub async fn health(ctx: RedisContext) -> impl IntoResponse {
    let probe: Result<String, _> = ctx.query(&redis::cmd("PING")).await;
    let pool = ctx.pool().stats();

    match probe {
        Ok(_) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "status": "ok",
                "pool": pool,
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "redis health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(serde_json::json!({
                    "status": "degraded",
                    "error": e.to_string(),
                    "pool": pool,
                })),
            )
        }
    }
}
