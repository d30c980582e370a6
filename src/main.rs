mod config;
mod handlers;
mod pool;
mod redis_client;
mod workers;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use handlers::context::attach_redis;
use pool::Pool;
use redis_client::{RedisDialer, RedisPool};

const MAX_BODY_SIZE: usize = 64 * 1024; // 64KB

/// Shared application state. The pool is built once at startup and handed to
/// each request through [`attach_redis`].
#[derive(Clone)]
pub struct AppState {
    pub pool: RedisPool,
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/kv/{key}",
            get(handlers::kv::get_value)
                .put(handlers::kv::put_value)
                .delete(handlers::kv::delete_value),
        )
        .layer(middleware::from_fn_with_state(state, attach_redis))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() {
    // Initialize tracing before config so configuration warnings are visible
    let debug = std::env::var("SERVICE_DEBUG").is_ok_and(|v| !v.is_empty());
    let log_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("redis_pool_service={log_level},tower_http=info").into()
            }),
        )
        .init();

    // A pool without an endpoint is a deployment error: refuse to start
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid redis configuration");
            std::process::exit(1);
        }
    };

    let dialer = match RedisDialer::new(&config.endpoint, config.dial_timeout) {
        Ok(dialer) => dialer,
        Err(e) => {
            tracing::error!(error = %e, endpoint = ?config.endpoint, "failed to build redis client");
            std::process::exit(1);
        }
    };
    let pool = Pool::new(config.pool.clone(), dialer);

    tracing::info!(
        host = config.endpoint.host,
        port = config.endpoint.port,
        auth = config.endpoint.password.is_some(),
        max_idle = config.pool.max_idle(),
        idle_timeout_secs = config.pool.idle_timeout().as_secs(),
        "redis pool ready"
    );

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper = workers::idle_reaper::spawn_idle_reaper(pool.clone(), shutdown_rx);

    let state = AppState { pool: pool.clone() };

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    tracing::info!(port = config.port, "redis pool service starting");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .expect("server error");

    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    pool.close();

    tracing::info!("shutdown complete");
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, draining requests");

    // Notify workers to exit
    let _ = shutdown_tx.send(true);
}
