//! HTTP server wiring: binds the REST router built in [`crate::rest_api`]
//! over a [`CoreRuntime`], with a default 30-second per-request timeout
//! layered on via `tower`'s `TimeoutLayer`.

use crate::rest_api::{create_router, AppState};
use crate::runtime::CoreRuntime;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;

/// Default per-request timeout when not overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the full application router, layered with the request timeout.
#[must_use]
pub fn build_router(runtime: AppState, request_timeout: Duration) -> Router {
    create_router(runtime).layer(ServiceBuilder::new().layer(TimeoutLayer::new(request_timeout)))
}

/// Binds a listener at `runtime.config.listen_addr`.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind(runtime: &CoreRuntime) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(runtime.config.listen_addr).await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Binds a listener on any available port, for tests.
///
/// # Errors
///
/// Returns an error if the server cannot bind to any available port.
pub async fn bind_any() -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Serves `router` on `listener` until cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while serving requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves when the process receives SIGINT (or, on Unix, SIGTERM), for use
/// as `serve`'s graceful-shutdown future.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tokio::time::{timeout, Duration as TokioDuration};

    async fn test_runtime() -> (Arc<CoreRuntime>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("server-test.db");
        let mut vars = HashMap::new();
        vars.insert(
            "HYPHAE_DATABASE_PATH".to_string(),
            db_path.to_string_lossy().to_string(),
        );
        vars.insert("HYPHAE_LISTEN_ADDR".to_string(), "127.0.0.1:0".to_string());
        let config = RuntimeConfig::from_map(&vars).unwrap();
        let runtime = CoreRuntime::initialize(config).await.unwrap();
        (Arc::new(runtime), dir)
    }

    #[tokio::test]
    async fn health_endpoint_responds_ok_against_a_healthy_store() {
        let (runtime, _dir) = test_runtime().await;
        let router = build_router(runtime, DEFAULT_REQUEST_TIMEOUT);

        let (listener, addr) = bind_any().await.unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        tokio::time::sleep(TokioDuration::from_millis(20)).await;
        let client = reqwest::Client::new();
        let response = timeout(
            TokioDuration::from_secs(1),
            client.get(format!("http://{addr}/v1/health")).send(),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(response.status().is_success());
        handle.abort();
    }
}
