//! Process entrypoint: loads configuration, builds the [`CoreRuntime`],
//! starts the decay/sweep scheduler, and serves the REST API until signaled
//! to shut down.
//!
//! Exit codes follow the external-interfaces contract: `0` on a clean
//! shutdown, `1` for an unhandled error, `2` for invalid configuration, `3`
//! when a required store is unreachable at startup.

use hyphae::config::RuntimeConfig;
use hyphae::observability::init_tracing;
use hyphae::runtime::{CoreRuntime, RuntimeInitError};
use hyphae::scheduler;
use hyphae::server;
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_UNHANDLED_ERROR: u8 = 1;
const EXIT_INVALID_CONFIG: u8 = 2;
const EXIT_STORE_UNREACHABLE: u8 = 3;

fn main() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(EXIT_INVALID_CONFIG);
        }
    };

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("could not initialize tracing: {e}");
        return ExitCode::from(EXIT_UNHANDLED_ERROR);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("could not start the async runtime: {e}");
            return ExitCode::from(EXIT_UNHANDLED_ERROR);
        }
    };

    runtime.block_on(run(config))
}

async fn run(config: RuntimeConfig) -> ExitCode {
    let listen_addr = config.listen_addr;

    let core_runtime = match CoreRuntime::initialize(config).await {
        Ok(core_runtime) => Arc::new(core_runtime),
        Err(e @ RuntimeInitError::Store(_)) => {
            tracing::error!("required store unreachable at startup: {e}");
            return ExitCode::from(EXIT_STORE_UNREACHABLE);
        }
        Err(e) => {
            tracing::error!("could not build runtime: {e}");
            return ExitCode::from(EXIT_UNHANDLED_ERROR);
        }
    };

    let scheduler_handles = scheduler::spawn(Arc::clone(&core_runtime));

    let router = server::build_router(Arc::clone(&core_runtime), server::DEFAULT_REQUEST_TIMEOUT);

    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("could not bind {listen_addr}: {e}");
            scheduler_handles.abort();
            return ExitCode::from(EXIT_UNHANDLED_ERROR);
        }
    };

    tracing::info!("listening on {listen_addr}");

    let result = server::serve(listener, router, server::shutdown_signal()).await;
    scheduler_handles.abort();

    match result {
        Ok(()) => {
            tracing::info!("shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("server error: {e}");
            ExitCode::from(EXIT_UNHANDLED_ERROR)
        }
    }
}
