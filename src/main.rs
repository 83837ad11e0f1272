//! Container entrypoint: supervise the proxy binary and serve health checks.

use std::process::ExitCode;

use proxy_supervisor::{config, lifecycle, observability};

#[tokio::main]
async fn main() -> ExitCode {
    observability::logging::init_logging();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-supervisor starting");

    let config = config::load_from_env();
    let code = lifecycle::run(config).await;

    tracing::info!(code, "Shutdown complete");
    ExitCode::from(code)
}
