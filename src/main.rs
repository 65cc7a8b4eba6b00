//! # File Server - Entry Point
//! src/main.rs
//!
//! Lee la configuración, arma el runtime con la cantidad de threads de
//! reactor pedida y corre el servidor hasta Ctrl+C.

use clap::Parser;
use file_server::config::Config;
use file_server::error::ServerError;
use file_server::server::Server;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    config.log_summary();

    match serve(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "error fatal");
            ExitCode::FAILURE
        }
    }
}

fn serve(config: Config) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.reactor_threads.max(1))
        .thread_name("reactor")
        .enable_all()
        .build()
        .map_err(|e| ServerError::Runtime(e.to_string()))?;

    runtime.block_on(async {
        let server = Server::bind(config).await?;
        server.run().await
    })
}
