//! HTTP server command handler

use anyhow::{Context, Result};

use starling::service::Service;

/// Run the HTTP server on a multi-threaded runtime until Ctrl-C
pub fn run(service: Service, host: &str, port: u16) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(starling::server::serve(service, host, port))
}
