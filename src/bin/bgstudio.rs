//! bgstudio CLI
//!
//! Runs the HTTP server, processes images locally, or posts them to a
//! running server.

use bgstudio::cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    cli::main().await
}
