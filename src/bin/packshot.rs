//! Packshot CLI
//!
//! Command-line entry point: one-shot processing and the HTTP service.

use packshot::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
