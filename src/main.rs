//! PDF conversion MCP Server - Entry point
//!
//! Arguments are directories the server may read from and write to. With no
//! arguments, any path is allowed.

use bigpdf_mcp_server::{run_server, run_server_with_dirs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the MCP protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bigpdf_mcp_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let resource_dirs: Vec<String> = std::env::args().skip(1).collect();
    tracing::info!(dirs = ?resource_dirs, "Starting PDF conversion MCP Server");

    if resource_dirs.is_empty() {
        run_server().await
    } else {
        run_server_with_dirs(resource_dirs).await
    }
}
