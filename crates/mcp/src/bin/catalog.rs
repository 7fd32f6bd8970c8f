//! Storefront catalog backend.
//!
//! Speaks MCP on stdin/stdout and logs to stderr (`RUST_LOG` controls the
//! level, default `warn`).

use anyhow::Result;
use storefront_mcp::{init_backend_logging, serve_stdio, CatalogHandler};

#[tokio::main]
async fn main() -> Result<()> {
    init_backend_logging();

    serve_stdio(CatalogHandler::seeded()).await?;

    Ok(())
}
