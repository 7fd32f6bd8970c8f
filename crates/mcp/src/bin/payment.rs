//! Storefront payment backend: shopper lookup and the checkout state machine.
//!
//! Speaks MCP on stdin/stdout and logs to stderr (`RUST_LOG` controls the
//! level, default `warn`).

use anyhow::Result;
use storefront_mcp::{init_backend_logging, serve_stdio, PaymentHandler};

#[tokio::main]
async fn main() -> Result<()> {
    init_backend_logging();

    serve_stdio(PaymentHandler::seeded()).await?;

    Ok(())
}
