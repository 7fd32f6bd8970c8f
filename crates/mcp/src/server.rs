//! MCP plumbing shared by every backend binary.
//!
//! A [`CapabilityHandler`] is wrapped in a [`CapabilityServer`], which speaks
//! MCP through `rmcp`: each capability is listed as a tool whose input schema
//! comes from `schemars`, and each tool call is dispatched to the handler.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler, ServiceExt};
use serde_json::{json, Map, Value};
use storefront_core::domain::capability::Capability;
use storefront_core::protocol::ToolOutcome;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::McpError;

const INBOUND_BUFFER: usize = 64 * 1024;

/// One backend's capabilities. A handler is driven through a single lock,
/// so calls never overlap.
pub trait CapabilityHandler: Send {
    fn server_name(&self) -> &'static str;

    fn instructions(&self) -> Option<&'static str> {
        None
    }

    fn capabilities(&self) -> Vec<Capability>;

    fn invoke(&mut self, capability: &str, arguments: Map<String, Value>)
        -> Result<Value, McpError>;
}

/// Runs one capability call and packs the result the way it goes on the wire.
/// Handler errors become tool results flagged `is_error`, not protocol errors.
pub fn call_capability<H>(
    handler: &mut H,
    capability: &str,
    arguments: Map<String, Value>,
) -> CallToolResult
where
    H: CapabilityHandler + ?Sized,
{
    debug!(
        event_name = "backend.invoke",
        server = handler.server_name(),
        capability = %capability,
        "invoking capability"
    );

    let result = handler.invoke(capability, arguments);
    if let Err(error) = &result {
        warn!(
            event_name = "backend.invoke_failed",
            server = handler.server_name(),
            capability = %capability,
            error = %error,
            "capability returned an error"
        );
    }
    ToolOutcome::from(result).into_call_result()
}

/// The initialize answer for a backend.
pub fn server_info(name: &str, instructions: Option<&str>) -> ServerInfo {
    let mut implementation = Implementation::from_build_env();
    implementation.name = name.to_string();
    implementation.version = env!("CARGO_PKG_VERSION").to_string();

    ServerInfo {
        capabilities: ServerCapabilities::builder().enable_tools().build(),
        server_info: implementation,
        instructions: instructions.map(str::to_string),
        ..Default::default()
    }
}

/// Adapts a [`CapabilityHandler`] to `rmcp`'s [`ServerHandler`].
pub struct CapabilityServer<H> {
    name: &'static str,
    instructions: Option<&'static str>,
    handler: Arc<Mutex<H>>,
}

impl<H> CapabilityServer<H>
where
    H: CapabilityHandler + 'static,
{
    pub fn new(handler: H) -> Self {
        Self {
            name: handler.server_name(),
            instructions: handler.instructions(),
            handler: Arc::new(Mutex::new(handler)),
        }
    }
}

impl<H> ServerHandler for CapabilityServer<H>
where
    H: CapabilityHandler + 'static,
{
    fn get_info(&self) -> ServerInfo {
        server_info(self.name, self.instructions)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let capabilities = self.handler.lock().await.capabilities();
        Ok(ListToolsResult::with_all_items(capabilities.iter().map(Capability::to_tool).collect()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.unwrap_or_default();
        let mut handler = self.handler.lock().await;
        Ok(call_capability(&mut *handler, &request.name, arguments))
    }
}

/// Copies newline-terminated JSON frames from `reader` to `writer`.
///
/// A frame that is not UTF-8 or not JSON is logged and dropped, so one bad
/// line never ends the session and takes the backend's state with it.
pub async fn forward_frames<R, W>(reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        if reader.read_until(b'\n', &mut frame).await? == 0 {
            break;
        }

        let text = match std::str::from_utf8(&frame) {
            Ok(text) => text.trim(),
            Err(error) => {
                warn!(event_name = "backend.malformed_frame", error = %error, "dropping frame that is not UTF-8");
                continue;
            }
        };
        if text.is_empty() {
            continue;
        }
        if let Err(error) = serde_json::from_str::<serde::de::IgnoredAny>(text) {
            warn!(event_name = "backend.malformed_frame", error = %error, "dropping frame that is not JSON");
            continue;
        }

        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    writer.shutdown().await
}

/// Serves MCP over `reader`/`writer` until the client disconnects.
pub async fn serve<H, R, W>(handler: H, reader: R, writer: W) -> Result<(), McpError>
where
    H: CapabilityHandler + 'static,
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let name = handler.server_name();
    let (inbound, filtered) = tokio::io::duplex(INBOUND_BUFFER);
    let forwarder = tokio::spawn(forward_frames(reader, filtered));

    let service = CapabilityServer::new(handler)
        .serve((inbound, writer))
        .await
        .map_err(|error| McpError::Transport(error.to_string()))?;
    info!(event_name = "backend.initialized", server = name, "client connected");

    let reason = service.waiting().await.map_err(|error| McpError::Transport(error.to_string()));
    forwarder.abort();
    info!(event_name = "backend.stopped", server = name, "client disconnected");
    reason.map(|_| ())
}

pub async fn serve_stdio<H>(handler: H) -> Result<(), McpError>
where
    H: CapabilityHandler + 'static,
{
    info!(event_name = "backend.started", server = handler.server_name(), "serving on stdio");
    serve(handler, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Stdout carries the protocol, so backend logs go to stderr. Defaults to
/// `warn` unless `RUST_LOG` says otherwise.
pub fn init_backend_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// A `{message, cart}` result shared by the cart-mutating capabilities.
pub(crate) fn cart_result(message: String, cart: Value) -> Value {
    json!({ "message": message, "cart": cart })
}
