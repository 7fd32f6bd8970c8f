//! In-memory stand-ins for backend processes and the model service.
//!
//! Backends are the real catalog and payment handlers served over MCP on a
//! duplex stream, wrapped so tests can record calls or cut the channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler, ServiceExt};
use serde_json::{json, Map, Value};
use storefront_core::config::LaunchSpec;
use storefront_core::domain::capability::Capability;
use storefront_mcp::{
    call_capability, server_info, CapabilityHandler, CatalogHandler, McpError, PaymentHandler,
};
use tokio::io::DuplexStream;
use tokio::sync::Notify;

use crate::llm::{AssistantReply, ChatMessage, LlmClient, LlmError, ToolSpec};
use crate::manager::Launcher;
use crate::session::{SessionError, Transport};

type HandlerFactory = Arc<dyn Fn() -> Box<dyn CapabilityHandler> + Send + Sync>;

#[derive(Clone, Default)]
pub struct InvocationLog(Arc<Mutex<Vec<(String, Map<String, Value>)>>>);

impl InvocationLog {
    fn push(&self, name: &str, arguments: &Map<String, Value>) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push((name.to_string(), arguments.clone()));
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.0.lock().map(|entries| entries.iter().map(|(n, _)| n.clone()).collect()).unwrap_or_default()
    }

    /// Arguments of the most recent call to `name`.
    pub fn arguments_for(&self, name: &str) -> Option<Value> {
        let entries = self.0.lock().ok()?;
        entries.iter().rev().find(|(n, _)| n == name).map(|(_, args)| Value::Object(args.clone()))
    }
}

/// Answers every listed capability with `{server, capability}`.
struct StubHandler {
    name: &'static str,
    capabilities: Vec<Capability>,
}

impl CapabilityHandler for StubHandler {
    fn server_name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }

    fn invoke(&mut self, capability: &str, _arguments: Map<String, Value>) -> Result<Value, McpError> {
        if self.capabilities.iter().any(|listed| listed.name == capability) {
            Ok(json!({"server": self.name, "capability": capability}))
        } else {
            Err(McpError::UnknownCapability(capability.to_string()))
        }
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Serve,
    HangUp,
    Silent,
}

/// One launchable backend. Every launch gets a fresh handler, the way a
/// restarted process starts from its seed data.
#[derive(Clone)]
pub struct FakeBackend {
    behavior: Behavior,
    factory: HandlerFactory,
    die_after: Option<usize>,
    log: Option<InvocationLog>,
}

impl FakeBackend {
    fn serving<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn CapabilityHandler> + Send + Sync + 'static,
    {
        Self { behavior: Behavior::Serve, factory: Arc::new(factory), die_after: None, log: None }
    }

    pub fn stub(name: &'static str, capabilities: &[&str]) -> Self {
        let capabilities: Vec<Capability> = capabilities
            .iter()
            .map(|capability| {
                Capability::new(*capability, format!("stub {capability}"), json!({"type": "object"}))
            })
            .collect();
        Self::serving(move || {
            Box::new(StubHandler { name, capabilities: capabilities.clone() }) as Box<dyn CapabilityHandler>
        })
    }

    /// Drops its end of the channel before the handshake.
    pub fn hang_up() -> Self {
        Self { behavior: Behavior::HangUp, ..Self::stub("gone", &[]) }
    }

    /// Holds the channel open and never answers.
    pub fn silent() -> Self {
        Self { behavior: Behavior::Silent, ..Self::stub("silent", &[]) }
    }

    /// Closes the channel instead of answering any call after the first `calls`.
    pub fn die_after(mut self, calls: usize) -> Self {
        self.die_after = Some(calls);
        self
    }

    pub fn recording(mut self, log: InvocationLog) -> Self {
        self.log = Some(log);
        self
    }

    async fn run(self, stream: DuplexStream) {
        match self.behavior {
            Behavior::HangUp => drop(stream),
            Behavior::Silent => {
                let _held = stream;
                std::future::pending::<()>().await;
            }
            Behavior::Serve => {
                let kill = Arc::new(Notify::new());
                let server = FakeServer::new(&self, kill.clone());
                let Ok(service) = server.serve(tokio::io::split(stream)).await else {
                    return;
                };
                // Dropping the running service closes the channel.
                tokio::select! {
                    _ = service.waiting() => {}
                    _ = kill.notified() => {}
                }
            }
        }
    }
}

struct FakeServer {
    info: ServerInfo,
    handler: Mutex<Box<dyn CapabilityHandler>>,
    served: AtomicUsize,
    die_after: Option<usize>,
    log: Option<InvocationLog>,
    kill: Arc<Notify>,
}

impl FakeServer {
    fn new(backend: &FakeBackend, kill: Arc<Notify>) -> Self {
        let handler = (backend.factory)();
        Self {
            info: server_info(handler.server_name(), handler.instructions()),
            handler: Mutex::new(handler),
            served: AtomicUsize::new(0),
            die_after: backend.die_after,
            log: backend.log.clone(),
            kill,
        }
    }

    fn poisoned() -> ErrorData {
        ErrorData::internal_error("handler lock poisoned", None)
    }
}

impl ServerHandler for FakeServer {
    fn get_info(&self) -> ServerInfo {
        self.info.clone()
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let capabilities = self.handler.lock().map_err(|_| Self::poisoned())?.capabilities();
        Ok(ListToolsResult::with_all_items(capabilities.iter().map(Capability::to_tool).collect()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let served = self.served.fetch_add(1, Ordering::SeqCst);
        if self.die_after.is_some_and(|limit| served >= limit) {
            self.kill.notify_one();
            return std::future::pending().await;
        }

        let arguments = request.arguments.unwrap_or_default();
        if let Some(log) = &self.log {
            log.push(&request.name, &arguments);
        }
        let mut handler = self.handler.lock().map_err(|_| Self::poisoned())?;
        Ok(call_capability(&mut **handler, &request.name, arguments))
    }
}

pub fn duplex_transport(backend: FakeBackend) -> Transport {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(backend.run(server));
    Transport::Stream(client)
}

pub fn silent_transport() -> Transport {
    duplex_transport(FakeBackend::silent())
}

pub fn launch_spec() -> LaunchSpec {
    LaunchSpec { command: "fake".to_string(), args: Vec::new(), handshake_timeout_secs: 2 }
}

#[derive(Clone, Default)]
pub struct DuplexLauncher {
    backends: HashMap<String, FakeBackend>,
    launches: Arc<Mutex<HashMap<String, usize>>>,
}

impl DuplexLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, id: &str, backend: FakeBackend) -> Self {
        self.backends.insert(id.to_string(), backend);
        self
    }

    pub fn launch_count(&self, id: &str) -> usize {
        self.launches.lock().map(|counts| counts.get(id).copied().unwrap_or(0)).unwrap_or(0)
    }
}

#[async_trait]
impl Launcher for DuplexLauncher {
    async fn launch(&self, id: &str, spec: &LaunchSpec) -> Result<Transport, SessionError> {
        let backend = self.backends.get(id).cloned().ok_or_else(|| SessionError::Launch {
            id: id.to_string(),
            reason: format!("`{}`: not found", spec.command),
        })?;
        if let Ok(mut counts) = self.launches.lock() {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }
        Ok(duplex_transport(backend))
    }
}

pub fn catalog_backend() -> FakeBackend {
    FakeBackend::serving(|| Box::new(CatalogHandler::seeded()) as Box<dyn CapabilityHandler>)
}

pub fn payment_backend() -> FakeBackend {
    FakeBackend::serving(|| Box::new(PaymentHandler::seeded()) as Box<dyn CapabilityHandler>)
}

enum Script {
    Replies(Mutex<VecDeque<AssistantReply>>),
    Repeat(AssistantReply),
    Fail(String),
}

/// Replays canned model replies and records what it was sent.
#[derive(Clone)]
pub struct ScriptedLlm {
    script: Arc<Script>,
    received: Arc<Mutex<Vec<(Vec<ChatMessage>, Vec<String>)>>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self::with_script(Script::Replies(Mutex::new(replies.into())))
    }

    pub fn repeating(reply: AssistantReply) -> Self {
        Self::with_script(Script::Repeat(reply))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_script(Script::Fail(message.to_string()))
    }

    fn with_script(script: Script) -> Self {
        Self { script: Arc::new(script), received: Arc::default() }
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn messages_for_call(&self, index: usize) -> Vec<ChatMessage> {
        self.received
            .lock()
            .ok()
            .and_then(|calls| calls.get(index).map(|(messages, _)| messages.clone()))
            .unwrap_or_default()
    }

    pub fn last_tool_names(&self) -> Vec<String> {
        self.received
            .lock()
            .ok()
            .and_then(|calls| calls.last().map(|(_, tools)| tools.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantReply, LlmError> {
        if let Ok(mut received) = self.received.lock() {
            received.push((messages.to_vec(), tools.iter().map(|t| t.name.clone()).collect()));
        }

        match self.script.as_ref() {
            Script::Replies(replies) => replies
                .lock()
                .ok()
                .and_then(|mut replies| replies.pop_front())
                .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string())),
            Script::Repeat(reply) => Ok(reply.clone()),
            Script::Fail(message) => Err(LlmError::InvalidResponse(message.clone())),
        }
    }
}
