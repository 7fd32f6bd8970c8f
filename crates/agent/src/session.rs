//! One live MCP connection to a backend.
//!
//! A [`Session`] owns the `rmcp` client service for its backend (and through
//! it the child process, when there is one). The service sits behind an async
//! mutex so a session never has more than one call in flight.

use std::fmt;
use std::time::Duration;

use rmcp::model::{CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{RoleClient, RunningService, ServiceError};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use serde::Serialize;
use serde_json::{Map, Value};
use storefront_core::domain::capability::Capability;
use storefront_core::protocol::ToolOutcome;
use thiserror::Error;
use tokio::io::DuplexStream;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

type ClientService = RunningService<RoleClient, ClientInfo>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch backend `{id}`: {reason}")]
    Launch { id: String, reason: String },
    #[error("handshake with backend `{id}` failed: {reason}")]
    Handshake { id: String, reason: String },
    #[error("channel to backend `{id}` closed")]
    ChannelClosed { id: String },
    #[error("transport fault on channel to backend `{id}`: {reason}")]
    Transport { id: String, reason: String },
    #[error("{message}")]
    Invocation { capability: String, message: String },
    #[error("backend `{id}` is {state}, not ready")]
    NotReady { id: String, state: SessionState },
    #[error("no backend named `{0}` has been started")]
    UnknownSession(String),
}

impl SessionError {
    /// Faults that mean the channel itself can no longer be trusted.
    pub fn is_channel_fault(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. } | Self::Transport { .. })
    }
}

/// The byte channel produced by a launcher: a child process speaking MCP on
/// its stdio, or an in-memory stream.
pub enum Transport {
    Process(TokioChildProcess),
    Stream(DuplexStream),
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(_) => f.write_str("Transport::Process"),
            Self::Stream(_) => f.write_str("Transport::Stream"),
        }
    }
}

fn client_info(client_name: &str) -> ClientInfo {
    let mut implementation = Implementation::from_build_env();
    implementation.name = client_name.to_string();
    implementation.version = env!("CARGO_PKG_VERSION").to_string();

    ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: implementation,
    }
}

pub struct Session {
    id: String,
    server_name: String,
    instructions: Option<String>,
    capabilities: Vec<Capability>,
    state: RwLock<SessionState>,
    service: Mutex<Option<ClientService>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("server_name", &self.server_name)
            .field("capabilities", &self.capabilities.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Runs the MCP initialize exchange and lists the backend's tools over a
    /// fresh transport. Both steps together must finish within
    /// `handshake_timeout`; on failure the transport is dropped, which also
    /// reaps a child process.
    pub async fn connect(
        id: &str,
        transport: Transport,
        client_name: &str,
        handshake_timeout: Duration,
    ) -> Result<Self, SessionError> {
        debug!(event_name = "session.connecting", session_id = %id, "performing handshake");

        let negotiated =
            tokio::time::timeout(handshake_timeout, negotiate(id, transport, client_name)).await;

        let (service, capabilities) = match negotiated {
            Ok(result) => result?,
            Err(_) => {
                return Err(SessionError::Handshake {
                    id: id.to_string(),
                    reason: format!("timed out after {}s", handshake_timeout.as_secs()),
                });
            }
        };

        let (server_name, instructions) = match service.peer_info() {
            Some(info) => (info.server_info.name.clone(), info.instructions.clone()),
            None => (id.to_string(), None),
        };

        info!(
            event_name = "session.started",
            session_id = %id,
            server_name = %server_name,
            capability_count = capabilities.len(),
            "backend session ready"
        );

        Ok(Self {
            id: id.to_string(),
            server_name,
            instructions,
            capabilities,
            state: RwLock::new(SessionState::Ready),
            service: Mutex::new(Some(service)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Capabilities advertised at connect time.
    pub fn list_capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn mark_failed(&self) {
        *self.state.write().await = SessionState::Failed;
    }

    /// Calls one tool. A result flagged `is_error` or an MCP error reply is an
    /// [`SessionError::Invocation`] and leaves the session ready; any other
    /// service failure marks the session failed.
    pub async fn invoke(
        &self,
        capability: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, SessionError> {
        let state = self.state().await;
        if state != SessionState::Ready {
            return Err(SessionError::NotReady { id: self.id.clone(), state });
        }

        let guard = self.service.lock().await;
        let Some(service) = guard.as_ref() else {
            return Err(SessionError::ChannelClosed { id: self.id.clone() });
        };

        let request = CallToolRequestParam {
            name: capability.to_string().into(),
            arguments: Some(arguments),
        };

        match service.call_tool(request).await {
            Ok(result) => match ToolOutcome::from_call_result(&result) {
                ToolOutcome::Error(message) => {
                    Err(SessionError::Invocation { capability: capability.to_string(), message })
                }
                outcome => Ok(outcome.to_json()),
            },
            Err(ServiceError::McpError(error)) => Err(SessionError::Invocation {
                capability: capability.to_string(),
                message: error.message.to_string(),
            }),
            Err(fault) => {
                drop(guard);
                self.mark_failed().await;
                let error = SessionError::Transport { id: self.id.clone(), reason: fault.to_string() };
                warn!(
                    event_name = "session.channel_fault",
                    session_id = %self.id,
                    capability,
                    error = %error,
                    "backend channel failed"
                );
                Err(error)
            }
        }
    }

    /// Cancels the client service, which closes the channel and reaps the
    /// process. Safe to call more than once.
    pub async fn close(&self) {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            if let Err(error) = service.cancel().await {
                warn!(event_name = "session.cancel_failed", session_id = %self.id, error = %error, "client service did not shut down cleanly");
            }
        }
        *self.state.write().await = SessionState::Disconnected;
        debug!(event_name = "session.stopped", session_id = %self.id, "backend session closed");
    }
}

async fn negotiate(
    id: &str,
    transport: Transport,
    client_name: &str,
) -> Result<(ClientService, Vec<Capability>), SessionError> {
    let handshake_error = |reason: String| SessionError::Handshake { id: id.to_string(), reason };

    let service = match transport {
        Transport::Process(child) => client_info(client_name)
            .serve(child)
            .await
            .map_err(|error| handshake_error(error.to_string()))?,
        Transport::Stream(stream) => client_info(client_name)
            .serve(tokio::io::split(stream))
            .await
            .map_err(|error| handshake_error(error.to_string()))?,
    };

    let tools = match service.list_all_tools().await {
        Ok(tools) => tools,
        Err(error) => {
            let reason = error.to_string();
            let _ = service.cancel().await;
            return Err(handshake_error(reason));
        }
    };

    Ok((service, tools.iter().map(Capability::from_tool).collect()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Map};

    use super::{Session, SessionError, SessionState};
    use crate::test_support::{catalog_backend, duplex_transport, silent_transport, FakeBackend};

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn connect_lists_capabilities_and_invokes() {
        let session = Session::connect("catalog", duplex_transport(catalog_backend()), "test", TIMEOUT)
            .await
            .expect("connect");

        assert_eq!(session.state().await, SessionState::Ready);
        assert_eq!(session.server_name(), "catalog");
        assert!(session.instructions().is_some_and(|text| text.contains("shopping cart")));
        let names: Vec<_> = session.list_capabilities().iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"add_to_cart"));
        let add = session
            .list_capabilities()
            .iter()
            .find(|capability| capability.name == "add_to_cart")
            .expect("add_to_cart listed");
        assert_eq!(add.input_schema["required"], json!(["item_id"]));

        let mut args = Map::new();
        args.insert("query".to_string(), json!("shirt"));
        let result = session.invoke("search_items", args).await.expect("invoke");
        assert_eq!(result[0]["name"], "Classic T-Shirt");
    }

    #[tokio::test]
    async fn backend_error_is_an_invocation_error_and_keeps_session_ready() {
        let session = Session::connect("catalog", duplex_transport(catalog_backend()), "test", TIMEOUT)
            .await
            .expect("connect");

        let mut args = Map::new();
        args.insert("item_id".to_string(), json!("42"));
        let error = session.invoke("get_item", args).await.expect_err("unknown item");

        assert!(matches!(error, SessionError::Invocation { ref message, .. } if message == "Item 42 not found"));
        assert!(!error.is_channel_fault());
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test]
    async fn peer_that_hangs_up_is_a_handshake_error() {
        let error = Session::connect("catalog", duplex_transport(FakeBackend::hang_up()), "test", TIMEOUT)
            .await
            .expect_err("no server");
        assert!(matches!(error, SessionError::Handshake { ref id, .. } if id == "catalog"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_backend_times_out() {
        let error = Session::connect("payment", silent_transport(), "test", Duration::from_secs(5))
            .await
            .expect_err("timeout");
        assert!(matches!(error, SessionError::Handshake { ref reason, .. } if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn dead_channel_marks_session_failed() {
        let backend = catalog_backend().die_after(1);
        let session = Session::connect("catalog", duplex_transport(backend), "test", TIMEOUT)
            .await
            .expect("connect");

        session.invoke("list_items", Map::new()).await.expect("first call");
        let error = session.invoke("list_items", Map::new()).await.expect_err("dead");

        assert!(error.is_channel_fault());
        assert_eq!(session.state().await, SessionState::Failed);

        session.close().await;
        session.close().await;
        assert_eq!(session.state().await, SessionState::Disconnected);
    }
}
