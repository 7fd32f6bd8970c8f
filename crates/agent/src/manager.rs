//! Supervision of the named backend sessions.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::transport::TokioChildProcess;
use serde::Serialize;
use serde_json::{Map, Value};
use storefront_core::config::LaunchSpec;
use storefront_core::domain::capability::Capability;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::registry::CapabilityRegistry;
use crate::session::{Session, SessionError, SessionState, Transport};

/// Produces a transport for a backend. The production launcher spawns a
/// child process speaking MCP on its stdio; tests hand out in-memory pipes.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, id: &str, spec: &LaunchSpec) -> Result<Transport, SessionError>;
}

#[derive(Clone, Debug, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, id: &str, spec: &LaunchSpec) -> Result<Transport, SessionError> {
        let mut command = Command::new(&spec.command);
        command.args(&spec.args).stderr(Stdio::inherit()).kill_on_drop(true);

        let child = TokioChildProcess::new(command).map_err(|error| SessionError::Launch {
            id: id.to_string(),
            reason: format!("`{}`: {error}", spec.command),
        })?;

        Ok(Transport::Process(child))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub id: String,
    pub state: SessionState,
    pub capability_count: usize,
}

/// Sessions live in per-id slots whose order is fixed by the first start of
/// each id. Restarting a backend refills its slot in place, so registry
/// precedence and teardown order never depend on restart history.
#[derive(Default)]
struct ManagerState {
    order: Vec<String>,
    sessions: HashMap<String, Arc<Session>>,
    connecting: HashSet<String>,
    specs: HashMap<String, LaunchSpec>,
    registry: Arc<CapabilityRegistry>,
}

impl ManagerState {
    fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).cloned()
    }

    fn claim_slot(&mut self, id: &str) {
        if !self.order.iter().any(|slot| slot == id) {
            self.order.push(id.to_string());
        }
    }

    /// Live sessions in slot order.
    fn ordered(&self) -> Vec<Arc<Session>> {
        self.order.iter().filter_map(|id| self.sessions.get(id).cloned()).collect()
    }

    async fn rebuild_registry(&mut self) {
        let mut ready = Vec::with_capacity(self.sessions.len());
        for session in self.ordered() {
            if session.state().await == SessionState::Ready {
                ready.push(session);
            }
        }
        self.registry = Arc::new(CapabilityRegistry::build(
            ready.iter().map(|session| (session.id(), session.list_capabilities())),
        ));
    }
}

/// Owns every backend session, keyed by id and kept in start order.
pub struct SessionManager<L = ProcessLauncher> {
    launcher: L,
    client_name: String,
    state: RwLock<ManagerState>,
}

impl SessionManager<ProcessLauncher> {
    pub fn with_processes() -> Self {
        Self::new(ProcessLauncher)
    }
}

impl<L> SessionManager<L>
where
    L: Launcher,
{
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            client_name: format!("storefront/{}", env!("CARGO_PKG_VERSION")),
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Launches and connects one backend. A running session with the same id
    /// is stopped first and the new one takes over its slot. While the
    /// handshake runs the id reports [`SessionState::Connecting`].
    pub async fn start(&self, id: &str, spec: LaunchSpec) -> Result<Arc<Session>, SessionError> {
        self.stop(id).await;
        {
            let mut state = self.state.write().await;
            state.claim_slot(id);
            state.connecting.insert(id.to_string());
        }

        let connected = self.connect(id, &spec).await;

        let mut state = self.state.write().await;
        state.connecting.remove(id);
        let session = connected?;
        state.claim_slot(id);
        state.specs.insert(id.to_string(), spec);
        state.sessions.insert(id.to_string(), session.clone());
        state.rebuild_registry().await;

        Ok(session)
    }

    async fn connect(&self, id: &str, spec: &LaunchSpec) -> Result<Arc<Session>, SessionError> {
        let transport = self.launcher.launch(id, spec).await?;
        let timeout = Duration::from_secs(spec.handshake_timeout_secs);
        Ok(Arc::new(Session::connect(id, transport, &self.client_name, timeout).await?))
    }

    /// Starts every backend in order. If any fails, the ones already started
    /// by this call are torn down before the error is returned.
    pub async fn start_all<I>(&self, specs: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (String, LaunchSpec)>,
    {
        let mut started: Vec<String> = Vec::new();

        for (id, spec) in specs {
            match self.start(&id, spec).await {
                Ok(_) => started.push(id),
                Err(start_error) => {
                    error!(
                        event_name = "session.start_failed",
                        session_id = %id,
                        error = %start_error,
                        "backend failed to start; tearing down batch"
                    );
                    for started_id in started.iter().rev() {
                        self.stop(started_id).await;
                    }
                    return Err(start_error);
                }
            }
        }

        Ok(())
    }

    /// Stops one session. Stopping an unknown or already stopped id does
    /// nothing. The id keeps its slot for a later start.
    pub async fn stop(&self, id: &str) {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.sessions.remove(id);
            if removed.is_some() {
                state.rebuild_registry().await;
            }
            removed
        };

        if let Some(session) = removed {
            session.close().await;
            info!(event_name = "session.stopped", session_id = %id, "backend session stopped");
        }
    }

    /// Stops every session in reverse start order.
    pub async fn stop_all(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut state = self.state.write().await;
            let drained = state.ordered();
            state.sessions.clear();
            state.order.clear();
            state.registry = Arc::new(CapabilityRegistry::default());
            drained
        };

        for session in drained.into_iter().rev() {
            session.close().await;
            info!(event_name = "session.stopped", session_id = %session.id(), "backend session stopped");
        }
    }

    pub async fn restart(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let spec = self
            .state
            .read()
            .await
            .specs
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;

        info!(event_name = "session.restarting", session_id = %id, "restarting backend session");
        self.start(id, spec).await
    }

    pub async fn registry(&self) -> Arc<CapabilityRegistry> {
        self.state.read().await.registry.clone()
    }

    pub async fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.state.read().await.lookup(id)
    }

    pub async fn capabilities(&self) -> Vec<Capability> {
        self.registry().await.capabilities()
    }

    /// Every slot that is connecting or holds a session, in start order.
    pub async fn session_states(&self) -> Vec<SessionStatus> {
        let slots: Vec<(String, Option<Arc<Session>>)> = {
            let state = self.state.read().await;
            state
                .order
                .iter()
                .filter_map(|id| match state.sessions.get(id) {
                    Some(session) => Some((id.clone(), Some(session.clone()))),
                    None if state.connecting.contains(id) => Some((id.clone(), None)),
                    None => None,
                })
                .collect()
        };

        let mut statuses = Vec::with_capacity(slots.len());
        for (id, session) in slots {
            statuses.push(match session {
                Some(session) => SessionStatus {
                    id,
                    state: session.state().await,
                    capability_count: session.list_capabilities().len(),
                },
                None => SessionStatus { id, state: SessionState::Connecting, capability_count: 0 },
            });
        }
        statuses
    }

    /// Routes one invocation to the session that owns `capability`.
    ///
    /// A channel fault marks the session failed and triggers a single
    /// restart. The failed call itself is not retried.
    pub async fn invoke(
        &self,
        capability: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, RouteError> {
        let (session_id, session) = {
            let state = self.state.read().await;
            let session_id = state
                .registry
                .resolve(capability)
                .ok_or_else(|| RouteError::NotFound(capability.to_string()))?
                .to_string();
            let session = state
                .lookup(&session_id)
                .ok_or_else(|| RouteError::NotFound(capability.to_string()))?;
            (session_id, session)
        };

        match session.invoke(capability, arguments).await {
            Ok(value) => Ok(value),
            Err(invoke_error) if invoke_error.is_channel_fault() => {
                match self.restart(&session_id).await {
                    Ok(_) => info!(
                        event_name = "session.recovered",
                        session_id = %session_id,
                        "backend session restarted after channel fault"
                    ),
                    Err(restart_error) => {
                        error!(
                            event_name = "session.restart_failed",
                            session_id = %session_id,
                            error = %restart_error,
                            "backend session could not be restarted"
                        );
                        self.stop(&session_id).await;
                    }
                }
                Err(RouteError::Session(invoke_error))
            }
            Err(invoke_error) => {
                warn!(
                    event_name = "session.invocation_error",
                    session_id = %session_id,
                    capability,
                    error = %invoke_error,
                    "backend returned an error"
                );
                Err(RouteError::Session(invoke_error))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("capability `{0}` is not registered")]
    NotFound(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}
