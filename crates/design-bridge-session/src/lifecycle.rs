//! Agent session lifecycle: connect, bind tools, tear down.

use std::{fmt, sync::Arc};

use design_bridge_core::{RemoteConnector, RemoteError, RemoteLink};
use design_bridge_llm::ChatModel;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tracing::{error, info, instrument, warn};

use crate::{
    agent::{AgentConfig, ToolAgent},
    error::{SessionError, TeardownStep, TeardownWarning},
    invoker::ToolInvoker,
    registry::ToolRegistry,
    state::SessionState,
};

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Resources of a running session.
pub struct LiveSession {
    link: Arc<dyn RemoteLink>,
    invoker: ToolInvoker,
    agent: ToolAgent,
}

impl LiveSession {
    #[must_use]
    pub const fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    #[must_use]
    pub const fn agent(&self) -> &ToolAgent {
        &self.agent
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        self.invoker.registry()
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        self.invoker.state()
    }
}

/// Owns at most one live session and serializes start/stop.
pub struct AgentSession {
    connector: Arc<dyn RemoteConnector>,
    model: Arc<dyn ChatModel>,
    agent_config: AgentConfig,
    live: RwLock<Option<Arc<LiveSession>>>,
    phase: watch::Sender<Phase>,
}

impl AgentSession {
    #[must_use]
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        model: Arc<dyn ChatModel>,
        agent_config: AgentConfig,
    ) -> Self {
        let (phase, _) = watch::channel(Phase::Stopped);
        Self {
            connector,
            model,
            agent_config,
            live: RwLock::new(None),
            phase,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Observe phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// The running session.
    ///
    /// # Errors
    /// Returns `SessionError::NotRunning` when stopped.
    pub async fn live(&self) -> Result<Arc<LiveSession>, SessionError> {
        self.live.read().await.clone().ok_or(SessionError::NotRunning)
    }

    /// Connect, handshake, load tools and bind the agent.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if started, or `Configuration` if any step
    /// fails. Anything opened before the failure is closed first.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<Arc<LiveSession>, SessionError> {
        let mut slot = self.live.write().await;
        self.start_locked(&mut slot).await
    }

    /// Close the protocol session, then the transport.
    ///
    /// Always ends in `Stopped`; failed close steps are logged and returned.
    ///
    /// # Errors
    /// Returns `NotRunning` if there is nothing to stop.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<Vec<TeardownWarning>, SessionError> {
        let mut slot = self.live.write().await;
        self.stop_locked(&mut slot).await
    }

    /// Stop (if running) and start again under one hold of the lifecycle lock.
    ///
    /// # Errors
    /// Returns error if the new session fails to start.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<Arc<LiveSession>, SessionError> {
        let mut slot = self.live.write().await;
        if slot.is_some() {
            self.stop_locked(&mut slot).await?;
        }
        self.start_locked(&mut slot).await
    }

    async fn start_locked(
        &self,
        slot: &mut Option<Arc<LiveSession>>,
    ) -> Result<Arc<LiveSession>, SessionError> {
        if slot.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        self.phase.send_replace(Phase::Starting);
        let stopped = StoppedOnDrop::new(&self.phase);
        match self.open().await {
            Ok(live) => {
                let live = Arc::new(live);
                *slot = Some(Arc::clone(&live));
                self.phase.send_replace(Phase::Running);
                stopped.disarm();
                info!(tools = live.registry().len(), "Agent session running");
                Ok(live)
            }
            Err(e) => {
                drop(stopped);
                error!(error = %e, "Failed to start agent session");
                Err(e)
            }
        }
    }

    async fn stop_locked(
        &self,
        slot: &mut Option<Arc<LiveSession>>,
    ) -> Result<Vec<TeardownWarning>, SessionError> {
        let live = slot.take().ok_or(SessionError::NotRunning)?;

        self.phase.send_replace(Phase::Stopping);
        let stopped = StoppedOnDrop::new(&self.phase);

        // The slot is already empty, so teardown runs detached and finishes
        // even if this future is dropped.
        let link = Arc::clone(&live.link);
        let warnings = tokio::spawn(async move { close_link(link.as_ref()).await })
            .await
            .unwrap_or_else(|e| {
                vec![TeardownWarning {
                    step: TeardownStep::Transport,
                    error: RemoteError::Transport(format!("Teardown task failed: {e}")),
                }]
            });
        drop(stopped);

        info!(warnings = warnings.len(), "Agent session stopped");
        Ok(warnings)
    }

    async fn open(&self) -> Result<LiveSession, SessionError> {
        let link: Arc<dyn RemoteLink> = self
            .connector
            .connect()
            .await
            .map_err(|e| SessionError::Configuration(format!("Failed to connect: {e}")))?
            .into();
        let pending = CloseOnDrop::new(Arc::clone(&link));

        let registry = match load_tools(link.as_ref()).await {
            Ok(registry) => registry,
            Err(e) => {
                pending.close().await;
                return Err(e);
            }
        };
        pending.disarm();

        let invoker = ToolInvoker::new(Arc::new(registry), Arc::new(SessionState::new()));
        let agent = ToolAgent::new(
            Arc::clone(&self.model),
            invoker.clone(),
            self.agent_config.clone(),
        );

        Ok(LiveSession {
            link,
            invoker,
            agent,
        })
    }
}

/// Publishes `Stopped` when dropped while armed.
struct StoppedOnDrop<'a> {
    phase: &'a watch::Sender<Phase>,
    armed: bool,
}

impl<'a> StoppedOnDrop<'a> {
    const fn new(phase: &'a watch::Sender<Phase>) -> Self {
        Self { phase, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StoppedOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.phase.send_replace(Phase::Stopped);
        }
    }
}

/// A connected link not yet owned by a live session. Dropping it while
/// armed closes the link on a background task.
struct CloseOnDrop {
    link: Option<Arc<dyn RemoteLink>>,
}

impl CloseOnDrop {
    fn new(link: Arc<dyn RemoteLink>) -> Self {
        Self { link: Some(link) }
    }

    fn disarm(mut self) {
        self.link = None;
    }

    async fn close(mut self) {
        if let Some(link) = &self.link {
            close_link(link.as_ref()).await;
        }
        self.link = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!("Session start abandoned, closing link");
                runtime.spawn(async move {
                    close_link(link.as_ref()).await;
                });
            }
            Err(_) => error!("Session start abandoned outside a runtime, link left open"),
        }
    }
}

async fn load_tools(link: &dyn RemoteLink) -> Result<ToolRegistry, SessionError> {
    link.initialize()
        .await
        .map_err(|e| SessionError::Configuration(format!("Handshake failed: {e}")))?;
    ToolRegistry::fetch(link.tools()).await
}

/// Close session then transport, continuing past failures.
async fn close_link(link: &dyn RemoteLink) -> Vec<TeardownWarning> {
    let mut warnings = Vec::new();

    if let Err(error) = link.close_session().await {
        warnings.push(TeardownWarning {
            step: TeardownStep::Session,
            error,
        });
    }
    if let Err(error) = link.close_transport().await {
        warnings.push(TeardownWarning {
            step: TeardownStep::Transport,
            error,
        });
    }

    for warning in &warnings {
        warn!(step = %warning.step, error = %warning.error, "Teardown step failed");
    }
    warnings
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use design_bridge_core::ToolArgs;

    use super::*;
    use crate::testing::{FakeConnector, FakeTransport, Faults, ScriptedModel};

    fn session_over(connector: FakeConnector) -> (AgentSession, Arc<crate::testing::LinkStats>) {
        let stats = connector.stats();
        let session = AgentSession::new(
            Arc::new(connector),
            Arc::new(ScriptedModel::replying("ok")),
            AgentConfig::default(),
        );
        (session, stats)
    }

    #[tokio::test]
    async fn start_then_stop() {
        let (session, stats) =
            session_over(FakeConnector::single(FakeTransport::with_tools(&["create_frame"])));
        let mut phases = session.subscribe();
        assert_eq!(session.phase(), Phase::Stopped);

        let live = tokio_test::assert_ok!(session.start().await);
        assert_eq!(session.phase(), Phase::Running);
        assert!(phases.has_changed().unwrap());
        assert_eq!(*phases.borrow_and_update(), Phase::Running);
        assert_eq!(live.registry().names().collect::<Vec<_>>(), ["create_frame"]);

        let warnings = tokio_test::assert_ok!(session.stop().await);
        assert!(warnings.is_empty());
        assert_eq!(session.phase(), Phase::Stopped);
        assert_eq!(stats.session_closes(), 1);
        assert_eq!(stats.transport_closes(), 1);
        assert_eq!(session.live().await.err(), Some(SessionError::NotRunning));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (session, stats) =
            session_over(FakeConnector::single(FakeTransport::with_tools(&["create_frame"])));
        session.start().await.unwrap();

        assert_eq!(session.start().await.err(), Some(SessionError::AlreadyRunning));
        assert_eq!(stats.connects(), 1);
        assert_eq!(session.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn stop_when_stopped_is_rejected() {
        let (session, _) =
            session_over(FakeConnector::single(FakeTransport::with_tools(&["create_frame"])));
        assert_eq!(session.stop().await, Err(SessionError::NotRunning));
    }

    #[tokio::test]
    async fn restart_replaces_registry_and_state() {
        let first = Arc::new(FakeTransport::with_tools(&["create_frame", "get_selection"]).respond_with(
            |_, _| Ok(design_bridge_core::ToolOutput::Text("Created frame. ID: 1:1".into())),
        ));
        let second = Arc::new(FakeTransport::with_tools(&["create_frame", "create_text"]));
        let (session, _) = session_over(FakeConnector::new(vec![first, second]));

        let live = session.start().await.unwrap();
        live.invoker().invoke("create_frame", ToolArgs::new()).await;
        assert_eq!(live.state().get_root_id().as_deref(), Some("1:1"));

        session.stop().await.unwrap();
        let live = session.start().await.unwrap();

        assert_eq!(
            live.registry().names().collect::<Vec<_>>(),
            ["create_frame", "create_text"]
        );
        assert!(live.registry().lookup("get_selection").is_err());
        assert_eq!(live.state().get_root_id(), None);
    }

    #[tokio::test]
    async fn restart_from_stopped_just_starts() {
        let (session, stats) =
            session_over(FakeConnector::single(FakeTransport::with_tools(&["create_frame"])));
        tokio_test::assert_ok!(session.restart().await);
        tokio_test::assert_ok!(session.restart().await);

        assert_eq!(stats.connects(), 2);
        assert_eq!(stats.open_links(), 1);
        assert_eq!(session.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn failed_handshake_closes_link() {
        let connector = FakeConnector::single(FakeTransport::with_tools(&["create_frame"]));
        connector.set_faults(Faults {
            initialize: Some(RemoteError::Timeout(60_000)),
            ..Faults::default()
        });
        let (session, stats) = session_over(connector);

        let err = session.start().await.err().unwrap();
        assert_eq!(
            err,
            SessionError::Configuration("Handshake failed: Request timed out after 60000 ms".into())
        );
        assert_eq!(session.phase(), Phase::Stopped);
        assert_eq!(stats.session_closes(), 1);
        assert_eq!(stats.open_links(), 0);
    }

    #[tokio::test]
    async fn empty_listing_fails_start_and_closes_link() {
        let (session, stats) = session_over(FakeConnector::single(FakeTransport::with_tools(&[])));

        assert!(matches!(
            session.start().await,
            Err(SessionError::Configuration(_))
        ));
        assert_eq!(stats.open_links(), 0);
        assert_eq!(session.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn unreachable_remote_is_configuration_error() {
        let connector = FakeConnector::single(FakeTransport::with_tools(&["create_frame"]));
        connector.set_faults(Faults {
            connect: Some(RemoteError::Transport("Executable not found: node".into())),
            ..Faults::default()
        });
        let (session, _) = session_over(connector);

        let err = session.start().await.err().unwrap();
        assert!(err.to_string().contains("Executable not found: node"));
        assert_eq!(session.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn stop_reaches_stopped_when_both_closes_fail() {
        let connector = FakeConnector::single(FakeTransport::with_tools(&["create_frame"]));
        connector.set_faults(Faults {
            close_session: Some(RemoteError::Closed),
            close_transport: Some(RemoteError::Transport("kill failed".into())),
            ..Faults::default()
        });
        let (session, stats) = session_over(connector);
        tokio_test::assert_ok!(session.start().await);

        let warnings = tokio_test::assert_ok!(session.stop().await);
        let steps: Vec<_> = warnings.iter().map(|w| w.step).collect();
        assert_eq!(steps, [TeardownStep::Session, TeardownStep::Transport]);
        assert_eq!(session.phase(), Phase::Stopped);
        assert_eq!(stats.transport_closes(), 1);

        session.start().await.unwrap();
        assert_eq!(session.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn abandoned_start_resets_phase_and_closes_link() {
        let connector = FakeConnector::single(FakeTransport::with_tools(&["create_frame"]));
        connector.set_faults(Faults {
            initialize_delay: Some(Duration::from_secs(5)),
            ..Faults::default()
        });
        let (session, stats) = session_over(connector);

        let outcome = tokio::time::timeout(Duration::from_millis(50), session.start()).await;
        assert!(outcome.is_err());
        assert_eq!(session.phase(), Phase::Stopped);
        assert_eq!(session.live().await.err(), Some(SessionError::NotRunning));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.session_closes(), 1);
        assert_eq!(stats.open_links(), 0);
    }

    #[tokio::test]
    async fn abandoned_stop_still_reaches_stopped() {
        let connector = FakeConnector::single(FakeTransport::with_tools(&["create_frame"]));
        connector.set_faults(Faults {
            close_session_delay: Some(Duration::from_secs(5)),
            ..Faults::default()
        });
        let (session, stats) = session_over(connector);
        tokio_test::assert_ok!(session.start().await);

        let outcome = tokio::time::timeout(Duration::from_millis(50), session.stop()).await;
        assert!(outcome.is_err());
        assert_eq!(session.phase(), Phase::Stopped);
        assert_eq!(stats.session_closes(), 1);
        assert_eq!(session.live().await.err(), Some(SessionError::NotRunning));

        tokio_test::assert_ok!(session.start().await);
        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(stats.connects(), 2);
    }

    #[tokio::test]
    async fn concurrent_starts_open_one_session() {
        let (session, stats) =
            session_over(FakeConnector::single(FakeTransport::with_tools(&["create_frame"])));
        let session = Arc::new(session);

        let attempts = (0..4).map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.start().await.is_ok() })
        });
        let started = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|ok| *ok.as_ref().unwrap())
            .count();

        assert_eq!(started, 1);
        assert_eq!(stats.connects(), 1);
    }
}
