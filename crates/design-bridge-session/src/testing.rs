//! In-memory stand-ins for the remote server and the chat model.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use design_bridge_core::{
    RemoteConnector, RemoteError, RemoteLink, ToolArgs, ToolOutput, ToolSpec, ToolTransport,
};
use design_bridge_llm::{ChatMessage, ChatModel, Completion, LlmError, ToolDefinition};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Responder = dyn Fn(&str, &ToolArgs) -> Result<ToolOutput, RemoteError> + Send + Sync;

/// Tool server that records every call.
pub struct FakeTransport {
    tools: Vec<ToolSpec>,
    responder: Box<Responder>,
    list_error: Option<RemoteError>,
    calls: Mutex<Vec<(String, ToolArgs)>>,
}

impl FakeTransport {
    /// Offers `tools`; every call answers `"<name> ok"`.
    #[must_use]
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self {
            tools,
            responder: Box::new(|name, _| Ok(ToolOutput::Text(format!("{name} ok")))),
            list_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_tools(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| ToolSpec::new(*name, format!("{name} tool")))
                .collect(),
        )
    }

    #[must_use]
    pub fn respond_with(
        mut self,
        responder: impl Fn(&str, &ToolArgs) -> Result<ToolOutput, RemoteError> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    /// Make `list_tools` fail.
    #[must_use]
    pub fn failing_list(mut self, error: RemoteError) -> Self {
        self.list_error = Some(error);
        self
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, ToolArgs)> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|(n, _)| n == name).count()
    }
}

#[async_trait]
impl ToolTransport for FakeTransport {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, RemoteError> {
        match &self.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.tools.clone()),
        }
    }

    async fn call_tool(&self, name: &str, args: ToolArgs) -> Result<ToolOutput, RemoteError> {
        lock(&self.calls).push((name.to_string(), args.clone()));
        tokio::task::yield_now().await;
        (self.responder)(name, &args)
    }
}

/// Counters shared by a connector and every link it opened.
#[derive(Debug, Default)]
pub struct LinkStats {
    pub connects: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub transport_closes: AtomicUsize,
}

impl LinkStats {
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn transport_closes(&self) -> usize {
        self.transport_closes.load(Ordering::SeqCst)
    }

    /// Links opened but not yet fully closed.
    #[must_use]
    pub fn open_links(&self) -> usize {
        self.connects() - self.transport_closes()
    }
}

/// Failures and stalls to inject into connectors and links.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub connect: Option<RemoteError>,
    pub initialize: Option<RemoteError>,
    pub close_session: Option<RemoteError>,
    pub close_transport: Option<RemoteError>,
    /// Sleep before the handshake answers.
    pub initialize_delay: Option<Duration>,
    /// Sleep after the session close is counted.
    pub close_session_delay: Option<Duration>,
}

/// Connector handing out the given transports in order; the last one is
/// reused once the rest are consumed.
pub struct FakeConnector {
    transports: Mutex<VecDeque<Arc<FakeTransport>>>,
    faults: Mutex<Faults>,
    stats: Arc<LinkStats>,
}

impl FakeConnector {
    #[must_use]
    pub fn new(transports: Vec<Arc<FakeTransport>>) -> Self {
        Self {
            transports: Mutex::new(transports.into()),
            faults: Mutex::new(Faults::default()),
            stats: Arc::new(LinkStats::default()),
        }
    }

    #[must_use]
    pub fn single(transport: FakeTransport) -> Self {
        Self::new(vec![Arc::new(transport)])
    }

    /// Replace the faults applied to subsequent connects.
    pub fn set_faults(&self, faults: Faults) {
        *lock(&self.faults) = faults;
    }

    #[must_use]
    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    fn next_transport(&self) -> Option<Arc<FakeTransport>> {
        let mut transports = lock(&self.transports);
        if transports.len() > 1 {
            transports.pop_front()
        } else {
            transports.front().cloned()
        }
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteLink>, RemoteError> {
        let faults = lock(&self.faults).clone();
        if let Some(e) = faults.connect.clone() {
            return Err(e);
        }
        let transport = self
            .next_transport()
            .ok_or_else(|| RemoteError::Transport("no fake transport configured".into()))?;
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLink {
            transport,
            faults,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct FakeLink {
    transport: Arc<FakeTransport>,
    faults: Faults,
    stats: Arc<LinkStats>,
}

#[async_trait]
impl RemoteLink for FakeLink {
    async fn initialize(&self) -> Result<(), RemoteError> {
        if let Some(delay) = self.faults.initialize_delay {
            tokio::time::sleep(delay).await;
        }
        self.faults.initialize.clone().map_or(Ok(()), Err)
    }

    fn tools(&self) -> Arc<dyn ToolTransport> {
        self.transport.clone()
    }

    async fn close_session(&self) -> Result<(), RemoteError> {
        self.stats.session_closes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.faults.close_session_delay {
            tokio::time::sleep(delay).await;
        }
        self.faults.close_session.clone().map_or(Ok(()), Err)
    }

    async fn close_transport(&self) -> Result<(), RemoteError> {
        self.stats.transport_closes.fetch_add(1, Ordering::SeqCst);
        self.faults.close_transport.clone().map_or(Ok(()), Err)
    }
}

/// Chat model replaying a fixed script of replies.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ChatMessage, LlmError>>>,
    repeat: Option<ChatMessage>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    offered_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    #[must_use]
    pub fn new(script: Vec<Result<ChatMessage, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            offered_tools: Mutex::new(Vec::new()),
        }
    }

    /// Model that always answers with `text`.
    #[must_use]
    pub fn replying(text: &str) -> Self {
        Self::new(Vec::new()).then_repeat(ChatMessage::assistant(text))
    }

    /// Reply with `message` once the script is exhausted.
    #[must_use]
    pub fn then_repeat(mut self, message: ChatMessage) -> Self {
        self.repeat = Some(message);
        self
    }

    /// Messages sent on each request.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }

    /// Tool names offered on each request.
    #[must_use]
    pub fn offered_tools(&self) -> Vec<Vec<String>> {
        lock(&self.offered_tools).clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion, LlmError> {
        lock(&self.requests).push(messages.to_vec());
        lock(&self.offered_tools).push(tools.iter().map(|t| t.function.name.clone()).collect());

        let next = lock(&self.script).pop_front();
        let message = match next {
            Some(reply) => reply?,
            None => self.repeat.clone().ok_or(LlmError::EmptyResponse)?,
        };
        Ok(Completion {
            message,
            finish_reason: None,
            usage: None,
        })
    }
}
