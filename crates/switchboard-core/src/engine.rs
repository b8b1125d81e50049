//! The synchronization engine.
//!
//! [`SyncEngine`] owns the session manager and every stateful component and
//! is driven from a single task: transport events, UI commands and its own
//! timers are handled one at a time, so component state needs no locking.
//! The only ordering hazards are stale completions (a history page for a
//! tuple that has since been replaced, a retry for a fetch that was
//! superseded), and each of those is re-checked when it arrives.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::correlator::{PendingRequest, RequestCorrelator};
use crate::error::{Result, SyncError};
use crate::history::{BatchOutcome, FetchFailure, HistoryReconciler, HistoryState};
use crate::queue::OutboundQueue;
use crate::router::DataRouter;
use crate::session::SessionManager;
use crate::subscription::{SubscriptionController, SubscriptionPlan, SubscriptionState};
use crate::transport::{Transport, TransportError, TransportEvent};
use crate::types::{
    Agent, ChatEntry, ConnectionState, Message, OutboundKind, OutboundMessage, SUBJECT_FIELD,
    SubscriptionKey,
};

/// Everything the UI gets to see.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionChanged(ConnectionState),
    Subscribed(SubscriptionKey),
    Unsubscribed(SubscriptionKey),
    Chat(ChatEntry),
    Handoff(Message),
    RequestSent { correlation_id: String },
    ResponseReceived { correlation_id: String },
    /// A pending request was given up on (timeout, capacity, failed send,
    /// or the conversation changed).
    RequestAbandoned { correlation_id: String },
    /// A chat text was queued because the session is not subscribed.
    Queued { depth: usize },
    HistoryLoaded {
        key: SubscriptionKey,
        delivered: usize,
    },
    /// A recoverable failure, for display as a dismissible notice.
    Error(SyncError),
}

/// Requests the UI can make of a running engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    Dispose,
    SelectAgent(Option<Agent>),
    SelectScope(Option<String>),
    SendChat(String),
    SendData { subject: String, payload: Value },
    /// Dispose and stop the engine task.
    Shutdown,
}

/// Result of [`SyncEngine::send_chat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { correlation_id: String },
    Queued { depth: usize },
}

/// Work the engine scheduled for itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    RetryHistory { key: SubscriptionKey, attempt: u32 },
}

/// Realtime session synchronization over one transport.
pub struct SyncEngine<T: Transport> {
    config: SyncConfig,
    session: SessionManager<T>,
    agent: Option<Agent>,
    scope: Option<String>,
    subscriptions: SubscriptionController,
    history: HistoryReconciler,
    correlator: RequestCorrelator,
    queue: OutboundQueue,
    router: DataRouter,
    events: mpsc::UnboundedSender<SessionEvent>,
    timer_tx: mpsc::UnboundedSender<Timer>,
    timer_rx: mpsc::UnboundedReceiver<Timer>,
}

impl<T: Transport> SyncEngine<T> {
    /// Build an engine for `participant_id` that reports to `events`.
    pub fn new(
        config: SyncConfig,
        transport: T,
        participant_id: impl Into<String>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let session = SessionManager::new(transport, participant_id)?;
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Ok(Self {
            history: HistoryReconciler::new(&config),
            correlator: RequestCorrelator::new(config.max_pending, config.request_timeout),
            queue: OutboundQueue::new(config.max_queued),
            config,
            session,
            agent: None,
            scope: None,
            subscriptions: SubscriptionController::new(),
            router: DataRouter::new(),
            events,
            timer_tx,
            timer_rx,
        })
    }

    /// Publish data messages into an existing router instead of a private one.
    pub fn with_router(mut self, router: DataRouter) -> Self {
        self.router = router;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn router(&self) -> &DataRouter {
        &self.router
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn participant_id(&self) -> &str {
        self.session.participant_id()
    }

    pub fn agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn subscription_state(&self) -> &SubscriptionState {
        self.subscriptions.state()
    }

    pub fn history_state(&self) -> HistoryState {
        self.history.state()
    }

    pub fn pending_requests(&self) -> Vec<&str> {
        self.correlator.pending_ids()
    }

    pub fn queued(&self) -> Vec<&str> {
        self.queue.iter().collect()
    }

    pub fn transport(&self) -> &T {
        self.session.transport()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Connect the transport. Idempotent while connecting or connected.
    pub async fn connect(&mut self) -> Result<()> {
        if !self.session.connect().await? {
            return Ok(());
        }
        self.emit(SessionEvent::ConnectionChanged(ConnectionState::Connecting));
        if self.session.is_connected() {
            self.emit(SessionEvent::ConnectionChanged(ConnectionState::Connected));
            self.reconcile().await;
        }
        Ok(())
    }

    /// Tear down the transport and clear all session state.
    pub async fn dispose(&mut self) {
        let was = self.session.state();
        self.session.dispose().await;
        self.subscriptions.reset();
        self.history.reset();
        self.abandon_pending();
        self.queue.clear();
        self.agent = None;
        self.scope = None;
        if was != ConnectionState::Disconnected {
            self.emit(SessionEvent::ConnectionChanged(ConnectionState::Disconnected));
        }
    }

    /// Make `agent` the active conversation.
    ///
    /// Re-selecting the current agent changes nothing but does retry a
    /// subscription that previously failed.
    pub async fn select_agent(&mut self, agent: Option<Agent>) {
        if self.agent.as_ref().map(|a| &a.id) != agent.as_ref().map(|a| &a.id) {
            info!(
                agent = agent.as_ref().map(|a| a.id.as_str()).unwrap_or("<none>"),
                "Active agent changed"
            );
            self.agent = agent;
            self.abandon_pending();
        }
        self.reconcile().await;
    }

    /// Make `scope` the active document. Behaves as if the session had just
    /// been opened for that document, even when the agent is unchanged.
    pub async fn select_scope(&mut self, scope: Option<String>) {
        if self.scope != scope {
            info!(scope = scope.as_deref().unwrap_or("<none>"), "Active scope changed");
            self.scope = scope;
            self.history.reset();
            self.abandon_pending();
        }
        self.reconcile().await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a chat text, or queue it if the session is not subscribed.
    pub async fn send_chat(&mut self, text: impl Into<String>) -> Result<SendOutcome> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SyncError::Send("message is empty".to_string()));
        }
        if self.active_key().is_none() {
            let depth = self.queue.push(text)?;
            info!(depth, "Session not subscribed, message queued");
            self.emit(SessionEvent::Queued { depth });
            return Ok(SendOutcome::Queued { depth });
        }
        let correlation_id = self.dispatch_chat(text).await?;
        Ok(SendOutcome::Sent { correlation_id })
    }

    /// Send a structured data message on the live subscription.
    ///
    /// Data messages are neither queued nor correlated. Returns the request id.
    pub async fn send_data(&mut self, subject: &str, payload: Value) -> Result<String> {
        let key = self
            .active_key()
            .ok_or_else(|| SyncError::Send("cannot send data while not subscribed".into()))?;

        let data = match payload {
            Value::Object(mut map) => {
                map.insert(SUBJECT_FIELD.to_string(), Value::String(subject.to_string()));
                Value::Object(map)
            }
            other => json!({ SUBJECT_FIELD: subject, "value": other }),
        };
        let request_id = self.correlator.next_id();
        let outbound = OutboundMessage {
            request_id: request_id.clone(),
            participant_id: self.session.participant_id().to_string(),
            workflow: key.channel_id,
            kind: OutboundKind::Data,
            scope: key.scope,
            text: None,
            data: Some(data),
        };
        self.session.send(outbound).await?;
        debug!(subject, request_id = %request_id, "Data message sent");
        Ok(request_id)
    }

    async fn dispatch_chat(&mut self, text: String) -> Result<String> {
        let key = self
            .active_key()
            .ok_or_else(|| SyncError::Send("not subscribed".into()))?;

        let correlation_id = self.correlator.next_id();
        let evicted = self.correlator.track(correlation_id.clone(), Utc::now());
        self.emit_abandoned(evicted);
        self.emit(SessionEvent::RequestSent {
            correlation_id: correlation_id.clone(),
        });

        let outbound = OutboundMessage {
            request_id: correlation_id.clone(),
            participant_id: self.session.participant_id().to_string(),
            workflow: key.channel_id,
            kind: OutboundKind::Chat,
            scope: key.scope,
            text: Some(text),
            data: None,
        };
        if let Err(e) = self.session.send(outbound).await {
            self.correlator.resolve(&correlation_id);
            self.emit(SessionEvent::RequestAbandoned { correlation_id });
            return Err(e);
        }
        debug!(correlation_id = %correlation_id, "Chat request sent");
        Ok(correlation_id)
    }

    /// Send queued texts in order, one at a time. Stops at the first failure,
    /// leaving that text and everything after it queued.
    async fn drain_queue(&mut self) {
        let mut sent = 0usize;
        while self.active_key().is_some() {
            let Some(text) = self.queue.pop() else {
                break;
            };
            if sent > 0 {
                pause(self.config.queue_drain_delay).await;
            }
            match self.dispatch_chat(text.clone()).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    self.queue.requeue_front(text);
                    warn!(remaining = self.queue.len(), error = %e, "Queue drain halted");
                    self.surface(e);
                    return;
                }
            }
        }
        if sent > 0 {
            info!(sent, "Outbound queue drained");
        }
    }

    /// Abandon pending requests older than the request timeout.
    pub fn sweep_pending(&mut self) {
        let expired = self.correlator.expire(Utc::now());
        self.emit_abandoned(expired);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscription
    // ─────────────────────────────────────────────────────────────────────────

    fn desired_key(&self) -> Option<SubscriptionKey> {
        self.agent
            .as_ref()
            .map(|a| SubscriptionKey::new(a.channel_id.clone(), self.scope.clone()))
    }

    /// The live subscription, if it is the one currently selected. A channel
    /// held over by a refused unsubscribe does not count.
    fn active_key(&self) -> Option<SubscriptionKey> {
        self.subscriptions
            .live()
            .filter(|live| self.desired_key().as_ref() == Some(*live))
            .cloned()
    }

    /// Bring the live subscription in line with the selected agent and scope.
    async fn reconcile(&mut self) {
        let desired = self.desired_key();
        if let Some(key) = &desired {
            self.history.activate(key);
        }

        match self
            .subscriptions
            .plan(desired.as_ref(), self.session.is_connected())
        {
            SubscriptionPlan::Noop => {
                // Already live: pick up a history fetch or queue drain that
                // gave up earlier.
                if let Some(key) = self.subscriptions.live().cloned()
                    && desired.as_ref() == Some(&key)
                {
                    self.on_subscribed(&key).await;
                }
            }
            SubscriptionPlan::Release(old) => {
                // A refused unsubscribe leaves the channel live; the next
                // trigger tries again.
                if self.release(&old).await {
                    self.subscriptions.reset();
                    self.emit(SessionEvent::Unsubscribed(old));
                }
            }
            SubscriptionPlan::Rescope { from, to } => {
                debug!(from = %from, to = %to, "Rescoping subscription");
                self.subscriptions.begin_switch(from, to.clone());
                self.subscriptions.complete(&to);
                self.emit(SessionEvent::Subscribed(to.clone()));
                self.on_subscribed(&to).await;
            }
            SubscriptionPlan::Subscribe { release, to } => {
                match release {
                    Some(old) => {
                        if !self.release(&old).await {
                            warn!(from = %old, to = %to, "Switch held, previous channel still live");
                            return;
                        }
                        self.subscriptions.begin_switch(old.clone(), to.clone());
                        self.emit(SessionEvent::Unsubscribed(old));
                    }
                    None => self.subscriptions.begin_subscribe(to.clone()),
                }

                match self.session.subscribe(&to.channel_id).await {
                    Ok(()) => {
                        if self.subscriptions.complete(&to) {
                            info!(key = %to, "Subscribed");
                            self.emit(SessionEvent::Subscribed(to.clone()));
                            self.on_subscribed(&to).await;
                        }
                    }
                    Err(e) => {
                        // Left idle; the next trigger retries.
                        self.subscriptions.reset();
                        self.surface(e);
                    }
                }
            }
        }
    }

    /// Unsubscribe from `key`. Returns whether the backend released it.
    async fn release(&mut self, key: &SubscriptionKey) -> bool {
        match self.session.unsubscribe(&key.channel_id).await {
            Ok(()) => {
                debug!(key = %key, "Unsubscribed");
                true
            }
            Err(e) => {
                self.surface(e);
                false
            }
        }
    }

    async fn on_subscribed(&mut self, key: &SubscriptionKey) {
        if self.history.begin_fetch(key) {
            self.request_history(key).await;
        }
        self.drain_queue().await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    async fn request_history(&mut self, key: &SubscriptionKey) {
        let Some(query) = self.history.query(self.session.participant_id()) else {
            return;
        };
        debug!(key = %key, page_size = query.page_size, "Requesting history");
        if let Err(e) = self.session.request_history(query).await {
            self.history_failed(key, e);
        }
    }

    fn history_failed(&mut self, key: &SubscriptionKey, err: TransportError) {
        match self.history.fetch_failed(key) {
            FetchFailure::Retry { attempt } => {
                warn!(key = %key, attempt, error = %err, "History fetch failed, retrying");
                self.schedule(
                    self.config.history_retry_delay,
                    Timer::RetryHistory {
                        key: key.clone(),
                        attempt,
                    },
                );
            }
            FetchFailure::Exhausted { attempts } => {
                self.surface(SyncError::History {
                    key: key.to_string(),
                    attempts,
                    message: err.to_string(),
                });
            }
            FetchFailure::Stale => {
                debug!(key = %key, "Ignoring failure of superseded history fetch");
            }
        }
    }

    async fn on_history(
        &mut self,
        workflow: Option<String>,
        scope: Option<String>,
        messages: Vec<Message>,
    ) {
        let Some(key) = self.history.key().cloned() else {
            debug!("History batch without an active tuple, discarding");
            return;
        };
        if self.subscriptions.live() != Some(&key) {
            debug!(key = %key, "History batch while not subscribed, discarding");
            return;
        }

        match self
            .history
            .accept_batch(workflow.as_deref(), scope.as_deref(), messages)
        {
            BatchOutcome::Stale | BatchOutcome::Duplicate => {}
            BatchOutcome::Deliver(messages) => {
                let delivered = messages.len();
                for (i, message) in messages.into_iter().enumerate() {
                    if i > 0 {
                        pause(self.config.history_stagger).await;
                    }
                    self.emit(SessionEvent::Chat(ChatEntry {
                        message,
                        is_history: true,
                    }));
                }
                self.history.mark_loaded(&key);
                info!(key = %key, delivered, "History loaded");
                self.emit(SessionEvent::HistoryLoaded { key, delivered });
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// React to one transport event.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                if self.session.mark_connected() {
                    info!("Transport connected");
                    self.emit(SessionEvent::ConnectionChanged(ConnectionState::Connected));
                    self.reconcile().await;
                }
            }
            TransportEvent::Disconnected { reason } => {
                if self.session.mark_disconnected() {
                    warn!(reason = %reason, "Transport disconnected");
                    self.subscriptions.connection_lost();
                    self.history.connection_lost();
                    self.emit(SessionEvent::ConnectionChanged(
                        ConnectionState::Disconnected,
                    ));
                }
            }
            TransportEvent::ConnectionError {
                status_code,
                message,
            } => {
                self.surface(SyncError::Connection {
                    status_code,
                    message,
                });
            }
            TransportEvent::Chat(message) => self.on_chat(message),
            TransportEvent::Data(message) => {
                if self.in_scope(&message) {
                    self.router.publish(&message);
                }
            }
            TransportEvent::Handoff(message) => {
                if self.in_scope(&message) {
                    self.emit(SessionEvent::Handoff(message));
                }
            }
            TransportEvent::ThreadHistory {
                workflow,
                scope,
                messages,
            } => self.on_history(workflow, scope, messages).await,
        }
    }

    fn on_chat(&mut self, message: Message) {
        if !self.in_scope(&message) {
            return;
        }
        if let Some(correlation_id) = &message.correlation_id
            && self.correlator.resolve(correlation_id).is_some()
        {
            debug!(correlation_id = %correlation_id, "Response matched pending request");
            self.emit(SessionEvent::ResponseReceived {
                correlation_id: correlation_id.clone(),
            });
        }
        self.history.record(&message);
        self.emit(SessionEvent::Chat(ChatEntry {
            message,
            is_history: false,
        }));
    }

    /// Untagged messages are accepted for any scope. With no agent selected
    /// only untagged ones are.
    fn in_scope(&self, message: &Message) -> bool {
        let scope = message.scope.as_deref();
        let admitted = match self.desired_key() {
            Some(key) => key.admits(scope),
            None => scope.is_none(),
        };
        if !admitted {
            debug!(scope, active = ?self.scope, kind = ?message.kind, "Dropping message for inactive scope");
        }
        admitted
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timers and driver
    // ─────────────────────────────────────────────────────────────────────────

    /// Wait for the next self-scheduled timer.
    pub async fn next_timer(&mut self) -> Option<Timer> {
        self.timer_rx.recv().await
    }

    pub async fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::RetryHistory { key, attempt } => {
                if self.history.retry_due(&key, attempt) && self.subscriptions.live() == Some(&key)
                {
                    self.request_history(&key).await;
                } else {
                    debug!(key = %key, attempt, "Dropping stale history retry");
                }
            }
        }
    }

    /// Apply one UI command. Returns false once the engine should stop.
    pub async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => {
                if let Err(e) = self.connect().await {
                    self.surface(e);
                }
            }
            Command::Dispose => self.dispose().await,
            Command::SelectAgent(agent) => self.select_agent(agent).await,
            Command::SelectScope(scope) => self.select_scope(scope).await,
            Command::SendChat(text) => {
                if let Err(e) = self.send_chat(text).await {
                    self.surface(e);
                }
            }
            Command::SendData { subject, payload } => {
                if let Err(e) = self.send_data(&subject, payload).await {
                    self.surface(e);
                }
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// Drive the engine until the command channel closes or `Shutdown` arrives.
    pub async fn run(
        mut self,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let period = self
            .config
            .pending_sweep_interval
            .max(Duration::from_millis(10));
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = transport_events.recv() => self.handle_transport_event(event).await,
                Some(timer) = self.timer_rx.recv() => self.handle_timer(timer).await,
                _ = sweep.tick() => self.sweep_pending(),
            }
        }

        self.dispose().await;
        debug!("Engine stopped");
    }

    fn schedule(&self, delay: Duration, timer: Timer) {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            pause(delay).await;
            let _ = tx.send(timer);
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn abandon_pending(&mut self) {
        let abandoned = self.correlator.abandon_all();
        self.emit_abandoned(abandoned);
    }

    fn emit_abandoned(&self, requests: Vec<PendingRequest>) {
        for request in requests {
            debug!(correlation_id = %request.correlation_id, "Pending request abandoned");
            self.emit(SessionEvent::RequestAbandoned {
                correlation_id: request.correlation_id,
            });
        }
    }

    fn surface(&self, err: SyncError) {
        warn!(error = %err, "Session error");
        self.emit(SessionEvent::Error(err));
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event receiver dropped");
        }
    }
}

impl<T: Transport + 'static> SyncEngine<T> {
    /// Run the engine on its own task.
    pub fn spawn(self, transport_events: mpsc::UnboundedReceiver<TransportEvent>) -> EngineHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(transport_events, rx));
        EngineHandle { commands, task }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Command side of a spawned engine.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::Send("engine has stopped".to_string()))
    }

    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    pub fn select_agent(&self, agent: Option<Agent>) -> Result<()> {
        self.send(Command::SelectAgent(agent))
    }

    pub fn select_scope(&self, scope: Option<String>) -> Result<()> {
        self.send(Command::SelectScope(scope))
    }

    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendChat(text.into()))
    }

    pub fn send_data(&self, subject: impl Into<String>, payload: Value) -> Result<()> {
        self.send(Command::SendData {
            subject: subject.into(),
            payload,
        })
    }

    pub fn dispose(&self) -> Result<()> {
        self.send(Command::Dispose)
    }

    /// Stop the engine and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Engine task ended abnormally");
        }
    }
}
