//! Common test utilities for engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use switchboard_core::{
    Agent, HistoryQuery, OutboundMessage, SessionEvent, SyncConfig, SyncEngine, Transport,
    TransportError,
};

/// One call made against the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Send(OutboundMessage),
    History(HistoryQuery),
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    connected: bool,
    /// Report the link as up as soon as `connect` returns.
    connect_immediately: bool,
    fail_connect: usize,
    fail_subscribe: usize,
    fail_unsubscribe: usize,
    fail_send: usize,
    fail_history: usize,
}

/// Transport double that records calls and fails on request.
///
/// Clones share state, so a test can keep one while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<State>>,
}

impl RecordingTransport {
    /// Connects synchronously.
    pub fn new() -> Self {
        let transport = Self::default();
        transport.state.lock().connect_immediately = true;
        transport
    }

    /// Reports `Connected` only through a transport event.
    pub fn deferred() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn sends(&self) -> Vec<OutboundMessage> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Send(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sends().into_iter().filter_map(|m| m.text).collect()
    }

    pub fn history_requests(&self) -> Vec<HistoryQuery> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::History(q) => Some(q.clone()),
                _ => None,
            })
            .collect()
    }

    /// Largest number of channels subscribed at the same time.
    ///
    /// Refused unsubscribes are not recorded, so their channel stays live.
    pub fn peak_live_subscriptions(&self) -> usize {
        let mut live = HashSet::new();
        let mut peak = 0;
        for call in self.state.lock().calls.iter() {
            match call {
                Call::Subscribe(ch) => {
                    live.insert(ch.clone());
                }
                Call::Unsubscribe(ch) => {
                    live.remove(ch);
                }
                Call::Disconnect => live.clear(),
                _ => {}
            }
            peak = peak.max(live.len());
        }
        peak
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().fail_connect = n;
    }

    pub fn fail_next_subscribes(&self, n: usize) {
        self.state.lock().fail_subscribe = n;
    }

    pub fn fail_next_unsubscribes(&self, n: usize) {
        self.state.lock().fail_unsubscribe = n;
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.state.lock().fail_send = n;
    }

    pub fn fail_next_history(&self, n: usize) {
        self.state.lock().fail_history = n;
    }
}

fn take_failure(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Connect);
        if take_failure(&mut state.fail_connect) {
            return Err(TransportError::Rejected {
                status_code: 401,
                message: "bad credentials".to_string(),
            });
        }
        if state.connect_immediately {
            state.connected = true;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(Call::Disconnect);
        state.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn subscribe_to_agent(
        &mut self,
        channel_id: &str,
        _participant_id: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if take_failure(&mut state.fail_subscribe) {
            return Err(TransportError::Other("subscribe refused".to_string()));
        }
        state.calls.push(Call::Subscribe(channel_id.to_string()));
        Ok(())
    }

    async fn unsubscribe_from_agent(
        &mut self,
        channel_id: &str,
        _participant_id: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if take_failure(&mut state.fail_unsubscribe) {
            return Err(TransportError::Other("unsubscribe refused".to_string()));
        }
        state.calls.push(Call::Unsubscribe(channel_id.to_string()));
        Ok(())
    }

    async fn send_inbound_message(
        &mut self,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if take_failure(&mut state.fail_send) {
            return Err(TransportError::Closed);
        }
        state.calls.push(Call::Send(message));
        Ok(())
    }

    async fn get_thread_history(&mut self, query: HistoryQuery) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(Call::History(query));
        if take_failure(&mut state.fail_history) {
            return Err(TransportError::Other("history unavailable".to_string()));
        }
        Ok(())
    }
}

pub type TestEngine = SyncEngine<RecordingTransport>;

/// Engine with no delays, plus its event stream and a handle on the transport.
pub fn engine() -> (
    TestEngine,
    mpsc::UnboundedReceiver<SessionEvent>,
    RecordingTransport,
) {
    engine_with(SyncConfig::immediate(), RecordingTransport::new())
}

pub fn engine_with(
    config: SyncConfig,
    transport: RecordingTransport,
) -> (
    TestEngine,
    mpsc::UnboundedReceiver<SessionEvent>,
    RecordingTransport,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = SyncEngine::new(config, transport.clone(), "participant-1", tx)
        .expect("valid participant");
    (engine, rx, transport)
}

pub fn agent(id: &str) -> Agent {
    Agent::new(id, id.to_uppercase(), format!("channel-{id}"))
}

/// Everything emitted so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Texts of the chat entries in `events`, with their history flag.
pub fn chat_texts(events: &[SessionEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Chat(entry) => Some((
                entry.message.text.clone().unwrap_or_default(),
                entry.is_history,
            )),
            _ => None,
        })
        .collect()
}

/// A connected engine subscribed to `agent("a")` with `scope`.
pub async fn subscribed(
    scope: Option<&str>,
) -> (
    TestEngine,
    mpsc::UnboundedReceiver<SessionEvent>,
    RecordingTransport,
) {
    let (mut engine, mut rx, transport) = engine();
    engine.select_scope(scope.map(str::to_string)).await;
    engine.select_agent(Some(agent("a"))).await;
    engine.connect().await.expect("connect");
    drain(&mut rx);
    (engine, rx, transport)
}
