//! The transport capability the engine drives.
//!
//! A transport owns the realtime link to the messaging backend. The engine
//! never opens a connection of its own: it calls the request methods below
//! and consumes [`TransportEvent`]s that the transport pushes into the
//! channel it was created with.

use async_trait::async_trait;

use crate::types::{Message, OutboundMessage};

/// Errors reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The link is down.
    #[error("transport is not connected")]
    NotConnected,

    /// The backend refused the request.
    #[error("rejected by backend ({status_code}): {message}")]
    Rejected { status_code: u16, message: String },

    /// The server URL could not be used.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// The transport's worker has shut down.
    #[error("transport closed")]
    Closed,

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Parameters of a thread-history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub channel_id: String,
    pub participant_id: String,
    pub page: u32,
    pub page_size: u32,
    pub scope: Option<String>,
}

/// Events a transport pushes to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link is up (initially or after a reconnect).
    Connected,
    /// The link went down.
    Disconnected { reason: String },
    /// The transport hit an error and may be retrying on its own.
    ConnectionError {
        status_code: Option<u16>,
        message: String,
    },
    Chat(Message),
    Data(Message),
    Handoff(Message),
    /// One page of replayed history, tagged with the request it answers.
    ThreadHistory {
        workflow: Option<String>,
        scope: Option<String>,
        messages: Vec<Message>,
    },
}

/// Capability surface of the realtime messaging client.
#[async_trait]
pub trait Transport: Send {
    /// Open the link. Connection progress is reported through events.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the link.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    async fn subscribe_to_agent(
        &mut self,
        channel_id: &str,
        participant_id: &str,
    ) -> Result<(), TransportError>;

    async fn unsubscribe_from_agent(
        &mut self,
        channel_id: &str,
        participant_id: &str,
    ) -> Result<(), TransportError>;

    async fn send_inbound_message(&mut self, message: OutboundMessage)
    -> Result<(), TransportError>;

    /// Request a page of history. The page arrives as
    /// [`TransportEvent::ThreadHistory`].
    async fn get_thread_history(&mut self, query: HistoryQuery) -> Result<(), TransportError>;
}
