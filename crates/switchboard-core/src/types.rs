//! Core data model shared by every engine component.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload field that names the subject key of a data message.
pub const SUBJECT_FIELD: &str = "messageSubject";

/// Connection state of a session's transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting..."),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Immutable descriptor of a conversational agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    /// Backend workflow the agent is reachable on.
    pub channel_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            channel_id: channel_id.into(),
            capabilities: Vec::new(),
        }
    }
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Message category as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Data,
    Handoff,
}

/// A normalized message exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Backend-assigned id; absent for local messages not yet acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub direction: Direction,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Correlation id echoed back by the backend on responses.
    #[serde(
        default,
        rename = "requestId",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
}

impl Message {
    fn new(direction: Direction, kind: MessageKind) -> Self {
        Self {
            id: None,
            direction,
            kind,
            text: None,
            data: None,
            created_at: Utc::now(),
            scope: None,
            correlation_id: None,
        }
    }

    /// An incoming chat message.
    pub fn chat(text: impl Into<String>) -> Self {
        let mut msg = Self::new(Direction::Incoming, MessageKind::Chat);
        msg.text = Some(text.into());
        msg
    }

    /// An incoming data message carrying a structured payload.
    pub fn data(payload: Value) -> Self {
        let mut msg = Self::new(Direction::Incoming, MessageKind::Data);
        msg.data = Some(payload);
        msg
    }

    /// An incoming handoff message.
    pub fn handoff(payload: Value) -> Self {
        let mut msg = Self::new(Direction::Incoming, MessageKind::Handoff);
        msg.data = Some(payload);
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The routing subject of a data message, if its payload names one.
    pub fn subject(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .get(SUBJECT_FIELD)?
            .as_str()
            .filter(|s| !s.is_empty())
    }
}

/// Body type of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundKind {
    Chat,
    Data,
}

/// Message shape handed to the transport for delivery to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub request_id: String,
    pub participant_id: String,
    /// Channel id of the target agent.
    pub workflow: String,
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The (agent channel, document scope) pair a session is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel_id: String,
    pub scope: Option<String>,
}

impl SubscriptionKey {
    pub fn new(channel_id: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            scope,
        }
    }

    /// Whether a message tagged with `scope` belongs to this key.
    ///
    /// Untagged messages belong to every scope.
    pub fn admits(&self, scope: Option<&str>) -> bool {
        match scope {
            None => true,
            Some(s) => self.scope.as_deref() == Some(s),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}[{}]", self.channel_id, scope),
            None => write!(f, "{}", self.channel_id),
        }
    }
}

/// A chat message as handed to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub message: Message,
    /// Replayed from history rather than received live.
    pub is_history: bool,
}
