//! JSON frames exchanged over the realtime socket.

use serde::{Deserialize, Serialize};

use switchboard_core::{HistoryQuery, Message, OutboundMessage, TransportEvent};

/// Frames from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving traffic for an agent channel.
    Subscribe {
        workflow: String,
        participant_id: String,
    },
    Unsubscribe {
        workflow: String,
        participant_id: String,
    },
    /// Deliver a chat or data message to the agent.
    Send { message: OutboundMessage },
    /// Ask for one page of history; answered with [`ServerFrame::History`].
    GetHistory {
        workflow: String,
        participant_id: String,
        page: u32,
        page_size: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
    /// Keepalive.
    Ping,
}

impl From<HistoryQuery> for ClientFrame {
    fn from(query: HistoryQuery) -> Self {
        ClientFrame::GetHistory {
            workflow: query.channel_id,
            participant_id: query.participant_id,
            page: query.page,
            page_size: query.page_size,
            scope: query.scope,
        }
    }
}

/// Frames from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Chat {
        message: Message,
    },
    Data {
        message: Message,
    },
    Handoff {
        message: Message,
    },
    /// A history page, tagged with the request it answers.
    History {
        #[serde(default)]
        workflow: Option<String>,
        #[serde(default)]
        scope: Option<String>,
        messages: Vec<Message>,
    },
    /// The server rejected something.
    Error {
        #[serde(default)]
        status_code: Option<u16>,
        message: String,
    },
    Pong,
}

impl ServerFrame {
    /// The transport event this frame stands for. Keepalive replies have none.
    pub fn into_event(self) -> Option<TransportEvent> {
        match self {
            ServerFrame::Chat { message } => Some(TransportEvent::Chat(message)),
            ServerFrame::Data { message } => Some(TransportEvent::Data(message)),
            ServerFrame::Handoff { message } => Some(TransportEvent::Handoff(message)),
            ServerFrame::History {
                workflow,
                scope,
                messages,
            } => Some(TransportEvent::ThreadHistory {
                workflow,
                scope,
                messages,
            }),
            ServerFrame::Error {
                status_code,
                message,
            } => Some(TransportEvent::ConnectionError {
                status_code,
                message,
            }),
            ServerFrame::Pong => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{MessageKind, OutboundKind};

    #[test]
    fn test_client_frame_serialization() {
        let json = serde_json::to_string(&ClientFrame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);

        let frame = ClientFrame::from(HistoryQuery {
            channel_id: "acme:Invoice".into(),
            participant_id: "alice".into(),
            page: 0,
            page_size: 50,
            scope: None,
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"get_history""#));
        assert!(json.contains(r#""page_size":50"#));
        assert!(!json.contains("scope")); // Skipped when None

        let frame = ClientFrame::Send {
            message: OutboundMessage {
                request_id: "r1".into(),
                participant_id: "alice".into(),
                workflow: "acme:Invoice".into(),
                kind: OutboundKind::Chat,
                scope: Some("doc-7".into()),
                text: Some("hello".into()),
                data: None,
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"send""#));
        assert!(json.contains(r#""requestId":"r1""#));
        assert!(json.contains(r#""scope":"doc-7""#));
    }

    #[test]
    fn test_server_frame_deserialization() {
        let json = r#"{"type":"pong"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(frame.into_event().is_none());

        let json = r#"{"type":"chat","message":{"id":"m1","direction":"incoming","kind":"chat",
            "text":"hi","createdAt":"2024-05-01T10:00:00Z","requestId":"r1"}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame.into_event() {
            Some(TransportEvent::Chat(message)) => {
                assert_eq!(message.kind, MessageKind::Chat);
                assert_eq!(message.text.as_deref(), Some("hi"));
                assert_eq!(message.correlation_id.as_deref(), Some("r1"));
            }
            other => panic!("expected chat event, got {other:?}"),
        }

        let json = r#"{"type":"history","workflow":"acme:Invoice","messages":[]}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame.into_event(),
            Some(TransportEvent::ThreadHistory {
                workflow: Some("acme:Invoice".into()),
                scope: None,
                messages: vec![],
            })
        );

        let json = r#"{"type":"error","status_code":403,"message":"tenant mismatch"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(
            frame.into_event(),
            Some(TransportEvent::ConnectionError { status_code: Some(403), message })
            if message == "tenant mismatch"
        ));
    }
}
