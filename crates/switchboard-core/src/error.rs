//! Error types for the synchronization engine.

use crate::transport::TransportError;

/// Errors surfaced by the synchronization engine.
///
/// Everything except [`SyncError::Config`] is recoverable: the engine keeps
/// running and the failed step is retried on the next trigger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// Missing or invalid session configuration. Fatal at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// The transport reported a connection failure.
    #[error("connection error{}: {message}", status_suffix(.status_code))]
    Connection {
        status_code: Option<u16>,
        message: String,
    },

    /// A subscribe or unsubscribe call was rejected.
    #[error("subscription to '{channel_id}' failed: {message}")]
    Subscription { channel_id: String, message: String },

    /// History replay could not be fetched within the retry bound.
    #[error("history fetch for {key} failed after {attempts} attempt(s): {message}")]
    History {
        key: String,
        attempts: u32,
        message: String,
    },

    /// An outbound chat or data message could not be sent.
    #[error("send failed: {0}")]
    Send(String),

    /// The outbound queue is at capacity.
    #[error("outbound queue is full ({0} messages waiting)")]
    QueueFull(usize),
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl SyncError {
    /// Whether the session can keep operating after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::Config(_))
    }

    pub(crate) fn connection(err: TransportError) -> Self {
        match err {
            TransportError::Rejected {
                status_code,
                message,
            } => SyncError::Connection {
                status_code: Some(status_code),
                message,
            },
            other => SyncError::Connection {
                status_code: None,
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn subscription(channel_id: &str, err: TransportError) -> Self {
        SyncError::Subscription {
            channel_id: channel_id.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::Send(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(!SyncError::Config("missing tenant".into()).is_recoverable());
        assert!(SyncError::Send("boom".into()).is_recoverable());
        assert!(SyncError::QueueFull(3).is_recoverable());
        assert!(
            SyncError::History {
                key: "wf".into(),
                attempts: 3,
                message: "timeout".into()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_connection_error_display() {
        let err = SyncError::connection(TransportError::Rejected {
            status_code: 401,
            message: "bad key".into(),
        });
        assert_eq!(err.to_string(), "connection error (401): bad key");

        let err = SyncError::connection(TransportError::NotConnected);
        assert_eq!(err.to_string(), "connection error: transport is not connected");
    }
}
