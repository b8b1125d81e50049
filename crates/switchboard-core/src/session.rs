//! Session manager: sole owner of the transport link.

use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::transport::{HistoryQuery, Transport, TransportError};
use crate::types::{ConnectionState, OutboundMessage};

/// Owns one transport per UI session and tracks its connection state.
///
/// Other components never touch the transport directly; they go through the
/// request methods here, which refuse to run while the link is down.
pub struct SessionManager<T: Transport> {
    transport: T,
    participant_id: String,
    state: ConnectionState,
}

impl<T: Transport> SessionManager<T> {
    /// Create a manager for `participant_id`.
    ///
    /// An empty participant identity is a configuration error.
    pub fn new(transport: T, participant_id: impl Into<String>) -> Result<Self> {
        let participant_id = participant_id.into();
        if participant_id.trim().is_empty() {
            return Err(SyncError::Config("participant id is required".to_string()));
        }
        Ok(Self {
            transport,
            participant_id,
            state: ConnectionState::Disconnected,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the link.
    ///
    /// A no-op returning `Ok(false)` while connecting or connected. On
    /// success the state is `Connecting`, or `Connected` if the transport is
    /// already up when `connect` returns.
    pub async fn connect(&mut self) -> Result<bool> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "connect ignored, link already active");
            return Ok(false);
        }

        self.state = ConnectionState::Connecting;
        info!(participant_id = %self.participant_id, "Connecting session");

        match self.transport.connect().await {
            Ok(()) => {
                if self.transport.is_connected() {
                    self.state = ConnectionState::Connected;
                }
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Session connect failed");
                self.state = ConnectionState::Disconnected;
                Err(SyncError::connection(e))
            }
        }
    }

    /// Close the link. Safe to call any number of times.
    pub async fn dispose(&mut self) {
        if self.state == ConnectionState::Disconnected && !self.transport.is_connected() {
            return;
        }
        info!(participant_id = %self.participant_id, "Disposing session");
        self.transport.disconnect().await;
        self.state = ConnectionState::Disconnected;
    }

    /// Record a transport-reported connect. Returns whether the state changed.
    ///
    /// Ignored unless the transport itself reports the link as up, so a
    /// connect event that was queued before `dispose` cannot revive the
    /// session.
    pub fn mark_connected(&mut self) -> bool {
        if self.state == ConnectionState::Connected {
            return false;
        }
        if !self.transport.is_connected() {
            debug!(state = %self.state, "Ignoring connect event, transport is down");
            return false;
        }
        self.state = ConnectionState::Connected;
        true
    }

    /// Record a transport-reported loss. Returns whether the state changed.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        true
    }

    pub async fn subscribe(&mut self, channel_id: &str) -> Result<()> {
        self.require_connected()
            .map_err(|e| SyncError::subscription(channel_id, e))?;
        self.transport
            .subscribe_to_agent(channel_id, &self.participant_id)
            .await
            .map_err(|e| SyncError::subscription(channel_id, e))
    }

    pub async fn unsubscribe(&mut self, channel_id: &str) -> Result<()> {
        self.require_connected()
            .map_err(|e| SyncError::subscription(channel_id, e))?;
        self.transport
            .unsubscribe_from_agent(channel_id, &self.participant_id)
            .await
            .map_err(|e| SyncError::subscription(channel_id, e))
    }

    pub async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        self.require_connected()?;
        self.transport.send_inbound_message(message).await?;
        Ok(())
    }

    /// Issue a history request. Transport failures are returned as-is so the
    /// caller can decide whether to retry.
    pub async fn request_history(
        &mut self,
        query: HistoryQuery,
    ) -> std::result::Result<(), TransportError> {
        self.require_connected()?;
        self.transport.get_thread_history(query).await
    }

    fn require_connected(&self) -> std::result::Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}
