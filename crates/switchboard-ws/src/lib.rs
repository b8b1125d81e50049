//! WebSocket transport for the Switchboard synchronization engine.
//!
//! [`WsTransport`] implements [`switchboard_core::Transport`] over a single
//! socket to the server's `/ws` endpoint, speaking the JSON frames in
//! [`protocol`].

pub mod protocol;
pub mod transport;

pub use protocol::{ClientFrame, ServerFrame};
pub use transport::{
    Credential, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, WsSettings, WsTransport,
    http_to_ws_url,
};
