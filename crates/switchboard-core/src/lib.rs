//! Realtime session synchronization for the Switchboard assistant console.
//!
//! A UI session talks to a set of assistant agents through one realtime
//! transport. This crate keeps that session coherent:
//!
//! - [`session::SessionManager`] owns the transport and its connection state
//! - [`subscription::SubscriptionController`] keeps exactly one
//!   (agent channel, document scope) subscription live
//! - [`history::HistoryReconciler`] replays history once per tuple, without
//!   duplicates
//! - [`correlator::RequestCorrelator`] matches responses to chat requests
//! - [`router::DataRouter`] fans structured data messages out by subject
//! - [`queue::OutboundQueue`] holds chat texts until the session can send
//!
//! [`SyncEngine`] wires them together and is driven from a single task.
//! The transport itself is abstract; see [`Transport`].

pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod history;
pub mod queue;
pub mod router;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod types;

pub use config::SyncConfig;
pub use engine::{Command, EngineHandle, SendOutcome, SessionEvent, SyncEngine, Timer};
pub use error::{Result, SyncError};
pub use history::HistoryState;
pub use router::{DataRouter, DataSubscription, HandlerError, HandlerResult};
pub use subscription::SubscriptionState;
pub use transport::{HistoryQuery, Transport, TransportError, TransportEvent};
pub use types::{
    Agent, ChatEntry, ConnectionState, Direction, Message, MessageKind, OutboundKind,
    OutboundMessage, SUBJECT_FIELD, SubscriptionKey,
};
