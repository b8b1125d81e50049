//! Typed publish/subscribe bus for structured data messages.
//!
//! Data messages are demultiplexed by the `messageSubject` field of their
//! payload. Any number of independent handlers may listen to the same
//! subject; they run synchronously in registration order. Nothing is
//! buffered: a message with no listener is dropped.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::types::Message;

/// Error a handler may return. It is logged and otherwise ignored.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of data message handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

type Handler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

#[derive(Default)]
struct RouterInner {
    next_id: u64,
    routes: HashMap<String, Vec<(u64, Handler)>>,
}

/// Subject-keyed fan-out of data messages.
///
/// Cheap to clone; clones share the same handler table.
#[derive(Clone, Default)]
pub struct DataRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl std::fmt::Debug for DataRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        let mut subjects: Vec<_> = inner
            .routes
            .iter()
            .map(|(subject, handlers)| (subject.clone(), handlers.len()))
            .collect();
        subjects.sort();
        f.debug_struct("DataRouter")
            .field("subjects", &subjects)
            .finish()
    }
}

impl DataRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `subject`.
    ///
    /// The registration lives until [`DataSubscription::unsubscribe`] is
    /// called; dropping the handle does not remove it.
    pub fn subscribe<F>(&self, subject: impl Into<String>, handler: F) -> DataSubscription
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        let subject = subject.into();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .routes
            .entry(subject.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(subject = %subject, handler_id = id, "Data handler registered");

        DataSubscription {
            router: Arc::downgrade(&self.inner),
            subject,
            id,
        }
    }

    /// Register a handler that receives the payload deserialized as `T`.
    pub fn subscribe_typed<T, F>(&self, subject: impl Into<String>, handler: F) -> DataSubscription
    where
        T: DeserializeOwned,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(subject, move |message: &Message| {
            let payload = message
                .data
                .clone()
                .ok_or_else(|| HandlerError::from("data message has no payload"))?;
            let value: T = serde_json::from_value(payload)?;
            handler(value)
        })
    }

    /// Deliver a data message to every handler of its subject.
    ///
    /// Returns how many handlers ran. Messages without a payload, without a
    /// subject, or without any listener are logged and dropped.
    pub fn publish(&self, message: &Message) -> usize {
        let Some(subject) = message.subject() else {
            warn!(id = ?message.id, "Dropping data message without a subject");
            return 0;
        };

        let handlers: Vec<(u64, Handler)> = {
            let inner = self.inner.lock();
            match inner.routes.get(subject) {
                Some(handlers) if !handlers.is_empty() => handlers.clone(),
                _ => {
                    warn!(subject, id = ?message.id, "No handler for data message, dropping");
                    return 0;
                }
            }
        };

        // The lock is released so handlers may (un)subscribe.
        for (id, handler) in &handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(subject, handler_id = id, error = %e, "Data handler failed");
                }
                Err(_) => {
                    error!(subject, handler_id = id, "Data handler panicked");
                }
            }
        }
        handlers.len()
    }

    pub fn handler_count(&self, subject: &str) -> usize {
        self.inner.lock().routes.get(subject).map_or(0, Vec::len)
    }

    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .inner
            .lock()
            .routes
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(subject, _)| subject.clone())
            .collect();
        subjects.sort();
        subjects
    }
}

/// Handle returned by [`DataRouter::subscribe`].
#[derive(Debug)]
pub struct DataSubscription {
    router: Weak<Mutex<RouterInner>>,
    subject: String,
    id: u64,
}

impl DataSubscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Remove the handler. Does nothing if the router is gone.
    pub fn unsubscribe(self) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        let mut inner = router.lock();
        if let Some(handlers) = inner.routes.get_mut(&self.subject) {
            handlers.retain(|(id, _)| *id != self.id);
            if handlers.is_empty() {
                inner.routes.remove(&self.subject);
            }
        }
        debug!(subject = %self.subject, handler_id = self.id, "Data handler removed");
    }
}
