//! History replay for the active subscription.
//!
//! One fetch per tuple, guarded so a second trigger cannot start a
//! concurrent duplicate. Replayed batches are deduplicated twice: whole
//! batches by their sorted id list, and single messages against everything
//! already shown for the tuple.
//!
//! The per-message check falls back to "same text within the duplicate
//! window" when ids differ or are missing. That is an approximation: two
//! genuine messages with identical text sent inside the window collapse into
//! one.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::transport::HistoryQuery;
use crate::types::{Message, MessageKind, SubscriptionKey};

/// Loading state for the active tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryState {
    #[default]
    NotLoaded,
    InFlight {
        attempt: u32,
    },
    Loaded,
}

/// What to do with an incoming history page.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Not for the active tuple, or no fetch is outstanding.
    Stale,
    /// Same batch already processed for this tuple.
    Duplicate,
    /// Chat messages to hand to the UI, oldest first.
    Deliver(Vec<Message>),
}

/// Verdict after a failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// Try again; `attempt` is the number of the next attempt.
    Retry { attempt: u32 },
    /// Out of attempts. The tuple is left not-loaded.
    Exhausted { attempts: u32 },
    /// The tuple is no longer active.
    Stale,
}

#[derive(Debug, Clone)]
struct Fingerprint {
    id: Option<String>,
    text: Option<String>,
    created_at: DateTime<Utc>,
}

impl Fingerprint {
    fn of(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
        }
    }

    fn matches(&self, message: &Message, window: TimeDelta) -> bool {
        if let (Some(a), Some(b)) = (&self.id, &message.id)
            && a == b
        {
            return true;
        }
        match (&self.text, &message.text) {
            (Some(a), Some(b)) if a == b => (self.created_at - message.created_at).abs() <= window,
            _ => false,
        }
    }
}

/// Requests and deduplicates history for the active (agent, scope) tuple.
#[derive(Debug)]
pub struct HistoryReconciler {
    key: Option<SubscriptionKey>,
    state: HistoryState,
    seen_batches: HashSet<String>,
    delivered: VecDeque<Fingerprint>,
    page_size: u32,
    max_attempts: u32,
    duplicate_window: TimeDelta,
    delivered_memory: usize,
}

impl HistoryReconciler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            key: None,
            state: HistoryState::NotLoaded,
            seen_batches: HashSet::new(),
            delivered: VecDeque::new(),
            page_size: config.history_page_size,
            max_attempts: config.history_max_attempts,
            duplicate_window: TimeDelta::from_std(config.duplicate_window)
                .unwrap_or_else(|_| TimeDelta::seconds(1)),
            delivered_memory: config.delivered_memory.max(1),
        }
    }

    pub fn key(&self) -> Option<&SubscriptionKey> {
        self.key.as_ref()
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    /// Make `key` the active tuple. Switching tuples discards all state, as
    /// if the session had just been opened for it.
    pub fn activate(&mut self, key: &SubscriptionKey) -> bool {
        if self.key.as_ref() == Some(key) {
            return false;
        }
        self.reset();
        self.key = Some(key.clone());
        debug!(key = %key, "History state reset for new tuple");
        true
    }

    /// Forget everything, including which tuple is active.
    pub fn reset(&mut self) {
        self.key = None;
        self.state = HistoryState::NotLoaded;
        self.seen_batches.clear();
        self.delivered.clear();
    }

    /// Start the one fetch for `key`, if it is due.
    pub fn begin_fetch(&mut self, key: &SubscriptionKey) -> bool {
        if self.key.as_ref() != Some(key) || self.state != HistoryState::NotLoaded {
            return false;
        }
        self.state = HistoryState::InFlight { attempt: 1 };
        true
    }

    /// The request to issue for the active tuple.
    pub fn query(&self, participant_id: &str) -> Option<HistoryQuery> {
        let key = self.key.as_ref()?;
        Some(HistoryQuery {
            channel_id: key.channel_id.clone(),
            participant_id: participant_id.to_string(),
            page: 0,
            page_size: self.page_size,
            scope: key.scope.clone(),
        })
    }

    /// Record a failed attempt for `key`.
    pub fn fetch_failed(&mut self, key: &SubscriptionKey) -> FetchFailure {
        let HistoryState::InFlight { attempt } = self.state else {
            return FetchFailure::Stale;
        };
        if self.key.as_ref() != Some(key) {
            return FetchFailure::Stale;
        }
        if attempt >= self.max_attempts {
            self.state = HistoryState::NotLoaded;
            return FetchFailure::Exhausted { attempts: attempt };
        }
        let next = attempt + 1;
        self.state = HistoryState::InFlight { attempt: next };
        FetchFailure::Retry { attempt: next }
    }

    /// Whether a scheduled retry is still wanted.
    pub fn retry_due(&self, key: &SubscriptionKey, attempt: u32) -> bool {
        self.key.as_ref() == Some(key) && self.state == (HistoryState::InFlight { attempt })
    }

    /// The link dropped; an outstanding fetch will never be answered.
    pub fn connection_lost(&mut self) {
        if matches!(self.state, HistoryState::InFlight { .. }) {
            self.state = HistoryState::NotLoaded;
        }
    }

    /// Process one history page.
    ///
    /// `workflow` and `scope` are the tuple the page was requested for, when
    /// the transport reports it.
    pub fn accept_batch(
        &mut self,
        workflow: Option<&str>,
        scope: Option<&str>,
        messages: Vec<Message>,
    ) -> BatchOutcome {
        let Some(key) = self.key.clone() else {
            return BatchOutcome::Stale;
        };
        if let Some(workflow) = workflow
            && (workflow != key.channel_id || scope != key.scope.as_deref())
        {
            debug!(key = %key, workflow, "Discarding history for superseded tuple");
            return BatchOutcome::Stale;
        }
        // An untagged page can only be checked through its messages.
        if workflow.is_none()
            && let Some(foreign) = messages.iter().find(|m| !key.admits(m.scope.as_deref()))
        {
            debug!(key = %key, scope = ?foreign.scope, "Discarding history page for another scope");
            return BatchOutcome::Stale;
        }
        if !matches!(self.state, HistoryState::InFlight { .. }) {
            debug!(key = %key, state = ?self.state, "Discarding unsolicited history batch");
            return BatchOutcome::Stale;
        }

        let hash = batch_hash(&messages);
        if !self.seen_batches.insert(hash) {
            debug!(key = %key, count = messages.len(), "Duplicate history batch suppressed");
            self.state = HistoryState::Loaded;
            return BatchOutcome::Duplicate;
        }

        let mut chat: Vec<Message> = messages
            .into_iter()
            .filter(|m| m.kind != MessageKind::Data)
            .collect();
        // Stable sort keeps original order for equal timestamps.
        chat.sort_by_key(|m| m.created_at);

        let mut fresh = Vec::with_capacity(chat.len());
        for message in chat {
            if self.is_duplicate(&message) {
                trace!(id = ?message.id, "Duplicate history message dropped");
                continue;
            }
            self.record(&message);
            fresh.push(message);
        }
        BatchOutcome::Deliver(fresh)
    }

    /// Mark the active tuple's history as loaded.
    pub fn mark_loaded(&mut self, key: &SubscriptionKey) -> bool {
        if self.key.as_ref() != Some(key) {
            return false;
        }
        self.state = HistoryState::Loaded;
        true
    }

    /// Whether `message` was already shown for the active tuple.
    ///
    /// Equal backend ids always match. Otherwise, whether the ids differ or
    /// are missing, the same text inside the timestamp window also counts as
    /// a match, so two distinct messages with identical text sent within the
    /// window are shown once.
    pub fn is_duplicate(&self, message: &Message) -> bool {
        self.delivered
            .iter()
            .any(|f| f.matches(message, self.duplicate_window))
    }

    /// Remember a message shown to the UI.
    pub fn record(&mut self, message: &Message) {
        if self.delivered.len() >= self.delivered_memory {
            self.delivered.pop_front();
        }
        self.delivered.push_back(Fingerprint::of(message));
    }
}

/// Content hash of a batch: its sorted id list. Messages without an id
/// contribute their text and timestamp instead.
fn batch_hash(messages: &[Message]) -> String {
    let mut ids: Vec<String> = messages
        .iter()
        .map(|m| match &m.id {
            Some(id) => id.clone(),
            None => format!(
                "~{}@{}",
                m.text.as_deref().unwrap_or_default(),
                m.created_at.timestamp_millis()
            ),
        })
        .collect();
    ids.sort();
    ids.join("\u{1f}")
}
