//! Tunables for the synchronization engine.

use std::time::Duration;

/// Default number of history messages requested per page.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Default number of history fetch attempts before giving up.
pub const DEFAULT_HISTORY_MAX_ATTEMPTS: u32 = 3;

/// Default window within which identical history texts count as duplicates.
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(1);

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Messages requested per history page.
    pub history_page_size: u32,

    /// Total history fetch attempts (first try included).
    pub history_max_attempts: u32,

    /// Fixed delay between history fetch attempts.
    pub history_retry_delay: Duration,

    /// Delay between consecutive replayed history messages.
    pub history_stagger: Duration,

    /// Two history messages with identical text closer than this are one message.
    pub duplicate_window: Duration,

    /// Number of delivered messages remembered for duplicate suppression.
    pub delivered_memory: usize,

    /// Delay between queued sends while draining.
    pub queue_drain_delay: Duration,

    /// Maximum number of texts waiting in the outbound queue.
    pub max_queued: usize,

    /// Pending requests older than this are abandoned.
    pub request_timeout: Duration,

    /// Maximum number of pending requests tracked at once.
    pub max_pending: usize,

    /// How often the engine sweeps for timed-out requests.
    pub pending_sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            history_max_attempts: DEFAULT_HISTORY_MAX_ATTEMPTS,
            history_retry_delay: Duration::from_secs(1),
            history_stagger: Duration::from_millis(10),
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            delivered_memory: 1_000,
            queue_drain_delay: Duration::from_millis(100),
            max_queued: 100,
            request_timeout: Duration::from_secs(120),
            max_pending: 64,
            pending_sweep_interval: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with every artificial delay removed.
    pub fn immediate() -> Self {
        Self {
            history_retry_delay: Duration::ZERO,
            history_stagger: Duration::ZERO,
            queue_drain_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_history_page_size(mut self, size: u32) -> Self {
        self.history_page_size = size.max(1);
        self
    }

    pub fn with_history_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.history_max_attempts = max_attempts.max(1);
        self.history_retry_delay = delay;
        self
    }

    pub fn with_history_stagger(mut self, stagger: Duration) -> Self {
        self.history_stagger = stagger;
        self
    }

    pub fn with_queue_drain_delay(mut self, delay: Duration) -> Self {
        self.queue_drain_delay = delay;
        self
    }

    pub fn with_max_queued(mut self, max: usize) -> Self {
        self.max_queued = max.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max.max(1);
        self
    }
}
