//! Tunables for the engine and transport, as written in the config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::SyncConfig;
use switchboard_core::config::{DEFAULT_HISTORY_MAX_ATTEMPTS, DEFAULT_HISTORY_PAGE_SIZE};
use switchboard_ws::{DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY};

/// The `sync:` section of the client config.
///
/// Every field is optional in the file; omitted fields take the engine's
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncSettings {
    pub history_page_size: u32,
    pub history_max_attempts: u32,
    pub history_retry_delay_ms: u64,
    pub history_stagger_ms: u64,
    pub queue_drain_delay_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_pending_requests: usize,
    pub max_queued_messages: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let engine = SyncConfig::default();
        Self {
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            history_max_attempts: DEFAULT_HISTORY_MAX_ATTEMPTS,
            history_retry_delay_ms: millis(engine.history_retry_delay),
            history_stagger_ms: millis(engine.history_stagger),
            queue_drain_delay_ms: millis(engine.queue_drain_delay),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: millis(DEFAULT_RECONNECT_DELAY),
            request_timeout_secs: engine.request_timeout.as_secs(),
            max_pending_requests: engine.max_pending,
            max_queued_messages: engine.max_queued,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl SyncSettings {
    /// Engine configuration for these settings.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_history_page_size(self.history_page_size)
            .with_history_retry(
                self.history_max_attempts,
                Duration::from_millis(self.history_retry_delay_ms),
            )
            .with_history_stagger(Duration::from_millis(self.history_stagger_ms))
            .with_queue_drain_delay(Duration::from_millis(self.queue_drain_delay_ms))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_max_pending(self.max_pending_requests)
            .with_max_queued(self.max_queued_messages)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
