//! Outbound request correlation.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use uuid::Uuid;

/// A chat request waiting for its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// Tracks in-flight chat requests by correlation id.
///
/// The pending set is bounded twice over: by count (oldest abandoned first)
/// and by age (see [`RequestCorrelator::expire`]).
#[derive(Debug)]
pub struct RequestCorrelator {
    pending: VecDeque<PendingRequest>,
    max_pending: usize,
    timeout: TimeDelta,
}

impl RequestCorrelator {
    pub fn new(max_pending: usize, timeout: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            timeout: TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX),
        }
    }

    /// A fresh correlation id.
    pub fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Start tracking `correlation_id`. Returns requests abandoned to make room.
    pub fn track(
        &mut self,
        correlation_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Vec<PendingRequest> {
        let mut evicted = Vec::new();
        while self.pending.len() >= self.max_pending {
            if let Some(oldest) = self.pending.pop_front() {
                debug!(correlation_id = %oldest.correlation_id, "Pending request evicted");
                evicted.push(oldest);
            }
        }
        self.pending.push_back(PendingRequest {
            correlation_id: correlation_id.into(),
            submitted_at: now,
        });
        evicted
    }

    /// Resolve a response. Unknown or already-resolved ids return `None`.
    pub fn resolve(&mut self, correlation_id: &str) -> Option<PendingRequest> {
        let pos = self
            .pending
            .iter()
            .position(|p| p.correlation_id == correlation_id)?;
        self.pending.remove(pos)
    }

    /// Drop requests submitted more than the timeout before `now`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<PendingRequest> {
        let timeout = self.timeout;
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| now.signed_duration_since(p.submitted_at) > timeout);
        self.pending = kept.into();
        expired
    }

    /// Drop everything, e.g. when the conversation changes.
    pub fn abandon_all(&mut self) -> Vec<PendingRequest> {
        self.pending.drain(..).collect()
    }

    pub fn pending_ids(&self) -> Vec<&str> {
        self.pending
            .iter()
            .map(|p| p.correlation_id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlator() -> RequestCorrelator {
        RequestCorrelator::new(3, Duration::from_secs(60))
    }

    #[test]
    fn test_resolve_round_trip() {
        let mut c = correlator();
        let now = Utc::now();
        c.track("c1", now);
        c.track("c2", now);

        assert!(c.resolve("unrelated").is_none());
        assert_eq!(c.len(), 2);

        let resolved = c.resolve("c1").unwrap();
        assert_eq!(resolved.correlation_id, "c1");
        assert_eq!(c.pending_ids(), vec!["c2"]);

        // Second response for the same id is not a match.
        assert!(c.resolve("c1").is_none());
        assert_eq!(c.pending_ids(), vec!["c2"]);
    }

    #[test]
    fn test_ids_are_unique() {
        let c = correlator();
        assert_ne!(c.next_id(), c.next_id());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut c = correlator();
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            assert!(c.track(id, now).is_empty());
        }
        let evicted = c.track("d", now);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].correlation_id, "a");
        assert_eq!(c.pending_ids(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_expire_by_age() {
        let mut c = correlator();
        let now = Utc::now();
        c.track("old", now - TimeDelta::seconds(120));
        c.track("new", now - TimeDelta::seconds(5));

        let expired = c.expire(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].correlation_id, "old");
        assert_eq!(c.pending_ids(), vec!["new"]);
    }

    #[test]
    fn test_abandon_all() {
        let mut c = correlator();
        c.track("a", Utc::now());
        c.track("b", Utc::now());
        assert_eq!(c.abandon_all().len(), 2);
        assert!(c.is_empty());
    }
}
