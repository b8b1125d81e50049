//! Channel subscription state machine.
//!
//! `Idle -> Subscribing -> Subscribed -> Switching -> Subscribing ...`
//!
//! The controller only decides; the engine performs the transport calls a
//! [`SubscriptionPlan`] asks for and reports back.

use crate::types::SubscriptionKey;

/// Where the session stands with respect to its single live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Idle,
    Subscribing(SubscriptionKey),
    Subscribed(SubscriptionKey),
    Switching {
        from: SubscriptionKey,
        to: SubscriptionKey,
    },
}

/// What has to happen to move from the current state to the desired key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionPlan {
    /// Already where we need to be, or nothing can be done yet.
    Noop,
    /// No agent is selected any more; drop the live subscription.
    Release(SubscriptionKey),
    /// Same agent channel, different document scope. The transport
    /// subscription stays; only the scope changes.
    Rescope {
        from: SubscriptionKey,
        to: SubscriptionKey,
    },
    /// Subscribe to `to`, unsubscribing `release` first when present.
    Subscribe {
        release: Option<SubscriptionKey>,
        to: SubscriptionKey,
    },
}

/// Tracks the one (agent channel, scope) tuple registered with the transport.
#[derive(Debug, Default)]
pub struct SubscriptionController {
    state: SubscriptionState,
}

impl SubscriptionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// The live subscription, if the controller is `Subscribed`.
    pub fn live(&self) -> Option<&SubscriptionKey> {
        match &self.state {
            SubscriptionState::Subscribed(key) => Some(key),
            _ => None,
        }
    }

    /// Decide how to reach `desired`.
    ///
    /// Asking for the tuple that is already subscribed (or being subscribed)
    /// is a no-op, so several observers reacting to the same change do not
    /// produce duplicate subscribe calls.
    pub fn plan(&self, desired: Option<&SubscriptionKey>, connected: bool) -> SubscriptionPlan {
        if !connected {
            return SubscriptionPlan::Noop;
        }

        let Some(desired) = desired else {
            return match &self.state {
                SubscriptionState::Subscribed(key) => SubscriptionPlan::Release(key.clone()),
                _ => SubscriptionPlan::Noop,
            };
        };

        match &self.state {
            SubscriptionState::Subscribed(key) if key == desired => SubscriptionPlan::Noop,
            SubscriptionState::Subscribing(key) if key == desired => SubscriptionPlan::Noop,
            SubscriptionState::Switching { to, .. } if to == desired => SubscriptionPlan::Noop,
            SubscriptionState::Subscribed(key) if key.channel_id == desired.channel_id => {
                SubscriptionPlan::Rescope {
                    from: key.clone(),
                    to: desired.clone(),
                }
            }
            SubscriptionState::Subscribed(key) => SubscriptionPlan::Subscribe {
                release: Some(key.clone()),
                to: desired.clone(),
            },
            _ => SubscriptionPlan::Subscribe {
                release: None,
                to: desired.clone(),
            },
        }
    }

    pub fn begin_switch(&mut self, from: SubscriptionKey, to: SubscriptionKey) {
        self.state = SubscriptionState::Switching { from, to };
    }

    pub fn begin_subscribe(&mut self, key: SubscriptionKey) {
        self.state = SubscriptionState::Subscribing(key);
    }

    /// Mark `key` as subscribed.
    ///
    /// Returns false, leaving the state alone, if the controller has moved on
    /// to another tuple in the meantime.
    pub fn complete(&mut self, key: &SubscriptionKey) -> bool {
        let current = match &self.state {
            SubscriptionState::Subscribing(k) => k,
            SubscriptionState::Switching { to, .. } => to,
            _ => return false,
        };
        if current != key {
            return false;
        }
        self.state = SubscriptionState::Subscribed(key.clone());
        true
    }

    /// Subscribe failed or the subscription was released.
    pub fn reset(&mut self) {
        self.state = SubscriptionState::Idle;
    }

    /// The link dropped; whatever was live is gone with it.
    pub fn connection_lost(&mut self) -> Option<SubscriptionKey> {
        match std::mem::take(&mut self.state) {
            SubscriptionState::Subscribed(key) => Some(key),
            _ => None,
        }
    }
}
