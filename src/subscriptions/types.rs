//! Subscription types for state store events.

use crate::types::{CommitSummary, GlobalKey, HandlerId, UpdateId};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only events touching these identities (None = all identities).
    pub keys: Option<Vec<GlobalKey>>,

    /// Include queued update events.
    pub include_updates: bool,

    /// Include commit events.
    pub include_commits: bool,

    /// Include pass start/discard and unmount events.
    pub include_lifecycle: bool,
}

impl SubscriptionFilter {
    /// Everything touching specific identities.
    pub fn keys(keys: Vec<GlobalKey>) -> Self {
        Self {
            keys: Some(keys),
            ..Self::all()
        }
    }

    /// Commit events only.
    pub fn commits() -> Self {
        Self {
            include_commits: true,
            ..Default::default()
        }
    }

    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            keys: None,
            include_updates: true,
            include_commits: true,
            include_lifecycle: true,
        }
    }

    pub(crate) fn matches_key(&self, key: &GlobalKey) -> bool {
        match self.keys {
            Some(ref keys) => keys.contains(key),
            None => true,
        }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// A hook update was queued on the authoritative handler.
    UpdateQueued { key: GlobalKey, update: UpdateId },

    /// A render pass handler was cloned from the authoritative handler.
    PassStarted { pass: HandlerId },

    /// A render pass was committed.
    Committed { summary: CommitSummary },

    /// A render pass was dropped without commit.
    Discarded { pass: HandlerId },

    /// A component's state was removed.
    Unmounted { key: GlobalKey },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StateEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StateEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StateEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StateEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
