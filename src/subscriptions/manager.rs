//! Subscription manager for broadcasting state store events.

use crate::error::{Result, StateError};
use crate::types::{CommitSummary, GlobalKey, HandlerId, UpdateId};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, StateEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    filter: SubscriptionFilter,
    sender: Sender<StateEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: StateEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    fn matches_update(&self, key: &GlobalKey) -> bool {
        self.filter.include_updates && self.filter.matches_key(key)
    }

    fn matches_commit(&self, summary: &CommitSummary) -> bool {
        if !self.filter.include_commits {
            return false;
        }
        if self.filter.keys.is_none() {
            return true;
        }
        summary
            .adopted
            .iter()
            .chain(&summary.mounted)
            .chain(&summary.refused)
            .any(|key| self.filter.matches_key(key))
    }

    fn matches_unmount(&self, key: &GlobalKey) -> bool {
        self.filter.include_lifecycle && self.filter.matches_key(key)
    }

    /// Pass events carry no identity; key filters do not apply to them.
    fn wants_pass_events(&self) -> bool {
        self.filter.include_lifecycle
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        let subscription = Subscription {
            filter: config.filter,
            sender,
        };

        self.subscriptions.write().insert(id, subscription);

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let sub = self
            .subscriptions
            .write()
            .remove(&id)
            .ok_or(StateError::SubscriptionNotFound(id))?;

        // Best effort; the receiver may already be gone.
        let _ = sub.sender.try_send(StateEvent::Dropped {
            reason: DropReason::Unsubscribed,
        });
        Ok(())
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    // --- Broadcasting ---

    pub fn broadcast_update_queued(&self, key: &GlobalKey, update: UpdateId) {
        let event = StateEvent::UpdateQueued {
            key: key.clone(),
            update,
        };

        self.broadcast(|sub| sub.matches_update(key), event);
    }

    pub fn broadcast_pass_started(&self, pass: HandlerId) {
        self.broadcast(|sub| sub.wants_pass_events(), StateEvent::PassStarted { pass });
    }

    pub fn broadcast_committed(&self, summary: &CommitSummary) {
        let event = StateEvent::Committed {
            summary: summary.clone(),
        };

        self.broadcast(|sub| sub.matches_commit(summary), event);
    }

    pub fn broadcast_discarded(&self, pass: HandlerId) {
        self.broadcast(|sub| sub.wants_pass_events(), StateEvent::Discarded { pass });
    }

    pub fn broadcast_unmounted(&self, key: &GlobalKey) {
        let event = StateEvent::Unmounted { key: key.clone() };

        self.broadcast(|sub| sub.matches_unmount(key), event);
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: StateEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::warn!(subscription = ?id, "Dropped slow state subscriber");
                    // Usually fails too; the receiver sees a disconnect instead.
                    let _ = sub.sender.try_send(StateEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
