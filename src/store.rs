//! Authoritative state store shared by render threads.

use crate::error::Result;
use crate::state::{HookUpdater, StateContainer, StateHandler};
use crate::subscriptions::{
    SubscriptionConfig, SubscriptionFilter, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{CommitSummary, GlobalKey, HandlerStats, UpdateId};
use parking_lot::Mutex;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StateStoreConfig {
    /// Buffer size for subscriptions created with [`StateStore::watch`].
    pub event_buffer_size: usize,

    /// Whether queued updates are broadcast to subscribers.
    pub emit_update_events: bool,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            emit_update_events: true,
        }
    }
}

/// The authoritative hook state of one component tree.
///
/// Render passes work on handlers cloned with [`StateStore::begin_pass`] and
/// may run on any thread. Only [`StateStore::commit`] writes pass results
/// back, one commit at a time.
pub struct StateStore {
    /// Store configuration.
    config: StateStoreConfig,

    /// The authoritative handler. Serialises commits.
    handler: Mutex<StateHandler>,

    /// Event subscribers.
    subscriptions: SubscriptionManager,
}

impl StateStore {
    pub fn new(config: StateStoreConfig) -> Self {
        Self {
            config,
            handler: Mutex::new(StateHandler::new()),
            subscriptions: SubscriptionManager::new(),
        }
    }

    pub fn config(&self) -> &StateStoreConfig {
        &self.config
    }

    // --- Render Passes ---

    /// Snapshot the authoritative handler for a new render pass.
    pub fn begin_pass(&self) -> StateHandler {
        let pass = StateHandler::from_parent(&self.handler.lock());
        self.subscriptions.broadcast_pass_started(pass.id());
        pass
    }

    /// Merge an accepted render pass into the authoritative handler.
    pub fn commit(&self, pass: StateHandler) -> CommitSummary {
        let summary = self.handler.lock().commit(&pass);
        self.subscriptions.broadcast_committed(&summary);
        summary
    }

    /// Drop a render pass. The authoritative handler is not touched.
    pub fn discard(&self, pass: StateHandler) {
        let id = pass.id();
        drop(pass);
        tracing::debug!(pass = ?id, "Discarded render pass");
        self.subscriptions.broadcast_discarded(id);
    }

    // --- State Operations ---

    /// Queue a hook update on the authoritative handler. Passes begun after
    /// this call see it.
    pub fn queue_update(
        &self,
        key: impl Into<GlobalKey>,
        updater: impl HookUpdater + 'static,
    ) -> UpdateId {
        let key = key.into();
        let id = self
            .handler
            .lock()
            .queue_hook_state_update(key.clone(), updater);
        if self.config.emit_update_events {
            self.subscriptions.broadcast_update_queued(&key, id);
        }
        id
    }

    /// Register a container directly on the authoritative handler.
    pub fn add_state_container(&self, key: impl Into<GlobalKey>, container: StateContainer) {
        self.handler.lock().add_state_container(key, container);
    }

    /// Fold the authoritative handler's pending updates for `key`.
    pub fn keep_state_container_for_global_key(&self, key: &GlobalKey) -> Result<()> {
        self.handler.lock().keep_state_container_for_global_key(key)
    }

    /// Stored container for `key`, pending updates not applied.
    pub fn state_container(&self, key: &GlobalKey) -> Option<StateContainer> {
        self.handler.lock().get_state_container(key).cloned()
    }

    /// Container for `key` with pending updates applied, without storing it.
    pub fn effective_state_container(&self, key: &GlobalKey) -> Result<Option<StateContainer>> {
        self.handler.lock().get_state_container_with_hook_updates(key)
    }

    /// Remove all state for an unmounted component. Passes begun before the
    /// unmount cannot bring it back.
    pub fn unmount(&self, key: &GlobalKey) -> Option<StateContainer> {
        let removed = self.handler.lock().remove_state_container(key);
        self.subscriptions.broadcast_unmounted(key);
        removed
    }

    pub fn has_uncommitted_updates(&self) -> bool {
        self.handler.lock().has_uncommitted_updates()
    }

    pub fn is_empty(&self) -> bool {
        self.handler.lock().is_empty()
    }

    pub fn stats(&self) -> HandlerStats {
        self.handler.lock().stats()
    }

    /// Run `f` against the authoritative handler while holding its lock.
    pub fn with_handler<R>(&self, f: impl FnOnce(&StateHandler) -> R) -> R {
        f(&self.handler.lock())
    }

    // --- Subscriptions ---

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    /// Subscribe to every event with the configured buffer size.
    pub fn watch(&self) -> SubscriptionHandle {
        self.subscriptions.subscribe(SubscriptionConfig {
            buffer_size: self.config.event_buffer_size,
            filter: SubscriptionFilter::all(),
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscriptions.unsubscribe(id)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StateStoreConfig::default())
    }
}
