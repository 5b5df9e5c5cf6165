//! # Hook State Store
//!
//! Per-component hook state for a declarative UI tree whose render passes
//! are speculative: they may run off the main thread, be thrown away, or be
//! retried before one of them is accepted.
//!
//! ## Core Concepts
//!
//! - **Containers**: Immutable ordered hook slots for one component instance
//! - **Updates**: Queued pure transitions from one container to the next
//! - **Handlers**: A render pass's snapshot of every container plus its own
//!   update queues; cloned from the authoritative handler, committed back
//! - **Store**: The authoritative handler behind a lock, with event
//!   subscriptions for diagnostic tooling
//!
//! Reading a handler's container returns the stored value. Fold pending
//! updates with `keep_state_container_for_global_key` (or peek with
//! `get_state_container_with_hook_updates`) before reading effective state.
//!
//! ## Example
//!
//! ```ignore
//! use hookstate::{updater, GlobalKey, StateContainer, StateStore};
//!
//! let store = StateStore::default();
//! let key = GlobalKey::from("root/counter");
//! store.add_state_container(key.clone(), StateContainer::with_new_state(None, 0i32));
//!
//! // A click handler schedules an increment.
//! store.queue_update(key.clone(), updater::update_state(0, |n: &i32| n + 1));
//!
//! // A render pass folds it on a worker thread...
//! let mut pass = store.begin_pass();
//! pass.keep_state_container_for_global_key(&key)?;
//!
//! // ...and is accepted.
//! store.commit(pass);
//! ```

pub mod error;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, StateError};
pub use state::{fold_updates, updater, HookUpdater, QueuedUpdate, StateContainer, StateHandler};
pub use store::{StateStore, StateStoreConfig};
pub use subscriptions::{
    DropReason, StateEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
