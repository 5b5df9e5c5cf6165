//! In-process subscriptions to state store events.
//!
//! Diagnostic tooling can watch a [`crate::StateStore`] without touching the
//! authoritative handler:
//! - Queued hook updates
//! - Render passes started, committed or discarded
//! - Component unmounts
//!
//! Subscriptions filter by identity and event kind, and use bounded buffers;
//! a subscriber that falls behind is dropped.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::keys(vec![GlobalKey::from("root/counter")]),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(StateEvent::Committed { summary }) => println!("commit: {:?}", summary),
//!         Ok(StateEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, StateEvent, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
