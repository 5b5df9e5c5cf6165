//! Hook state containers, updates and per-pass handlers.
//!
//! Containers are immutable; updates are queued closures over them; a
//! handler owns one render pass's view of every component's state and can
//! be committed into the handler it was cloned from.

mod container;
mod handler;
pub mod updater;

pub use container::StateContainer;
pub use handler::StateHandler;
pub use updater::{fold_updates, HookUpdater, QueuedUpdate};
