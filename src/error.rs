//! Error types for the hook state store.

use crate::subscriptions::SubscriptionId;
use crate::types::GlobalKey;
use thiserror::Error;

/// Main error type for state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// A hook slot was addressed that does not exist in the container.
    ///
    /// Hooks must be called in the same order and number on every render of
    /// the same component, so this always indicates a programming error.
    #[error("Hook order violation{}: slot {index} out of range (len {len})", key_suffix(.key))]
    HookOrderViolation {
        key: Option<GlobalKey>,
        index: usize,
        len: usize,
    },

    /// Raised by caller-supplied updaters through
    /// [`StateError::updater_failed`]. The identity is attached when the
    /// fold fails.
    #[error("Hook updater failed{}: {reason}", key_suffix(.key))]
    UpdaterFailed {
        key: Option<GlobalKey>,
        reason: String,
    },

    #[error("Subscription not found: {0:?}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn key_suffix(key: &Option<GlobalKey>) -> String {
    match key {
        Some(key) => format!(" for {}", key),
        None => String::new(),
    }
}

impl StateError {
    /// Error for an updater that cannot produce the next container.
    pub fn updater_failed(reason: impl Into<String>) -> Self {
        StateError::UpdaterFailed {
            key: None,
            reason: reason.into(),
        }
    }

    /// Attach the identity being folded to an error raised by a container
    /// operation or updater that did not know it.
    pub(crate) fn for_key(self, key: &GlobalKey) -> Self {
        match self {
            StateError::HookOrderViolation {
                key: None,
                index,
                len,
            } => StateError::HookOrderViolation {
                key: Some(key.clone()),
                index,
                len,
            },
            StateError::UpdaterFailed { key: None, reason } => StateError::UpdaterFailed {
                key: Some(key.clone()),
                reason,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;
