//! Immutable hook slot container.

use crate::error::{Result, StateError};
use crate::types::StateValue;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Ordered hook slots for one component instance.
///
/// A container is never mutated in place. Every transformation returns a new
/// container; slot values are shared, the slot list is not. Cloning a
/// container is cheap.
#[derive(Clone, Default)]
pub struct StateContainer {
    states: Arc<Vec<StateValue>>,
}

impl StateContainer {
    /// A container with no slots.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Return `container` (or an empty container) with `value` appended as a
    /// new hook slot.
    pub fn with_new_state<T: Any + Send + Sync>(container: Option<&StateContainer>, value: T) -> Self {
        Self::with_new_value(container, Arc::new(value))
    }

    /// Same as [`StateContainer::with_new_state`] for an already boxed value.
    pub fn with_new_value(container: Option<&StateContainer>, value: StateValue) -> Self {
        let mut states = match container {
            Some(c) => Vec::with_capacity(c.states.len() + 1),
            None => Vec::with_capacity(1),
        };
        if let Some(c) = container {
            states.extend(c.states.iter().cloned());
        }
        states.push(value);
        Self {
            states: Arc::new(states),
        }
    }

    /// Return a copy of this container with slot `index` replaced by `value`.
    ///
    /// Fails with [`StateError::HookOrderViolation`] if `index` is not an
    /// existing slot.
    pub fn copy_and_mutate<T: Any + Send + Sync>(&self, index: usize, value: T) -> Result<Self> {
        self.copy_and_replace(index, Arc::new(value))
    }

    /// Same as [`StateContainer::copy_and_mutate`] for an already boxed value.
    pub fn copy_and_replace(&self, index: usize, value: StateValue) -> Result<Self> {
        if index >= self.states.len() {
            return Err(StateError::HookOrderViolation {
                key: None,
                index,
                len: self.states.len(),
            });
        }

        let mut states: Vec<StateValue> = self.states.iter().cloned().collect();
        states[index] = value;
        Ok(Self {
            states: Arc::new(states),
        })
    }

    /// Number of hook slots.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Typed view of slot `index`. `None` if the slot is missing or holds a
    /// different type.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.states.get(index).and_then(|v| v.downcast_ref::<T>())
    }

    /// Untyped handle to slot `index`.
    pub fn get_value(&self, index: usize) -> Option<&StateValue> {
        self.states.get(index)
    }

    /// Iterate slot values in hook order.
    pub fn values(&self) -> impl Iterator<Item = &StateValue> {
        self.states.iter()
    }
}

// Slot-wise identity. Only tests compare containers.
impl PartialEq for StateContainer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.states, &other.states)
            || (self.states.len() == other.states.len()
                && self
                    .states
                    .iter()
                    .zip(other.states.iter())
                    .all(|(a, b)| Arc::ptr_eq(a, b)))
    }
}

impl fmt::Debug for StateContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateContainer({} slots)", self.states.len())
    }
}
