//! Hook state transitions.

use super::container::StateContainer;
use crate::error::{Result, StateError};
use crate::types::{StateValue, UpdateId};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A pending transition from one container to the next.
///
/// Updaters must be pure: applying the same updater to the same container
/// must give the same result, since a queue may be folded by more than one
/// handler. `None` in means the identity has no container yet; `None` out
/// means it has none afterwards.
pub trait HookUpdater: Send + Sync {
    fn updated_state_container(
        &self,
        current: Option<&StateContainer>,
    ) -> Result<Option<StateContainer>>;
}

impl<F> HookUpdater for F
where
    F: Fn(Option<&StateContainer>) -> Result<Option<StateContainer>> + Send + Sync,
{
    fn updated_state_container(
        &self,
        current: Option<&StateContainer>,
    ) -> Result<Option<StateContainer>> {
        self(current)
    }
}

/// An updater sitting in a handler's queue.
///
/// Clones share the updater; the id is what merge bookkeeping tracks.
#[derive(Clone)]
pub struct QueuedUpdate {
    id: UpdateId,
    updater: Arc<dyn HookUpdater>,
}

impl QueuedUpdate {
    pub(crate) fn new(updater: Arc<dyn HookUpdater>) -> Self {
        Self {
            id: UpdateId::next(),
            updater,
        }
    }

    pub fn id(&self) -> UpdateId {
        self.id
    }

    pub fn apply(&self, current: Option<&StateContainer>) -> Result<Option<StateContainer>> {
        self.updater.updated_state_container(current)
    }
}

impl fmt::Debug for QueuedUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedUpdate").field("id", &self.id).finish()
    }
}

/// Fold `updates` over `base` in order.
pub fn fold_updates<'a>(
    base: Option<StateContainer>,
    updates: impl IntoIterator<Item = &'a QueuedUpdate>,
) -> Result<Option<StateContainer>> {
    let mut container = base;
    for update in updates {
        container = update.apply(container.as_ref())?;
    }
    Ok(container)
}

/// Updater that registers a new hook slot holding `value`.
pub fn append_state<T: Any + Send + Sync>(value: T) -> impl HookUpdater {
    let value: StateValue = Arc::new(value);
    move |current: Option<&StateContainer>| -> Result<Option<StateContainer>> {
        Ok(Some(StateContainer::with_new_value(current, Arc::clone(&value))))
    }
}

/// Updater that replaces hook slot `index` with `value`.
pub fn set_state<T: Any + Send + Sync>(index: usize, value: T) -> impl HookUpdater {
    let value: StateValue = Arc::new(value);
    move |current: Option<&StateContainer>| match current {
        Some(c) => c.copy_and_replace(index, Arc::clone(&value)).map(Some),
        None => StateContainer::empty()
            .copy_and_replace(index, Arc::clone(&value))
            .map(Some),
    }
}

/// Updater that derives slot `index` from its current value.
///
/// A slot holding another type is left untouched.
pub fn update_state<T, F>(index: usize, f: F) -> impl HookUpdater
where
    T: Any + Send + Sync,
    F: Fn(&T) -> T + Send + Sync,
{
    move |current: Option<&StateContainer>| {
        let container = current.cloned().unwrap_or_default();
        match container.get::<T>(index).map(&f) {
            Some(next) => container.copy_and_mutate(index, next).map(Some),
            None if index >= container.len() => Err(StateError::HookOrderViolation {
                key: None,
                index,
                len: container.len(),
            }),
            None => Ok(Some(container)),
        }
    }
}
