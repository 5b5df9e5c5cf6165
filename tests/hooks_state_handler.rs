//! Hook state handler tests.
//!
//! These tests verify that:
//! 1. Cloned handlers are isolated from their parent
//! 2. Folding pending updates is ordered and idempotent
//! 3. Commits carry folded state and pending intent without double-applying
//! 4. Partial commits followed by full commits settle on the full result

use hookstate::updater::{append_state, set_state, update_state};
use hookstate::{GlobalKey, HookUpdater, Result, StateContainer, StateHandler, StateValue};
use std::sync::Arc;

#[derive(Debug)]
struct BazState;

fn global_key() -> GlobalKey {
    GlobalKey::from("globalKey")
}

/// `["test", 4, baz]`, returning the container and the baz slot.
fn base_container() -> (StateContainer, StateValue) {
    let container = StateContainer::with_new_state(None, "test");
    let container = StateContainer::with_new_state(Some(&container), 4i32);
    let container = StateContainer::with_new_state(Some(&container), BazState);
    let baz = Arc::clone(container.get_value(2).unwrap());
    (container, baz)
}

fn assert_states(container: &StateContainer, second: i32, baz: &StateValue, fourth: Option<&str>) {
    assert_eq!(container.len(), if fourth.is_some() { 4 } else { 3 });
    assert_eq!(container.get::<&str>(0), Some(&"test"));
    assert_eq!(container.get::<i32>(1), Some(&second));
    assert!(Arc::ptr_eq(container.get_value(2).unwrap(), baz));
    if let Some(fourth) = fourth {
        assert_eq!(container.get::<&str>(3), Some(&fourth));
    }
}

/// Append "newValue", then set slot 1 to 5.
fn append_then_set() -> impl HookUpdater {
    |current: Option<&StateContainer>| -> Result<Option<StateContainer>> {
        StateContainer::with_new_state(current, "newValue")
            .copy_and_mutate(1, 5i32)
            .map(Some)
    }
}

fn increment_slot_one() -> impl HookUpdater {
    update_state(1, |v: &i32| v + 1)
}

fn effective(handler: &StateHandler) -> &StateContainer {
    handler.get_state_container(&global_key()).unwrap()
}

// =============================================================================
// CLONING
// =============================================================================

#[test]
fn test_copying_empty_handler_creates_empty_handler() {
    let first = StateHandler::new();
    let second = StateHandler::from_parent(&first);

    assert!(!second.has_uncommitted_updates());
    assert!(second.is_empty());
}

#[test]
fn test_clone_queue_is_independent() {
    let (container, _) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), append_state(1i32));

    let mut second = StateHandler::from_parent(&first);
    second.queue_hook_state_update(global_key(), append_state(2i32));
    first.queue_hook_state_update(global_key(), append_state(3i32));
    first.queue_hook_state_update(global_key(), append_state(4i32));

    assert_eq!(first.pending_update_count(&global_key()), 3);
    assert_eq!(second.pending_update_count(&global_key()), 2);

    second.keep_state_container_for_global_key(&global_key()).unwrap();
    assert_eq!(effective(&second).len(), 5);
    assert_eq!(effective(&first).len(), 3);
}

// =============================================================================
// COMMIT
// =============================================================================

#[test]
fn test_commit_copies_old_state_and_applies_update() {
    let (container, baz) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), append_state("newValue"));

    assert!(first.has_uncommitted_updates());

    let mut second = StateHandler::from_parent(&first);

    assert!(first.has_uncommitted_updates());
    assert!(second.has_uncommitted_updates());

    second.keep_state_container_for_global_key(&global_key()).unwrap();
    assert_states(effective(&second), 4, &baz, Some("newValue"));

    first.commit(&second);

    assert!(!first.has_uncommitted_updates());
    assert_states(effective(&first), 4, &baz, Some("newValue"));
}

#[test]
fn test_commit_applies_multiple_updates_in_order() {
    let (container, baz) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), append_then_set());
    first.queue_hook_state_update(global_key(), increment_slot_one());

    assert!(first.has_uncommitted_updates());

    let mut second = StateHandler::from_parent(&first);

    assert!(first.has_uncommitted_updates());
    assert!(second.has_uncommitted_updates());
    assert_eq!(second.get_state_containers().len(), 1);

    second.keep_state_container_for_global_key(&global_key()).unwrap();
    assert_states(effective(&second), 6, &baz, Some("newValue"));

    first.commit(&second);

    assert!(!first.has_uncommitted_updates());
    assert_states(effective(&first), 6, &baz, Some("newValue"));
}

#[test]
fn test_partial_commit_then_full_commit() {
    let (container, baz) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), append_then_set());
    first.queue_hook_state_update(global_key(), increment_slot_one());

    let mut second = StateHandler::from_parent(&first);

    first.queue_hook_state_update(global_key(), increment_slot_one());

    let mut third = StateHandler::from_parent(&first);
    third.keep_state_container_for_global_key(&global_key()).unwrap();

    second.keep_state_container_for_global_key(&global_key()).unwrap();
    assert_states(effective(&second), 6, &baz, Some("newValue"));

    first.commit(&second);

    // The third update is still pending on top of the committed state.
    assert!(first.has_uncommitted_updates());
    assert_eq!(first.pending_update_count(&global_key()), 1);
    assert_states(effective(&first), 6, &baz, Some("newValue"));

    first.commit(&third);

    assert!(!first.has_uncommitted_updates());
    assert_states(effective(&first), 7, &baz, Some("newValue"));
}

#[test]
fn test_partial_commit_of_unfolded_pass_is_noop() {
    let (container, baz) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), append_then_set());
    first.queue_hook_state_update(global_key(), increment_slot_one());

    let second = StateHandler::from_parent(&first);
    first.queue_hook_state_update(global_key(), increment_slot_one());
    let mut third = StateHandler::from_parent(&first);

    assert!(first.commit(&second).is_noop());
    assert_eq!(first.pending_update_count(&global_key()), 3);
    assert_states(effective(&first), 4, &baz, None);

    third.keep_state_container_for_global_key(&global_key()).unwrap();
    first.commit(&third);

    assert!(!first.has_uncommitted_updates());
    assert_states(effective(&first), 7, &baz, Some("newValue"));
}

#[test]
fn test_commit_unfolded_then_fold_in_receiver() {
    let (container, baz) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), append_then_set());

    let mut second = StateHandler::from_parent(&first);
    second.queue_hook_state_update(global_key(), increment_slot_one());

    let summary = first.commit(&second);
    assert_eq!(summary.appended, 1);
    assert!(summary.adopted.is_empty());

    first.keep_state_container_for_global_key(&global_key()).unwrap();
    assert_states(effective(&first), 6, &baz, Some("newValue"));
}

#[test]
fn test_end_to_end_scenario() {
    let (container, baz) = base_container();
    let mut original = StateHandler::new();
    original.add_state_container(global_key(), container);
    original.queue_hook_state_update(global_key(), append_then_set());
    original.queue_hook_state_update(global_key(), increment_slot_one());

    let mut pass = StateHandler::from_parent(&original);
    pass.keep_state_container_for_global_key(&global_key()).unwrap();
    assert_states(effective(&pass), 6, &baz, Some("newValue"));

    original.commit(&pass);
    original
        .keep_state_container_for_global_key(&global_key())
        .unwrap();
    assert_states(effective(&original), 6, &baz, Some("newValue"));
    assert!(!original.has_uncommitted_updates());
}

/// Append 4, append "bazState", set slot 1 to 5, increment slot 1.
fn order_updates() -> Vec<Arc<dyn HookUpdater>> {
    vec![
        Arc::new(append_state(4i32)),
        Arc::new(append_state("bazState")),
        Arc::new(set_state(1, 5i32)),
        Arc::new(update_state(1, |v: &i32| v + 1)),
    ]
}

#[test]
fn test_commit_order_preservation_with_set_state() {
    let base = StateContainer::with_new_state(None, "test");

    // Folded locally, then committed.
    let mut local = StateHandler::new();
    local.add_state_container(global_key(), base.clone());
    for updater in order_updates() {
        local.queue_shared_update(global_key(), updater);
    }
    let mut pass = StateHandler::from_parent(&local);
    pass.keep_state_container_for_global_key(&global_key()).unwrap();
    local.commit(&pass);
    assert!(!local.has_uncommitted_updates());

    // Queued on the pass only, committed unfolded, folded by the receiver.
    let mut remote = StateHandler::new();
    remote.add_state_container(global_key(), base);
    let mut pass = StateHandler::from_parent(&remote);
    for updater in order_updates() {
        pass.queue_shared_update(global_key(), updater);
    }
    remote.commit(&pass);
    remote
        .keep_state_container_for_global_key(&global_key())
        .unwrap();
    // Folded but still queued until a pass that applied them is committed.
    assert_eq!(remote.pending_update_count(&global_key()), 4);

    for handler in [&local, &remote] {
        let c = effective(handler);
        assert_eq!(c.len(), 3);
        assert_eq!(c.get::<&str>(0), Some(&"test"));
        assert_eq!(c.get::<i32>(1), Some(&6));
        assert_eq!(c.get::<&str>(2), Some(&"bazState"));
    }

    // Settling the receiver's own fold through a pass does not refold.
    let settle = StateHandler::from_parent(&remote);
    remote.commit(&settle);
    assert!(!remote.has_uncommitted_updates());
    assert_eq!(effective(&remote).get::<i32>(1), Some(&6));
}

#[test]
fn test_double_commit_is_safe() {
    let (container, baz) = base_container();
    let mut first = StateHandler::new();
    first.add_state_container(global_key(), container);
    first.queue_hook_state_update(global_key(), increment_slot_one());

    let mut pass = StateHandler::from_parent(&first);
    pass.queue_hook_state_update(global_key(), increment_slot_one());
    pass.keep_state_container_for_global_key(&global_key()).unwrap();

    first.commit(&pass);
    first.commit(&pass);

    assert!(!first.has_uncommitted_updates());
    assert_states(effective(&first), 6, &baz, None);
}

#[test]
fn test_committing_into_grandparent() {
    let mut root = StateHandler::new();
    root.add_state_container(global_key(), StateContainer::with_new_state(None, 0i32));
    root.queue_hook_state_update(global_key(), update_state(0, |v: &i32| v + 1));

    let mut middle = StateHandler::from_parent(&root);
    middle.queue_hook_state_update(global_key(), update_state(0, |v: &i32| v + 10));
    let mut leaf = StateHandler::from_parent(&middle);
    leaf.keep_state_container_for_global_key(&global_key()).unwrap();

    root.commit(&leaf);
    assert!(!root.has_uncommitted_updates());
    assert_eq!(effective(&root).get::<i32>(0), Some(&11));

    // The middle pass has nothing the root does not already reflect.
    assert!(root.commit(&middle).is_noop());
}

#[test]
fn test_independent_identities() {
    let a = GlobalKey::from("a");
    let b = GlobalKey::from("b");
    let mut root = StateHandler::new();
    root.add_state_container(a.clone(), StateContainer::with_new_state(None, 0i32));
    root.add_state_container(b.clone(), StateContainer::with_new_state(None, 0i32));
    root.queue_hook_state_update(a.clone(), update_state(0, |v: &i32| v + 1));
    root.queue_hook_state_update(b.clone(), update_state(0, |v: &i32| v + 2));

    let mut pass = StateHandler::from_parent(&root);
    pass.keep_state_container_for_global_key(&a).unwrap();

    let summary = root.commit(&pass);
    assert_eq!(summary.adopted, vec![a.clone()]);
    assert_eq!(root.pending_update_count(&a), 0);
    assert_eq!(root.pending_update_count(&b), 1);
    assert!(root.has_uncommitted_updates());
}
