//! Per-pass hook state handler.
//!
//! A handler maps component identities to their hook containers and holds
//! the hook updates queued against them. The authoritative handler is
//! cloned at the start of every render pass; the pass folds its queues into
//! its own containers and, if accepted, is committed back.
//!
//! Handlers cloned from one another form a family rooted at the handler
//! created with [`StateHandler::new`]. The root only remembers settled
//! updates and unmounts that some live pass of its family may not have seen.

use super::container::StateContainer;
use super::updater::{fold_updates, HookUpdater, QueuedUpdate};
use crate::error::Result;
use crate::types::{CommitSummary, GlobalKey, HandlerId, HandlerStats, UpdateId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static CLOCK: AtomicU64 = AtomicU64::new(1);

/// Next tick of the clock ordering clones, settles and unmounts.
fn tick() -> u64 {
    CLOCK.fetch_add(1, Ordering::Relaxed)
}

/// How far into a source's queue for one identity a receiver has merged.
#[derive(Clone, Copy, Debug)]
struct MergeMark {
    source: HandlerId,
    /// Queue length at the last merge.
    len: usize,
    /// Id of the last entry merged, used to detect that the queue was
    /// reshaped since.
    last: UpdateId,
}

/// Update ids reflected in an identity's stored container through commits.
#[derive(Clone, Debug, Default)]
struct Ledger {
    /// Tick of the last `add_state_container` for the identity, 0 if the
    /// container only ever came from updates.
    epoch: u64,
    /// Settled ids with the tick at which each settled.
    settled: HashMap<UpdateId, u64>,
    /// Entries settled before this tick have been forgotten.
    pruned_before: u64,
}

impl Ledger {
    fn registered() -> Self {
        Ledger {
            epoch: tick(),
            ..Default::default()
        }
    }

    fn contains(&self, id: &UpdateId) -> bool {
        self.settled.contains_key(id)
    }

    fn prune(&mut self, cutoff: u64) {
        self.settled.retain(|_, at| *at >= cutoff);
        self.pruned_before = self.pruned_before.max(cutoff);
    }
}

/// Branch ticks of the live passes of one handler family.
#[derive(Debug, Default)]
struct Lineage {
    live: Mutex<BTreeMap<u64, usize>>,
}

impl Lineage {
    fn retain(&self, branched_at: u64) {
        *self.live.lock().entry(branched_at).or_insert(0) += 1;
    }

    fn release(&self, branched_at: u64) {
        let mut live = self.live.lock();
        if let Some(count) = live.get_mut(&branched_at) {
            *count -= 1;
            if *count == 0 {
                live.remove(&branched_at);
            }
        }
    }

    fn oldest(&self) -> Option<u64> {
        self.live.lock().keys().next().copied()
    }
}

/// Hook state store for one render pass, or the authoritative store.
#[derive(Debug)]
pub struct StateHandler {
    id: HandlerId,

    /// Shared with every handler cloned from the same root.
    lineage: Arc<Lineage>,

    /// Tick at which this handler's ancestry left the root. `None` for the
    /// root itself.
    branched_at: Option<u64>,

    /// Stored container per identity.
    containers: HashMap<GlobalKey, StateContainer>,

    /// Queued updates per identity, in enqueue order.
    pending_updates: HashMap<GlobalKey, Vec<QueuedUpdate>>,

    /// Number of leading pending updates already folded into the stored
    /// container.
    folded: HashMap<GlobalKey, usize>,

    /// Updates reflected in the stored container through earlier commits.
    /// Settled ids never sit in `pending_updates`.
    ledgers: HashMap<GlobalKey, Ledger>,

    /// Tick of the last unmount per identity.
    unmounted: HashMap<GlobalKey, u64>,

    /// High-water mark into the queue of the last handler committed into
    /// this one, per identity.
    merge_marks: HashMap<GlobalKey, MergeMark>,

    /// Memoised fold of the full pending queue over the stored container.
    applied_containers: HashMap<GlobalKey, Option<StateContainer>>,
}

impl Default for StateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StateHandler {
    fn drop(&mut self) {
        if let Some(branched_at) = self.branched_at {
            self.lineage.release(branched_at);
        }
    }
}

impl StateHandler {
    /// Create an empty handler, the root of a new family.
    pub fn new() -> Self {
        Self {
            id: HandlerId::next(),
            lineage: Arc::default(),
            branched_at: None,
            containers: HashMap::new(),
            pending_updates: HashMap::new(),
            folded: HashMap::new(),
            ledgers: HashMap::new(),
            unmounted: HashMap::new(),
            merge_marks: HashMap::new(),
            applied_containers: HashMap::new(),
        }
    }

    /// Create a handler for a new render pass from `parent`.
    ///
    /// The clone owns its own maps and queues; queued updaters are shared.
    /// Nothing done to one handler afterwards is visible in the other.
    pub fn from_parent(parent: &StateHandler) -> Self {
        let branched_at = parent.branched_at.unwrap_or_else(tick);
        parent.lineage.retain(branched_at);

        let handler = Self {
            id: HandlerId::next(),
            lineage: Arc::clone(&parent.lineage),
            branched_at: Some(branched_at),
            containers: parent.containers.clone(),
            pending_updates: parent.pending_updates.clone(),
            folded: parent.folded.clone(),
            ledgers: parent.ledgers.clone(),
            unmounted: parent.unmounted.clone(),
            merge_marks: HashMap::new(),
            applied_containers: parent.applied_containers.clone(),
        };

        tracing::trace!(
            parent = ?parent.id,
            handler = ?handler.id,
            containers = handler.containers.len(),
            "Cloned state handler"
        );

        handler
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Register (or overwrite) the container for `key`.
    ///
    /// Queued updates are kept; they will be folded over the new container.
    /// Passes cloned before this call can no longer replace the container
    /// on commit, though their queued updates still merge.
    pub fn add_state_container(&mut self, key: impl Into<GlobalKey>, container: StateContainer) {
        let key = key.into();
        self.folded.remove(&key);
        self.ledgers.insert(key.clone(), Ledger::registered());
        self.applied_containers.remove(&key);
        self.containers.insert(key, container);
    }

    /// The stored container for `key`, without folding pending updates.
    ///
    /// Call [`StateHandler::keep_state_container_for_global_key`] first to
    /// read the effective state.
    pub fn get_state_container(&self, key: &GlobalKey) -> Option<&StateContainer> {
        self.containers.get(key)
    }

    /// All stored containers.
    pub fn get_state_containers(&self) -> &HashMap<GlobalKey, StateContainer> {
        &self.containers
    }

    /// Append `updater` to the queue for `key`. The updater is not applied.
    pub fn queue_hook_state_update(
        &mut self,
        key: impl Into<GlobalKey>,
        updater: impl HookUpdater + 'static,
    ) -> UpdateId {
        self.queue_shared_update(key, Arc::new(updater))
    }

    /// Same as [`StateHandler::queue_hook_state_update`] for an updater that
    /// is already shared.
    pub fn queue_shared_update(
        &mut self,
        key: impl Into<GlobalKey>,
        updater: Arc<dyn HookUpdater>,
    ) -> UpdateId {
        let key = key.into();
        let update = QueuedUpdate::new(updater);
        let id = update.id();

        tracing::trace!(handler = ?self.id, key = %key, update = ?id, "Queued hook update");

        self.applied_containers.remove(&key);
        self.pending_updates.entry(key).or_default().push(update);
        id
    }

    /// Fold this handler's pending updates for `key` into its stored
    /// container.
    ///
    /// Updates stay queued for commit bookkeeping but are never folded twice,
    /// so calling this again without new updates does nothing. On error the
    /// handler is unchanged.
    pub fn keep_state_container_for_global_key(&mut self, key: &GlobalKey) -> Result<()> {
        let Some(queue) = self.pending_updates.get(key) else {
            return Ok(());
        };
        let done = self.folded.get(key).copied().unwrap_or(0);
        if done >= queue.len() {
            return Ok(());
        }

        let folded = match self.applied_containers.remove(key) {
            Some(cached) => cached,
            None => fold_updates(self.containers.get(key).cloned(), &queue[done..])
                .map_err(|e| e.for_key(key))?,
        };

        tracing::debug!(
            handler = ?self.id,
            key = %key,
            updates = queue.len() - done,
            "Folded pending hook updates"
        );

        let total = queue.len();
        match folded {
            Some(container) => {
                self.containers.insert(key.clone(), container);
            }
            None => {
                self.containers.remove(key);
            }
        }
        self.folded.insert(key.clone(), total);
        Ok(())
    }

    /// The container for `key` with all pending updates applied, without
    /// storing it. The result is memoised until `key` changes.
    pub fn get_state_container_with_hook_updates(
        &mut self,
        key: &GlobalKey,
    ) -> Result<Option<StateContainer>> {
        if let Some(cached) = self.applied_containers.get(key) {
            return Ok(cached.clone());
        }

        let base = self.containers.get(key).cloned();
        let done = self.folded.get(key).copied().unwrap_or(0);
        match self.pending_updates.get(key) {
            Some(queue) if done < queue.len() => {
                let folded = fold_updates(base, &queue[done..]).map_err(|e| e.for_key(key))?;
                self.applied_containers.insert(key.clone(), folded.clone());
                Ok(folded)
            }
            _ => Ok(base),
        }
    }

    /// Merge the work of `source`, a pass cloned from this handler (directly
    /// or through other passes), into this handler.
    ///
    /// Per identity, if `source` reflects updates that this handler has not
    /// yet settled, on top of all it has settled, its folded container is
    /// adopted and those updates leave this handler's queue. Updates
    /// `source` queued but did not fold are appended unless already known
    /// here. A `source` whose folded container misses updates settled here,
    /// or predates the last `add_state_container` for the identity, is
    /// stale and its container is refused. State for an identity unmounted
    /// here after `source` was cloned is ignored. Committing the same source
    /// again is a no-op.
    pub fn commit(&mut self, source: &StateHandler) -> CommitSummary {
        let mut summary = CommitSummary {
            source: Some(source.id),
            ..Default::default()
        };

        for (key, queue) in &source.pending_updates {
            if self.missed_unmount(source, key) {
                self.refuse_unmounted(source, key, &mut summary);
                continue;
            }
            self.merge_identity(source, key, queue, &mut summary);
        }

        for (key, container) in &source.containers {
            if self.containers.contains_key(key) || self.ledgers.contains_key(key) {
                continue;
            }
            if self.missed_unmount(source, key) {
                if !summary.refused.contains(key) {
                    self.refuse_unmounted(source, key, &mut summary);
                }
                continue;
            }
            self.mount(source, key, container, &mut summary);
        }

        if self.branched_at.is_none() {
            self.prune_history();
        }

        tracing::debug!(
            handler = ?self.id,
            source = ?source.id,
            adopted = summary.adopted.len(),
            mounted = summary.mounted.len(),
            refused = summary.refused.len(),
            appended = summary.appended,
            retired = summary.retired,
            "Committed state handler"
        );

        summary
    }

    fn merge_identity(
        &mut self,
        source: &StateHandler,
        key: &GlobalKey,
        queue: &[QueuedUpdate],
        summary: &mut CommitSummary,
    ) {
        let folded_len = source.folded.get(key).copied().unwrap_or(0).min(queue.len());
        let folded_ids: HashSet<UpdateId> =
            queue[..folded_len].iter().map(QueuedUpdate::id).collect();
        let source_ledger = source.ledgers.get(key);
        let reflects =
            |id: &UpdateId| folded_ids.contains(id) || source_ledger.is_some_and(|l| l.contains(id));

        let own = self.ledgers.get(key);
        let covers = own.map_or(true, |own| {
            own.epoch == source_ledger.map_or(0, |l| l.epoch)
                && own.settled.keys().all(|id| reflects(id))
        });

        if covers {
            let cutoff = own.map_or(0, |l| l.pruned_before);
            let settled_here = |id: &UpdateId| own.is_some_and(|l| l.contains(id));
            let inherited: Vec<(UpdateId, u64)> = source_ledger
                .map(|l| {
                    l.settled
                        .iter()
                        .filter(|(id, at)| **at >= cutoff && !settled_here(*id))
                        .map(|(id, at)| (*id, *at))
                        .collect()
                })
                .unwrap_or_default();
            let newly_folded: Vec<UpdateId> = folded_ids
                .iter()
                .filter(|id| !settled_here(*id))
                .copied()
                .collect();

            if !inherited.is_empty() || !newly_folded.is_empty() {
                self.adopt(source, key, inherited, newly_folded, summary);
            }
        } else if folded_len > 0 {
            tracing::warn!(
                handler = ?self.id,
                source = ?source.id,
                key = %key,
                "Refused stale folded container during commit"
            );
            summary.refused.push(key.clone());
        }

        let start = self.merge_start(source.id, key, queue);
        let ledger = self.ledgers.get(key);
        let pending = self.pending_updates.entry(key.clone()).or_default();
        let known: HashSet<UpdateId> = pending.iter().map(QueuedUpdate::id).collect();
        for update in &queue[start..] {
            let id = update.id();
            if known.contains(&id) || ledger.is_some_and(|l| l.contains(&id)) {
                continue;
            }
            pending.push(update.clone());
            summary.appended += 1;
        }
        if pending.is_empty() {
            self.pending_updates.remove(key);
            self.folded.remove(key);
        }

        if let Some(last) = queue.last() {
            self.merge_marks.insert(
                key.clone(),
                MergeMark {
                    source: source.id,
                    len: queue.len(),
                    last: last.id(),
                },
            );
        }
        self.applied_containers.remove(key);
    }

    /// Take `source`'s container for `key` and settle what it reflects.
    fn adopt(
        &mut self,
        source: &StateHandler,
        key: &GlobalKey,
        inherited: Vec<(UpdateId, u64)>,
        newly_folded: Vec<UpdateId>,
        summary: &mut CommitSummary,
    ) {
        let source_ledger = source.ledgers.get(key);
        let ledger = self.ledgers.entry(key.clone()).or_insert_with(|| Ledger {
            epoch: source_ledger.map_or(0, |l| l.epoch),
            settled: HashMap::new(),
            pruned_before: source_ledger.map_or(0, |l| l.pruned_before),
        });
        ledger.settled.extend(inherited);
        let now = tick();
        ledger
            .settled
            .extend(newly_folded.into_iter().map(|id| (id, now)));

        if let Some(pending) = self.pending_updates.get_mut(key) {
            let before = pending.len();
            pending.retain(|u| !ledger.contains(&u.id()));
            summary.retired += before - pending.len();
        }

        match source.containers.get(key) {
            Some(container) => {
                self.containers.insert(key.clone(), container.clone());
            }
            None => {
                self.containers.remove(key);
            }
        }
        self.folded.remove(key);
        summary.adopted.push(key.clone());
    }

    /// Take a container `source` registered for an identity unknown here.
    fn mount(
        &mut self,
        source: &StateHandler,
        key: &GlobalKey,
        container: &StateContainer,
        summary: &mut CommitSummary,
    ) {
        if let Some(ledger) = source.ledgers.get(key) {
            if let Some(pending) = self.pending_updates.get_mut(key) {
                let before = pending.len();
                pending.retain(|u| !ledger.contains(&u.id()));
                summary.retired += before - pending.len();
                if pending.is_empty() {
                    self.pending_updates.remove(key);
                }
            }
            self.ledgers.insert(key.clone(), ledger.clone());
        }
        self.containers.insert(key.clone(), container.clone());
        self.folded.remove(key);
        self.applied_containers.remove(key);
        summary.mounted.push(key.clone());
    }

    /// True if `key` was unmounted here after `source` last saw it unmount.
    fn missed_unmount(&self, source: &StateHandler, key: &GlobalKey) -> bool {
        self.unmounted.get(key).is_some_and(|&at| {
            source
                .unmounted
                .get(key)
                .map_or(true, |&seen| seen < at)
        })
    }

    fn refuse_unmounted(&self, source: &StateHandler, key: &GlobalKey, summary: &mut CommitSummary) {
        tracing::warn!(
            handler = ?self.id,
            source = ?source.id,
            key = %key,
            "Ignored state for identity unmounted after the pass began"
        );
        summary.refused.push(key.clone());
    }

    /// Index into `queue` from which entries may still be unmerged.
    fn merge_start(&self, source: HandlerId, key: &GlobalKey, queue: &[QueuedUpdate]) -> usize {
        match self.merge_marks.get(key) {
            Some(mark)
                if mark.source == source
                    && mark.len <= queue.len()
                    && mark.len > 0
                    && queue[mark.len - 1].id() == mark.last =>
            {
                mark.len
            }
            _ => 0,
        }
    }

    /// Forget settles and unmounts older than every live pass of the family.
    /// Only the root prunes.
    fn prune_history(&mut self) {
        let cutoff = self.lineage.oldest().unwrap_or_else(tick);
        for ledger in self.ledgers.values_mut() {
            ledger.prune(cutoff);
        }
        self.unmounted.retain(|_, at| *at >= cutoff);
    }

    /// Drop all state for `key`, as when its component unmounts.
    ///
    /// Passes cloned before the unmount cannot bring the identity back.
    pub fn remove_state_container(&mut self, key: &GlobalKey) -> Option<StateContainer> {
        self.pending_updates.remove(key);
        self.folded.remove(key);
        self.ledgers.remove(key);
        self.unmounted.insert(key.clone(), tick());
        self.applied_containers.remove(key);
        self.merge_marks.remove(key);
        self.containers.remove(key)
    }

    /// True if any identity has queued updates.
    pub fn has_uncommitted_updates(&self) -> bool {
        self.pending_updates.values().any(|q| !q.is_empty())
    }

    /// True if no container is stored.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Number of updates queued for `key`.
    pub fn pending_update_count(&self, key: &GlobalKey) -> usize {
        self.pending_updates.get(key).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> HandlerStats {
        HandlerStats {
            containers: self.containers.len(),
            identities_with_pending: self
                .pending_updates
                .values()
                .filter(|q| !q.is_empty())
                .count(),
            pending_updates: self.pending_updates.values().map(Vec::len).sum(),
            folded_updates: self.folded.values().sum(),
            settled_updates: self.ledgers.values().map(|l| l.settled.len()).sum(),
        }
    }
}
