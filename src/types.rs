//! Core types for the hook state store.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable identity of one component instance across renders.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalKey(Arc<str>);

impl GlobalKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        GlobalKey(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalKey({})", self.0)
    }
}

impl fmt::Display for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GlobalKey {
    fn from(key: &str) -> Self {
        GlobalKey::new(key)
    }
}

impl From<String> for GlobalKey {
    fn from(key: String) -> Self {
        GlobalKey(Arc::from(key))
    }
}

/// Opaque value held in one hook slot.
pub type StateValue = Arc<dyn Any + Send + Sync>;

static NEXT_UPDATE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a queued hook update.
///
/// Ids follow the order in which updates were queued anywhere in the
/// process; a merged queue need not be sorted by id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpdateId(pub u64);

impl UpdateId {
    pub(crate) fn next() -> Self {
        UpdateId(NEXT_UPDATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UpdateId({})", self.0)
    }
}

/// Process-unique identifier of a state handler.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// What a commit did to the receiving handler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Handler whose work was merged.
    pub source: Option<HandlerId>,
    /// Identities whose folded container was adopted from the source.
    pub adopted: Vec<GlobalKey>,
    /// Identities first registered in the source and newly mounted here.
    pub mounted: Vec<GlobalKey>,
    /// Identities whose folded container was refused as stale.
    pub refused: Vec<GlobalKey>,
    /// Updates appended to the receiver's pending queues.
    pub appended: usize,
    /// Updates removed from the receiver's pending queues as settled.
    pub retired: usize,
}

impl CommitSummary {
    /// True if the commit changed nothing in the receiver.
    pub fn is_noop(&self) -> bool {
        self.adopted.is_empty() && self.mounted.is_empty() && self.appended == 0 && self.retired == 0
    }
}

/// Point-in-time counters for a handler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerStats {
    /// Number of identities with a stored container.
    pub containers: usize,
    /// Number of identities with a non-empty pending queue.
    pub identities_with_pending: usize,
    /// Total queued updates across identities.
    pub pending_updates: usize,
    /// Queued updates already folded into stored containers.
    pub folded_updates: usize,
    /// Settled update ids still remembered for merging late passes.
    pub settled_updates: usize,
}

impl HandlerStats {
    /// Render the stats as JSON for diagnostic tooling.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
