//! Root records.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::fiber::{FiberId, RootId};
use crate::hooks::Effect;
use crate::lane::Lanes;
use crate::scheduler::TaskId;

/// Handle to a container created with
/// [`Reconciler::create_container`](crate::Reconciler::create_container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootHandle(pub(crate) RootId);

impl RootHandle {
    /// The root id.
    #[must_use]
    pub const fn id(self) -> RootId {
        self.0
    }
}

/// Bookkeeping for one container.
#[derive(Debug)]
pub(crate) struct FiberRoot<I> {
    pub container: I,
    pub current: FiberId,
    /// Tree built by the last render, waiting for commit.
    pub finished_work: Option<FiberId>,
    pub finished_lane: Lanes,
    pub pending_lanes: Lanes,
    pub callback_node: Option<TaskId>,
    pub callback_priority: Lanes,
    pub pending_passive_unmounts: Vec<Rc<Effect>>,
    pub pending_passive_mounts: Vec<Rc<Effect>>,
}

impl<I> FiberRoot<I> {
    pub(crate) const fn new(container: I, current: FiberId) -> Self {
        Self {
            container,
            current,
            finished_work: None,
            finished_lane: Lanes::NONE,
            pending_lanes: Lanes::NONE,
            callback_node: None,
            callback_priority: Lanes::NONE,
            pending_passive_unmounts: Vec::new(),
            pending_passive_mounts: Vec::new(),
        }
    }

    pub(crate) fn has_pending_passive_effects(&self) -> bool {
        !self.pending_passive_unmounts.is_empty() || !self.pending_passive_mounts.is_empty()
    }
}
