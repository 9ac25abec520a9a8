//! Update queues.
//!
//! Producers append to a shared pending list in O(1). A render detaches that list,
//! appends it to the base updates carried by the node, and folds the updates that
//! belong to the render lanes into a new state. Updates from other lanes are left in
//! the base list together with everything after them, so that they are applied in
//! their original order once their lane renders.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::{self, Debug};

use crate::element::Props;
use crate::lane::{Lane, Lanes};

/// Types that support a shallow merge of a partial value.
pub trait ShallowMerge {
    /// Returns `self` with every top-level entry of `partial` written over it.
    #[must_use]
    fn shallow_merge(&self, partial: &Self) -> Self;
}

impl<K: Ord + Clone, V: Clone> ShallowMerge for BTreeMap<K, V> {
    fn shallow_merge(&self, partial: &Self) -> Self {
        let mut merged = self.clone();
        merged.extend(partial.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// The payload of an update.
pub enum Action<S> {
    /// Replace the state.
    Replace(S),
    /// Compute the next state from the previous one and the current props.
    Reduce(Rc<dyn Fn(&S, &Props) -> S>),
}

impl<S: 'static> Action<S> {
    /// A reducer that only looks at the previous state.
    pub fn reduce(f: impl Fn(&S) -> S + 'static) -> Self {
        Self::Reduce(Rc::new(move |prev: &S, _: &Props| f(prev)))
    }

    /// Merges `partial` over the previous state.
    pub fn merge(partial: S) -> Self
    where
        S: ShallowMerge,
    {
        Self::Reduce(Rc::new(move |prev: &S, _: &Props| {
            prev.shallow_merge(&partial)
        }))
    }
}

impl<S: Clone> Action<S> {
    fn apply(&self, prev: &S, props: &Props) -> S {
        match self {
            Self::Replace(value) => value.clone(),
            Self::Reduce(f) => f(prev, props),
        }
    }
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Replace(value) => Self::Replace(value.clone()),
            Self::Reduce(f) => Self::Reduce(Rc::clone(f)),
        }
    }
}

impl<S: Debug> Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Self::Reduce(_) => f.write_str("Reduce(..)"),
        }
    }
}

/// A pending change and the lane it was issued on.
#[derive(Debug)]
pub struct Update<S> {
    /// What to do.
    pub action: Action<S>,
    /// Lane the update belongs to; [`Lanes::NONE`] for rebased updates.
    pub lane: Lane,
}

impl<S> Update<S> {
    /// Creates an update.
    pub const fn new(action: Action<S>, lane: Lane) -> Self {
        Self { action, lane }
    }
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

/// The producer side of a queue: a pending list shared by every copy of the queue.
pub struct SharedQueue<S> {
    pending: Rc<RefCell<VecDeque<Update<S>>>>,
}

impl<S> SharedQueue<S> {
    /// Appends an update.
    pub fn enqueue(&self, update: Update<S>) {
        self.pending.borrow_mut().push_back(update);
    }

    /// Number of updates not yet picked up by a render.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    fn take(&self) -> VecDeque<Update<S>> {
        core::mem::take(&mut *self.pending.borrow_mut())
    }
}

impl<S> Clone for SharedQueue<S> {
    fn clone(&self) -> Self {
        Self {
            pending: Rc::clone(&self.pending),
        }
    }
}

impl<S> Debug for SharedQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedQueue")
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// Outcome of [`UpdateQueue::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed<S> {
    /// State after applying every update in the render lanes.
    pub state: S,
    /// Lanes of updates that were skipped.
    pub skipped: Lanes,
}

/// A node's view of an update queue.
///
/// The current node and its work-in-progress copy each hold their own base state and
/// base updates, while sharing the pending list.
#[derive(Debug)]
pub struct UpdateQueue<S> {
    base_state: S,
    base_updates: Vec<Update<S>>,
    shared: SharedQueue<S>,
}

impl<S: Clone> Clone for UpdateQueue<S> {
    fn clone(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            base_updates: self.base_updates.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<S: Clone> UpdateQueue<S> {
    /// Creates a queue whose base state is `base_state`.
    pub fn new(base_state: S) -> Self {
        Self {
            base_state,
            base_updates: Vec::new(),
            shared: SharedQueue {
                pending: Rc::new(RefCell::new(VecDeque::new())),
            },
        }
    }

    /// A producer handle for this queue.
    pub fn shared(&self) -> SharedQueue<S> {
        self.shared.clone()
    }

    /// Appends an update to the pending list.
    pub fn enqueue(&self, update: Update<S>) {
        self.shared.enqueue(update);
    }

    /// The state updates are folded into.
    pub const fn base_state(&self) -> &S {
        &self.base_state
    }

    /// Updates retained for a later render.
    pub fn base_updates(&self) -> &[Update<S>] {
        &self.base_updates
    }

    /// Folds the updates that belong to `render_lanes` into a new state.
    ///
    /// Pending updates are moved into the base list of this queue and, when given, of
    /// `current`, so a discarded render does not lose them. The first skipped update
    /// fixes the new base state; every update after it stays in the base list, with
    /// applied ones rebased to [`Lanes::NONE`].
    pub fn process(
        &mut self,
        current: Option<&mut Self>,
        props: &Props,
        render_lanes: Lanes,
    ) -> Processed<S> {
        let pending = self.shared.take();
        if !pending.is_empty() {
            if let Some(current) = current {
                current.base_updates.extend(pending.iter().cloned());
            }
            self.base_updates.extend(pending);
        }

        let mut state = self.base_state.clone();
        let mut new_base_state = None;
        let mut retained = Vec::new();
        let mut skipped = Lanes::NONE;

        for update in core::mem::take(&mut self.base_updates) {
            if !render_lanes.includes(update.lane) {
                if retained.is_empty() {
                    new_base_state = Some(state.clone());
                }
                skipped |= update.lane;
                retained.push(update);
                continue;
            }
            state = update.action.apply(&state, props);
            if !retained.is_empty() {
                retained.push(Update::new(update.action, Lanes::NONE));
            }
        }

        self.base_state = new_base_state.unwrap_or_else(|| state.clone());
        self.base_updates = retained;
        Processed { state, skipped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(n: i32) -> Action<i32> {
        Action::reduce(move |prev| prev + n)
    }

    #[test]
    fn folds_pending_updates_in_order() {
        let mut queue = UpdateQueue::new(2);
        queue.enqueue(Update::new(add(1), Lanes::SYNC));
        queue.enqueue(Update::new(Action::Replace(10), Lanes::SYNC));
        queue.enqueue(Update::new(add(3), Lanes::SYNC));

        let processed = queue.process(None, &Props::new(), Lanes::SYNC);
        assert_eq!(processed.state, 13);
        assert_eq!(processed.skipped, Lanes::NONE);
        assert_eq!(*queue.base_state(), 13);
    }

    #[test]
    fn replaying_without_new_updates_is_a_no_op() {
        let mut queue = UpdateQueue::new(0);
        queue.enqueue(Update::new(add(5), Lanes::DEFAULT));

        let first = queue.process(None, &Props::new(), Lanes::DEFAULT);
        let second = queue.process(None, &Props::new(), Lanes::DEFAULT);
        assert_eq!(first.state, 5);
        assert_eq!(second.state, 5);
        assert_eq!(*queue.base_state(), 5);
        assert!(queue.base_updates().is_empty());
    }

    #[test]
    fn skips_foreign_lanes_and_rebases() {
        let mut queue = UpdateQueue::new(String::new());
        let push = |c: char| Action::reduce(move |prev: &String| format!("{prev}{c}"));
        queue.enqueue(Update::new(push('a'), Lanes::SYNC));
        queue.enqueue(Update::new(push('b'), Lanes::TRANSITION));
        queue.enqueue(Update::new(push('c'), Lanes::SYNC));

        let urgent = queue.process(None, &Props::new(), Lanes::SYNC);
        assert_eq!(urgent.state, "ac");
        assert_eq!(urgent.skipped, Lanes::TRANSITION);
        assert_eq!(queue.base_state(), "a");
        assert_eq!(queue.base_updates().len(), 2);

        let deferred = queue.process(None, &Props::new(), Lanes::TRANSITION);
        assert_eq!(deferred.state, "abc");
        assert!(queue.base_updates().is_empty());
    }

    #[test]
    fn pending_updates_survive_a_discarded_render() {
        let mut current = UpdateQueue::new(1);
        current.enqueue(Update::new(add(1), Lanes::SYNC));

        let mut abandoned = current.clone();
        let processed = abandoned.process(Some(&mut current), &Props::new(), Lanes::SYNC);
        assert_eq!(processed.state, 2);

        let mut retry = current.clone();
        assert_eq!(retry.process(None, &Props::new(), Lanes::SYNC).state, 2);
    }

    #[test]
    fn merge_is_shallow() {
        let mut queue = UpdateQueue::new(BTreeMap::from([("a", 1), ("b", 2)]));
        queue.enqueue(Update::new(
            Action::merge(BTreeMap::from([("b", 3)])),
            Lanes::SYNC,
        ));
        let state = queue.process(None, &Props::new(), Lanes::SYNC).state;
        assert_eq!(state, BTreeMap::from([("a", 1), ("b", 3)]));
    }
}
