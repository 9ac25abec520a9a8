//! Child reconciliation.
//!
//! Given a work-in-progress parent, the first child of its committed counterpart and
//! the new children description, builds the new child chain. Matching fibers are
//! cloned, the rest are created. Fibers that must be inserted or moved get
//! [`Flags::PLACEMENT`], and committed children that disappear are recorded in the
//! parent's `deletions`.
//!
//! Keyed sequences are matched through a lookup table and moves are decided in a
//! single linear pass. This is a heuristic, not a minimal edit script: a reused child
//! only stays in place if its previous position keeps the reused children ordered.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::element::{Element, ElementType, Key, Node};
use crate::fiber::{Fiber, FiberArena, FiberId, FiberProps, Flags, WorkTag};

/// Identity of a child inside a keyed sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

impl SlotKey {
    fn of_fiber<I>(fiber: &Fiber<I>) -> Self {
        fiber
            .key
            .as_ref()
            .map_or(Self::Index(fiber.index), |key| Self::Key(Rc::clone(key)))
    }

    fn of_node(node: &Node, index: usize) -> Self {
        match node {
            Node::Element(element) => element
                .key()
                .map_or(Self::Index(index), |key| Self::Key(Rc::clone(key))),
            _ => Self::Index(index),
        }
    }
}

/// A child built by the keyed pass, with the position of the fiber it reused.
struct Placed {
    fiber: FiberId,
    old_index: Option<usize>,
}

pub(crate) struct ChildReconciler<'a, I> {
    arena: &'a mut FiberArena<I>,
    track: bool,
}

impl<'a, I: Clone> ChildReconciler<'a, I> {
    /// Creates a reconciler. Without tracking, no placement or deletion is recorded:
    /// a subtree that is mounted for the first time is inserted as a whole.
    pub(crate) const fn new(arena: &'a mut FiberArena<I>, track: bool) -> Self {
        Self { arena, track }
    }

    /// Reconciles `children` under `parent` and returns the new first child.
    pub(crate) fn reconcile(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        children: &Node,
    ) -> Option<FiberId> {
        match unwrap_fragment(children) {
            Node::Element(element) => {
                let child = self.reconcile_single_element(parent, current_first, element);
                Some(self.place_single(child))
            }
            Node::Text(content) => {
                let child = self.reconcile_single_text(parent, current_first, content);
                Some(self.place_single(child))
            }
            Node::List(items) => self.reconcile_list(parent, current_first, items),
            Node::Empty => {
                self.delete_remaining(parent, current_first);
                None
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let key = element.key();
        let mut child = current_first;
        while let Some(id) = child {
            let fiber = &self.arena[id];
            let next = fiber.sibling;
            if fiber.key.as_ref() == key {
                if same_type(fiber, element) {
                    self.delete_remaining(parent, next);
                    let reused = self.use_fiber(id, element_props(element));
                    self.arena[reused].return_ = Some(parent);
                    return reused;
                }
                self.delete_remaining(parent, Some(id));
                break;
            }
            self.delete_child(parent, id);
            child = next;
        }

        let created = self.arena.create_from_element(element);
        self.arena[created].return_ = Some(parent);
        created
    }

    fn reconcile_single_text(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        content: &Rc<str>,
    ) -> FiberId {
        if let Some(first) = current_first {
            if self.arena[first].tag == WorkTag::HostText {
                let next = self.arena[first].sibling;
                self.delete_remaining(parent, next);
                let reused = self.use_fiber(first, FiberProps::Text(Rc::clone(content)));
                self.arena[reused].return_ = Some(parent);
                return reused;
            }
        }
        self.delete_remaining(parent, current_first);
        let created = self.arena.create_text(Rc::clone(content));
        self.arena[created].return_ = Some(parent);
        created
    }

    fn reconcile_list(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        items: &[Node],
    ) -> Option<FiberId> {
        let mut existing = BTreeMap::new();
        let mut shadowed = Vec::new();
        let mut child = current_first;
        while let Some(id) = child {
            let fiber = &self.arena[id];
            let slot = SlotKey::of_fiber(fiber);
            child = fiber.sibling;
            if let Some(previous) = existing.insert(slot.clone(), id) {
                tracing::warn!(?parent, key = ?slot, "duplicate key among children; earlier child dropped");
                shadowed.push(previous);
            }
        }

        let mut placed = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if item.is_empty() {
                continue;
            }
            let slot = SlotKey::of_node(item, index);
            let candidate = existing.get(&slot).copied();
            let (fiber, old_index) = match self.update_from_map(candidate, item) {
                Some(reused) => {
                    existing.remove(&slot);
                    (reused.0, Some(reused.1))
                }
                None => (self.create_child(item), None),
            };
            let new_fiber = &mut self.arena[fiber];
            new_fiber.index = index;
            new_fiber.return_ = Some(parent);
            placed.push(Placed { fiber, old_index });
        }

        for pair in placed.windows(2) {
            self.arena[pair[0].fiber].sibling = Some(pair[1].fiber);
        }
        if let Some(last) = placed.last() {
            self.arena[last.fiber].sibling = None;
        }

        if self.track {
            for fiber in moved_children(&placed) {
                self.arena[fiber].flags |= Flags::PLACEMENT;
            }
            for id in shadowed.into_iter().chain(existing.into_values()) {
                self.delete_child(parent, id);
            }
        }

        placed.first().map(|placed| placed.fiber)
    }

    /// Reuses `candidate` for `item` when their types line up. Returns the clone and
    /// the previous index of the candidate.
    fn update_from_map(&mut self, candidate: Option<FiberId>, item: &Node) -> Option<(FiberId, usize)> {
        let candidate = candidate?;
        let fiber = &self.arena[candidate];
        let old_index = fiber.index;
        let props = match item {
            Node::Element(element) if same_type(fiber, element) => element_props(element),
            Node::Text(content) if fiber.tag == WorkTag::HostText => {
                FiberProps::Text(Rc::clone(content))
            }
            Node::List(_) if fiber.tag == WorkTag::Fragment && fiber.key.is_none() => {
                FiberProps::Fragment(item.clone())
            }
            _ => return None,
        };
        Some((self.use_fiber(candidate, props), old_index))
    }

    fn create_child(&mut self, item: &Node) -> FiberId {
        match item {
            Node::Element(element) => self.arena.create_from_element(element),
            Node::Text(content) => self.arena.create_text(Rc::clone(content)),
            Node::List(_) => self.arena.create_fragment(item.clone(), None),
            Node::Empty => {
                tracing::warn!("empty child reached fiber creation");
                self.arena.create_fragment(Node::Empty, None)
            }
        }
    }

    fn use_fiber(&mut self, fiber: FiberId, props: FiberProps) -> FiberId {
        let clone = self.arena.clone_for_work_in_progress(fiber, props);
        let fiber = &mut self.arena[clone];
        fiber.index = 0;
        fiber.sibling = None;
        clone
    }

    fn place_single(&mut self, fiber: FiberId) -> FiberId {
        let fiber_ref = &mut self.arena[fiber];
        if self.track && fiber_ref.alternate.is_none() {
            fiber_ref.flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId) {
        if !self.track {
            return;
        }
        let parent = &mut self.arena[parent];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining(&mut self, parent: FiberId, first: Option<FiberId>) {
        if !self.track {
            return;
        }
        let mut child = first;
        while let Some(id) = child {
            child = self.arena[id].sibling;
            self.delete_child(parent, id);
        }
    }
}

/// A sole unkeyed fragment stands for its children.
fn unwrap_fragment(node: &Node) -> &Node {
    match node {
        Node::Element(element)
            if element.key().is_none() && matches!(element.ty(), ElementType::Fragment) =>
        {
            element.props().children()
        }
        _ => node,
    }
}

fn same_type<I>(fiber: &Fiber<I>, element: &Element) -> bool {
    match element.ty() {
        ElementType::Fragment => fiber.tag == WorkTag::Fragment,
        _ => fiber.ty.matches(element),
    }
}

fn element_props(element: &Element) -> FiberProps {
    match element.ty() {
        ElementType::Fragment => FiberProps::Fragment(element.props().children().clone()),
        _ => FiberProps::Element(Rc::clone(element.props())),
    }
}

/// Picks the fibers that must be placed.
///
/// New fibers are always placed. Reused fibers are checked twice: left to right
/// against the highest previous index kept so far, and right to left against the
/// lowest one. Either way the kept fibers appear in increasing previous order, so
/// the host order of the kept nodes is already right. The pass that moves fewer
/// fibers wins; ties go to the left-to-right pass.
fn moved_children(placed: &[Placed]) -> Vec<FiberId> {
    let mut forward = Vec::new();
    let mut last_placed = 0;
    for child in placed {
        if let Some(old) = child.old_index {
            if old < last_placed {
                forward.push(child.fiber);
            } else {
                last_placed = old;
            }
        }
    }

    let mut backward = Vec::new();
    let mut first_placed = usize::MAX;
    for child in placed.iter().rev() {
        if let Some(old) = child.old_index {
            if old > first_placed {
                backward.push(child.fiber);
            } else {
                first_placed = old;
            }
        }
    }

    let mut moved = if backward.len() < forward.len() {
        backward
    } else {
        forward
    };
    moved.extend(
        placed
            .iter()
            .filter(|child| child.old_index.is_none())
            .map(|child| child.fiber),
    );
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{fragment, h, text};

    type Arena = FiberArena<u32>;

    fn keyed(keys: &[&str]) -> Node {
        keys.iter()
            .map(|key| Node::from(h("li").key(*key).child(*key)))
            .collect()
    }

    /// Mounts `children` under a fresh parent and returns the committed parent.
    fn mount(arena: &mut Arena, children: &Node) -> FiberId {
        let parent = arena.create_from_element(&h("ul").build());
        let first = ChildReconciler::new(arena, false).reconcile(parent, None, children);
        arena[parent].child = first;
        arena.settle_fresh();
        parent
    }

    /// Reconciles `children` against the committed parent and returns the new chain.
    fn update(arena: &mut Arena, parent: FiberId, children: &Node) -> (FiberId, Vec<FiberId>) {
        let wip = arena.clone_for_work_in_progress(parent, FiberProps::None);
        let current_first = arena[parent].child;
        let first = ChildReconciler::new(arena, true).reconcile(wip, current_first, children);
        arena[wip].child = first;
        let chain = arena.children(wip).collect();
        (wip, chain)
    }

    fn key_of(arena: &Arena, id: FiberId) -> &str {
        arena[id].key.as_deref().unwrap_or("")
    }

    fn placed_keys(arena: &Arena, chain: &[FiberId]) -> Vec<String> {
        chain
            .iter()
            .filter(|id| arena[**id].flags.contains(Flags::PLACEMENT))
            .map(|id| key_of(arena, *id).to_owned())
            .collect()
    }

    #[test]
    fn mounting_marks_nothing() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &keyed(&["a", "b"]));
        let chain: Vec<_> = arena.children(parent).collect();
        assert_eq!(chain.len(), 2);
        assert!(chain.iter().all(|id| arena[*id].flags.is_empty()));
        assert_eq!(arena[chain[1]].index, 1);
    }

    #[test]
    fn moving_the_last_child_to_the_front_places_only_it() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &keyed(&["a", "b", "c"]));
        let (wip, chain) = update(&mut arena, parent, &keyed(&["c", "a", "b"]));

        assert_eq!(placed_keys(&arena, &chain), ["c"]);
        assert!(arena[wip].deletions.is_empty());
        assert!(chain.iter().all(|id| arena[*id].alternate.is_some()));
    }

    #[test]
    fn moving_the_first_child_to_the_back_places_only_it() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &keyed(&["a", "b", "c"]));
        let (_, chain) = update(&mut arena, parent, &keyed(&["b", "c", "a"]));
        assert_eq!(placed_keys(&arena, &chain), ["a"]);
    }

    #[test]
    fn removed_and_added_children() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &keyed(&["a", "b", "c"]));
        let old: Vec<_> = arena.children(parent).collect();
        let (wip, chain) = update(&mut arena, parent, &keyed(&["a", "d", "c"]));

        assert_eq!(placed_keys(&arena, &chain), ["d"]);
        assert_eq!(arena[wip].deletions, [old[1]]);
        assert!(arena[wip].flags.contains(Flags::CHILD_DELETION));
        assert_eq!(arena[chain[2]].alternate, Some(old[2]));
    }

    #[test]
    fn type_change_under_the_same_key_replaces_the_child() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &h("p").key("x").into());
        let old = arena[parent].child;
        let (wip, chain) = update(&mut arena, parent, &h("span").key("x").into());

        assert_eq!(chain.len(), 1);
        assert_eq!(arena[chain[0]].alternate, None);
        assert!(arena[chain[0]].flags.contains(Flags::PLACEMENT));
        assert_eq!(arena[wip].deletions, old.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn single_child_deletes_unmatched_siblings() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &keyed(&["a", "b", "c"]));
        let old: Vec<_> = arena.children(parent).collect();
        let (wip, chain) = update(&mut arena, parent, &h("li").key("b").into());

        assert_eq!(chain.len(), 1);
        assert_eq!(arena[chain[0]].alternate, Some(old[1]));
        assert!(arena[chain[0]].flags.is_empty());
        assert_eq!(arena[wip].deletions, [old[0], old[2]]);
    }

    #[test]
    fn unkeyed_fragment_is_unwrapped() {
        let mut arena = Arena::default();
        let node: Node = fragment().child("a").child("b").build().into();
        let parent = mount(&mut arena, &node);
        let chain: Vec<_> = arena.children(parent).collect();

        assert_eq!(chain.len(), 2);
        assert!(chain.iter().all(|id| arena[*id].tag == WorkTag::HostText));
    }

    #[test]
    fn text_child_is_reused() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &text("a"));
        let old = arena[parent].child;
        let (_, chain) = update(&mut arena, parent, &text("b"));

        assert_eq!(arena[chain[0]].alternate, old);
        assert_eq!(arena[chain[0]].pending_props.text(), Some("b"));
    }

    #[test]
    fn empty_children_delete_everything() {
        let mut arena = Arena::default();
        let parent = mount(&mut arena, &keyed(&["a", "b"]));
        let (wip, chain) = update(&mut arena, parent, &Node::Empty);
        assert!(chain.is_empty());
        assert_eq!(arena[wip].deletions.len(), 2);
    }
}
