//! The fiber graph.
//!
//! Fibers live in a [`FiberArena`] and refer to each other through [`FiberId`]s:
//! `return_` (parent), `child` (first child), `sibling` (next sibling) and
//! `alternate`, the symmetric link between a committed fiber and its
//! work-in-progress counterpart. Keys are generational, so a handle to a released
//! fiber resolves to nothing instead of to a recycled slot.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt::{self, Debug};

use slotmap::SlotMap;

use crate::element::{Component, Element, ElementType, Key, Node, Props};
use crate::hooks::{Effect, Hook};
use crate::update_queue::UpdateQueue;

slotmap::new_key_type! {
    /// Handle to a fiber.
    pub struct FiberId;

    /// Handle to a root record.
    pub struct RootId;
}

/// Kind of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    /// The top of a tree, owned by a root record.
    HostRoot,
    /// A host element.
    HostComponent,
    /// A host text node.
    HostText,
    /// A function component.
    FunctionComponent,
    /// A transparent group of children.
    Fragment,
}

bitflags::bitflags! {
    /// Pending work recorded on a fiber for the commit phase.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        /// The host node must be inserted or moved.
        const PLACEMENT = 1 << 0;
        /// The host node's props or text changed.
        const UPDATE = 1 << 1;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 2;
        /// A passive effect must run after commit.
        const PASSIVE = 1 << 3;
        /// A layout effect must run right after mutation.
        const LAYOUT = 1 << 4;

        /// Flags handled by the mutation walk.
        const MUTATION_MASK = Self::PLACEMENT.bits() | Self::UPDATE.bits() | Self::CHILD_DELETION.bits();
        /// Flags that mark effects to collect after mutation.
        const EFFECT_MASK = Self::PASSIVE.bits() | Self::LAYOUT.bits();
    }
}

/// What a fiber renders as.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FiberType {
    None,
    Host(Rc<str>),
    Component(Component),
}

impl FiberType {
    fn of(element: &Element) -> Self {
        match element.ty() {
            ElementType::Host(tag) => Self::Host(Rc::clone(tag)),
            ElementType::Component(component) => Self::Component(component.clone()),
            ElementType::Fragment => Self::None,
        }
    }

    /// Whether an element of this type can reuse a fiber of type `self`.
    pub(crate) fn matches(&self, element: &Element) -> bool {
        match (self, element.ty()) {
            (Self::Host(tag), ElementType::Host(other)) => tag == other,
            (Self::Component(component), ElementType::Component(other)) => component == other,
            _ => false,
        }
    }
}

/// Inputs of a fiber for one render.
#[derive(Debug, Clone, Default)]
pub(crate) enum FiberProps {
    #[default]
    None,
    Element(Rc<Props>),
    Text(Rc<str>),
    Fragment(Node),
}

impl FiberProps {
    pub(crate) fn element(&self) -> Option<&Rc<Props>> {
        match self {
            Self::Element(props) => Some(props),
            _ => None,
        }
    }

    pub(crate) fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(&**text),
            _ => None,
        }
    }
}

/// The object a fiber owns outside the tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StateNode<I> {
    None,
    Host(I),
    Root(RootId),
}

impl<I> StateNode<I> {
    pub(crate) const fn host(&self) -> Option<&I> {
        match self {
            Self::Host(instance) => Some(instance),
            _ => None,
        }
    }
}

/// State carried by a host root between renders.
#[derive(Debug, Clone, Default)]
pub(crate) struct RootState {
    pub element: Node,
}

/// Memoized state of a fiber.
#[derive(Default)]
pub(crate) enum MemoizedState {
    #[default]
    None,
    Root(RootState),
    Hooks(Vec<Hook>),
}

impl Clone for MemoizedState {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Root(state) => Self::Root(state.clone()),
            Self::Hooks(hooks) => Self::Hooks(hooks.iter().map(Hook::duplicate).collect()),
        }
    }
}

/// Queue attached to a fiber: the root's update queue, or a component's effects.
#[derive(Debug, Clone, Default)]
pub(crate) enum FiberQueue {
    #[default]
    None,
    Root(UpdateQueue<RootState>),
    Effects(Vec<Rc<Effect>>),
}

impl FiberQueue {
    pub(crate) fn effects(&self) -> &[Rc<Effect>] {
        match self {
            Self::Effects(effects) => effects.as_slice(),
            _ => &[],
        }
    }
}

pub(crate) struct Fiber<I> {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub ty: FiberType,
    pub state_node: StateNode<I>,

    pub return_: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: usize,

    pub pending_props: FiberProps,
    pub memoized_props: FiberProps,
    pub memoized_state: MemoizedState,
    pub update_queue: FiberQueue,

    pub flags: Flags,
    pub subtree_flags: Flags,
    pub deletions: Vec<FiberId>,

    pub alternate: Option<FiberId>,
}

impl<I> Fiber<I> {
    fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            ty: FiberType::None,
            state_node: StateNode::None,
            return_: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: FiberProps::None,
            memoized_state: MemoizedState::None,
            update_queue: FiberQueue::None,
            flags: Flags::empty(),
            subtree_flags: Flags::empty(),
            deletions: Vec::new(),
            alternate: None,
        }
    }

    pub(crate) fn component(&self) -> Option<&Component> {
        match &self.ty {
            FiberType::Component(component) => Some(component),
            _ => None,
        }
    }

    pub(crate) fn host_tag(&self) -> Option<&str> {
        match &self.ty {
            FiberType::Host(tag) => Some(&**tag),
            _ => None,
        }
    }

    pub(crate) const fn is_host(&self) -> bool {
        matches!(self.tag, WorkTag::HostComponent | WorkTag::HostText)
    }

    pub(crate) fn take_hooks(&mut self) -> Vec<Hook> {
        match core::mem::take(&mut self.memoized_state) {
            MemoizedState::Hooks(hooks) => hooks,
            other => {
                self.memoized_state = other;
                Vec::new()
            }
        }
    }
}

impl<I: Debug> Debug for Fiber<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("ty", &self.ty)
            .field("state_node", &self.state_node)
            .field("index", &self.index)
            .field("flags", &self.flags)
            .field("subtree_flags", &self.subtree_flags)
            .finish_non_exhaustive()
    }
}

/// Storage for every fiber of every root.
///
/// While a render is in progress the arena remembers which fibers it allocated, so
/// that an abandoned render can be released without touching the committed tree.
pub(crate) struct FiberArena<I> {
    fibers: SlotMap<FiberId, Fiber<I>>,
    fresh: Vec<FiberId>,
}

impl<I> Default for FiberArena<I> {
    fn default() -> Self {
        Self {
            fibers: SlotMap::with_key(),
            fresh: Vec::new(),
        }
    }
}

impl<I: Debug> Debug for FiberArena<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberArena")
            .field("len", &self.fibers.len())
            .field("fresh", &self.fresh.len())
            .finish()
    }
}

impl<I> core::ops::Index<FiberId> for FiberArena<I> {
    type Output = Fiber<I>;

    fn index(&self, id: FiberId) -> &Self::Output {
        &self.fibers[id]
    }
}

impl<I> core::ops::IndexMut<FiberId> for FiberArena<I> {
    fn index_mut(&mut self, id: FiberId) -> &mut Self::Output {
        &mut self.fibers[id]
    }
}

impl<I: Clone> FiberArena<I> {
    pub(crate) fn get(&self, id: FiberId) -> Option<&Fiber<I>> {
        self.fibers.get(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.len()
    }

    fn insert(&mut self, fiber: Fiber<I>) -> FiberId {
        let id = self.fibers.insert(fiber);
        self.fresh.push(id);
        id
    }

    /// Allocates a fiber with no links and no flags.
    pub(crate) fn create(&mut self, tag: WorkTag, props: FiberProps, key: Option<Key>) -> FiberId {
        self.insert(Fiber::new(tag, props, key))
    }

    /// Allocates the fiber for a host root. Root fibers are never released.
    pub(crate) fn create_host_root(&mut self, root: RootId) -> FiberId {
        let mut fiber = Fiber::new(WorkTag::HostRoot, FiberProps::None, None);
        fiber.state_node = StateNode::Root(root);
        fiber.memoized_state = MemoizedState::Root(RootState::default());
        fiber.update_queue = FiberQueue::Root(UpdateQueue::new(RootState::default()));
        self.fibers.insert(fiber)
    }

    pub(crate) fn create_from_element(&mut self, element: &Element) -> FiberId {
        let (tag, props) = match element.ty() {
            ElementType::Host(_) => (
                WorkTag::HostComponent,
                FiberProps::Element(Rc::clone(element.props())),
            ),
            ElementType::Component(_) => (
                WorkTag::FunctionComponent,
                FiberProps::Element(Rc::clone(element.props())),
            ),
            ElementType::Fragment => (
                WorkTag::Fragment,
                FiberProps::Fragment(element.props().children().clone()),
            ),
        };
        let id = self.create(tag, props, element.key().cloned());
        self[id].ty = FiberType::of(element);
        id
    }

    pub(crate) fn create_fragment(&mut self, children: Node, key: Option<Key>) -> FiberId {
        self.create(WorkTag::Fragment, FiberProps::Fragment(children), key)
    }

    pub(crate) fn create_text(&mut self, text: Rc<str>) -> FiberId {
        self.create(WorkTag::HostText, FiberProps::Text(text), None)
    }

    /// Returns the work-in-progress counterpart of `current`, primed for a new render.
    ///
    /// Reuses the existing alternate (clearing its flags and deletions) or allocates one
    /// and links both ways. Props, state, queue, child and sibling are copied from
    /// `current`; `current` itself only gains the alternate link.
    pub(crate) fn clone_for_work_in_progress(
        &mut self,
        current: FiberId,
        pending_props: FiberProps,
    ) -> FiberId {
        let source = &self.fibers[current];
        let memoized_props = source.memoized_props.clone();
        let memoized_state = source.memoized_state.clone();
        let update_queue = source.update_queue.clone();
        let (tag, key, ty, state_node) = (
            source.tag,
            source.key.clone(),
            source.ty.clone(),
            source.state_node.clone(),
        );
        let (child, sibling, index, existing) =
            (source.child, source.sibling, source.index, source.alternate);

        let wip = if let Some(alternate) = existing {
            let fiber = &mut self.fibers[alternate];
            fiber.pending_props = pending_props;
            fiber.flags = Flags::empty();
            fiber.subtree_flags = Flags::empty();
            fiber.deletions.clear();
            alternate
        } else {
            let mut fiber = Fiber::new(tag, pending_props, key);
            fiber.state_node = state_node;
            fiber.alternate = Some(current);
            let alternate = self.insert(fiber);
            self.fibers[current].alternate = Some(alternate);
            alternate
        };

        let fiber = &mut self.fibers[wip];
        fiber.ty = ty;
        fiber.memoized_props = memoized_props;
        fiber.memoized_state = memoized_state;
        fiber.update_queue = update_queue;
        fiber.child = child;
        fiber.sibling = sibling;
        fiber.index = index;
        wip
    }

    /// Iterates the children of `parent` in sibling order.
    pub(crate) fn children(&self, parent: FiberId) -> Children<'_, I> {
        Children {
            arena: self,
            next: self.fibers[parent].child,
        }
    }

    /// Collects `root` and every fiber below it, depth first.
    pub(crate) fn subtree(&self, root: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut child = self.fibers[id].child;
            let mut children = Vec::new();
            while let Some(c) = child {
                children.push(c);
                child = self.fibers[c].sibling;
            }
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Forgets which fibers the current render allocated; they are now committed.
    pub(crate) fn settle_fresh(&mut self) {
        self.fresh.clear();
    }

    /// Releases every fiber allocated by an abandoned render.
    pub(crate) fn discard_fresh(&mut self) -> usize {
        let fresh = core::mem::take(&mut self.fresh);
        let count = fresh.len();
        for id in fresh {
            if let Some(fiber) = self.fibers.remove(id) {
                if let Some(alternate) = fiber.alternate {
                    if let Some(other) = self.fibers.get_mut(alternate) {
                        if other.alternate == Some(id) {
                            other.alternate = None;
                        }
                    }
                }
            }
        }
        count
    }

    /// Releases a deleted subtree together with the alternates of its fibers.
    pub(crate) fn release_subtree(&mut self, root: FiberId) -> usize {
        let ids = self.subtree(root);
        let mut released = 0;
        for id in ids {
            if let Some(fiber) = self.fibers.remove(id) {
                released += 1;
                if let Some(alternate) = fiber.alternate {
                    if self.fibers.remove(alternate).is_some() {
                        released += 1;
                    }
                }
            }
        }
        released
    }
}

/// Iterator over the children of a fiber.
pub(crate) struct Children<'a, I> {
    arena: &'a FiberArena<I>,
    next: Option<FiberId>,
}

impl<I> Iterator for Children<'_, I> {
    type Item = FiberId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.arena.fibers[id].sibling;
        Some(id)
    }
}
