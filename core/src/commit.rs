//! The commit phase.
//!
//! One depth-first walk over the finished tree applies deletions, placements and
//! updates to the host, skipping subtrees whose `subtree_flags` carry no mutation.
//! Host failures do not stop the walk: they are collected and reported once the
//! commit is done, so the host tree is never left half-committed by an early return.
//! Effects are only collected here; running them is up to the caller.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::error::ReconcileError;
use crate::fiber::{FiberArena, FiberId, FiberProps, Flags, WorkTag};
use crate::hooks::Effect;
use crate::host::{HostConfig, HostUpdate};

/// Work left over once host mutation is done.
#[derive(Debug, Default)]
pub(crate) struct CommitOutcome {
    pub layout_destroys: Vec<Rc<Effect>>,
    pub layout_creates: Vec<Rc<Effect>>,
    pub passive_unmounts: Vec<Rc<Effect>>,
    pub passive_mounts: Vec<Rc<Effect>>,
    /// Roots of deleted subtrees, to release from the arena.
    pub deleted: Vec<FiberId>,
    pub errors: Vec<ReconcileError>,
}

pub(crate) struct Committer<'a, H: HostConfig> {
    arena: &'a FiberArena<H::Instance>,
    host: &'a H,
    container: &'a H::Instance,
    outcome: CommitOutcome,
}

impl<'a, H: HostConfig> Committer<'a, H> {
    pub(crate) fn new(
        arena: &'a FiberArena<H::Instance>,
        host: &'a H,
        container: &'a H::Instance,
    ) -> Self {
        Self {
            arena,
            host,
            container,
            outcome: CommitOutcome::default(),
        }
    }

    /// Applies every recorded mutation below `finished` and collects its effects.
    pub(crate) fn commit(mut self, finished: FiberId) -> CommitOutcome {
        let fiber = &self.arena[finished];
        if (fiber.flags | fiber.subtree_flags).intersects(Flags::MUTATION_MASK) {
            self.commit_mutation_effects(finished);
        }
        self.collect_effects(finished);
        self.outcome
    }

    fn commit_mutation_effects(&mut self, id: FiberId) {
        let arena = self.arena;
        let fiber = &arena[id];
        if fiber.flags.contains(Flags::CHILD_DELETION) {
            for &deleted in &fiber.deletions {
                self.commit_deletion(id, deleted);
            }
        }
        if fiber.subtree_flags.intersects(Flags::MUTATION_MASK) {
            for child in arena.children(id) {
                self.commit_mutation_effects(child);
            }
        }
        if fiber.flags.contains(Flags::PLACEMENT) {
            self.commit_placement(id);
        }
        if fiber.flags.contains(Flags::UPDATE) {
            self.commit_update(id);
        }
    }

    fn record(&mut self, result: Result<(), H::Error>, operation: &'static str) {
        if let Err(source) = result {
            self.outcome.errors.push(ReconcileError::host(operation, source));
        }
    }

    // ------------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------------

    /// The host instance children of `id` are attached to: the nearest host element
    /// at or above `id`, or the root container.
    fn host_parent_from(&self, mut id: FiberId) -> Option<&'a H::Instance> {
        let arena = self.arena;
        loop {
            let fiber = &arena[id];
            match fiber.tag {
                WorkTag::HostComponent => return fiber.state_node.host(),
                WorkTag::HostRoot => return Some(self.container),
                _ => id = fiber.return_?,
            }
        }
    }

    /// The first committed host node after `id` in host order, if any.
    fn host_sibling(&self, id: FiberId) -> Option<&'a H::Instance> {
        let arena = self.arena;
        let mut node = id;
        'siblings: loop {
            while arena[node].sibling.is_none() {
                let parent = arena[node].return_?;
                if matches!(arena[parent].tag, WorkTag::HostComponent | WorkTag::HostRoot) {
                    return None;
                }
                node = parent;
            }
            node = arena[node].sibling?;
            while !arena[node].is_host() {
                if arena[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match arena[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            if !arena[node].flags.contains(Flags::PLACEMENT) {
                return arena[node].state_node.host();
            }
        }
    }

    fn commit_placement(&mut self, id: FiberId) {
        let parent = self.arena[id].return_.and_then(|parent| self.host_parent_from(parent));
        let Some(parent) = parent else {
            tracing::error!(fiber = ?id, "placed fiber has no host parent");
            return;
        };
        let before = self.host_sibling(id);
        tracing::trace!(fiber = ?id, before = before.is_some(), "placement");
        self.insert_or_append(id, before, parent);
    }

    fn insert_or_append(
        &mut self,
        id: FiberId,
        before: Option<&H::Instance>,
        parent: &H::Instance,
    ) {
        let arena = self.arena;
        let fiber = &arena[id];
        if let Some(instance) = fiber.state_node.host().filter(|_| fiber.is_host()) {
            let result = match before {
                Some(before) => self.host.insert_child_to_container(instance, parent, before),
                None => self.host.append_child_to_container(parent, instance),
            };
            self.record(result, "place_child");
            return;
        }
        for child in arena.children(id) {
            self.insert_or_append(child, before, parent);
        }
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    fn commit_update(&mut self, id: FiberId) {
        let arena = self.arena;
        let fiber = &arena[id];
        let Some(instance) = fiber.state_node.host() else {
            tracing::error!(fiber = ?id, "update flagged on a fiber without a host node");
            return;
        };
        let Some(current) = fiber.alternate.and_then(|alt| arena.get(alt)) else {
            tracing::error!(fiber = ?id, "update flagged on a fiber that never committed");
            return;
        };
        let update = match (&current.memoized_props, &fiber.memoized_props) {
            (FiberProps::Text(old), FiberProps::Text(new)) => HostUpdate::Text {
                old: &**old,
                new: &**new,
            },
            (FiberProps::Element(old), FiberProps::Element(new)) => HostUpdate::Props {
                ty: fiber.host_tag().unwrap_or_default(),
                old: &**old,
                new: &**new,
            },
            _ => {
                tracing::error!(fiber = ?id, "update flagged with mismatched props");
                return;
            }
        };
        let result = self.host.commit_update(instance, update);
        self.record(result, "commit_update");
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Detaches the deleted subtree: only its top-most host nodes are removed, and
    /// every effect below it is torn down.
    fn commit_deletion(&mut self, parent: FiberId, deleted: FiberId) {
        let Some(host_parent) = self.host_parent_from(parent) else {
            tracing::error!(fiber = ?deleted, "deleted fiber has no host parent");
            return;
        };
        tracing::trace!(fiber = ?deleted, "deletion");
        self.outcome.deleted.push(deleted);

        let arena = self.arena;
        // (fiber, inside an already removed host node)
        let mut stack = alloc::vec![(deleted, false)];
        while let Some((id, detached)) = stack.pop() {
            let fiber = &arena[id];
            let mut detached_below = detached;
            if fiber.is_host() {
                if !detached {
                    if let Some(instance) = fiber.state_node.host() {
                        let result = self.host.remove_child(instance, host_parent);
                        self.record(result, "remove_child");
                    }
                }
                detached_below = true;
            } else if fiber.tag == WorkTag::FunctionComponent {
                for effect in fiber.update_queue.effects() {
                    if effect.is_layout() {
                        self.outcome.layout_destroys.push(Rc::clone(effect));
                    } else if effect.is_passive() {
                        self.outcome.passive_unmounts.push(Rc::clone(effect));
                    }
                }
            }
            let start = stack.len();
            stack.extend(arena.children(id).map(|child| (child, detached_below)));
            stack[start..].reverse();
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    fn collect_effects(&mut self, root: FiberId) {
        let arena = self.arena;
        let mask = Flags::EFFECT_MASK;
        let mut stack = alloc::vec![root];
        while let Some(id) = stack.pop() {
            let fiber = &arena[id];
            if fiber.flags.intersects(mask) {
                for effect in fiber.update_queue.effects().iter().filter(|e| e.is_dirty()) {
                    if effect.is_layout() {
                        self.outcome.layout_destroys.push(Rc::clone(effect));
                        self.outcome.layout_creates.push(Rc::clone(effect));
                    } else if effect.is_passive() {
                        self.outcome.passive_unmounts.push(Rc::clone(effect));
                        self.outcome.passive_mounts.push(Rc::clone(effect));
                    }
                }
            }
            if fiber.subtree_flags.intersects(mask) {
                let start = stack.len();
                stack.extend(arena.children(id));
                stack[start..].reverse();
            }
        }
    }
}

