//! The complete phase: host instances and flag bubbling on the way up.

use alloc::vec::Vec;

use crate::error::ReconcileError;
use crate::fiber::{FiberArena, FiberId, FiberProps, Flags, StateNode, WorkTag};
use crate::host::HostConfig;

/// Finishes `wip` after all of its children completed.
///
/// A host fiber without a host instance gets one, with its already built host
/// descendants appended. A host fiber that already has one is flagged for update
/// when its text or attributes changed.
pub(crate) fn complete_work<H: HostConfig>(
    arena: &mut FiberArena<H::Instance>,
    host: &H,
    wip: FiberId,
) -> Result<(), ReconcileError> {
    let fiber = &arena[wip];
    let tag = fiber.tag;
    tracing::trace!(fiber = ?wip, ?tag, "complete");
    match tag {
        WorkTag::HostComponent => {
            if fiber.state_node.host().is_some() {
                if props_changed(arena, wip) {
                    arena[wip].flags |= Flags::UPDATE;
                }
            } else {
                let props = fiber.memoized_props.element().cloned().unwrap_or_default();
                let tag = fiber.host_tag().unwrap_or_default();
                let instance = host
                    .create_instance(tag, &props)
                    .map_err(|e| ReconcileError::host("create_instance", e))?;
                append_all_children(arena, host, &instance, wip)?;
                arena[wip].state_node = StateNode::Host(instance);
            }
        }
        WorkTag::HostText => {
            if fiber.state_node.host().is_some() {
                if props_changed(arena, wip) {
                    arena[wip].flags |= Flags::UPDATE;
                }
            } else {
                let content = fiber.memoized_props.text().unwrap_or_default();
                let instance = host
                    .create_text_instance(content)
                    .map_err(|e| ReconcileError::host("create_text_instance", e))?;
                arena[wip].state_node = StateNode::Host(instance);
            }
        }
        WorkTag::HostRoot | WorkTag::FunctionComponent | WorkTag::Fragment => {}
    }
    bubble_properties(arena, wip);
    Ok(())
}

fn props_changed<I: Clone>(arena: &FiberArena<I>, wip: FiberId) -> bool {
    let fiber = &arena[wip];
    let Some(current) = fiber.alternate.and_then(|id| arena.get(id)) else {
        return true;
    };
    match (&current.memoized_props, &fiber.memoized_props) {
        (FiberProps::Text(old), FiberProps::Text(new)) => old != new,
        (FiberProps::Element(old), FiberProps::Element(new)) => !old.same_attributes(new),
        _ => true,
    }
}

/// Appends the top-level host nodes below `wip` to `parent`, skipping through
/// components and fragments.
fn append_all_children<H: HostConfig>(
    arena: &FiberArena<H::Instance>,
    host: &H,
    parent: &H::Instance,
    wip: FiberId,
) -> Result<(), ReconcileError> {
    let mut stack: Vec<FiberId> = arena.children(wip).collect();
    stack.reverse();
    while let Some(id) = stack.pop() {
        let fiber = &arena[id];
        if let Some(instance) = fiber.state_node.host().filter(|_| fiber.is_host()) {
            host.append_initial_child(parent, instance)
                .map_err(|e| ReconcileError::host("append_initial_child", e))?;
        } else {
            let start = stack.len();
            stack.extend(arena.children(id));
            stack[start..].reverse();
        }
    }
    Ok(())
}

/// Folds the flags of the direct children into `subtree_flags` of `wip`.
pub(crate) fn bubble_properties<I: Clone>(arena: &mut FiberArena<I>, wip: FiberId) {
    let mut subtree = Flags::empty();
    let children: Vec<FiberId> = arena.children(wip).collect();
    for child in children {
        let fiber = &mut arena[child];
        subtree |= fiber.subtree_flags | fiber.flags;
        fiber.return_ = Some(wip);
    }
    arena[wip].subtree_flags |= subtree;
}
