//! The begin phase: per-tag work on the way down.

use alloc::rc::Weak;

use crate::child::ChildReconciler;
use crate::element::{Node, Props};
use crate::error::ReconcileError;
use crate::fiber::{FiberArena, FiberId, FiberProps, FiberQueue, MemoizedState, WorkTag};
use crate::hooks::{UpdateScheduler, render_with_hooks};
use crate::lane::Lanes;

/// Everything a unit of work needs besides the fiber itself.
pub(crate) struct RenderContext<'a, I> {
    pub arena: &'a mut FiberArena<I>,
    pub lanes: Lanes,
    pub scheduler: &'a Weak<dyn UpdateScheduler>,
    /// Lanes of updates left unprocessed by this render.
    pub skipped: Lanes,
}

/// Runs the per-tag logic for `wip` and reconciles its children.
///
/// Returns the first child to descend into, or `None` when the walk should complete
/// `wip` and move on.
pub(crate) fn begin_work<I: Clone>(
    ctx: &mut RenderContext<'_, I>,
    wip: FiberId,
) -> Result<Option<FiberId>, ReconcileError> {
    let tag = ctx.arena[wip].tag;
    tracing::trace!(fiber = ?wip, ?tag, "begin");
    let children = match tag {
        WorkTag::HostRoot => update_host_root(ctx, wip),
        WorkTag::HostComponent => ctx.arena[wip]
            .pending_props
            .element()
            .map(|props| props.children().clone())
            .unwrap_or_default(),
        WorkTag::HostText => return Ok(None),
        WorkTag::FunctionComponent => {
            let (children, skipped) = render_with_hooks(ctx.arena, wip, ctx.lanes, ctx.scheduler)?;
            ctx.skipped |= skipped;
            children
        }
        WorkTag::Fragment => match &ctx.arena[wip].pending_props {
            FiberProps::Fragment(children) => children.clone(),
            _ => Node::Empty,
        },
    };
    Ok(reconcile_children(ctx.arena, wip, &children))
}

fn update_host_root<I: Clone>(ctx: &mut RenderContext<'_, I>, wip: FiberId) -> Node {
    let Some(current) = ctx.arena[wip].alternate else {
        tracing::error!(fiber = ?wip, "host root rendered without a committed counterpart");
        return Node::Empty;
    };
    let mut queue = core::mem::take(&mut ctx.arena[wip].update_queue);
    let mut current_queue = core::mem::take(&mut ctx.arena[current].update_queue);

    let element = match (&mut queue, &mut current_queue) {
        (FiberQueue::Root(queue), FiberQueue::Root(current_queue)) => {
            let processed = queue.process(Some(current_queue), &Props::new(), ctx.lanes);
            ctx.skipped |= processed.skipped;
            let element = processed.state.element.clone();
            ctx.arena[wip].memoized_state = MemoizedState::Root(processed.state);
            element
        }
        _ => {
            tracing::error!(fiber = ?wip, "host root without an update queue");
            Node::Empty
        }
    };

    ctx.arena[wip].update_queue = queue;
    ctx.arena[current].update_queue = current_queue;
    element
}

/// Reconciles `children` under `wip`. Effects are tracked unless `wip` is mounting.
fn reconcile_children<I: Clone>(
    arena: &mut FiberArena<I>,
    wip: FiberId,
    children: &Node,
) -> Option<FiberId> {
    let current = arena[wip].alternate;
    let current_first = current.and_then(|current| arena[current].child);
    let first = ChildReconciler::new(arena, current.is_some()).reconcile(wip, current_first, children);
    arena[wip].child = first;
    first
}
