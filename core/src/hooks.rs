//! Hook state engine.
//!
//! A function component receives a [`Hooks`] value for the duration of one render.
//! Hook calls are matched to the records of the previous render by call order only,
//! so they must be unconditional. A call that cannot be matched (a different kind,
//! or more or fewer calls than before) fails the render with a [`HookError`].
//!
//! The mount/update split is an explicit branch on whether the fiber has a committed
//! counterpart: the first render allocates records, later renders clone and advance
//! the previous ones.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;
use core::fmt::{self, Debug};

use crate::element::{Node, PropValue, Props};
use crate::error::{HookError, ReconcileError};
use crate::fiber::{FiberArena, FiberId, FiberQueue, Flags, MemoizedState};
use crate::lane::{Lane, Lanes};
use crate::update_queue::{Action, SharedQueue, Update, UpdateQueue};

/// Cleanup returned by an effect.
pub type Destroy = Box<dyn FnOnce()>;

type Create = Box<dyn FnOnce() -> Option<Destroy>>;

/// Dependency list of an effect. Entries are compared with [`PropValue`] equality.
pub type Deps = Vec<PropValue>;

/// Receiver for updates dispatched from outside the render phase.
pub(crate) trait UpdateScheduler {
    /// Lane for an update issued right now.
    fn request_update_lane(&self) -> Lane;

    /// Marks `lane` pending on the root that owns `fiber` and schedules it.
    fn schedule_update(&self, fiber: FiberId, lane: Lane);
}

// ============================================================================
// Effects
// ============================================================================

bitflags::bitflags! {
    /// Tag bits of an effect descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct EffectTag: u8 {
        /// The effect must run in this commit.
        const HAS_EFFECT = 1 << 0;
        /// Runs synchronously after host mutation.
        const LAYOUT = 1 << 1;
        /// Runs in the scheduled passive flush.
        const PASSIVE = 1 << 2;
    }
}

/// The part of an effect that outlives a single render: its pending cleanup.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Destroy>>,
}

/// One effect call of one render.
pub(crate) struct Effect {
    tag: EffectTag,
    create: RefCell<Option<Create>>,
    deps: Option<Deps>,
    inst: Rc<EffectInstance>,
}

impl Effect {
    pub(crate) const fn is_dirty(&self) -> bool {
        self.tag.contains(EffectTag::HAS_EFFECT)
    }

    pub(crate) const fn is_passive(&self) -> bool {
        self.tag.contains(EffectTag::PASSIVE)
    }

    pub(crate) const fn is_layout(&self) -> bool {
        self.tag.contains(EffectTag::LAYOUT)
    }

    /// Runs the create callback and stores the cleanup it returns.
    pub(crate) fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let destroy = create();
            *self.inst.destroy.borrow_mut() = destroy;
        }
    }

    /// Runs the pending cleanup, if any. A cleanup runs at most once.
    pub(crate) fn run_destroy(&self) {
        let destroy = self.inst.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("tag", &self.tag)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Hook records
// ============================================================================

pub(crate) trait StateSlot: Any {
    fn duplicate(&self) -> Box<dyn StateSlot>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct StateHook<S> {
    memoized: S,
    queue: UpdateQueue<S>,
}

impl<S: Clone + 'static> StateSlot for StateHook<S> {
    fn duplicate(&self) -> Box<dyn StateSlot> {
        Box::new(Self {
            memoized: self.memoized.clone(),
            queue: self.queue.clone(),
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-call-site state of a component.
pub(crate) enum Hook {
    State(Box<dyn StateSlot>),
    Effect(Rc<Effect>),
}

impl Hook {
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::State(slot) => Self::State(slot.duplicate()),
            Self::Effect(effect) => Self::Effect(Rc::clone(effect)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Effect(effect) if effect.is_layout() => "layout effect",
            Self::Effect(_) => "effect",
        }
    }
}

impl Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Setter returned by [`Hooks::use_state`].
///
/// Bound to the fiber and queue of one hook. Updates are stamped with the lane of the
/// context they are issued in and scheduled on the owning root. After the component
/// unmounts, updates are dropped.
pub struct SetState<S> {
    fiber: FiberId,
    queue: SharedQueue<S>,
    scheduler: Weak<dyn UpdateScheduler>,
}

impl<S> Clone for SetState<S> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber,
            queue: self.queue.clone(),
            scheduler: Weak::clone(&self.scheduler),
        }
    }
}

impl<S> Debug for SetState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState")
            .field("fiber", &self.fiber)
            .finish_non_exhaustive()
    }
}

impl<S: Clone + 'static> SetState<S> {
    /// Replaces the state.
    pub fn set(&self, value: S) {
        self.dispatch(Action::Replace(value));
    }

    /// Computes the next state from the previous one.
    pub fn update(&self, f: impl Fn(&S) -> S + 'static) {
        self.dispatch(Action::reduce(f));
    }

    /// Enqueues an arbitrary action.
    pub fn dispatch(&self, action: Action<S>) {
        let Some(scheduler) = self.scheduler.upgrade() else {
            tracing::debug!(fiber = ?self.fiber, "state update after the reconciler was dropped");
            return;
        };
        let lane = scheduler.request_update_lane();
        self.queue.enqueue(Update::new(action, lane));
        scheduler.schedule_update(self.fiber, lane);
    }
}

// ============================================================================
// Render context
// ============================================================================

enum Slot<'h> {
    Mount,
    Previous(&'h mut Hook),
    Missing,
}

/// Hook context of one component render.
pub struct Hooks<'a> {
    fiber: FiberId,
    component: &'static str,
    props: Rc<Props>,
    render_lanes: Lanes,
    scheduler: Weak<dyn UpdateScheduler>,
    previous: Option<&'a mut Vec<Hook>>,
    cursor: usize,
    hooks: Vec<Hook>,
    effects: Vec<Rc<Effect>>,
    flags: Flags,
    skipped: Lanes,
    violation: Option<HookError>,
}

impl Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("component", &self.component)
            .field("cursor", &self.cursor)
            .field("mounting", &self.previous.is_none())
            .finish_non_exhaustive()
    }
}

pub(crate) struct RenderedHooks {
    hooks: Vec<Hook>,
    effects: Vec<Rc<Effect>>,
    flags: Flags,
    skipped: Lanes,
    violation: Option<HookError>,
}

impl<'a> Hooks<'a> {
    fn new(
        fiber: FiberId,
        component: &'static str,
        props: Rc<Props>,
        render_lanes: Lanes,
        scheduler: Weak<dyn UpdateScheduler>,
        previous: Option<&'a mut Vec<Hook>>,
    ) -> Self {
        Self {
            fiber,
            component,
            props,
            render_lanes,
            scheduler,
            previous,
            cursor: 0,
            hooks: Vec::new(),
            effects: Vec::new(),
            flags: Flags::empty(),
            skipped: Lanes::NONE,
            violation: None,
        }
    }

    /// Name of the component being rendered.
    #[must_use]
    pub const fn component_name(&self) -> &'static str {
        self.component
    }

    /// Whether this is the first render of the component.
    #[must_use]
    pub const fn is_mounting(&self) -> bool {
        self.previous.is_none()
    }

    /// Declares a state cell initialised with `initial`.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the call does not line up with the previous render.
    pub fn use_state<S: Clone + 'static>(
        &mut self,
        initial: S,
    ) -> Result<(S, SetState<S>), HookError> {
        self.use_state_with(move || initial)
    }

    /// Declares a state cell initialised by `init` on the first render.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the call does not line up with the previous render.
    pub fn use_state_with<S, F>(&mut self, init: F) -> Result<(S, SetState<S>), HookError>
    where
        S: Clone + 'static,
        F: FnOnce() -> S,
    {
        let index = self.advance()?;
        let (value, queue) = match Self::slot(&mut self.previous, index) {
            Slot::Mount => {
                let value = init();
                (value.clone(), UpdateQueue::new(value))
            }
            Slot::Previous(Hook::State(slot)) => {
                let Some(previous) = slot.as_any_mut().downcast_mut::<StateHook<S>>() else {
                    return Err(self.fail(HookError::KindMismatch {
                        index,
                        expected: "state of another type",
                        found: "state",
                    }));
                };
                let mut queue = previous.queue.clone();
                let processed =
                    queue.process(Some(&mut previous.queue), &self.props, self.render_lanes);
                self.skipped |= processed.skipped;
                (processed.state, queue)
            }
            Slot::Previous(hook) => {
                let expected = hook.kind();
                return Err(self.fail(HookError::KindMismatch {
                    index,
                    expected,
                    found: "state",
                }));
            }
            Slot::Missing => return Err(self.fail(HookError::MoreHooks { index })),
        };

        let setter = SetState {
            fiber: self.fiber,
            queue: queue.shared(),
            scheduler: Weak::clone(&self.scheduler),
        };
        self.hooks.push(Hook::State(Box::new(StateHook {
            memoized: value.clone(),
            queue,
        })));
        Ok((value, setter))
    }

    /// Declares a passive effect, run after the commit in a scheduled flush.
    ///
    /// With `Some(deps)` the effect only re-runs when an entry changed; with `None` it
    /// runs after every commit.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the call does not line up with the previous render.
    pub fn use_effect<F>(&mut self, deps: Option<Deps>, create: F) -> Result<(), HookError>
    where
        F: FnOnce() -> Option<Destroy> + 'static,
    {
        self.push_effect(EffectTag::PASSIVE, deps, Box::new(create))
    }

    /// Declares a layout effect, run synchronously right after host mutation.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the call does not line up with the previous render.
    pub fn use_layout_effect<F>(&mut self, deps: Option<Deps>, create: F) -> Result<(), HookError>
    where
        F: FnOnce() -> Option<Destroy> + 'static,
    {
        self.push_effect(EffectTag::LAYOUT, deps, Box::new(create))
    }

    fn push_effect(
        &mut self,
        kind: EffectTag,
        deps: Option<Deps>,
        create: Create,
    ) -> Result<(), HookError> {
        let index = self.advance()?;
        let found = if kind.contains(EffectTag::LAYOUT) {
            "layout effect"
        } else {
            "effect"
        };
        let (tag, inst) = match Self::slot(&mut self.previous, index) {
            Slot::Mount => (kind | EffectTag::HAS_EFFECT, Rc::default()),
            Slot::Previous(Hook::Effect(previous)) if previous.tag.intersects(kind) => {
                let unchanged = matches!(
                    (&deps, &previous.deps),
                    (Some(next), Some(prev)) if next == prev
                );
                let tag = if unchanged {
                    kind
                } else {
                    kind | EffectTag::HAS_EFFECT
                };
                (tag, Rc::clone(&previous.inst))
            }
            Slot::Previous(hook) => {
                let expected = hook.kind();
                return Err(self.fail(HookError::KindMismatch {
                    index,
                    expected,
                    found,
                }));
            }
            Slot::Missing => return Err(self.fail(HookError::MoreHooks { index })),
        };

        if tag.contains(EffectTag::HAS_EFFECT) {
            self.flags |= if kind.contains(EffectTag::LAYOUT) {
                Flags::LAYOUT
            } else {
                Flags::PASSIVE
            };
        }
        let effect = Rc::new(Effect {
            tag,
            create: RefCell::new(Some(create)),
            deps,
            inst,
        });
        self.effects.push(Rc::clone(&effect));
        self.hooks.push(Hook::Effect(effect));
        Ok(())
    }

    fn advance(&mut self) -> Result<usize, HookError> {
        if let Some(violation) = &self.violation {
            return Err(violation.clone());
        }
        let index = self.cursor;
        self.cursor += 1;
        Ok(index)
    }

    fn slot<'h>(previous: &'h mut Option<&'a mut Vec<Hook>>, index: usize) -> Slot<'h> {
        match previous.as_deref_mut() {
            None => Slot::Mount,
            Some(previous) => previous.get_mut(index).map_or(Slot::Missing, Slot::Previous),
        }
    }

    fn fail(&mut self, error: HookError) -> HookError {
        self.violation.get_or_insert(error).clone()
    }

    fn finish(self) -> RenderedHooks {
        let mut violation = self.violation;
        if violation.is_none() {
            if let Some(previous) = &self.previous {
                if self.cursor < previous.len() {
                    violation = Some(HookError::FewerHooks {
                        expected: previous.len(),
                        found: self.cursor,
                    });
                }
            }
        }
        RenderedHooks {
            hooks: self.hooks,
            effects: self.effects,
            flags: self.flags,
            skipped: self.skipped,
            violation,
        }
    }
}

/// Runs the component of `wip` with a fresh hook context. Returns its children and
/// the lanes of state updates it had to skip.
///
/// Hook records are matched against the committed counterpart, whose records are
/// only borrowed for the call and stay in place, so an abandoned render leaves the
/// committed state intact.
pub(crate) fn render_with_hooks<I: Clone>(
    arena: &mut FiberArena<I>,
    wip: FiberId,
    render_lanes: Lanes,
    scheduler: &Weak<dyn UpdateScheduler>,
) -> Result<(Node, Lanes), ReconcileError> {
    let fiber = &arena[wip];
    let Some(component) = fiber.component().cloned() else {
        tracing::warn!(fiber = ?wip, "function fiber without a component renders nothing");
        return Ok((Node::Empty, Lanes::NONE));
    };
    let props = fiber.pending_props.element().cloned().unwrap_or_default();
    let current = fiber.alternate;
    let mut previous = current.map(|id| arena[id].take_hooks());

    // Setters address the committed fiber when there is one: a work-in-progress
    // fiber allocated by this render is released if the render is abandoned.
    let mut hooks = Hooks::new(
        current.unwrap_or(wip),
        component.name(),
        Rc::clone(&props),
        render_lanes,
        Weak::clone(scheduler),
        previous.as_mut(),
    );
    let result = component.render(&mut hooks, &props);
    let rendered = hooks.finish();

    if let (Some(id), Some(previous)) = (current, previous) {
        arena[id].memoized_state = MemoizedState::Hooks(previous);
    }
    if let Some(source) = rendered.violation {
        return Err(ReconcileError::HookOrder {
            component: component.name(),
            source,
        });
    }
    let children = result.map_err(|source| ReconcileError::Component {
        component: component.name(),
        source,
    })?;

    if !rendered.skipped.is_empty() {
        tracing::trace!(
            component = component.name(),
            skipped = ?rendered.skipped,
            "deferred state updates outside the render lanes"
        );
    }
    let fiber = &mut arena[wip];
    fiber.memoized_state = MemoizedState::Hooks(rendered.hooks);
    fiber.update_queue = FiberQueue::Effects(rendered.effects);
    fiber.flags |= rendered.flags;
    Ok((children, rendered.skipped))
}
