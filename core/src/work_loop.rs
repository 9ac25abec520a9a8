//! The work loop.
//!
//! [`Reconciler`] owns every fiber and root record and drives renders through two
//! phases. The render phase walks the work-in-progress tree depth first: `begin` runs
//! on the way down and `complete` on the way up. The commit phase applies the
//! recorded mutations to the host and makes the finished tree current.
//!
//! Synchronous work is flushed from a host microtask, so several updates issued in
//! the same tick share one render. Every other lane is handed to the [`Scheduler`];
//! such renders yield between fibers when the scheduler asks, and resume from the
//! preserved cursor on the next slice. A render for a different root or lane
//! discards the interrupted one.
//!
//! The engine state lives in a single `RefCell`. Updates dispatched while it is held
//! (from component bodies, for instance) are parked in a mailbox and scheduled as
//! soon as the engine is released.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt::{self, Debug};

use slotmap::SlotMap;

use crate::begin::{RenderContext, begin_work};
use crate::commit::{CommitOutcome, Committer};
use crate::complete::complete_work;
use crate::config::ReconcilerConfig;
use crate::element::Node;
use crate::error::ReconcileError;
use crate::fiber::{
    FiberArena, FiberId, FiberProps, FiberQueue, RootId, RootState, StateNode, WorkTag,
};
use crate::hooks::UpdateScheduler;
use crate::host::HostConfig;
use crate::lane::{Lane, Lanes};
use crate::root::{FiberRoot, RootHandle};
use crate::scheduler::{Priority, Scheduler, TaskId, TaskStatus};
use crate::update_queue::{Action, Update};

type ErrorSink = Box<dyn FnMut(&ReconcileError)>;

/// A fiber reconciler bound to one host.
///
/// Cloning yields another handle to the same engine.
pub struct Reconciler<H: HostConfig> {
    inner: Rc<Inner<H>>,
}

impl<H: HostConfig> Clone for Reconciler<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: HostConfig> Debug for Reconciler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.inner.config)
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> Reconciler<H> {
    /// Creates a reconciler with the default configuration.
    pub fn new<S: Scheduler + 'static>(host: H, scheduler: S) -> Self {
        Self::with_config(host, scheduler, ReconcilerConfig::default())
    }

    /// Creates a reconciler with an explicit configuration.
    pub fn with_config<S: Scheduler + 'static>(
        host: H,
        scheduler: S,
        config: ReconcilerConfig,
    ) -> Self {
        let scheduler: Rc<dyn Scheduler> = Rc::new(scheduler);
        let inner = Rc::new_cyclic(|this| Inner {
            this: Weak::clone(this),
            host,
            scheduler,
            config,
            state: RefCell::new(WorkState {
                arena: FiberArena::default(),
                roots: SlotMap::with_key(),
                pass: None,
            }),
            sync_queue: RefCell::new(Vec::new()),
            sync_flush_scheduled: Cell::new(false),
            flushing_sync: Cell::new(false),
            passive_task: Cell::new(None),
            deferred: RefCell::new(Vec::new()),
            update_lane: Cell::new(Lanes::NONE),
            error_sink: RefCell::new(Box::new(|error: &ReconcileError| {
                tracing::error!(error = %error, source = ?core::error::Error::source(error), "render failed");
            })),
        });
        Self { inner }
    }

    /// The host adapter.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// The configuration this reconciler was built with.
    #[must_use]
    pub fn config(&self) -> ReconcilerConfig {
        self.inner.config
    }

    /// Registers `container` as the root of a new tree.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Busy`] when called while rendering.
    pub fn create_container(&self, container: H::Instance) -> Result<RootHandle, ReconcileError> {
        let mut state = self.inner.state.try_borrow_mut().map_err(|_| ReconcileError::Busy)?;
        let WorkState { arena, roots, .. } = &mut *state;
        let id = roots.insert_with_key(|id| FiberRoot::new(container, arena.create_host_root(id)));
        tracing::debug!(root = ?id, "container created");
        Ok(RootHandle(id))
    }

    /// Schedules `node` to be rendered into `root` on the synchronous lane.
    ///
    /// The render happens when the host runs its microtasks, or on an explicit
    /// [`flush_sync_callbacks`](Self::flush_sync_callbacks).
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownRoot`] for a foreign handle and
    /// [`ReconcileError::Busy`] when called while rendering.
    pub fn update_container(
        &self,
        node: impl Into<Node>,
        root: RootHandle,
    ) -> Result<Lane, ReconcileError> {
        let inner = &self.inner;
        let mut state = inner.state.try_borrow_mut().map_err(|_| ReconcileError::Busy)?;
        let current = state
            .roots
            .get(root.0)
            .ok_or(ReconcileError::UnknownRoot)?
            .current;
        let lane = Lanes::SYNC;
        let FiberQueue::Root(queue) = &state.arena[current].update_queue else {
            tracing::error!(root = ?root.0, "host root without an update queue");
            return Err(ReconcileError::UnknownRoot);
        };
        queue.enqueue(Update::new(
            Action::Replace(RootState {
                element: node.into(),
            }),
            lane,
        ));
        inner.mark_root_updated(&mut state, root.0, lane);
        inner.ensure_root_scheduled(&mut state, root.0);
        Ok(lane)
    }

    /// Schedules the removal of everything rendered into `root`.
    ///
    /// # Errors
    ///
    /// See [`update_container`](Self::update_container).
    pub fn unmount_container(&self, root: RootHandle) -> Result<Lane, ReconcileError> {
        self.update_container(Node::Empty, root)
    }

    /// The host container of `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::UnknownRoot`] for a foreign handle and
    /// [`ReconcileError::Busy`] when called while rendering.
    pub fn container(&self, root: RootHandle) -> Result<H::Instance, ReconcileError> {
        let state = self.inner.state.try_borrow().map_err(|_| ReconcileError::Busy)?;
        state
            .roots
            .get(root.0)
            .map(|record| record.container.clone())
            .ok_or(ReconcileError::UnknownRoot)
    }

    /// Runs `f` so that every state update it dispatches lands on the synchronous
    /// lane. Use it for discrete input such as clicks.
    pub fn discrete_updates<R>(&self, f: impl FnOnce() -> R) -> R {
        self.with_update_lane(Lanes::SYNC, f)
    }

    /// Runs `f` so that every state update it dispatches lands on `lane`.
    pub fn with_update_lane<R>(&self, lane: Lane, f: impl FnOnce() -> R) -> R {
        self.inner.with_update_lane(lane, f)
    }

    /// Renders and commits every root with pending synchronous work.
    pub fn flush_sync_callbacks(&self) {
        self.inner.flush_sync_callbacks();
    }

    /// Runs pending passive effects now instead of in their scheduled callback.
    ///
    /// Returns whether any effect ran.
    pub fn flush_passive_effects(&self) -> bool {
        self.inner.flush_passive_effects()
    }

    /// Replaces the sink that receives render and commit errors.
    ///
    /// The default sink logs through `tracing`.
    pub fn on_error(&self, sink: impl FnMut(&ReconcileError) + 'static) {
        match self.inner.error_sink.try_borrow_mut() {
            Ok(mut slot) => *slot = Box::new(sink),
            Err(_) => tracing::warn!("error sink replaced while it was running; ignored"),
        }
    }

    /// Lanes with work left on `root`.
    #[must_use]
    pub fn pending_lanes(&self, root: RootHandle) -> Lanes {
        self.inner
            .state
            .try_borrow()
            .ok()
            .and_then(|state| state.roots.get(root.0).map(|record| record.pending_lanes))
            .unwrap_or(Lanes::NONE)
    }

    /// Number of fibers currently allocated, across every root.
    #[must_use]
    pub fn live_fibers(&self) -> usize {
        self.inner
            .state
            .try_borrow()
            .map(|state| state.arena.len())
            .unwrap_or_default()
    }
}

// ============================================================================
// Engine
// ============================================================================

struct WorkState<I> {
    arena: FiberArena<I>,
    roots: SlotMap<RootId, FiberRoot<I>>,
    pass: Option<RenderPass>,
}

/// The render in progress. Kept across yields so the walk can resume.
#[derive(Debug, Clone, Copy)]
struct RenderPass {
    root: RootId,
    lanes: Lanes,
    wip_root: FiberId,
    cursor: Option<FiberId>,
    /// Lanes updated on this root while the render was running or yielded.
    interleaved: Lanes,
    skipped: Lanes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderExit {
    Yielded,
    Completed,
}

struct Inner<H: HostConfig> {
    this: Weak<Self>,
    host: H,
    scheduler: Rc<dyn Scheduler>,
    config: ReconcilerConfig,
    state: RefCell<WorkState<H::Instance>>,
    sync_queue: RefCell<Vec<RootId>>,
    sync_flush_scheduled: Cell<bool>,
    flushing_sync: Cell<bool>,
    passive_task: Cell<Option<TaskId>>,
    deferred: RefCell<Vec<(FiberId, Lane)>>,
    update_lane: Cell<Lanes>,
    error_sink: RefCell<ErrorSink>,
}

impl<H: HostConfig> UpdateScheduler for Inner<H> {
    fn request_update_lane(&self) -> Lane {
        let lane = self.update_lane.get();
        if lane.is_empty() { Lanes::DEFAULT } else { lane }
    }

    fn schedule_update(&self, fiber: FiberId, lane: Lane) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            tracing::trace!(?fiber, ?lane, "engine busy; update parked");
            self.deferred.borrow_mut().push((fiber, lane));
            return;
        };
        let Some(root) = root_of(&state.arena, fiber) else {
            tracing::warn!(?fiber, "state update on an unmounted component; ignored");
            return;
        };
        tracing::debug!(?root, ?lane, "update scheduled");
        self.mark_root_updated(&mut state, root, lane);
        self.ensure_root_scheduled(&mut state, root);
    }
}

/// Finds the root that owns `fiber` by walking `return_` links.
fn root_of<I: Clone>(arena: &FiberArena<I>, fiber: FiberId) -> Option<RootId> {
    let mut id = fiber;
    loop {
        let fiber = arena.get(id)?;
        if let (WorkTag::HostRoot, StateNode::Root(root)) = (fiber.tag, &fiber.state_node) {
            return Some(*root);
        }
        id = fiber.return_?;
    }
}

impl<H: HostConfig> Inner<H> {
    fn update_scheduler(&self) -> Weak<dyn UpdateScheduler> {
        let this: Weak<Self> = Weak::clone(&self.this);
        this
    }

    fn with_update_lane<R>(&self, lane: Lane, f: impl FnOnce() -> R) -> R {
        let previous = self.update_lane.replace(lane);
        let result = f();
        self.update_lane.set(previous);
        result
    }

    fn report(&self, error: &ReconcileError) {
        match self.error_sink.try_borrow_mut() {
            Ok(mut sink) => (*sink)(error),
            Err(_) => tracing::error!(error = %error, "error raised inside the error sink"),
        }
    }

    fn mark_root_updated(&self, state: &mut WorkState<H::Instance>, root: RootId, lane: Lane) {
        if let Some(record) = state.roots.get_mut(root) {
            record.pending_lanes |= lane;
        }
        if let Some(pass) = state.pass.as_mut().filter(|pass| pass.root == root) {
            pass.interleaved |= lane;
        }
    }

    /// Schedules scheduled work on `root` for its most urgent pending lane. A
    /// callback already scheduled at that lane is kept, which is what batches
    /// updates together.
    fn ensure_root_scheduled(&self, state: &mut WorkState<H::Instance>, root_id: RootId) {
        let Some(root) = state.roots.get_mut(root_id) else {
            return;
        };
        let next = root.pending_lanes.highest_priority();
        if next.is_empty() {
            if let Some(task) = root.callback_node.take() {
                self.scheduler.cancel_callback(task);
            }
            root.callback_priority = Lanes::NONE;
            return;
        }
        if root.callback_priority == next {
            return;
        }
        if let Some(task) = root.callback_node.take() {
            tracing::debug!(root = ?root_id, ?task, "cancelling superseded render");
            self.scheduler.cancel_callback(task);
        }
        root.callback_priority = next;

        if next == Lanes::SYNC {
            self.schedule_sync_callback(root_id);
        } else {
            let this = Weak::clone(&self.this);
            let task = self.scheduler.schedule_callback(
                next.to_priority(),
                Box::new(move |did_timeout| {
                    this.upgrade().map_or(TaskStatus::Complete, |inner| {
                        inner.perform_concurrent_work_on_root(root_id, did_timeout)
                    })
                }),
            );
            tracing::debug!(root = ?root_id, lane = ?next, ?task, "render scheduled");
            root.callback_node = Some(task);
        }
    }

    fn reschedule(&self, root_id: RootId) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            self.ensure_root_scheduled(&mut state, root_id);
        }
    }

    fn schedule_sync_callback(&self, root_id: RootId) {
        {
            let mut queue = self.sync_queue.borrow_mut();
            if !queue.contains(&root_id) {
                queue.push(root_id);
            }
        }
        if !self.sync_flush_scheduled.replace(true) {
            let this = Weak::clone(&self.this);
            self.host.schedule_microtask(Box::new(move || {
                if let Some(inner) = this.upgrade() {
                    inner.flush_sync_callbacks();
                }
            }));
        }
    }

    fn flush_sync_callbacks(&self) {
        if self.flushing_sync.get() {
            return;
        }
        if self.state.try_borrow_mut().is_err() {
            tracing::debug!("sync flush requested while rendering; rescheduled");
            self.sync_flush_scheduled.set(false);
            let first = self.sync_queue.borrow().first().copied();
            if let Some(root) = first {
                self.schedule_sync_callback(root);
            }
            return;
        }
        self.flushing_sync.set(true);
        self.sync_flush_scheduled.set(false);

        let limit = self.config.max_nested_updates();
        let mut renders: BTreeMap<RootId, usize> = BTreeMap::new();
        loop {
            let next = {
                let mut queue = self.sync_queue.borrow_mut();
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            };
            let Some(root) = next else {
                break;
            };
            let count = renders.entry(root).or_default();
            *count += 1;
            if *count > limit {
                self.drop_sync_lane(root);
                self.report(&ReconcileError::NestedUpdateLimit { count: limit });
                continue;
            }
            self.perform_sync_work_on_root(root);
        }

        self.flushing_sync.set(false);
    }

    fn drop_sync_lane(&self, root_id: RootId) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        if let Some(root) = state.roots.get_mut(root_id) {
            root.pending_lanes.remove(Lanes::SYNC);
            if root.callback_priority == Lanes::SYNC {
                root.callback_priority = Lanes::NONE;
            }
        }
        self.ensure_root_scheduled(&mut state, root_id);
    }

    fn perform_sync_work_on_root(&self, root_id: RootId) {
        self.flush_passive_effects();
        let lanes = {
            let Ok(mut state) = self.state.try_borrow_mut() else {
                return;
            };
            let Some(root) = state.roots.get_mut(root_id) else {
                return;
            };
            let lanes = root.pending_lanes.highest_priority();
            if lanes != Lanes::SYNC {
                if root.callback_priority == Lanes::SYNC {
                    root.callback_priority = Lanes::NONE;
                }
                self.ensure_root_scheduled(&mut state, root_id);
                return;
            }
            lanes
        };
        self.work_on_root(root_id, lanes, false);
    }

    fn callback_node(&self, root_id: RootId) -> Option<TaskId> {
        self.state
            .try_borrow()
            .ok()
            .and_then(|state| state.roots.get(root_id).and_then(|root| root.callback_node))
    }

    fn perform_concurrent_work_on_root(&self, root_id: RootId, did_timeout: bool) -> TaskStatus {
        let original = self.callback_node(root_id);
        if self.flush_passive_effects() && self.callback_node(root_id) != original {
            return TaskStatus::Complete;
        }
        let lanes = {
            let Ok(state) = self.state.try_borrow() else {
                tracing::warn!(root = ?root_id, "render task ran while the engine was busy");
                return TaskStatus::Continue;
            };
            let Some(root) = state.roots.get(root_id) else {
                return TaskStatus::Complete;
            };
            root.pending_lanes.highest_priority()
        };
        if lanes.is_empty() {
            return TaskStatus::Complete;
        }

        let time_slice = self.config.is_time_slicing() && !did_timeout;
        self.work_on_root(root_id, lanes, time_slice);

        if original.is_some() && self.callback_node(root_id) == original {
            TaskStatus::Continue
        } else {
            TaskStatus::Complete
        }
    }

    /// Renders `root_id` for `lanes` and commits the result if the walk finished.
    fn work_on_root(&self, root_id: RootId, lanes: Lanes, time_slice: bool) -> RenderExit {
        let (exit, outcome, error) = {
            let Ok(mut state) = self.state.try_borrow_mut() else {
                return RenderExit::Yielded;
            };
            match self.render_root(&mut state, root_id, lanes, time_slice) {
                Ok(RenderExit::Yielded) => (RenderExit::Yielded, None, None),
                Ok(RenderExit::Completed) => {
                    (RenderExit::Completed, self.commit_root(&mut state, root_id), None)
                }
                Err(error) => {
                    self.abort_render(&mut state, root_id, lanes);
                    (RenderExit::Completed, None, Some(error))
                }
            }
        };

        if let Some(error) = error {
            self.report(&error);
        }
        if let Some(outcome) = outcome {
            self.finish_commit(outcome);
        }
        self.drain_deferred();
        if exit == RenderExit::Completed {
            self.reschedule(root_id);
        }
        exit
    }

    // ------------------------------------------------------------------------
    // Render phase
    // ------------------------------------------------------------------------

    fn prepare_fresh_stack(
        &self,
        state: &mut WorkState<H::Instance>,
        root_id: RootId,
        lanes: Lanes,
    ) -> Result<(), ReconcileError> {
        if let Some(previous) = state.pass.take() {
            let discarded = state.arena.discard_fresh();
            tracing::debug!(
                root = ?previous.root,
                lanes = ?previous.lanes,
                discarded,
                "discarding interrupted render"
            );
        }
        let root = state.roots.get_mut(root_id).ok_or(ReconcileError::UnknownRoot)?;
        root.finished_work = None;
        let current = root.current;
        let wip_root = state.arena.clone_for_work_in_progress(current, FiberProps::None);
        state.pass = Some(RenderPass {
            root: root_id,
            lanes,
            wip_root,
            cursor: Some(wip_root),
            interleaved: Lanes::NONE,
            skipped: Lanes::NONE,
        });
        tracing::debug!(root = ?root_id, ?lanes, "render started");
        Ok(())
    }

    fn render_root(
        &self,
        state: &mut WorkState<H::Instance>,
        root_id: RootId,
        lanes: Lanes,
        time_slice: bool,
    ) -> Result<RenderExit, ReconcileError> {
        let resumable = matches!(state.pass, Some(pass) if pass.root == root_id && pass.lanes == lanes);
        if !resumable {
            self.prepare_fresh_stack(state, root_id, lanes)?;
        }
        let Some(mut pass) = state.pass else {
            return Err(ReconcileError::UnknownRoot);
        };

        let scheduler = self.update_scheduler();
        let mut ctx = RenderContext {
            arena: &mut state.arena,
            lanes,
            scheduler: &scheduler,
            skipped: pass.skipped,
        };
        let mut result = Ok(());
        while let Some(unit) = pass.cursor {
            if time_slice && self.scheduler.should_yield() {
                break;
            }
            match perform_unit_of_work(&mut ctx, &self.host, unit, pass.wip_root) {
                Ok(next) => pass.cursor = next,
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        pass.skipped = ctx.skipped;
        state.pass = Some(pass);
        result?;

        if pass.cursor.is_some() {
            tracing::trace!(root = ?root_id, "render yielded");
            return Ok(RenderExit::Yielded);
        }
        let root = state.roots.get_mut(root_id).ok_or(ReconcileError::UnknownRoot)?;
        root.finished_work = Some(pass.wip_root);
        root.finished_lane = lanes;
        Ok(RenderExit::Completed)
    }

    fn abort_render(&self, state: &mut WorkState<H::Instance>, root_id: RootId, lanes: Lanes) {
        state.pass = None;
        let discarded = state.arena.discard_fresh();
        if let Some(root) = state.roots.get_mut(root_id) {
            root.pending_lanes.remove(lanes);
            root.finished_work = None;
            root.callback_node = None;
            root.callback_priority = Lanes::NONE;
        }
        tracing::debug!(root = ?root_id, ?lanes, discarded, "render aborted");
    }

    // ------------------------------------------------------------------------
    // Commit phase
    // ------------------------------------------------------------------------

    fn commit_root(
        &self,
        state: &mut WorkState<H::Instance>,
        root_id: RootId,
    ) -> Option<CommitOutcome> {
        let Some(root) = state.roots.get_mut(root_id) else {
            tracing::error!(root = ?root_id, "commit on an unknown root");
            return None;
        };
        let Some(finished) = root.finished_work.take() else {
            tracing::error!(root = ?root_id, "commit without a finished tree");
            return None;
        };
        let lanes = core::mem::replace(&mut root.finished_lane, Lanes::NONE);
        if lanes.is_empty() {
            tracing::error!(root = ?root_id, "commit of a tree rendered for no lane");
        }
        // Lanes skipped by the render, or updated while it was yielded, stay pending.
        let carry = state
            .pass
            .take()
            .map_or(Lanes::NONE, |pass| pass.skipped | pass.interleaved);
        root.pending_lanes = root.pending_lanes.difference(lanes) | carry;
        root.callback_node = None;
        root.callback_priority = Lanes::NONE;
        let container = root.container.clone();
        tracing::debug!(root = ?root_id, ?lanes, "commit");

        let mut outcome = Committer::new(&state.arena, &self.host, &container).commit(finished);

        if let Some(root) = state.roots.get_mut(root_id) {
            root.current = finished;
            root.pending_passive_unmounts.append(&mut outcome.passive_unmounts);
            root.pending_passive_mounts.append(&mut outcome.passive_mounts);
        }
        state.arena.settle_fresh();
        for deleted in outcome.deleted.drain(..) {
            let released = state.arena.release_subtree(deleted);
            tracing::trace!(fiber = ?deleted, released, "released deleted subtree");
        }
        Some(outcome)
    }

    /// Runs what a commit left for after the engine is released: layout effects, error
    /// reports and the passive flush callback.
    fn finish_commit(&self, outcome: CommitOutcome) {
        if !outcome.layout_destroys.is_empty() || !outcome.layout_creates.is_empty() {
            self.with_update_lane(Lanes::SYNC, || {
                for effect in &outcome.layout_destroys {
                    effect.run_destroy();
                }
                for effect in &outcome.layout_creates {
                    effect.run_create();
                }
            });
        }
        for error in &outcome.errors {
            self.report(error);
        }
        let has_passive = self
            .state
            .try_borrow()
            .map(|state| state.roots.values().any(FiberRoot::has_pending_passive_effects))
            .unwrap_or_default();
        if has_passive {
            self.schedule_passive_flush();
        }
    }

    fn schedule_passive_flush(&self) {
        if self.passive_task.get().is_some() {
            return;
        }
        let this = Weak::clone(&self.this);
        let task = self.scheduler.schedule_callback(
            Priority::Normal,
            Box::new(move |_| {
                if let Some(inner) = this.upgrade() {
                    inner.passive_task.set(None);
                    inner.flush_passive_effects();
                }
                TaskStatus::Complete
            }),
        );
        self.passive_task.set(Some(task));
    }

    /// Runs every pending passive destroy, then every pending create.
    fn flush_passive_effects(&self) -> bool {
        let (unmounts, mounts) = {
            let Ok(mut state) = self.state.try_borrow_mut() else {
                return false;
            };
            let mut unmounts = Vec::new();
            let mut mounts = Vec::new();
            for root in state.roots.values_mut() {
                unmounts.append(&mut root.pending_passive_unmounts);
                mounts.append(&mut root.pending_passive_mounts);
            }
            (unmounts, mounts)
        };
        if let Some(task) = self.passive_task.take() {
            self.scheduler.cancel_callback(task);
        }
        if unmounts.is_empty() && mounts.is_empty() {
            return false;
        }

        tracing::debug!(
            unmounts = unmounts.len(),
            mounts = mounts.len(),
            "flushing passive effects"
        );
        for effect in &unmounts {
            effect.run_destroy();
        }
        for effect in &mounts {
            effect.run_create();
        }
        self.drain_deferred();
        self.flush_sync_callbacks();
        true
    }

    /// Schedules the updates parked while the engine was busy.
    fn drain_deferred(&self) {
        if self.state.try_borrow_mut().is_err() {
            return;
        }
        loop {
            let parked = core::mem::take(&mut *self.deferred.borrow_mut());
            if parked.is_empty() {
                break;
            }
            for (fiber, lane) in parked {
                self.schedule_update(fiber, lane);
            }
        }
    }
}

fn perform_unit_of_work<H: HostConfig>(
    ctx: &mut RenderContext<'_, H::Instance>,
    host: &H,
    unit: FiberId,
    wip_root: FiberId,
) -> Result<Option<FiberId>, ReconcileError> {
    let next = begin_work(ctx, unit)?;
    let fiber = &mut ctx.arena[unit];
    fiber.memoized_props = fiber.pending_props.clone();
    if next.is_some() {
        return Ok(next);
    }

    let mut completed = unit;
    loop {
        complete_work(ctx.arena, host, completed)?;
        if completed == wip_root {
            return Ok(None);
        }
        let fiber = &ctx.arena[completed];
        if let Some(sibling) = fiber.sibling {
            return Ok(Some(sibling));
        }
        match fiber.return_ {
            Some(parent) => completed = parent,
            None => return Ok(None),
        }
    }
}
