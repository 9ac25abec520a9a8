//! A deterministic scheduler driven by hand.
//!
//! Nothing runs until the owner calls [`ManualScheduler::run_next`] or
//! [`ManualScheduler::run_until_idle`]. Time is measured in work units: every
//! `should_yield` call spends one unit of the running task's slice.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use eddy_core::{Priority, Scheduler, Task, TaskId, TaskStatus};

/// Upper bound on task runs in one [`ManualScheduler::run_until_idle`] call.
const RUN_LIMIT: usize = 10_000;

/// Something that happened inside a [`ManualScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task was queued.
    Scheduled {
        /// Its token.
        id: TaskId,
        /// Its priority.
        priority: Priority,
    },
    /// A queued or running task was cancelled.
    Cancelled {
        /// Its token.
        id: TaskId,
    },
    /// A task ran to completion.
    Completed {
        /// Its token.
        id: TaskId,
    },
    /// A task returned [`TaskStatus::Continue`] and stays queued.
    Yielded {
        /// Its token.
        id: TaskId,
    },
}

#[derive(Default)]
struct State {
    queue: RefCell<BTreeMap<(Priority, TaskId), Task>>,
    next_id: Cell<u64>,
    running: Cell<Option<TaskId>>,
    running_cancelled: Cell<bool>,
    budget: Cell<Option<usize>>,
    spent: Cell<usize>,
    timed_out: Cell<bool>,
    log: RefCell<Vec<SchedulerEvent>>,
}

/// A [`Scheduler`] that only runs tasks when told to.
///
/// Tasks run in priority order, then in the order they were scheduled. A task that
/// yields keeps its place. Clones share the same queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<State>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .field("running", &self.state.running.get())
            .field("budget", &self.state.budget.get())
            .finish_non_exhaustive()
    }
}

impl ManualScheduler {
    /// Creates a scheduler whose tasks never have to yield.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler that grants `units` of work per slice.
    #[must_use]
    pub fn with_budget(units: usize) -> Self {
        let scheduler = Self::new();
        scheduler.set_budget(Some(units));
        scheduler
    }

    /// Sets the work units granted per slice, at least one. `None` never yields.
    pub fn set_budget(&self, units: Option<usize>) {
        self.state.budget.set(units.map(|units| units.max(1)));
    }

    /// Reports the deadline of every task as passed until reset.
    pub fn set_timed_out(&self, timed_out: bool) {
        self.state.timed_out.set(timed_out);
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.queue.borrow().len()
    }

    /// Priority of the task that would run next.
    #[must_use]
    pub fn next_priority(&self) -> Option<Priority> {
        self.state
            .queue
            .borrow()
            .first_key_value()
            .map(|((priority, _), _)| *priority)
    }

    /// Runs the most urgent task for one slice. Returns `false` when the queue is empty.
    pub fn run_next(&self) -> bool {
        let next = self.state.queue.borrow_mut().pop_first();
        let Some(((priority, id), mut task)) = next else {
            return false;
        };
        self.state.running.set(Some(id));
        self.state.running_cancelled.set(false);
        self.state.spent.set(0);
        tracing::trace!(task = id.raw(), ?priority, "running task");

        let status = task(self.state.timed_out.get());

        self.state.running.set(None);
        if self.state.running_cancelled.get() {
            return true;
        }
        match status {
            TaskStatus::Continue => {
                self.state.queue.borrow_mut().insert((priority, id), task);
                self.record(SchedulerEvent::Yielded { id });
            }
            TaskStatus::Complete => self.record(SchedulerEvent::Completed { id }),
        }
        true
    }

    /// Runs tasks until the queue is empty and returns how many slices ran.
    ///
    /// Stops early after a large number of slices so a task that never makes
    /// progress cannot hang the caller.
    pub fn run_until_idle(&self) -> usize {
        let mut runs = 0;
        while runs < RUN_LIMIT && self.run_next() {
            runs += 1;
        }
        if runs == RUN_LIMIT {
            tracing::warn!(runs, "scheduler still busy after the run limit");
        }
        runs
    }

    /// Returns and clears the event log.
    pub fn take_log(&self) -> Vec<SchedulerEvent> {
        core::mem::take(&mut *self.state.log.borrow_mut())
    }

    fn record(&self, event: SchedulerEvent) {
        self.state.log.borrow_mut().push(event);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_callback(&self, priority: Priority, task: Task) -> TaskId {
        let id = TaskId::new(self.state.next_id.get());
        self.state.next_id.set(id.raw() + 1);
        self.state.queue.borrow_mut().insert((priority, id), task);
        self.record(SchedulerEvent::Scheduled { id, priority });
        id
    }

    fn cancel_callback(&self, id: TaskId) {
        if self.state.running.get() == Some(id) {
            self.state.running_cancelled.set(true);
        } else {
            let before = self.pending();
            self.state.queue.borrow_mut().retain(|(_, task), _| *task != id);
            if self.pending() == before {
                return;
            }
        }
        self.record(SchedulerEvent::Cancelled { id });
    }

    fn should_yield(&self) -> bool {
        let spent = self.state.spent.get() + 1;
        self.state.spent.set(spent);
        self.state.budget.get().is_some_and(|budget| spent > budget)
    }

    fn first_pending_callback(&self) -> Option<TaskId> {
        self.state
            .queue
            .borrow()
            .first_key_value()
            .map(|((_, id), _)| *id)
    }
}
