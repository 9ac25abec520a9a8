//! The scheduler collaborator used for non-synchronous work.
//!
//! The reconciler never owns a timer or a priority queue. Low-priority renders and
//! passive effect flushes are handed to a [`Scheduler`], which decides when to run
//! them and tells a running render when its time slice is over.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::fmt::Debug;

/// Ordered scheduling priorities, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Must run before anything else.
    Immediate,
    /// Direct user interaction.
    UserBlocking,
    /// Regular updates and passive effects.
    Normal,
    /// Work that can be deferred, such as transitions.
    Low,
    /// Only when nothing else is pending.
    Idle,
}

/// Token identifying a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a token from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value of this token.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// What a task wants after it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task finished and can be dropped.
    Complete,
    /// The task yielded; call it again under the same token.
    Continue,
}

/// A scheduled unit of work. The argument reports whether the task's deadline passed.
pub type Task = Box<dyn FnMut(bool) -> TaskStatus>;

/// External scheduler used by the work loop.
///
/// Methods take `&self` because a running task may schedule or cancel other tasks.
pub trait Scheduler {
    /// Queues `task` at `priority` and returns its token.
    fn schedule_callback(&self, priority: Priority, task: Task) -> TaskId;

    /// Cancels a queued or running task. Unknown tokens are ignored.
    fn cancel_callback(&self, id: TaskId);

    /// Whether the current time slice is exhausted.
    fn should_yield(&self) -> bool;

    /// The task that would run next, if any.
    fn first_pending_callback(&self) -> Option<TaskId>;
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule_callback(&self, priority: Priority, task: Task) -> TaskId {
        self.as_ref().schedule_callback(priority, task)
    }

    fn cancel_callback(&self, id: TaskId) {
        self.as_ref().cancel_callback(id);
    }

    fn should_yield(&self) -> bool {
        self.as_ref().should_yield()
    }

    fn first_pending_callback(&self) -> Option<TaskId> {
        self.as_ref().first_pending_callback()
    }
}

impl Debug for dyn Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("dyn Scheduler")
    }
}
