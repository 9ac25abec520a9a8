//! One mounted root wired to a [`MemoryHost`] and a [`ManualScheduler`].

use core::error::Error;
use std::cell::RefCell;
use std::rc::Rc;

use eddy_core::{Node, ReconcileError, Reconciler, ReconcilerConfig, RootHandle};

use crate::host::{MemoryHost, NodeId};
use crate::scheduler::ManualScheduler;

/// An error handed to the reconciler's error sink, flattened to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    /// The error's own message.
    pub message: String,
    /// Message of its source, if any.
    pub source: Option<String>,
    /// The component involved, if any.
    pub component: Option<&'static str>,
}

impl CapturedError {
    fn new(error: &ReconcileError) -> Self {
        Self {
            message: error.to_string(),
            source: error.source().map(ToString::to_string),
            component: error.component(),
        }
    }
}

/// A test fixture: a document, a scheduler and a reconciler with one root.
///
/// Errors reported by the reconciler are captured instead of logged.
#[derive(Debug)]
pub struct TestRoot {
    host: MemoryHost,
    scheduler: ManualScheduler,
    reconciler: Reconciler<MemoryHost>,
    container: NodeId,
    root: RootHandle,
    errors: Rc<RefCell<Vec<CapturedError>>>,
}

impl TestRoot {
    /// Creates a fixture with the default configuration.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be created.
    pub fn new() -> Result<Self, ReconcileError> {
        Self::with_config(ReconcilerConfig::default())
    }

    /// Creates a fixture with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be created.
    pub fn with_config(config: ReconcilerConfig) -> Result<Self, ReconcileError> {
        Self::with_scheduler(ManualScheduler::new(), config)
    }

    /// Creates a fixture around an existing scheduler, for instance one with a budget.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be created.
    pub fn with_scheduler(
        scheduler: ManualScheduler,
        config: ReconcilerConfig,
    ) -> Result<Self, ReconcileError> {
        let host = MemoryHost::new();
        let container = host.create_container("root");
        let reconciler = Reconciler::with_config(host.clone(), scheduler.clone(), config);
        let root = reconciler.create_container(container)?;

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        reconciler.on_error(move |error| sink.borrow_mut().push(CapturedError::new(error)));

        Ok(Self {
            host,
            scheduler,
            reconciler,
            container,
            root,
            errors,
        })
    }

    /// Schedules `node` into the root without running anything.
    ///
    /// # Errors
    ///
    /// Fails when the reconciler is busy.
    pub fn schedule(&self, node: impl Into<Node>) -> Result<(), ReconcileError> {
        self.reconciler.update_container(node, self.root)?;
        Ok(())
    }

    /// Renders `node` into the root and runs all resulting work.
    ///
    /// # Errors
    ///
    /// Fails when the reconciler is busy.
    pub fn render(&self, node: impl Into<Node>) -> Result<(), ReconcileError> {
        self.schedule(node)?;
        self.flush();
        Ok(())
    }

    /// Unmounts everything under the root and runs all resulting work.
    ///
    /// # Errors
    ///
    /// Fails when the reconciler is busy.
    pub fn unmount(&self) -> Result<(), ReconcileError> {
        self.reconciler.unmount_container(self.root)?;
        self.flush();
        Ok(())
    }

    /// Runs microtasks and scheduler tasks until both queues are empty.
    pub fn flush(&self) {
        loop {
            let microtasks = self.host.flush_microtasks();
            let tasks = self.scheduler.run_until_idle();
            if microtasks == 0 && tasks == 0 {
                break;
            }
        }
    }

    /// Runs microtasks only, which performs synchronous renders but leaves
    /// scheduled work such as passive effects queued.
    pub fn flush_microtasks(&self) -> usize {
        self.host.flush_microtasks()
    }

    /// Dispatches `event` on `target` as discrete input, then runs microtasks.
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, target: NodeId, event: &str) -> usize {
        let invoked = self
            .reconciler
            .discrete_updates(|| self.host.dispatch_event(target, event));
        self.host.flush_microtasks();
        invoked
    }

    /// Clicks `target`. See [`dispatch`](Self::dispatch).
    pub fn click(&self, target: NodeId) -> usize {
        self.dispatch(target, "click")
    }

    /// Clicks the first element whose attribute `name` equals `value`.
    /// Returns `None` when no element matches.
    pub fn click_by_attr(&self, name: &str, value: &str) -> Option<usize> {
        let target = self.find(name, value)?;
        Some(self.click(target))
    }

    /// First element under the container whose attribute `name` equals `value`.
    #[must_use]
    pub fn find(&self, name: &str, value: &str) -> Option<NodeId> {
        self.host.find_by_attr(self.container, name, value)
    }

    /// Markup of everything mounted under the container.
    #[must_use]
    pub fn html(&self) -> String {
        self.host.render_to_string(self.container)
    }

    /// Text content of everything mounted under the container.
    #[must_use]
    pub fn text(&self) -> String {
        self.host.text_of(self.container)
    }

    /// Errors captured so far.
    #[must_use]
    pub fn errors(&self) -> Vec<CapturedError> {
        self.errors.borrow().clone()
    }

    /// Returns and clears the captured errors.
    pub fn take_errors(&self) -> Vec<CapturedError> {
        core::mem::take(&mut *self.errors.borrow_mut())
    }

    /// The document.
    #[must_use]
    pub const fn host(&self) -> &MemoryHost {
        &self.host
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &ManualScheduler {
        &self.scheduler
    }

    /// The reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler<MemoryHost> {
        &self.reconciler
    }

    /// The container node the root renders into.
    #[must_use]
    pub const fn container(&self) -> NodeId {
        self.container
    }

    /// The root handle.
    #[must_use]
    pub const fn root(&self) -> RootHandle {
        self.root
    }
}
