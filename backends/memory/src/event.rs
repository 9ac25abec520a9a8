//! Bubbling event dispatch over the memory document.

use core::cell::Cell;

use crate::host::{MemoryHost, NodeId};

/// Payload handed to `on*` handlers by [`MemoryHost::dispatch_event`].
///
/// Handlers receive it as `&dyn Any`; downcast with
/// `event.downcast_ref::<SyntheticEvent>()`.
#[derive(Debug)]
pub struct SyntheticEvent {
    kind: String,
    target: NodeId,
    current_target: Cell<NodeId>,
    stopped: Cell<bool>,
}

impl SyntheticEvent {
    fn new(kind: &str, target: NodeId) -> Self {
        Self {
            kind: kind.to_owned(),
            target,
            current_target: Cell::new(target),
            stopped: Cell::new(false),
        }
    }

    /// Event name, such as `click`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The node the event was dispatched on.
    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// The node whose handler is running.
    #[must_use]
    pub fn current_target(&self) -> NodeId {
        self.current_target.get()
    }

    /// Stops the event from reaching handlers further up the tree.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    /// Whether [`stop_propagation`](Self::stop_propagation) was called.
    #[must_use]
    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl MemoryHost {
    /// Dispatches `event` on `target` and bubbles it through the element ancestors.
    ///
    /// Handlers are collected before the first one runs, so a handler that changes
    /// the tree does not change who receives this event. Returns the number of
    /// handlers invoked.
    pub fn dispatch_event(&self, target: NodeId, event: &str) -> usize {
        let path = self.handler_path(target, event);
        let payload = SyntheticEvent::new(event, target);
        let mut invoked = 0;
        for (node, handler) in path {
            payload.current_target.set(node);
            handler.call(&payload);
            invoked += 1;
            if payload.is_propagation_stopped() {
                break;
            }
        }
        tracing::debug!(%target, event, invoked, "dispatched event");
        invoked
    }
}
