//! Error types reported by the reconciler.

use alloc::boxed::Box;
use core::error::Error;

/// A hook call that does not line up with the previous render of the same component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// A hook was called past the end of the previous render's hook list.
    #[error("rendered more hooks than during the previous render (hook #{index})")]
    MoreHooks {
        /// Position of the extra call.
        index: usize,
    },
    /// The render ended before consuming every previous hook.
    #[error("rendered fewer hooks than expected: {found} of {expected}")]
    FewerHooks {
        /// Hooks called by the previous render.
        expected: usize,
        /// Hooks called by this render.
        found: usize,
    },
    /// The hook at this position is of a different kind than before.
    #[error("hook #{index} changed from {expected} to {found}")]
    KindMismatch {
        /// Position of the call.
        index: usize,
        /// Kind recorded by the previous render.
        expected: &'static str,
        /// Kind called now.
        found: &'static str,
    },
}

/// Failures surfaced by the reconciler.
///
/// Render-phase failures abort the work-in-progress tree and leave the committed tree
/// untouched; they are handed to the error sink installed with
/// [`Reconciler::on_error`](crate::Reconciler::on_error).
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A component body returned an error.
    #[error("component `{component}` failed to render")]
    Component {
        /// Display name of the component.
        component: &'static str,
        /// The error returned by the component.
        #[source]
        source: anyhow::Error,
    },
    /// A component called its hooks in a different order than before.
    #[error("hooks of `{component}` changed between renders")]
    HookOrder {
        /// Display name of the component.
        component: &'static str,
        /// What did not line up.
        #[source]
        source: HookError,
    },
    /// The host adapter rejected an operation.
    #[error("host operation `{operation}` failed")]
    Host {
        /// Name of the host call.
        operation: &'static str,
        /// The host's error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The root handle was not created by this reconciler.
    #[error("unknown root")]
    UnknownRoot,
    /// The call was made while the reconciler was rendering or committing.
    #[error("the reconciler is busy rendering")]
    Busy,
    /// Rendering kept scheduling synchronous work for the same root.
    #[error("maximum update depth exceeded after {count} synchronous renders")]
    NestedUpdateLimit {
        /// Renders performed in the flush.
        count: usize,
    },
}

impl ReconcileError {
    pub(crate) fn host<E>(operation: &'static str, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Host {
            operation,
            source: Box::new(source),
        }
    }

    /// Name of the component involved, if any.
    #[must_use]
    pub const fn component(&self) -> Option<&'static str> {
        match self {
            Self::Component { component, .. } | Self::HookOrder { component, .. } => {
                Some(*component)
            }
            _ => None,
        }
    }
}
