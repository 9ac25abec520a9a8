//! The host platform adapter.
//!
//! The reconciler decides *what* changes; a [`HostConfig`] performs the changes on a
//! concrete platform. Containers are ordinary host instances, so one handle type
//! covers roots, elements and text nodes.

use alloc::boxed::Box;
use core::error::Error;
use core::fmt::Debug;

use crate::element::Props;

/// Callback queued with [`HostConfig::schedule_microtask`].
pub type Microtask = Box<dyn FnOnce()>;

/// A change to apply to an existing host instance during commit.
#[derive(Debug, Clone, Copy)]
pub enum HostUpdate<'a> {
    /// New text content.
    Text {
        /// Committed text.
        old: &'a str,
        /// Text to display.
        new: &'a str,
    },
    /// New attributes for an element.
    Props {
        /// Element tag.
        ty: &'a str,
        /// Committed props.
        old: &'a Props,
        /// Props to apply.
        new: &'a Props,
    },
}

/// Operations the reconciler needs from a platform.
///
/// Methods take `&self`; adapters keep their node storage behind interior mutability.
/// Adapters must not call back into the reconciler synchronously: deferred work goes
/// through [`HostConfig::schedule_microtask`].
pub trait HostConfig: 'static {
    /// Handle to a host node.
    type Instance: Clone + PartialEq + Debug + 'static;

    /// Error returned by failed operations.
    type Error: Error + Send + Sync + 'static;

    /// Creates a detached element.
    ///
    /// # Errors
    ///
    /// Fails when the platform cannot create an element of type `ty`.
    fn create_instance(&self, ty: &str, props: &Props) -> Result<Self::Instance, Self::Error>;

    /// Creates a detached text node.
    ///
    /// # Errors
    ///
    /// Fails when the platform cannot create the node.
    fn create_text_instance(&self, text: &str) -> Result<Self::Instance, Self::Error>;

    /// Appends `child` to a parent that is still being built.
    ///
    /// # Errors
    ///
    /// Fails on invalid handles.
    fn append_initial_child(
        &self,
        parent: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Appends `child` as the last child of an attached parent.
    ///
    /// # Errors
    ///
    /// Fails on invalid handles.
    fn append_child_to_container(
        &self,
        container: &Self::Instance,
        child: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Inserts `child` into `container` right before `before`.
    ///
    /// # Errors
    ///
    /// Fails when `before` is not a child of `container`.
    fn insert_child_to_container(
        &self,
        child: &Self::Instance,
        container: &Self::Instance,
        before: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Detaches `child` from `container`.
    ///
    /// # Errors
    ///
    /// Fails when `child` is not a child of `container`.
    fn remove_child(
        &self,
        child: &Self::Instance,
        container: &Self::Instance,
    ) -> Result<(), Self::Error>;

    /// Applies a text or prop change recorded during render.
    ///
    /// # Errors
    ///
    /// Fails on invalid handles.
    fn commit_update(
        &self,
        instance: &Self::Instance,
        update: HostUpdate<'_>,
    ) -> Result<(), Self::Error>;

    /// Runs `task` once the current synchronous work is done.
    fn schedule_microtask(&self, task: Microtask);
}
