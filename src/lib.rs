#![doc = include_str!("../README.md")]

pub mod logging;

#[doc(inline)]
pub use eddy_core::*;

/// The in-memory host, manual scheduler and test harness.
#[cfg(feature = "memory")]
pub use eddy_memory as memory;

pub mod prelude {
    //! The items needed to write and mount components.
    //!
    //! ```rust,ignore
    //! use eddy::prelude::*;
    //!
    //! fn greeting(_: &mut Hooks<'_>, props: &Props) -> anyhow::Result<Node> {
    //!     Ok(h("p").child(props.get_str("name").unwrap_or("world")).into())
    //! }
    //! ```
    pub use eddy_core::{
        Component, Destroy, HostConfig, Hooks, Lanes, Node, Props, Reconciler,
        ReconcilerConfig, RootHandle, Scheduler, SetState, component, deps, fragment, h, text,
    };
}
