#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
mod macros;

mod begin;
mod child;
mod commit;
mod complete;
pub mod config;
pub mod element;
pub mod error;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod lane;
pub mod root;
pub mod scheduler;
pub mod update_queue;
mod work_loop;

#[doc(inline)]
pub use config::ReconcilerConfig;
#[doc(inline)]
pub use element::{
    Component, Element, ElementBuilder, ElementType, EventHandler, Key, Node, PropValue, Props,
    component, event_prop_name, fragment, h, text,
};
pub use error::{HookError, ReconcileError};
pub use fiber::{FiberId, Flags, RootId, WorkTag};
#[doc(inline)]
pub use hooks::{Deps, Destroy, Hooks, SetState};
pub use host::{HostConfig, HostUpdate, Microtask};
pub use lane::{Lane, Lanes};
pub use root::RootHandle;
pub use scheduler::{Priority, Scheduler, Task, TaskId, TaskStatus};
pub use update_queue::{Action, Processed, ShallowMerge, SharedQueue, Update, UpdateQueue};
#[doc(inline)]
pub use work_loop::Reconciler;
