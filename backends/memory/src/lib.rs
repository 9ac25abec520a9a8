//! In-memory backend for eddy.
//!
//! [`MemoryHost`] keeps host nodes in a plain arena and records every mutation the
//! reconciler performs. [`ManualScheduler`] runs scheduled work only when asked to,
//! which makes time slicing and priorities deterministic. [`TestRoot`] wires both to
//! a reconciler with a single mounted root.

pub use crate::error::MemoryHostError;
pub use crate::event::SyntheticEvent;
pub use crate::harness::{CapturedError, TestRoot};
pub use crate::host::{HostOp, MemoryHost, NodeId};
pub use crate::scheduler::{ManualScheduler, SchedulerEvent};

mod error;
mod event;
mod harness;
mod host;
mod scheduler;

#[cfg(test)]
mod tests;
