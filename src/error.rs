//! # Errors
//!
//! Everything that can go wrong *before* dispatching starts. Runtime
//! violations (deadline miss, WCET overrun, negative slack) are not errors;
//! they are reported through [`Hooks`](crate::kernel::Hooks).

use core::fmt;

use crate::task::{Tick, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The kernel could not create the task's thread, or the task table is full.
    ResourceExhausted,
    /// Periodic task with zero WCET, zero deadline, or a deadline beyond its period.
    InvalidParameters,
    /// Tasks cannot be registered once the scheduler has started.
    AlreadyStarted,
    /// Response-time analysis proved `task` cannot meet its deadline.
    /// `response` is the busy-period length at which the iteration gave up.
    Unschedulable { task: TaskId, response: Tick },
    /// The shared scheduler slot was empty when the dispatcher loop began.
    NotInstalled,
    /// The shared scheduler is already borrowed further up the call stack
    /// (a kernel callback fired from inside a scheduler operation).
    Busy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceExhausted => f.write_str("no room for another task"),
            Error::InvalidParameters => f.write_str("invalid task timing parameters"),
            Error::AlreadyStarted => f.write_str("scheduler already started"),
            Error::Unschedulable { task, response } => write!(
                f,
                "task {} is unschedulable (response time reached {} ticks)",
                task.index(),
                response
            ),
            Error::NotInstalled => f.write_str("no scheduler installed"),
            Error::Busy => f.write_str("scheduler already borrowed"),
        }
    }
}
