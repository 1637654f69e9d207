//! # HST
//!
//! Application-level real-time scheduling for a preemptive kernel. HST keeps
//! its own task records and ready lists and lets the kernel run exactly one
//! scheduled thread at a time: the one its policy picked.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! │        wait_for_next_period() · lifecycle callbacks     │
//! ├────────────────────────────────────────────────────────┤
//! │               Dispatcher (scheduler.rs)                 │
//! │   register_*() · start() · tick() · dispatch() · run()  │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Policies    │   Analysis         │  Sync Primitives  │
//! │  policy/     │   wcrt.rs          │  sync.rs          │
//! │  ─ RM · EDF  │   ─ response time  │  ─ Shared         │
//! │  ─ DP · SS   │   slack.rs         │  ─ Notify         │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │        Task Model (task.rs) · Ordered lists (queue.rs)  │
//! ├────────────────────────────────────────────────────────┤
//! │     Kernel interface (kernel.rs) · Hooks (kernel.rs)    │
//! ├────────────────────────────────────────────────────────┤
//! │      Arch Port (arch/cortex_m4.rs, feature cortex-m)    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Policies
//!
//! | type                      | dispatching                                   |
//! |---------------------------|-----------------------------------------------|
//! | `RateMonotonic`           | static priority                               |
//! | `EarliestDeadlineFirst`   | absolute deadline                             |
//! | `DualPriority`            | lower band until `release + D − R`, then RM   |
//! | `SlackStealing`           | background first while slack lasts, then RM   |
//!
//! ## Usage
//!
//! ```ignore
//! static HST: Shared<Scheduler<Port, RateMonotonic>> = Shared::new();
//!
//! extern "C" fn sensor() -> ! {
//!     loop {
//!         sample();
//!         hst::scheduler::wait_for_next_period(&HST).ok();
//!     }
//! }
//!
//! extern "C" fn dispatcher() -> ! {
//!     let _ = hst::scheduler::run(&HST);
//!     loop {}
//! }
//!
//! HST.install(Scheduler::new(Port, RateMonotonic::new(), LogHooks));
//! HST.with(|s| s.spawn_dispatcher(dispatcher))??;
//! HST.with(|s| s.register_periodic_task(sensor, "sensor", 1, 100, 100, 10))??;
//! // Then start the kernel; the dispatcher thread runs first.
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: every container is a `heapless::Vec` bounded by `MAX_TASKS`
//! - **Index-based**: ready lists store `TaskId`s into one task table
//! - **Critical sections**: the `critical-section` crate guards shared state

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod kernel;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod slack;
pub mod sync;
pub mod task;
pub mod wcrt;

#[cfg(feature = "cortex-m")]
pub mod arch;

#[cfg(test)]
mod sim;

pub use error::Error;
pub use kernel::{Hooks, Kernel, LogHooks};
pub use policy::{DualPriority, EarliestDeadlineFirst, Policy, RateMonotonic, SlackStealing};
pub use scheduler::Scheduler;
pub use sync::Shared;
pub use task::{Priority, Slack, Task, TaskId, TaskState, ThreadHandle, Tick};
