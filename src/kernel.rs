//! # Kernel interface
//!
//! HST does not switch contexts itself. It runs on top of a preemptive kernel
//! and uses only the services listed in [`Kernel`]. The application supplies
//! the alarm callbacks in [`Hooks`].
//!
//! ## Thread layout expected from the kernel
//!
//! ```text
//!   priority
//!     ▲
//!     │  DISPATCHER_THREAD_PRIORITY   dispatcher (blocks on a notification)
//!     │  TASK_THREAD_PRIORITY         every scheduled task (all but one suspended)
//!     │  idle
//! ```
//!
//! The kernel must call back into the scheduler from its trace points:
//!
//! | kernel event                           | scheduler callback            |
//! |----------------------------------------|-------------------------------|
//! | tick interrupt                         | `Scheduler::tick`             |
//! | thread blocks on a queue/semaphore     | `Scheduler::on_block`         |
//! | thread suspends itself                 | `Scheduler::on_self_suspend`  |
//! | thread moved to the kernel ready list  | `Scheduler::on_become_ready`  |
//!
//! `Scheduler::on_delay` is not a kernel hook: periodic bodies reach it through
//! `wait_for_next_period`. Suspensions and resumptions performed *by the
//! dispatcher* through this trait must not be reported back.

use log::{error, info, warn};

use crate::task::{Slack, Task, TaskBody, TaskId, TaskTable, ThreadHandle, Tick};

/// Services consumed from the underlying kernel.
///
/// Methods take `&self`: a port is normally a zero-sized handle onto global
/// kernel state, and the same handle is used from thread and ISR context.
pub trait Kernel {
    /// Monotonic tick counter. Must be readable from ISR context.
    fn tick_count(&self) -> Tick;

    /// Create a thread in the suspended state. `None` if the kernel is out
    /// of memory or thread slots.
    fn create_thread(
        &self,
        body: TaskBody,
        name: &'static str,
        stack_depth: usize,
        priority: u8,
    ) -> Option<ThreadHandle>;

    fn suspend(&self, thread: ThreadHandle);

    fn resume(&self, thread: ThreadHandle);

    /// Thread executing the caller.
    fn current_thread(&self) -> ThreadHandle;

    /// `true` if the kernel would run `thread` were it the highest priority
    /// ready thread (i.e. not suspended, blocked or delayed).
    fn is_ready(&self, thread: ThreadHandle) -> bool;

    /// Store `task` in the thread's local storage slot.
    fn bind(&self, thread: ThreadHandle, task: TaskId);

    /// Read the thread's local storage slot.
    fn bound_task(&self, thread: ThreadHandle) -> Option<TaskId>;

    /// Give the dispatcher's notification from thread context.
    fn notify_dispatcher(&self);

    /// Give the dispatcher's notification from ISR context. Returns `true`
    /// if a thread of higher priority than the interrupted one was woken.
    fn notify_dispatcher_from_isr(&self) -> bool;

    /// Request a context switch on exit from the current ISR.
    fn yield_from_isr(&self);

    /// Block the calling (dispatcher) thread until notified, then clear the
    /// notification count.
    fn wait_notification(&self);

    /// Stop the kernel from switching threads. Nests.
    fn suspend_all(&self);

    fn resume_all(&self);

    /// Block the calling thread until the absolute tick `wake`.
    fn delay_until(&self, wake: Tick);
}

// ---------------------------------------------------------------------------
// Application hooks
// ---------------------------------------------------------------------------

/// Alarm callbacks supplied by the application.
///
/// Every method has a default that only logs, so `LogHooks` is a usable
/// implementation. What to do about a violation (halt, degrade, ignore) is
/// the application's decision; the scheduler keeps running after each call.
///
/// `on_deadline_miss`, `on_wcet_overrun` and `on_negative_slack` run in ISR
/// context and must not block.
pub trait Hooks {
    /// `task` is still unfinished after its absolute deadline. Raised on
    /// every tick until the release finishes.
    fn on_deadline_miss(&mut self, task: &Task, tick: Tick) {
        warn!(
            "{} (release {}) missed its deadline: {} > {}",
            task.name, task.release_count, tick, task.absolute_deadline
        );
    }

    /// `task` has executed longer than its WCET in the current release.
    fn on_wcet_overrun(&mut self, task: &Task, tick: Tick) {
        warn!(
            "{} (release {}) overran its wcet: {} > {} at {}",
            task.name, task.release_count, task.executed_ticks, task.wcet, tick
        );
    }

    /// Slack-Stealing only: the available slack dropped below zero.
    fn on_negative_slack(&mut self, tick: Tick, slack: Slack) {
        error!("negative available slack {} at {}", slack, tick);
    }

    /// Fired once by `start()` after the analysis, before the first dispatch.
    fn on_start(&mut self, tasks: &TaskTable) {
        for (_, t) in tasks.iter() {
            info!(
                "{}: prio={} T={} D={} C={} R={}",
                t.name, t.priority, t.period, t.relative_deadline, t.wcet, t.wcrt
            );
        }
    }
}

/// Hooks that only log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHooks;

impl Hooks for LogHooks {}
