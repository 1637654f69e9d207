//! # Scheduling Policies
//!
//! A policy owns the ready containers and decides which ready task runs.
//! It never touches the kernel: the dispatcher in `scheduler.rs` calls into
//! it and applies the decision.
//!
//! | policy                   | ready containers                           | key              |
//! |--------------------------|--------------------------------------------|------------------|
//! | [`RateMonotonic`]        | one list                                   | static priority  |
//! | [`EarliestDeadlineFirst`]| one list                                   | absolute deadline|
//! | [`DualPriority`]         | upper / middle / lower bands               | priority / FIFO  |
//! | [`SlackStealing`]        | periodic list, background FIFO             | priority / FIFO  |
//!
//! The policy is a type parameter of `Scheduler`, chosen at build time.

pub mod dp;
pub mod edf;
pub mod rm;
pub mod ss;

pub use dp::DualPriority;
pub use edf::EarliestDeadlineFirst;
pub use rm::RateMonotonic;
pub use ss::SlackStealing;

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::kernel::Hooks;
use crate::queue::OrderedList;
use crate::task::{Task, TaskId, TaskTable, Tick};

/// Task ids in analysis (highest priority first) order.
pub type Order = Vec<TaskId, MAX_TASKS>;

pub trait Policy {
    /// Short name for log output.
    const NAME: &'static str;

    /// Reset the ready containers. Called once by `Scheduler::new`.
    fn setup(&mut self);

    /// A task was registered. It is `Ready` and has not been released yet.
    fn add_task(&mut self, tasks: &TaskTable, id: TaskId);

    /// Periodic tasks in the order the response-time analysis must see them.
    fn analysis_order(&self, tasks: &TaskTable) -> Order;

    /// Called once after the analysis, before the first dispatch. `wcrt`
    /// is valid for every periodic task.
    fn start_logic(&mut self, tasks: &mut TaskTable, now: Tick);

    /// `id` became `Ready`, either for a new release or after an unblock.
    fn add_to_ready(&mut self, tasks: &mut TaskTable, id: TaskId, now: Tick);

    /// `id` left the `Ready` state; its new state is already recorded. Must
    /// be idempotent: the dispatcher may call it again for the same change.
    fn remove_from_ready(&mut self, tasks: &mut TaskTable, id: TaskId, now: Tick);

    /// Per-tick bookkeeping, in ISR context. `running` is the task that held
    /// the CPU during the tick that just ended, if any. Returns `true` if the
    /// dispatcher must re-evaluate its choice.
    fn tick_logic<H: Hooks>(
        &mut self,
        tasks: &mut TaskTable,
        running: Option<TaskId>,
        now: Tick,
        hooks: &mut H,
    ) -> bool;

    /// Select the task to run next, or `None` to idle.
    fn schedule(&mut self, tasks: &mut TaskTable, current: &mut Option<TaskId>, now: Tick);

    /// Number of ready containers currently holding `id`.
    fn ready_count(&self, id: TaskId) -> usize;

    /// Container ordering holds for the current task keys.
    fn is_consistent(&self, tasks: &TaskTable) -> bool;
}

/// Periodic tasks sorted by static priority, registration order on ties.
pub(crate) fn by_priority(tasks: &TaskTable) -> Order {
    sorted_periodic(tasks, |t| Tick::from(t.priority))
}

/// Periodic tasks sorted by `key`, registration order on ties.
pub(crate) fn sorted_periodic(tasks: &TaskTable, key: impl Fn(&Task) -> Tick) -> Order {
    let mut list = OrderedList::new();
    for (id, t) in tasks.iter().filter(|(_, t)| t.is_periodic()) {
        list.insert(id, key(t));
    }
    list.ids().collect()
}

/// Position of `id` in `order`.
pub(crate) fn position(order: &[TaskId], id: TaskId) -> Option<usize> {
    order.iter().position(|&o| o == id)
}
