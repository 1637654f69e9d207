//! # Earliest Deadline First
//!
//! One ready list keyed by absolute deadline, re-keyed on every release.
//! Aperiodic tasks carry no deadline and are keyed at `Tick::MAX`, so they
//! only run when no periodic release is pending.
//!
//! The offline analysis checks the periodic set in deadline-monotonic order.
//! This is sufficient for EDF, not exact.

use super::{sorted_periodic, Order, Policy};
use crate::kernel::Hooks;
use crate::queue::OrderedList;
use crate::task::{Task, TaskId, TaskTable, Tick};

#[derive(Debug, Default)]
pub struct EarliestDeadlineFirst {
    ready: OrderedList<Tick>,
}

fn key(task: &Task) -> Tick {
    if task.is_periodic() {
        task.absolute_deadline
    } else {
        Tick::MAX
    }
}

impl EarliestDeadlineFirst {
    pub const fn new() -> Self {
        Self {
            ready: OrderedList::new(),
        }
    }

    /// Ready tasks, earliest deadline first.
    pub fn ready(&self) -> &OrderedList<Tick> {
        &self.ready
    }
}

impl Policy for EarliestDeadlineFirst {
    const NAME: &'static str = "EDF";

    fn setup(&mut self) {
        self.ready = OrderedList::new();
    }

    fn add_task(&mut self, tasks: &TaskTable, id: TaskId) {
        self.ready.insert(id, key(&tasks[id]));
    }

    fn analysis_order(&self, tasks: &TaskTable) -> Order {
        sorted_periodic(tasks, |t| t.relative_deadline)
    }

    fn start_logic(&mut self, _tasks: &mut TaskTable, _now: Tick) {}

    fn add_to_ready(&mut self, tasks: &mut TaskTable, id: TaskId, _now: Tick) {
        self.ready.insert(id, key(&tasks[id]));
    }

    fn remove_from_ready(&mut self, _tasks: &mut TaskTable, id: TaskId, _now: Tick) {
        self.ready.remove(id);
    }

    fn tick_logic<H: Hooks>(
        &mut self,
        _tasks: &mut TaskTable,
        _running: Option<TaskId>,
        _now: Tick,
        _hooks: &mut H,
    ) -> bool {
        false
    }

    fn schedule(&mut self, _tasks: &mut TaskTable, current: &mut Option<TaskId>, _now: Tick) {
        *current = self.ready.head();
    }

    fn ready_count(&self, id: TaskId) -> usize {
        usize::from(self.ready.contains(id))
    }

    fn is_consistent(&self, tasks: &TaskTable) -> bool {
        self.ready.is_sorted() && self.ready.iter().all(|(id, d)| key(&tasks[id]) == d)
    }
}
