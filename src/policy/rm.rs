//! # Rate Monotonic
//!
//! Fixed-priority preemptive scheduling. One ready list keyed by static
//! priority; the head always runs. Aperiodic tasks share the list at their
//! (normally lowest) priority.

use super::{by_priority, Order, Policy};
use crate::kernel::Hooks;
use crate::queue::OrderedList;
use crate::task::{Priority, TaskId, TaskTable, Tick};

#[derive(Debug, Default)]
pub struct RateMonotonic {
    ready: OrderedList<Priority>,
}

impl RateMonotonic {
    pub const fn new() -> Self {
        Self {
            ready: OrderedList::new(),
        }
    }

    /// Ready tasks, highest priority first.
    pub fn ready(&self) -> &OrderedList<Priority> {
        &self.ready
    }
}

impl Policy for RateMonotonic {
    const NAME: &'static str = "RM";

    fn setup(&mut self) {
        self.ready = OrderedList::new();
    }

    fn add_task(&mut self, tasks: &TaskTable, id: TaskId) {
        self.ready.insert(id, tasks[id].priority);
    }

    fn analysis_order(&self, tasks: &TaskTable) -> Order {
        by_priority(tasks)
    }

    fn start_logic(&mut self, _tasks: &mut TaskTable, _now: Tick) {}

    fn add_to_ready(&mut self, tasks: &mut TaskTable, id: TaskId, _now: Tick) {
        self.ready.insert(id, tasks[id].priority);
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
        self.ready.is_sorted() && self.ready.iter().all(|(id, p)| tasks[id].priority == p)
    }
}
