//! # Slack Stealing
//!
//! Periodic tasks run under RM. Aperiodic (background) tasks run ahead of
//! every periodic task, but only while the *available slack*, the minimum
//! slack over all periodic tasks, is above `MIN_SLACK`. See `slack.rs` for
//! how each task's slack is computed.
//!
//! ## Per-tick accounting
//!
//! | who ran the last tick        | slack charged to                     |
//! |------------------------------|--------------------------------------|
//! | background task (stealing)   | every periodic task                  |
//! | periodic task at position p  | tasks strictly ahead of p            |
//! | nobody (idle)                | every periodic task                  |
//!
//! When a periodic release finishes, its own slack is recomputed for the
//! next release (or restored from the critical-instant value `K` when
//! slack caching is on) and any WCET it did not use is credited to every
//! task behind it.

use log::{debug, info};

use super::{by_priority, position, Order, Policy};
use crate::config::{MIN_SLACK, USE_SLACK_K};
use crate::kernel::Hooks;
use crate::queue::{FifoList, OrderedList};
use crate::slack;
use crate::task::{PolicyExt, Priority, Slack, SlackInfo, TaskId, TaskState, TaskTable, Tick};

#[derive(Debug)]
pub struct SlackStealing {
    periodic: OrderedList<Priority>,
    background: FifoList,
    /// Every periodic task, highest priority first.
    order: Order,
    using_slack: bool,
    available: Slack,
    use_k: bool,
}

impl Default for SlackStealing {
    fn default() -> Self {
        Self::new()
    }
}

impl SlackStealing {
    pub const fn new() -> Self {
        Self::with_slack_k(USE_SLACK_K)
    }

    /// `use_k`: restore the critical-instant slack at each finish instead of
    /// recomputing it.
    pub const fn with_slack_k(use_k: bool) -> Self {
        Self {
            periodic: OrderedList::new(),
            background: FifoList::new(),
            order: Order::new(),
            using_slack: false,
            available: Slack::MAX,
            use_k,
        }
    }

    /// Minimum slack over all periodic tasks.
    pub fn available_slack(&self) -> Slack {
        self.available
    }

    /// `true` while a background task holds the processor.
    pub fn using_slack(&self) -> bool {
        self.using_slack
    }

    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    fn refresh(&mut self, tasks: &TaskTable) {
        self.available = slack::available(tasks, &self.order);
    }

    /// Slack bookkeeping for a periodic release that just finished.
    fn finished(&mut self, tasks: &mut TaskTable, id: TaskId, now: Tick) {
        let Some(pos) = position(&self.order, id) else {
            return;
        };
        if self.use_k {
            let t = &mut tasks[id];
            let di = t.release_time.saturating_add(t.relative_deadline);
            if let Some(info) = t.slack_info_mut() {
                info.slack = info.k;
                info.di = di;
                info.ttma = di;
            }
        } else {
            slack::calculate(tasks, &self.order, pos, now);
        }

        let unused = tasks[id].wcet.saturating_sub(tasks[id].executed_ticks);
        if unused > 0 {
            slack::gain(tasks, &self.order, pos, unused);
        }
        self.refresh(tasks);
    }
}

impl Policy for SlackStealing {
    const NAME: &'static str = "SS";

    fn setup(&mut self) {
        *self = Self::with_slack_k(self.use_k);
    }

    fn add_task(&mut self, tasks: &TaskTable, id: TaskId) {
        if tasks[id].is_periodic() {
            self.periodic.insert(id, tasks[id].priority);
        } else {
            self.background.insert(id, ());
        }
    }

    fn analysis_order(&self, tasks: &TaskTable) -> Order {
        by_priority(tasks)
    }

    fn start_logic(&mut self, tasks: &mut TaskTable, now: Tick) {
        self.order = by_priority(tasks);
        for &id in &self.order {
            tasks[id].ext = PolicyExt::SlackStealing(SlackInfo::default());
        }
        for pos in 0..self.order.len() {
            slack::calculate(tasks, &self.order, pos, now);
            let t = &mut tasks[self.order[pos]];
            let name = t.name;
            if let Some(info) = t.slack_info_mut() {
                info.k = info.slack;
                debug!(
                    "ss: {} slack={} di={} ttma={}",
                    name, info.slack, info.di, info.ttma
                );
            }
        }
        self.refresh(tasks);
        info!("ss: available slack {}", self.available);
    }

    fn add_to_ready(&mut self, tasks: &mut TaskTable, id: TaskId, _now: Tick) {
        if tasks[id].is_periodic() {
            self.periodic.insert(id, tasks[id].priority);
        } else {
            self.background.insert(id, ());
        }
    }

    fn remove_from_ready(&mut self, tasks: &mut TaskTable, id: TaskId, now: Tick) {
        self.background.remove(id);
        if self.periodic.remove(id) && tasks[id].state == TaskState::Finished {
            self.finished(tasks, id, now);
        }
    }

    fn tick_logic<H: Hooks>(
        &mut self,
        tasks: &mut TaskTable,
        running: Option<TaskId>,
        now: Tick,
        hooks: &mut H,
    ) -> bool {
        let pos = running
            .filter(|_| !self.using_slack)
            .and_then(|id| position(&self.order, id));
        match pos {
            Some(pos) => slack::decrement_higher(tasks, &self.order, pos, 1),
            None => slack::decrement_all(tasks, &self.order, 1),
        }
        self.refresh(tasks);

        if self.available < 0 {
            hooks.on_negative_slack(now, self.available);
        }
        self.using_slack && self.available <= MIN_SLACK
    }

    fn schedule(&mut self, _tasks: &mut TaskTable, current: &mut Option<TaskId>, _now: Tick) {
        if self.available > MIN_SLACK {
            if let Some(id) = self.background.head() {
                *current = Some(id);
                self.using_slack = true;
                return;
            }
        }
        self.using_slack = false;
        *current = self.periodic.head();
    }

    fn ready_count(&self, id: TaskId) -> usize {
        usize::from(self.periodic.contains(id)) + usize::from(self.background.contains(id))
    }

    fn is_consistent(&self, tasks: &TaskTable) -> bool {
        self.periodic.is_sorted()
            && self.available == slack::available(tasks, &self.order)
            && self.order.iter().all(|&id| tasks[id].slack_info().is_some())
    }
}
