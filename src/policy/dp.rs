//! # Dual Priority
//!
//! Burns & Wellings' two-band scheme. A periodic release starts in the lower
//! band and is promoted to the upper band `D - R` ticks after its release,
//! the latest instant that still lets it meet its deadline under RM in the
//! upper band. Aperiodic work runs between the two bands, so it gets the
//! processor ahead of periodic tasks that can still afford to wait.
//!
//! ```text
//!   upper   promoted periodic releases      static priority
//!   middle  aperiodic tasks                 FIFO
//!   lower   unpromoted periodic releases    FIFO
//! ```
//!
//! Promotion instants are kept in one list sorted by absolute time, so the
//! per-tick scan stops at the first entry still in the future.

use log::debug;

use super::{by_priority, Order, Policy};
use crate::kernel::Hooks;
use crate::queue::{FifoList, OrderedList};
use crate::task::{Priority, PolicyExt, TaskId, TaskState, TaskTable, Tick};

#[derive(Debug, Default)]
pub struct DualPriority {
    upper: OrderedList<Priority>,
    middle: FifoList,
    lower: FifoList,
    /// Absolute promotion instant of each unpromoted periodic release.
    promotions: OrderedList<Tick>,
}

fn promotion_offset(tasks: &TaskTable, id: TaskId) -> Tick {
    match tasks[id].ext {
        PolicyExt::DualPriority { promotion, .. } => promotion,
        _ => 0,
    }
}

fn set_upper_band(tasks: &mut TaskTable, id: TaskId, upper: bool) {
    if let PolicyExt::DualPriority { in_upper_band, .. } = &mut tasks[id].ext {
        *in_upper_band = upper;
    }
}

impl DualPriority {
    pub const fn new() -> Self {
        Self {
            upper: OrderedList::new(),
            middle: FifoList::new(),
            lower: FifoList::new(),
            promotions: OrderedList::new(),
        }
    }

    pub fn upper(&self) -> &OrderedList<Priority> {
        &self.upper
    }

    pub fn middle(&self) -> &FifoList {
        &self.middle
    }

    pub fn lower(&self) -> &FifoList {
        &self.lower
    }

    pub fn promotions(&self) -> &OrderedList<Tick> {
        &self.promotions
    }

    /// Promote every release whose promotion instant is not after `now`.
    /// Returns `true` if a ready task changed band.
    fn promote_due(&mut self, tasks: &mut TaskTable, now: Tick) -> bool {
        let mut moved = false;
        while let Some(at) = self.promotions.head_key() {
            if at > now {
                break;
            }
            let Some((id, _)) = self.promotions.pop_head() else {
                break;
            };
            set_upper_band(tasks, id, true);
            // A blocked release is promoted in place and rejoins the upper band
            // when it unblocks.
            if self.lower.remove(id) {
                self.upper.insert(id, tasks[id].priority);
                moved = true;
            }
        }
        moved
    }
}

impl Policy for DualPriority {
    const NAME: &'static str = "DP";

    fn setup(&mut self) {
        *self = Self::new();
    }

    fn add_task(&mut self, tasks: &TaskTable, id: TaskId) {
        if tasks[id].is_periodic() {
            self.lower.insert(id, ());
        } else {
            self.middle.insert(id, ());
        }
    }

    fn analysis_order(&self, tasks: &TaskTable) -> Order {
        by_priority(tasks)
    }

    fn start_logic(&mut self, tasks: &mut TaskTable, now: Tick) {
        for id in by_priority(tasks) {
            let task = &mut tasks[id];
            let promotion = task.relative_deadline.saturating_sub(task.wcrt);
            task.ext = PolicyExt::DualPriority {
                promotion,
                in_upper_band: false,
            };
            debug!("dp: {} promotes {} ticks after release", task.name, promotion);
            self.promotions
                .insert(id, task.release_time.saturating_add(promotion));
        }
        self.promote_due(tasks, now);
    }

    fn add_to_ready(&mut self, tasks: &mut TaskTable, id: TaskId, now: Tick) {
        if !tasks[id].is_periodic() {
            self.middle.insert(id, ());
            return;
        }
        if tasks[id].in_upper_band() {
            self.upper.insert(id, tasks[id].priority);
            return;
        }
        if !self.promotions.contains(id) {
            let at = tasks[id]
                .release_time
                .saturating_add(promotion_offset(tasks, id));
            self.promotions.insert(id, at);
        }
        self.lower.insert(id, ());
        self.promote_due(tasks, now);
    }

    fn remove_from_ready(&mut self, tasks: &mut TaskTable, id: TaskId, _now: Tick) {
        self.upper.remove(id);
        self.middle.remove(id);
        self.lower.remove(id);
        if tasks[id].state == TaskState::Finished {
            // The next release re-enters the lower band with a fresh entry.
            self.promotions.remove(id);
            set_upper_band(tasks, id, false);
        }
    }

    fn tick_logic<H: Hooks>(
        &mut self,
        tasks: &mut TaskTable,
        _running: Option<TaskId>,
        now: Tick,
        _hooks: &mut H,
    ) -> bool {
        self.promote_due(tasks, now)
    }

    fn schedule(&mut self, _tasks: &mut TaskTable, current: &mut Option<TaskId>, _now: Tick) {
        *current = self
            .upper
            .head()
            .or_else(|| self.middle.head())
            .or_else(|| self.lower.head());
    }

    fn ready_count(&self, id: TaskId) -> usize {
        usize::from(self.upper.contains(id))
            + usize::from(self.middle.contains(id))
            + usize::from(self.lower.contains(id))
    }

    fn is_consistent(&self, tasks: &TaskTable) -> bool {
        self.upper.is_sorted()
            && self.promotions.is_sorted()
            && self.upper.ids().all(|id| tasks[id].in_upper_band())
            && self.lower.ids().all(|id| !tasks[id].in_upper_band())
            && self.promotions.ids().all(|id| !tasks[id].in_upper_band())
    }
}
