//! # Task Record
//!
//! The data model shared by every scheduling policy. One [`Task`] exists per
//! schedulable unit; it is owned by the [`TaskTable`] inside the scheduler for
//! the whole lifetime of the system and referred to everywhere else by its
//! [`TaskId`]. Ready containers store ids, never references.
//!
//! ## Release lifecycle
//!
//! ```text
//!              on_become_ready (new release)
//!   ┌──────────┐ ───────────────────────────► ┌─────────┐
//!   │ Finished │                              │  Ready  │
//!   └──────────┘ ◄─────────────────────────── └─────────┘
//!        ▲          on_delay (release done)    │      │ ▲
//!        │                                     │      │ │ on_become_ready
//!        │        on_self_suspend (aperiodic)  │      ▼ │ (unblock)
//!        └─────────────────────────────────────┘  ┌─────────┐
//!                                                 │ Blocked │
//!                                                 │Suspended│
//!                                                 └─────────┘
//! ```

use core::ops::{Index, IndexMut};

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Scalar types
// ---------------------------------------------------------------------------

/// Kernel tick count. Absolute instants and durations share this type.
/// 64 bits wide so release arithmetic never reaches the end of the range.
pub type Tick = u64;

/// Static priority. Lower value = higher priority.
pub type Priority = u8;

/// Slack in ticks. Signed: a negative value means a guarantee is already broken.
pub type Slack = i32;

/// Entry point of a scheduled thread. Never returns.
pub type TaskBody = extern "C" fn() -> !;

/// Index of a task in the scheduler's [`TaskTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Opaque reference to the kernel thread backing a task. The scheduler never
/// interprets the value; it only hands it back to the [`Kernel`](crate::kernel::Kernel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub usize);

// ---------------------------------------------------------------------------
// Task kind and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Released every `period` ticks.
    Periodic,
    /// Released on demand, no timing guarantee. Served in the background.
    Aperiodic,
    /// Released on demand, at most once per `period` (the minimum
    /// inter-arrival time). Dispatched like an aperiodic task.
    Sporadic,
}

/// Scheduler-level state of a task. Independent of the kernel thread state:
/// a `Ready` task is normally kernel-suspended, except for the one the
/// dispatcher resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run; present in exactly one ready container.
    Ready,
    /// Suspended itself.
    Suspended,
    /// Waiting on a resource.
    Blocked,
    /// Current release complete, waiting for the next one.
    Finished,
}

// ---------------------------------------------------------------------------
// Policy-private payload
// ---------------------------------------------------------------------------

/// Slack-Stealing bookkeeping for one periodic task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlackInfo {
    /// Deadline of the interval used for the last slack computation.
    pub di: Tick,
    /// Ticks that can still be handed to background work before `di`.
    pub slack: Slack,
    /// Instant at which that slack is realised.
    pub ttma: Tick,
    /// Slack computed at the critical instant.
    pub k: Slack,
}

/// Per-task state owned by the active policy. Exactly one variant is used
/// for the lifetime of a scheduler, chosen by the policy's `start_logic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyExt {
    None,
    DualPriority {
        /// Offset from release at which the task moves to the upper band.
        promotion: Tick,
        in_upper_band: bool,
    },
    SlackStealing(SlackInfo),
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Task {
    /// Kernel thread running the task body. Back-reference only.
    pub handle: ThreadHandle,
    pub name: &'static str,
    pub kind: TaskKind,
    pub state: TaskState,
    pub priority: Priority,

    pub period: Tick,
    pub relative_deadline: Tick,
    pub wcet: Tick,

    /// `release_time + relative_deadline` for the release in progress.
    pub absolute_deadline: Tick,
    /// Absolute tick at which the current release began.
    pub release_time: Tick,
    pub release_count: u32,

    /// Worst-case response time, filled in by the analysis at start.
    pub wcrt: Tick,
    /// Ticks consumed by the current release.
    pub executed_ticks: Tick,

    pub ext: PolicyExt,
}

impl Task {
    /// Build the record for a task that has not been released yet. The first
    /// release starts at tick 0, so the initial absolute deadline equals the
    /// relative one.
    pub fn new(
        handle: ThreadHandle,
        name: &'static str,
        priority: Priority,
        period: Tick,
        relative_deadline: Tick,
        wcet: Tick,
    ) -> Self {
        let kind = if period == 0 {
            TaskKind::Aperiodic
        } else {
            TaskKind::Periodic
        };
        Self {
            handle,
            name,
            kind,
            state: TaskState::Ready,
            priority,
            period,
            relative_deadline,
            wcet,
            absolute_deadline: relative_deadline,
            release_time: 0,
            release_count: 0,
            wcrt: 0,
            executed_ticks: 0,
            ext: PolicyExt::None,
        }
    }

    /// Same record as [`Task::new`], for a sporadic task whose `period` is
    /// the minimum inter-arrival time.
    pub fn sporadic(
        handle: ThreadHandle,
        name: &'static str,
        priority: Priority,
        min_interarrival: Tick,
        relative_deadline: Tick,
        wcet: Tick,
    ) -> Self {
        Self {
            kind: TaskKind::Sporadic,
            ..Self::new(handle, name, priority, min_interarrival, relative_deadline, wcet)
        }
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.kind == TaskKind::Periodic
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }

    /// Start a new release. Periodic tasks already had `release_time`
    /// advanced by `wait_for_next_period`; the others are released now.
    pub fn begin_release(&mut self, now: Tick) {
        if !self.is_periodic() {
            self.release_time = now;
        }
        self.absolute_deadline = self.release_time.saturating_add(self.relative_deadline);
        self.release_count = self.release_count.wrapping_add(1);
        self.executed_ticks = 0;
        self.state = TaskState::Ready;
    }

    /// Slack-Stealing payload, if the active policy installed one.
    pub fn slack_info(&self) -> Option<&SlackInfo> {
        match &self.ext {
            PolicyExt::SlackStealing(info) => Some(info),
            _ => None,
        }
    }

    pub fn slack_info_mut(&mut self) -> Option<&mut SlackInfo> {
        match &mut self.ext {
            PolicyExt::SlackStealing(info) => Some(info),
            _ => None,
        }
    }

    /// `true` once a Dual-Priority task has been promoted in this release.
    pub fn in_upper_band(&self) -> bool {
        matches!(
            self.ext,
            PolicyExt::DualPriority {
                in_upper_band: true,
                ..
            }
        )
    }
}

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

/// Arena of task records. Tasks are only ever appended, so a [`TaskId`]
/// stays valid for the life of the table.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Vec<Task, MAX_TASKS>,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn push(&mut self, task: Task) -> Result<TaskId, Error> {
        let id = TaskId::new(self.tasks.len());
        self.tasks
            .push(task)
            .map_err(|_| Error::ResourceExhausted)?;
        Ok(id)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.tasks.is_full()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.tasks.len()).map(TaskId::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &Task)> + '_ {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (TaskId::new(i), t))
    }
}

impl Index<TaskId> for TaskTable {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        &self.tasks[id.index()]
    }
}

impl IndexMut<TaskId> for TaskTable {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.index()]
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
