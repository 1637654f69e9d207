//! # Scheduler
//!
//! The dispatcher: the one object that owns every task record, the active
//! policy and the absolute-deadline list, and reconciles the kernel's view of
//! the threads with the policy's decision.
//!
//! ## Contexts
//!
//! ```text
//!   tick ISR ──► tick()            charge, overrun, deadline scan, tick_logic
//!                  │ notify (only if tick_logic asks)
//!                  ▼
//!   dispatcher ──► dispatch()      reconcile, suspend all, schedule, resume one
//!                  ▲
//!                  │ notify
//!   task bodies ─► on_delay / on_block / on_self_suspend / on_become_ready
//! ```
//!
//! At most one scheduled thread is kernel-ready after a dispatch: the one
//! the policy picked. All scheduled threads share one kernel priority, so
//! the kernel never has a choice to make.
//!
//! ## Dispatch cycle
//!
//! 1. Suspend kernel scheduling.
//! 2. If the outgoing task left `Ready`, make sure the policy dropped it and
//!    release its deadline entry if its release is over.
//! 3. Suspend every scheduled thread the kernel considers ready.
//! 4. Ask the policy for the next task and resume only that thread.
//! 5. Resume kernel scheduling.

use core::convert::Infallible;

use log::{debug, info, trace, warn};

use crate::config::{
    BACKGROUND_PRIORITY, DEFAULT_STACK_SIZE, DISPATCHER_THREAD_PRIORITY, TASK_THREAD_PRIORITY,
};
use crate::error::Error;
use crate::kernel::{Hooks, Kernel, LogHooks};
use crate::policy::Policy;
use crate::queue::OrderedList;
use crate::sync::Shared;
use crate::task::{
    Priority, Task, TaskBody, TaskId, TaskKind, TaskState, TaskTable, ThreadHandle, Tick,
};
use crate::wcrt;

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

pub struct Scheduler<K: Kernel, P: Policy, H: Hooks = LogHooks> {
    kernel: K,
    policy: P,
    hooks: H,

    tasks: TaskTable,

    /// Unfinished periodic releases, earliest absolute deadline first.
    deadlines: OrderedList<Tick>,

    /// Task the dispatcher last resumed.
    current: Option<TaskId>,

    /// Kernel thread running [`run`], once spawned.
    dispatcher: Option<ThreadHandle>,

    started: bool,
}

impl<K: Kernel, P: Policy, H: Hooks> Scheduler<K, P, H> {
    pub fn new(kernel: K, mut policy: P, hooks: H) -> Self {
        policy.setup();
        Self {
            kernel,
            policy,
            hooks,
            tasks: TaskTable::new(),
            deadlines: OrderedList::new(),
            current: None,
            dispatcher: None,
            started: false,
        }
    }

    /// Create the dispatcher thread at `DISPATCHER_THREAD_PRIORITY` and make
    /// it runnable. `body` must call [`run`] on the scheduler's [`Shared`]
    /// cell; it starts the scheduler once the kernel first switches to it.
    ///
    /// The thread is not bound to a task, so lifecycle callbacks ignore it.
    pub fn spawn_dispatcher(&mut self, body: TaskBody) -> Result<ThreadHandle, Error> {
        if self.started || self.dispatcher.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let Some(thread) = self.kernel.create_thread(
            body,
            "HST",
            DEFAULT_STACK_SIZE,
            DISPATCHER_THREAD_PRIORITY,
        ) else {
            warn!("kernel could not create the dispatcher thread");
            return Err(Error::ResourceExhausted);
        };
        self.kernel.resume(thread);
        self.dispatcher = Some(thread);
        debug!("dispatcher thread created");
        Ok(thread)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a task and create its (suspended) kernel thread.
    ///
    /// `period == 0` makes the task aperiodic; its deadline and WCET are then
    /// not checked. A periodic task needs `0 < wcet`, `0 < deadline <= period`.
    #[allow(clippy::too_many_arguments)]
    pub fn register_task(
        &mut self,
        body: TaskBody,
        name: &'static str,
        stack_depth: usize,
        priority: Priority,
        period: Tick,
        deadline: Tick,
        wcet: Tick,
    ) -> Result<TaskId, Error> {
        let kind = if period == 0 {
            TaskKind::Aperiodic
        } else {
            TaskKind::Periodic
        };
        self.register(kind, body, name, stack_depth, priority, period, deadline, wcet)
    }

    #[allow(clippy::too_many_arguments)]
    fn register(
        &mut self,
        kind: TaskKind,
        body: TaskBody,
        name: &'static str,
        stack_depth: usize,
        priority: Priority,
        period: Tick,
        deadline: Tick,
        wcet: Tick,
    ) -> Result<TaskId, Error> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        let timed = kind != TaskKind::Aperiodic;
        if timed && (period == 0 || wcet == 0 || deadline == 0 || deadline > period) {
            warn!(
                "{}: rejected T={} D={} C={}",
                name, period, deadline, wcet
            );
            return Err(Error::InvalidParameters);
        }
        if self.tasks.is_full() {
            return Err(Error::ResourceExhausted);
        }

        let Some(thread) = self
            .kernel
            .create_thread(body, name, stack_depth, TASK_THREAD_PRIORITY)
        else {
            warn!("{}: kernel could not create the thread", name);
            return Err(Error::ResourceExhausted);
        };

        let task = match kind {
            TaskKind::Sporadic => Task::sporadic(thread, name, priority, period, deadline, wcet),
            _ => Task::new(thread, name, priority, period, deadline, wcet),
        };
        let id = self.tasks.push(task)?;
        self.kernel.bind(thread, id);
        if self.tasks[id].is_periodic() {
            self.deadlines.insert(id, self.tasks[id].absolute_deadline);
        }
        self.policy.add_task(&self.tasks, id);

        debug!(
            "registered {} as task {} (prio={} T={} D={} C={})",
            name,
            id.index(),
            priority,
            period,
            deadline,
            wcet
        );
        Ok(id)
    }

    /// Register a periodic task with the default stack depth.
    pub fn register_periodic_task(
        &mut self,
        body: TaskBody,
        name: &'static str,
        priority: Priority,
        period: Tick,
        deadline: Tick,
        wcet: Tick,
    ) -> Result<TaskId, Error> {
        self.register_task(body, name, DEFAULT_STACK_SIZE, priority, period, deadline, wcet)
    }

    /// Register a sporadic task: released on demand, at most once every
    /// `min_interarrival` ticks. It is dispatched like an aperiodic task and
    /// takes no part in the response-time analysis.
    pub fn register_sporadic_task(
        &mut self,
        body: TaskBody,
        name: &'static str,
        priority: Priority,
        min_interarrival: Tick,
        deadline: Tick,
        wcet: Tick,
    ) -> Result<TaskId, Error> {
        self.register(
            TaskKind::Sporadic,
            body,
            name,
            DEFAULT_STACK_SIZE,
            priority,
            min_interarrival,
            deadline,
            wcet,
        )
    }

    /// Register a background task: no period, no deadline, no WCET, lowest
    /// priority.
    pub fn register_aperiodic_task(
        &mut self,
        body: TaskBody,
        name: &'static str,
    ) -> Result<TaskId, Error> {
        self.register_task(body, name, DEFAULT_STACK_SIZE, BACKGROUND_PRIORITY, 0, 0, 0)
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    /// Run the response-time analysis and the policy's start logic.
    ///
    /// On `Unschedulable` nothing is started; the caller may reconfigure. The
    /// dispatch loop itself is [`run`].
    pub fn start(&mut self) -> Result<(), Error> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        let order = self.policy.analysis_order(&self.tasks);
        wcrt::analyze(&mut self.tasks, &order)?;

        let now = self.kernel.tick_count();
        self.policy.start_logic(&mut self.tasks, now);
        self.hooks.on_start(&self.tasks);
        self.started = true;

        info!(
            "{} started at {} with {} tasks ({} periodic)",
            P::NAME,
            now,
            self.tasks.len(),
            order.len()
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick (ISR context)
    // -----------------------------------------------------------------------

    /// Per-tick bookkeeping. Call from the kernel's tick hook after the tick
    /// count was advanced.
    pub fn tick(&mut self) {
        if !self.started {
            return;
        }
        let now = self.kernel.tick_count();

        let running = self.current.filter(|&id| self.tasks[id].is_ready());
        if let Some(id) = running {
            let task = &mut self.tasks[id];
            task.executed_ticks = task.executed_ticks.saturating_add(1);
            if task.wcet > 0 && task.executed_ticks > task.wcet {
                self.hooks.on_wcet_overrun(task, now);
            }
        }

        // Sorted by deadline: stop at the first one still ahead.
        for (id, deadline) in self.deadlines.iter() {
            if deadline >= now {
                break;
            }
            self.hooks.on_deadline_miss(&self.tasks[id], now);
        }

        if self
            .policy
            .tick_logic(&mut self.tasks, running, now, &mut self.hooks)
            && self.kernel.notify_dispatcher_from_isr()
        {
            self.kernel.yield_from_isr();
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle callbacks (thread context)
    // -----------------------------------------------------------------------

    /// The task bound to `thread`, if it is the one currently dispatched
    /// and still `Ready`.
    fn running_task(&self, thread: ThreadHandle) -> Option<TaskId> {
        let id = self.kernel.bound_task(thread)?;
        (self.current == Some(id) && self.tasks[id].is_ready()).then_some(id)
    }

    fn leave_ready(&mut self, id: TaskId, state: TaskState) {
        let now = self.kernel.tick_count();
        self.tasks[id].state = state;
        self.policy.remove_from_ready(&mut self.tasks, id, now);
        if state == TaskState::Finished {
            self.deadlines.remove(id);
        }
        self.kernel.notify_dispatcher();
    }

    /// The running task finished its release.
    pub fn on_delay(&mut self, thread: ThreadHandle) {
        if let Some(id) = self.running_task(thread) {
            self.leave_ready(id, TaskState::Finished);
        }
    }

    /// The running task blocked on a resource.
    pub fn on_block(&mut self, thread: ThreadHandle) {
        if let Some(id) = self.running_task(thread) {
            self.leave_ready(id, TaskState::Blocked);
        }
    }

    /// The running task suspended itself. For an aperiodic task this ends
    /// the release.
    pub fn on_self_suspend(&mut self, thread: ThreadHandle) {
        if let Some(id) = self.running_task(thread) {
            let state = if self.tasks[id].is_periodic() {
                TaskState::Suspended
            } else {
                TaskState::Finished
            };
            self.leave_ready(id, state);
        }
    }

    /// The kernel made `thread` ready: a new release or an unblock.
    pub fn on_become_ready(&mut self, thread: ThreadHandle) {
        let Some(id) = self.kernel.bound_task(thread) else {
            return;
        };
        let now = self.kernel.tick_count();
        match self.tasks[id].state {
            TaskState::Ready => return,
            TaskState::Finished => {
                let task = &mut self.tasks[id];
                if task.kind == TaskKind::Sporadic
                    && task.release_count > 0
                    && now < task.release_time.saturating_add(task.period)
                {
                    warn!(
                        "{}: released {} ticks after the previous release (minimum {})",
                        task.name,
                        now - task.release_time,
                        task.period
                    );
                }
                task.begin_release(now);
                if task.is_periodic() {
                    self.deadlines.insert(id, task.absolute_deadline);
                }
            }
            TaskState::Blocked | TaskState::Suspended => {
                self.tasks[id].state = TaskState::Ready;
            }
        }
        self.policy.add_to_ready(&mut self.tasks, id, now);
        self.kernel.notify_dispatcher();
    }

    /// End the running periodic task's release.
    ///
    /// Returns the tick at which the next release begins; the caller must
    /// sleep until then. `None` means the next release was already due and
    /// has begun, so the caller carries on.
    pub fn wait_for_next_period(&mut self) -> Option<Tick> {
        let thread = self.kernel.current_thread();
        let id = self.running_task(thread)?;
        if !self.tasks[id].is_periodic() {
            warn!("{}: wait_for_next_period on an aperiodic task", self.tasks[id].name);
            return None;
        }

        let task = &mut self.tasks[id];
        task.release_time = task.release_time.saturating_add(task.period);
        let wake = task.release_time;
        self.on_delay(thread);

        if wake <= self.kernel.tick_count() {
            self.on_become_ready(thread);
            None
        } else {
            Some(wake)
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch (dispatcher thread)
    // -----------------------------------------------------------------------

    /// One dispatch cycle. Returns the task left running, if any.
    pub fn dispatch(&mut self) -> Option<TaskId> {
        self.kernel.suspend_all();
        let now = self.kernel.tick_count();

        if let Some(id) = self.current {
            let state = self.tasks[id].state;
            if state != TaskState::Ready {
                self.policy.remove_from_ready(&mut self.tasks, id, now);
                if state == TaskState::Finished {
                    self.deadlines.remove(id);
                }
            }
        }

        for (_, task) in self.tasks.iter() {
            if self.kernel.is_ready(task.handle) {
                self.kernel.suspend(task.handle);
            }
        }

        let previous = self.current;
        self.policy.schedule(&mut self.tasks, &mut self.current, now);
        if let Some(id) = self.current {
            self.kernel.resume(self.tasks[id].handle);
        }
        self.kernel.resume_all();

        if previous != self.current {
            trace!(
                "{}: {} -> {}",
                now,
                previous.map_or("idle", |id| self.tasks[id].name),
                self.current.map_or("idle", |id| self.tasks[id].name)
            );
        }
        self.current
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Every `Ready` task sits in exactly one ready container and no other
    /// task sits in any. The deadline list holds exactly the unfinished
    /// periodic releases, keyed by their current absolute deadline.
    pub fn check_invariants(&self) -> bool {
        let containers = self.tasks.iter().all(|(id, t)| {
            let expected = usize::from(t.is_ready());
            self.policy.ready_count(id) == expected
        });
        let deadlines = self.deadlines.is_sorted()
            && self.tasks.iter().all(|(id, t)| {
                let expected = t.is_periodic() && t.state != TaskState::Finished;
                match self.deadlines.key_of(id) {
                    Some(d) => expected && d == t.absolute_deadline,
                    None => !expected,
                }
            });
        containers && deadlines && self.policy.is_consistent(&self.tasks)
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn dispatcher(&self) -> Option<ThreadHandle> {
        self.dispatcher
    }

    pub fn deadlines(&self) -> &OrderedList<Tick> {
        &self.deadlines
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

// ---------------------------------------------------------------------------
// Thread entry points
// ---------------------------------------------------------------------------

/// Dispatcher thread body: start the scheduler, then dispatch every time
/// the notification is given. Returns only if starting fails.
pub fn run<K, P, H>(shared: &Shared<Scheduler<K, P, H>>) -> Result<Infallible, Error>
where
    K: Kernel + Clone,
    P: Policy,
    H: Hooks,
{
    let kernel = shared.with(|s| s.start().map(|()| s.kernel().clone()))??;
    loop {
        shared.with(|s| s.dispatch())?;
        kernel.wait_notification();
    }
}

/// End the calling periodic task's release and sleep until the next one.
pub fn wait_for_next_period<K, P, H>(shared: &Shared<Scheduler<K, P, H>>) -> Result<(), Error>
where
    K: Kernel + Clone,
    P: Policy,
    H: Hooks,
{
    let (kernel, wake) = shared.with(|s| (s.kernel().clone(), s.wait_for_next_period()))?;
    if let Some(wake) = wake {
        kernel.delay_until(wake);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
