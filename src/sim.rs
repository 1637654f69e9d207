//! # Host simulation
//!
//! A deterministic single-core kernel implementing [`Kernel`], and a harness
//! that drives a real [`Scheduler`] tick by tick. Task bodies are modelled as
//! budgets: a periodic body works for a fixed number of ticks then calls
//! `wait_for_next_period`; a background body works for a burst, suspends
//! itself, and is resumed after a gap.
//!
//! One simulated tick, `[t, t + 1)`:
//!
//! 1. The only kernel-ready scheduled thread (if any) runs and is recorded.
//! 2. The tick count advances to `t + 1`.
//! 3. Sleeping threads whose wake time arrived are made ready.
//! 4. The scheduler's tick handler runs.
//! 5. The running body, if its work is done, ends its release.
//! 6. If the dispatcher was notified, one dispatch cycle runs.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use crate::kernel::{Hooks, Kernel};
use crate::policy::Policy;
use crate::scheduler::{self, Scheduler};
use crate::sync::{Notify, Shared};
use crate::task::{Slack, Task, TaskBody, TaskId, TaskState, TaskTable, ThreadHandle, Tick};

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Thread {
    name: &'static str,
    priority: u8,
    suspended: bool,
    sleeping_until: Option<Tick>,
    bound: Option<TaskId>,
}

#[derive(Default)]
struct State {
    now: Tick,
    threads: Vec<Thread>,
    running: Option<ThreadHandle>,
    notify: Notify,
    fail_next_spawn: bool,
    lock_depth: u32,
    yields: u32,
}

#[derive(Clone, Default)]
pub struct SimKernel {
    state: Rc<RefCell<State>>,
}

impl SimKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Tick {
        self.state.borrow().now
    }

    pub fn advance(&self) -> Tick {
        let mut s = self.state.borrow_mut();
        s.now += 1;
        s.now
    }

    /// Jump the tick count to `now` without running anything.
    pub fn set_now(&self, now: Tick) {
        self.state.borrow_mut().now = now;
    }

    pub fn fail_next_spawn(&self) {
        self.state.borrow_mut().fail_next_spawn = true;
    }

    pub fn thread_count(&self) -> usize {
        self.state.borrow().threads.len()
    }

    pub fn thread_name(&self, thread: ThreadHandle) -> &'static str {
        self.state.borrow().threads[thread.0].name
    }

    pub fn thread_priority(&self, thread: ThreadHandle) -> u8 {
        self.state.borrow().threads[thread.0].priority
    }

    pub fn is_suspended(&self, thread: ThreadHandle) -> bool {
        self.state.borrow().threads[thread.0].suspended
    }

    pub fn set_running(&self, thread: Option<ThreadHandle>) {
        self.state.borrow_mut().running = thread;
    }

    /// Scheduled threads the kernel could run right now.
    pub fn ready_threads(&self) -> Vec<ThreadHandle> {
        let s = self.state.borrow();
        (0..s.threads.len())
            .map(ThreadHandle)
            .filter(|&h| {
                let t = &s.threads[h.0];
                t.bound.is_some() && !t.suspended && t.sleeping_until.is_none()
            })
            .collect()
    }

    /// Wake every sleeper whose time has come. Returns the woken threads.
    pub fn wake_due(&self) -> Vec<ThreadHandle> {
        let mut s = self.state.borrow_mut();
        let now = s.now;
        let mut woken = Vec::new();
        for (i, t) in s.threads.iter_mut().enumerate() {
            if t.sleeping_until.is_some_and(|w| w <= now) {
                t.sleeping_until = None;
                woken.push(ThreadHandle(i));
            }
        }
        woken
    }

    /// The running thread suspends itself.
    pub fn self_suspend(&self, thread: ThreadHandle) {
        self.state.borrow_mut().threads[thread.0].suspended = true;
    }

    pub fn take_notifications(&self) -> u32 {
        self.state.borrow().notify.take_all()
    }

    pub fn pending_notifications(&self) -> u32 {
        self.state.borrow().notify.pending()
    }

    pub fn lock_depth(&self) -> u32 {
        self.state.borrow().lock_depth
    }

    pub fn yields(&self) -> u32 {
        self.state.borrow().yields
    }
}

impl Kernel for SimKernel {
    fn tick_count(&self) -> Tick {
        self.now()
    }

    fn create_thread(
        &self,
        _body: TaskBody,
        name: &'static str,
        _stack_depth: usize,
        priority: u8,
    ) -> Option<ThreadHandle> {
        let mut s = self.state.borrow_mut();
        if s.fail_next_spawn {
            s.fail_next_spawn = false;
            return None;
        }
        s.threads.push(Thread {
            name,
            priority,
            suspended: true,
            ..Thread::default()
        });
        Some(ThreadHandle(s.threads.len() - 1))
    }

    fn suspend(&self, thread: ThreadHandle) {
        self.state.borrow_mut().threads[thread.0].suspended = true;
    }

    fn resume(&self, thread: ThreadHandle) {
        self.state.borrow_mut().threads[thread.0].suspended = false;
    }

    fn current_thread(&self) -> ThreadHandle {
        self.state.borrow().running.expect("no running thread")
    }

    fn is_ready(&self, thread: ThreadHandle) -> bool {
        let s = self.state.borrow();
        let t = &s.threads[thread.0];
        !t.suspended && t.sleeping_until.is_none()
    }

    fn bind(&self, thread: ThreadHandle, task: TaskId) {
        self.state.borrow_mut().threads[thread.0].bound = Some(task);
    }

    fn bound_task(&self, thread: ThreadHandle) -> Option<TaskId> {
        self.state.borrow().threads.get(thread.0)?.bound
    }

    fn notify_dispatcher(&self) {
        self.state.borrow().notify.give();
    }

    fn notify_dispatcher_from_isr(&self) -> bool {
        self.state.borrow().notify.give();
        true
    }

    fn yield_from_isr(&self) {
        self.state.borrow_mut().yields += 1;
    }

    fn wait_notification(&self) {
        self.state.borrow().notify.take_all();
    }

    fn suspend_all(&self) {
        self.state.borrow_mut().lock_depth += 1;
    }

    fn resume_all(&self) {
        self.state.borrow_mut().lock_depth -= 1;
    }

    fn delay_until(&self, wake: Tick) {
        let mut s = self.state.borrow_mut();
        let running = s.running.expect("no running thread");
        s.threads[running.0].sleeping_until = Some(wake);
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Records every alarm instead of logging it.
#[derive(Debug, Default)]
pub struct Recorder {
    pub misses: Vec<(&'static str, Tick)>,
    pub overruns: Vec<(&'static str, Tick)>,
    pub negative_slack: Vec<(Tick, Slack)>,
    pub starts: u32,
}

impl Hooks for Recorder {
    fn on_deadline_miss(&mut self, task: &Task, tick: Tick) {
        self.misses.push((task.name, tick));
    }

    fn on_wcet_overrun(&mut self, task: &Task, tick: Tick) {
        self.overruns.push((task.name, tick));
    }

    fn on_negative_slack(&mut self, tick: Tick, slack: Slack) {
        self.negative_slack.push((tick, slack));
    }

    fn on_start(&mut self, _tasks: &TaskTable) {
        self.starts += 1;
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub extern "C" fn idle_body() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Body {
    /// Works `work` ticks per release, then waits for the next period.
    Periodic { work: Tick },
    /// Works `burst` ticks, suspends itself, and is resumed `gap` ticks later.
    Background { burst: Tick, gap: Tick },
}

pub type SimScheduler<P> = Scheduler<SimKernel, P, Recorder>;

pub struct Sim<P: Policy> {
    pub kernel: SimKernel,
    pub shared: Shared<SimScheduler<P>>,
    bodies: Vec<Body>,
    resume_at: Vec<Option<Tick>>,
    /// Task that held the processor during each tick `[t, t + 1)`.
    pub trace: Vec<Option<TaskId>>,
}

impl<P: Policy> Sim<P> {
    pub fn new(policy: P) -> Self {
        let kernel = SimKernel::new();
        let shared = Shared::new();
        shared.install(Scheduler::new(kernel.clone(), policy, Recorder::default()));
        Self {
            kernel,
            shared,
            bodies: Vec::new(),
            resume_at: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimScheduler<P>) -> R) -> R {
        self.shared.with(f).expect("scheduler installed")
    }

    /// Periodic task whose body uses exactly its WCET.
    pub fn periodic(
        &mut self,
        name: &'static str,
        priority: u8,
        period: Tick,
        deadline: Tick,
        wcet: Tick,
    ) -> TaskId {
        self.periodic_with_work(name, priority, period, deadline, wcet, wcet)
    }

    pub fn periodic_with_work(
        &mut self,
        name: &'static str,
        priority: u8,
        period: Tick,
        deadline: Tick,
        wcet: Tick,
        work: Tick,
    ) -> TaskId {
        let id = self
            .with(|s| s.register_periodic_task(idle_body, name, priority, period, deadline, wcet))
            .expect("registration");
        self.push_body(id, Body::Periodic { work });
        id
    }

    pub fn background(&mut self, name: &'static str, burst: Tick, gap: Tick) -> TaskId {
        let id = self
            .with(|s| s.register_aperiodic_task(idle_body, name))
            .expect("registration");
        self.push_body(id, Body::Background { burst, gap });
        id
    }

    fn push_body(&mut self, id: TaskId, body: Body) {
        assert_eq!(id.index(), self.bodies.len());
        self.bodies.push(body);
        self.resume_at.push(None);
    }

    /// Start the scheduler and run the first dispatch, as the dispatcher
    /// thread does.
    pub fn start(&mut self) {
        self.with(|s| s.start()).expect("schedulable");
        self.kernel.take_notifications();
        self.with(|s| s.dispatch());
        assert!(self.with(|s| s.check_invariants()));
    }

    fn thread_of(&self, id: TaskId) -> ThreadHandle {
        self.with(|s| s.tasks()[id].handle)
    }

    /// Simulate one tick.
    pub fn step(&mut self) {
        // 1. run
        let ready = self.kernel.ready_threads();
        assert!(ready.len() <= 1, "several scheduled threads ready: {:?}", ready);
        let running = ready.first().copied();
        let running_task = running.and_then(|h| self.kernel.bound_task(h));
        self.kernel.set_running(running);
        self.trace.push(running_task);

        // 2. advance
        let now = self.kernel.advance();

        // 3. wake
        for thread in self.kernel.wake_due() {
            self.with(|s| s.on_become_ready(thread));
        }
        for i in 0..self.resume_at.len() {
            if self.resume_at[i].is_some_and(|at| at <= now) {
                self.resume_at[i] = None;
                let thread = self.thread_of(TaskId::new(i));
                self.kernel.resume(thread);
                self.with(|s| s.on_become_ready(thread));
            }
        }

        // 4. tick
        self.with(|s| s.tick());

        // 5. body
        if let (Some(id), Some(thread)) = (running_task, running) {
            let (state, executed, current) =
                self.with(|s| (s.tasks()[id].state, s.tasks()[id].executed_ticks, s.current()));
            if state == TaskState::Ready && current == Some(id) {
                match self.bodies[id.index()] {
                    Body::Periodic { work } if executed >= work => {
                        scheduler::wait_for_next_period(&self.shared).expect("installed");
                    }
                    Body::Background { burst, gap } if executed >= burst => {
                        self.kernel.self_suspend(thread);
                        self.with(|s| s.on_self_suspend(thread));
                        self.resume_at[id.index()] = Some(now + gap);
                    }
                    _ => {}
                }
            }
        }
        self.kernel.set_running(None);

        // 6. dispatch
        if self.kernel.take_notifications() > 0 {
            self.with(|s| s.dispatch());
        }
        assert_eq!(self.kernel.lock_depth(), 0);
        assert!(self.with(|s| s.check_invariants()), "invariants broken at {}", now);
    }

    pub fn run(&mut self, ticks: Tick) {
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn hooks<R>(&self, f: impl FnOnce(&Recorder) -> R) -> R {
        self.with(|s| f(s.hooks()))
    }
}

// ---------------------------------------------------------------------------
// End-to-end tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DualPriority, EarliestDeadlineFirst, RateMonotonic, SlackStealing};

    /// Plain fixed-priority simulation: every job released at `k·T`, the
    /// highest priority pending job runs each tick. `(priority, period, wcet)`.
    fn reference_fixed_priority(tasks: &[(u8, Tick, Tick)], ticks: Tick) -> Vec<Option<usize>> {
        let mut remaining = vec![0; tasks.len()];
        let mut trace = Vec::new();
        for t in 0..ticks {
            for (i, &(_, period, wcet)) in tasks.iter().enumerate() {
                if t % period == 0 {
                    remaining[i] += wcet;
                }
            }
            let pick = (0..tasks.len())
                .filter(|&i| remaining[i] > 0)
                .min_by_key(|&i| (tasks[i].0, i));
            if let Some(i) = pick {
                remaining[i] -= 1;
            }
            trace.push(pick);
        }
        trace
    }

    fn indices(trace: &[Option<TaskId>]) -> Vec<Option<usize>> {
        trace.iter().map(|t| t.map(TaskId::index)).collect()
    }

    #[test]
    fn test_rm_matches_reference_over_hyperperiod() {
        let set = [(1, 3000, 1000), (2, 4000, 1000), (3, 6000, 2000), (4, 12000, 1000)];
        let mut sim = Sim::new(RateMonotonic::new());
        for (i, &(prio, period, wcet)) in set.iter().enumerate() {
            sim.periodic(["T1", "T2", "T3", "T4"][i], prio, period, period, wcet);
        }
        sim.start();

        let wcrt: Vec<Tick> = sim.with(|s| s.tasks().iter().map(|(_, t)| t.wcrt).collect());
        assert_eq!(wcrt, [1000, 2000, 6000, 12000]);

        sim.run(12000);

        assert_eq!(indices(&sim.trace), reference_fixed_priority(&set, 12000));
        sim.hooks(|h| {
            assert!(h.misses.is_empty(), "{:?}", h.misses);
            assert!(h.overruns.is_empty(), "{:?}", h.overruns);
            assert_eq!(h.starts, 1);
        });
        let releases: Vec<u32> = sim.with(|s| s.tasks().iter().map(|(_, t)| t.release_count).collect());
        assert_eq!(releases, [4, 3, 2, 1]);
    }

    #[test]
    fn test_rm_wcet_equal_to_deadline_never_misses() {
        let mut sim = Sim::new(RateMonotonic::new());
        let a = sim.periodic("A", 0, 10, 5, 5);
        sim.start();
        assert_eq!(sim.with(|s| s.tasks()[a].wcrt), 5);

        sim.run(100);
        sim.hooks(|h| assert!(h.misses.is_empty()));
        let busy = sim.trace.iter().filter(|t| t.is_some()).count();
        assert_eq!(busy, 50);
    }

    #[test]
    fn test_overrun_and_miss_are_reported() {
        let mut sim = Sim::new(RateMonotonic::new());
        sim.periodic_with_work("late", 0, 10, 4, 2, 6);
        sim.start();
        sim.run(10);

        sim.hooks(|h| {
            // Executed ticks 3..=6 exceed the budget of 2.
            assert_eq!(h.overruns, [("late", 3), ("late", 4), ("late", 5), ("late", 6)]);
            // Unfinished after tick 4: reported at 5 and 6.
            assert_eq!(h.misses, [("late", 5), ("late", 6)]);
        });
    }

    #[test]
    fn test_edf_runs_earliest_deadline() {
        // RM would starve B until A finishes; EDF runs B first (deadline 3).
        let mut sim = Sim::new(EarliestDeadlineFirst::new());
        let a = sim.periodic("A", 0, 10, 10, 3);
        let b = sim.periodic("B", 1, 10, 3, 2);
        sim.start();
        sim.run(10);

        assert_eq!(&sim.trace[..5], &[Some(b), Some(b), Some(a), Some(a), Some(a)]);
        sim.hooks(|h| assert!(h.misses.is_empty()));
    }

    #[test]
    fn test_dual_priority_promotions() {
        // Background work keeps both periodic tasks waiting in the lower
        // band until they are promoted.
        let mut sim = Sim::new(DualPriority::new());
        let t1 = sim.periodic("T1", 0, 4, 4, 1);
        let t2 = sim.periodic("T2", 1, 6, 6, 2);
        let bg = sim.background("BG", 1000, 1);
        sim.start();

        let (r1, r2) = sim.with(|s| (s.tasks()[t1].wcrt, s.tasks()[t2].wcrt));
        assert_eq!((r1, r2), (1, 3));

        // (task, release_time, tick) of each promotion observed.
        let mut promotions: Vec<(TaskId, Tick, Tick)> = Vec::new();
        let mut upper = [false, false];
        let mut both_upper = 0;
        for _ in 0..48 {
            sim.step();
            let now = sim.kernel.now();
            for (i, id) in [t1, t2].into_iter().enumerate() {
                let (in_upper, release) =
                    sim.with(|s| (s.tasks()[id].in_upper_band(), s.tasks()[id].release_time));
                if in_upper && !upper[i] {
                    promotions.push((id, release, now));
                }
                upper[i] = in_upper;
            }
            let both = sim.with(|s| {
                [t1, t2]
                    .iter()
                    .all(|&id| s.tasks()[id].in_upper_band() && s.tasks()[id].is_ready())
            });
            if both {
                both_upper += 1;
                assert_eq!(sim.with(|s| s.current()), Some(t1), "T2 ran over T1 at {}", now);
            }
        }

        assert_eq!(sim.trace[0], Some(bg));
        assert!(both_upper > 0);
        for &(id, release, at) in &promotions {
            let offset = if id == t1 { 4 - r1 } else { 6 - r2 };
            assert_eq!(at, release + offset, "{:?} promoted at {}", id, at);
        }

        // Every release in [0, 48) is promoted once.
        let mut per_release = promotions.clone();
        per_release.sort();
        per_release.dedup_by_key(|p| (p.0, p.1));
        assert_eq!(per_release.len(), promotions.len());
        assert_eq!(promotions.iter().filter(|p| p.0 == t1).count(), 12);
        assert_eq!(promotions.iter().filter(|p| p.0 == t2).count(), 8);
        sim.hooks(|h| assert!(h.misses.is_empty(), "{:?}", h.misses));
    }

    #[test]
    fn test_dual_priority_without_background_is_rate_monotonic() {
        let mut sim = Sim::new(DualPriority::new());
        sim.periodic("T1", 0, 4, 4, 1);
        sim.periodic("T2", 1, 6, 6, 2);
        sim.start();
        sim.run(24);

        assert_eq!(indices(&sim.trace), reference_fixed_priority(&[(0, 4, 1), (1, 6, 2)], 24));
        sim.hooks(|h| assert!(h.misses.is_empty()));
    }

    #[test]
    fn test_slack_stealing_serves_background_without_misses() {
        let mut sim = Sim::new(SlackStealing::new());
        let t1 = sim.periodic("T1", 0, 4, 4, 1);
        let t2 = sim.periodic("T2", 1, 6, 6, 2);
        let bg = sim.background("BG", 1000, 1);
        sim.start();
        assert_eq!(sim.with(|s| s.policy().available_slack()), 2);

        sim.run(48);

        assert_eq!(
            &sim.trace[..6],
            &[Some(bg), Some(bg), Some(t1), Some(t2), Some(t1), Some(t2)]
        );
        let served = sim.trace.iter().filter(|&&t| t == Some(bg)).count();
        assert_eq!(served, 20);
        sim.hooks(|h| {
            assert!(h.misses.is_empty(), "{:?}", h.misses);
            assert!(h.negative_slack.is_empty(), "{:?}", h.negative_slack);
        });
    }

    #[test]
    fn test_slack_stealing_with_cached_k() {
        let mut sim = Sim::new(SlackStealing::with_slack_k(true));
        sim.periodic("T1", 0, 4, 4, 1);
        sim.periodic("T2", 1, 6, 6, 2);
        let bg = sim.background("BG", 1000, 1);
        sim.start();
        sim.run(48);

        assert!(sim.trace.iter().filter(|&&t| t == Some(bg)).count() > 0);
        sim.hooks(|h| {
            assert!(h.misses.is_empty(), "{:?}", h.misses);
            assert!(h.negative_slack.is_empty());
        });
    }

    #[test]
    fn test_slack_stealing_idle_without_background() {
        let mut sim = Sim::new(SlackStealing::new());
        sim.periodic("T1", 0, 4, 4, 1);
        sim.periodic("T2", 1, 6, 6, 2);
        sim.start();
        sim.run(12);

        assert_eq!(indices(&sim.trace), reference_fixed_priority(&[(0, 4, 1), (1, 6, 2)], 12));
        sim.hooks(|h| assert!(h.negative_slack.is_empty()));
    }
}
