//! # Response-Time Analysis
//!
//! Offline worst-case response-time computation for fixed-priority periodic
//! tasks with constrained deadlines, run once by `Scheduler::start()`.
//!
//! For tasks sorted highest priority first, the response time of task *i* is
//! the least fixed point of
//!
//! ```text
//! R = C_i + Σ_{j < i} ⌈R / T_j⌉ · C_j
//! ```
//!
//! The iteration for task *i* starts from `R_{i-1} + C_i` (Sjödin & Hansson,
//! "Improved Response-Time Analysis Calculations", RTSS 1998), a lower bound
//! on `R_i` that skips most of the early iterations, and stops as soon as `R`
//! exceeds the deadline.

use log::{debug, error};

use crate::error::Error;
use crate::task::{TaskId, TaskTable, Tick};

/// Timing parameters of one task, in analysis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub wcet: Tick,
    pub period: Tick,
    pub deadline: Tick,
}

#[inline]
pub(crate) fn ceil_div(x: Tick, y: Tick) -> Tick {
    x / y + Tick::from(x % y != 0)
}

/// Interference of `higher` on a busy period of length `t`, plus `wcet`.
fn workload(t: Tick, wcet: Tick, higher: &[Params]) -> Tick {
    higher.iter().fold(wcet, |w, hp| {
        w.saturating_add(ceil_div(t, hp.period).saturating_mul(hp.wcet))
    })
}

/// Response time of `tasks[i]`, starting the fixed-point search at `start`.
///
/// Returns `Err(r)` with the first busy-period length beyond the deadline
/// if no fixed point exists at or below it.
pub fn response_time(tasks: &[Params], i: usize, start: Tick) -> Result<Tick, Tick> {
    let task = tasks[i];
    let higher = &tasks[..i];
    let mut t = start;

    while t <= task.deadline {
        let w = workload(t, task.wcet, higher);
        if w == t {
            return Ok(t);
        }
        t = w;
    }
    Err(t)
}

/// Run the analysis over the periodic tasks of `table`, in `order`
/// (highest priority first), and store each task's `wcrt`.
///
/// Tasks earlier in `order` keep the response time computed for them even
/// when a later task fails.
pub fn analyze(table: &mut TaskTable, order: &[TaskId]) -> Result<(), Error> {
    let mut params: heapless::Vec<Params, { crate::config::MAX_TASKS }> = heapless::Vec::new();
    for &id in order {
        let t = &table[id];
        params
            .push(Params {
                wcet: t.wcet,
                period: t.period,
                deadline: t.relative_deadline,
            })
            .map_err(|_| Error::ResourceExhausted)?;
    }

    let mut previous: Tick = 0;
    for (i, &id) in order.iter().enumerate() {
        let start = previous.saturating_add(params[i].wcet);
        match response_time(&params, i, start) {
            Ok(r) => {
                table[id].wcrt = r;
                debug!(
                    "wcrt: {} C={} T={} D={} R={}",
                    table[id].name, params[i].wcet, params[i].period, params[i].deadline, r
                );
                previous = r;
            }
            Err(r) => {
                error!(
                    "wcrt: {} cannot meet its deadline ({} > {})",
                    table[id].name, r, params[i].deadline
                );
                return Err(Error::Unschedulable { task: id, response: r });
            }
        }
    }
    Ok(())
}
