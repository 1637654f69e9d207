//! # Slack analysis
//!
//! Per-task slack for the Slack-Stealing policy (Davis, Tindell & Burns,
//! "Scheduling slack time in fixed priority pre-emptive systems", RTSS 1993).
//!
//! The slack of a periodic task τ at instant `now` is the largest number of
//! ticks that can be given to background work before τ's deadline `Di`
//! without τ or any task ahead of it in priority order missing a deadline.
//! It is the maximum, over check-points `t` in `[Ti, Di]`, of
//!
//! ```text
//! slack(t) = t − now − W(t) + done(now)
//! ```
//!
//! where `W(t)` is the demand released in `[0, t)` by τ and every task ahead
//! of it, and `done(now)` is the part of that demand already served. The
//! check-points are `Di` itself and the release instants of higher-priority
//! tasks inside `[Ti, Di)`.
//!
//! All functions take the periodic tasks in priority order (`order[0]` is the
//! highest) and a position in that order.

use crate::task::{Slack, SlackInfo, TaskId, TaskState, TaskTable, Tick};
use crate::wcrt::ceil_div;

#[inline]
fn clamp(v: i128) -> Slack {
    v.clamp(i128::from(Slack::MIN), i128::from(Slack::MAX)) as Slack
}

fn info(table: &TaskTable, id: TaskId) -> SlackInfo {
    table[id].slack_info().copied().unwrap_or_default()
}

/// Demand released in `[0, t)` by the tasks at positions `0..=pos`.
fn demand(table: &TaskTable, order: &[TaskId], pos: usize, t: Tick) -> i128 {
    order[..=pos]
        .iter()
        .map(|&id| {
            let task = &table[id];
            i128::from(ceil_div(t, task.period)) * i128::from(task.wcet)
        })
        .sum()
}

/// Work already served, at `now`, for the tasks at positions `0..=pos`.
///
/// Every release before the current one counts in full. The current release
/// counts in full once finished (any unused budget is handed out separately
/// by [`gain`]), otherwise only the ticks it has executed so far.
fn served(table: &TaskTable, order: &[TaskId], pos: usize, now: Tick) -> i128 {
    if now == 0 {
        return 0;
    }
    order[..=pos]
        .iter()
        .map(|&id| {
            let task = &table[id];
            let earlier = i128::from(task.release_count) * i128::from(task.wcet);
            let current = if task.state == TaskState::Finished {
                task.wcet
            } else {
                task.executed_ticks.min(task.wcet)
            };
            earlier + i128::from(current)
        })
        .sum()
}

#[inline]
fn slack_at(table: &TaskTable, order: &[TaskId], pos: usize, now: Tick, t: Tick, done: i128) -> i128 {
    i128::from(t) - i128::from(now) - demand(table, order, pos, t) + done
}

/// Compute the slack of the task at `order[pos]` for the interval ending at
/// its next deadline, and store `Di`, slack and `Ttma` in its record.
///
/// At `now == 0` the critical instant is analysed (`Di` is the relative
/// deadline). Otherwise `Di` is `release_time + relative_deadline`, so the
/// caller must have advanced `release_time` to the release being analysed.
pub fn calculate(table: &mut TaskTable, order: &[TaskId], pos: usize, now: Tick) {
    let id = order[pos];
    let (release, deadline, wcet) = {
        let t = &table[id];
        (t.release_time, t.relative_deadline, t.wcet)
    };
    let (xi, di) = if now > 0 {
        (release, release.saturating_add(deadline))
    } else {
        (0, deadline)
    };

    let (slack, ttma) = if pos == 0 {
        (i128::from(di) - i128::from(now) - i128::from(wcet), di)
    } else {
        search(table, order, pos, now, xi, di)
    };

    if let Some(info) = table[id].slack_info_mut() {
        info.di = di;
        info.slack = clamp(slack);
        info.ttma = ttma;
    }
}

/// Maximum slack over the check-points of `[Ti, Di]` for a task that has
/// at least one task ahead of it.
fn search(
    table: &TaskTable,
    order: &[TaskId],
    pos: usize,
    now: Tick,
    xi: Tick,
    di: Tick,
) -> (i128, Tick) {
    let task = &table[order[pos]];
    let wcet = i128::from(task.wcet);

    let hp = &table[order[pos - 1]];
    let hp_info = info(table, order[pos - 1]);
    let hp_end = hp_info.di.saturating_add(hp.wcet);

    // Corollary 2: the next higher task's busy interval covers ours.
    if hp_end >= di && di >= hp_info.ttma {
        return (i128::from(hp_info.slack) - wcet, hp_info.ttma);
    }

    // Theorem 3: no check-point before Di − R + C can hold the maximum.
    let mut ti = xi
        .saturating_add(task.relative_deadline)
        .saturating_sub(task.wcrt)
        .saturating_add(task.wcet);
    let mut kmax: i128 = 0;
    let mut tmax: Tick = Tick::MAX;

    // Corollary 1: the higher task's result bounds the start of the search.
    if hp_end >= ti && hp_end <= di {
        ti = hp_end;
        kmax = i128::from(hp_info.slack) - wcet;
        tmax = hp_info.ttma;
    }

    let done = served(table, order, pos, now);

    let k = slack_at(table, order, pos, now, di, done);
    if k > kmax {
        kmax = k;
        tmax = di;
    } else if k == kmax && di < tmax {
        tmax = di;
    }

    for &hid in order[..pos].iter().rev() {
        let period = table[hid].period;
        let mut t = ceil_div(ti, period).saturating_mul(period);
        while t < di {
            let k = slack_at(table, order, pos, now, t, done);
            if k > kmax {
                kmax = k;
                tmax = t;
            } else if k == kmax && t < tmax {
                tmax = t;
            }
            t = t.saturating_add(period);
        }
    }

    (kmax, tmax)
}

/// Minimum slack over all periodic tasks. With no periodic tasks nothing
/// can be endangered and the result is `Slack::MAX`.
pub fn available(table: &TaskTable, order: &[TaskId]) -> Slack {
    order
        .iter()
        .map(|&id| info(table, id).slack)
        .min()
        .unwrap_or(Slack::MAX)
}

fn decrement(table: &mut TaskTable, ids: &[TaskId], ticks: Tick) {
    let ticks = clamp(i128::from(ticks));
    for &id in ids {
        if let Some(info) = table[id].slack_info_mut() {
            if info.slack > 0 {
                info.slack -= ticks;
            }
        }
    }
}

/// Background work or idle time consumed `ticks`: every task loses slack.
pub fn decrement_all(table: &mut TaskTable, order: &[TaskId], ticks: Tick) {
    decrement(table, order, ticks);
}

/// The task at `order[pos]` ran for `ticks`: only the tasks ahead of it lose
/// slack, since its execution is already part of everyone else's demand.
pub fn decrement_higher(table: &mut TaskTable, order: &[TaskId], pos: usize, ticks: Tick) {
    decrement(table, &order[..pos], ticks);
}

/// The task at `order[pos]` finished `ticks` under its WCET: every task
/// strictly behind it gains that much slack.
pub fn gain(table: &mut TaskTable, order: &[TaskId], pos: usize, ticks: Tick) {
    let ticks = clamp(i128::from(ticks));
    for &id in &order[pos + 1..] {
        if let Some(info) = table[id].slack_info_mut() {
            info.slack = info.slack.saturating_add(ticks);
        }
    }
}
