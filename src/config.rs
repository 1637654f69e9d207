//! # HST Configuration
//!
//! Compile-time constants governing the scheduler and its kernel port.
//! All limits are fixed at compile time. There is no dynamic allocation.

use crate::task::{Priority, Slack};

/// Maximum number of scheduled tasks (periodic and aperiodic together).
/// Bounds the task table and every ready container.
pub const MAX_TASKS: usize = 16;

/// SysTick frequency in Hz. One scheduler tick per SysTick interrupt.
pub const TICK_HZ: u32 = 1000;

/// Core clock of the NUCLEO-F411RE (STM32F411 at 100 MHz).
pub const SYSTEM_CLOCK_HZ: u32 = 100_000_000;

/// Stack depth, in words, handed to the kernel for each scheduled thread.
pub const DEFAULT_STACK_SIZE: usize = 256;

/// Kernel priority shared by every scheduled thread. The dispatcher alone
/// decides which of them runs by suspending all but one.
pub const TASK_THREAD_PRIORITY: u8 = 1;

/// Kernel priority of the dispatcher thread. Must be above
/// `TASK_THREAD_PRIORITY` so a notification preempts the running task.
pub const DISPATCHER_THREAD_PRIORITY: u8 = 2;

/// Static priority assigned to aperiodic tasks by
/// [`Scheduler::register_aperiodic_task`](crate::scheduler::Scheduler::register_aperiodic_task).
/// Lower value = higher priority, so background work sorts last.
pub const BACKGROUND_PRIORITY: Priority = Priority::MAX;

/// Slack-Stealing: background work is only dispatched while the available
/// slack is strictly above this value.
pub const MIN_SLACK: Slack = 0;

/// Slack-Stealing: when set, a finished release restores the slack computed
/// at the critical instant instead of recomputing it. Cheaper, less exact.
pub const USE_SLACK_K: bool = false;
