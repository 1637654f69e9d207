//! # Cortex-M4 Port Layer
//!
//! Tick and context-switch plumbing for an ARM Cortex-M4 (NUCLEO-F411RE).
//! The kernel owns the actual context switch; this module only programs the
//! SysTick timer, sets the exception priorities the dispatcher relies on,
//! and forwards the tick into the shared scheduler.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xFF (lowest). Runs the scheduler's tick handler.
//! - PendSV: 0xFF (lowest). Performs the deferred switch to the dispatcher
//!   thread after a tick that woke it.
//!
//! A kernel port implements `Kernel::yield_from_isr` with [`trigger_pendsv`]
//! and calls [`systick_handler`] from its tick hook.

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use log::error;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::{Hooks, Kernel};
use crate::policy::Policy;
use crate::scheduler::Scheduler;
use crate::sync::Shared;

/// Lowest exception priority on a 4-bit priority implementation.
const LOWEST_PRIORITY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Program SysTick to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Put SysTick and PendSV at the lowest priority so the tick handler never
/// delays an application interrupt.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: lowering these two priorities cannot break a priority-based
    // critical section; both handlers only take the `critical-section` lock.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, LOWEST_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, LOWEST_PRIORITY);
    }
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Request a context switch on exit from the current exception.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Tick entry point
// ---------------------------------------------------------------------------

/// Forward one kernel tick into the scheduler. Call from the kernel's tick
/// hook, after the tick count was incremented.
pub fn systick_handler<K, P, H>(shared: &Shared<Scheduler<K, P, H>>)
where
    K: Kernel,
    P: Policy,
    H: Hooks,
{
    if let Err(e) = shared.with(|s| s.tick()) {
        error!("tick dropped: {}", e);
    }
}
