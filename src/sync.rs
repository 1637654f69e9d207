//! # Synchronization Primitives
//!
//! The tick interrupt and the dispatcher thread share one `Scheduler`. Every
//! access goes through a critical section, provided by the `critical-section`
//! crate: on target by `cortex-m`'s single-core implementation, on the host
//! by its `std` implementation.

use core::cell::{Cell, RefCell};

use ::critical_section::{CriticalSection, Mutex};

use crate::error::Error;

/// Run `f` with interrupts masked.
///
/// Keep the closure short: it adds directly to interrupt latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

// ---------------------------------------------------------------------------
// Shared slot
// ---------------------------------------------------------------------------

/// A `static`-friendly slot for a value used from both thread and ISR
/// context.
///
/// ```ignore
/// static HST: Shared<Scheduler<Port, RateMonotonic>> = Shared::new();
///
/// HST.install(Scheduler::new(Port, RateMonotonic::new(), LogHooks));
/// HST.with(|s| s.register_periodic_task(body, "T1", 1, 3000, 3000, 1000))??;
/// ```
pub struct Shared<T> {
    slot: Mutex<RefCell<Option<T>>>,
}

impl<T> Shared<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    /// Store `value`, returning the previous occupant.
    pub fn install(&self, value: T) -> Option<T> {
        critical_section(|cs| self.slot.borrow(cs).replace(Some(value)))
    }

    pub fn take(&self) -> Option<T> {
        critical_section(|cs| self.slot.borrow(cs).take())
    }

    pub fn is_installed(&self) -> bool {
        critical_section(|cs| self.slot.borrow(cs).borrow().is_some())
    }

    /// Run `f` on the stored value inside a critical section.
    ///
    /// Fails with `NotInstalled` if the slot is empty and with `Busy` if the
    /// value is already borrowed by an enclosing `with` (a kernel callback
    /// re-entering the scheduler).
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, Error> {
        critical_section(|cs| {
            let mut slot = self.slot.borrow(cs).try_borrow_mut().map_err(|_| Error::Busy)?;
            slot.as_mut().map(f).ok_or(Error::NotInstalled)
        })
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Counting notification
// ---------------------------------------------------------------------------

/// ISR-safe counting notification: `give` increments, `take` decrements if
/// non-zero. For kernels without a native task notification.
pub struct Notify {
    count: Mutex<Cell<u32>>,
}

impl Notify {
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
        }
    }

    /// Safe from ISR context.
    pub fn give(&self) {
        critical_section(|cs| {
            let c = self.count.borrow(cs);
            c.set(c.get().saturating_add(1));
        });
    }

    /// Consume one notification. `false` if none was pending.
    pub fn take(&self) -> bool {
        critical_section(|cs| {
            let c = self.count.borrow(cs);
            match c.get() {
                0 => false,
                n => {
                    c.set(n - 1);
                    true
                }
            }
        })
    }

    /// Consume every pending notification and return how many there were.
    pub fn take_all(&self) -> u32 {
        critical_section(|cs| self.count.borrow(cs).replace(0))
    }

    pub fn pending(&self) -> u32 {
        critical_section(|cs| self.count.borrow(cs).get())
    }
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}
