//! Reentrancy guard for the tick path
//!
//! A single busy flag decides whether a tick notification may run a
//! scheduler + dispatcher pass. Acquisition is an atomic test-and-set, so the
//! guard stays race-free when notifications come from another execution
//! context (signal handler, timer thread, interrupt).
//!
//! The guard is released by dropping the [`GuardToken`], the same RAII shape
//! as a critical section.
//!
//! Ticks refused while the guard is held can be left with it as owed ticks.
//! Whoever next holds the guard takes them all at once.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Busy flag shared by the tick path and guarded registration
#[derive(Debug, Default)]
pub struct TickGuard {
    busy: AtomicBool,
    owed: AtomicU32,
}

impl TickGuard {
    /// Create a released guard
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            owed: AtomicU32::new(0),
        }
    }

    /// Take the guard if nobody holds it
    pub fn try_acquire(&self) -> Option<GuardToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GuardToken { guard: self })
    }

    /// Is a pass (or guarded registration) in flight?
    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Leave `ticks` for the current holder to serve after it lets go
    pub(crate) fn request_redelivery(&self, ticks: u32) {
        // Saturates instead of wrapping back to "nothing owed"
        let _ = self
            .owed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |owed| {
                Some(owed.saturating_add(ticks))
            });
    }

    /// Are ticks waiting to be served?
    pub(crate) fn has_redelivery(&self) -> bool {
        self.owed.load(Ordering::Acquire) > 0
    }

    /// Take every owed tick
    pub(crate) fn take_redelivery(&self) -> u32 {
        self.owed.swap(0, Ordering::AcqRel)
    }
}

/// Proof of holding the tick guard; releases it on drop
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a TickGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
