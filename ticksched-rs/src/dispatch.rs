//! Dispatcher
//!
//! Runs right after the scheduler in the same context. Ready slots are invoked
//! synchronously in ascending slot order, each to completion before the next
//! one starts. There is no preemption: a lower slot number only means "runs
//! earlier in the pass".
//!
//! A failing task never takes the pass down with it. The fault is counted and
//! logged, the slot's bookkeeping (pending clear, one-shot removal) still
//! completes, and the scan moves on.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::log::{sched_error, sched_trace, sched_warn};
use crate::table::{table_corrupted, TaskTable};
use crate::task::Callable;
use crate::types::*;
use heapless::Vec;

// ============================================================================
// Running Slot Marker
// ============================================================================

/// Slot currently executing, readable from any context
///
/// Also serves as the dispatch bound: a pass only scans slots below the value
/// captured when it starts. Idle is out of range, so an idle pass scans the
/// whole table.
#[derive(Debug)]
pub struct RunningSlot(AtomicUsize);

impl RunningSlot {
    const IDLE: usize = usize::MAX;

    /// Marker with no slot running
    pub const fn new() -> Self {
        Self(AtomicUsize::new(Self::IDLE))
    }

    /// Slot currently executing, if any
    pub fn get(&self) -> Option<SlotIndex> {
        match self.0.load(Ordering::Acquire) {
            Self::IDLE => None,
            index => Some(SlotIndex::new(index)),
        }
    }

    fn bound(&self, capacity: usize) -> usize {
        self.0.load(Ordering::Acquire).min(capacity)
    }

    // Single writer (the guarded pass), so load + store is enough
    fn enter(&self, index: usize) -> usize {
        let previous = self.0.load(Ordering::Relaxed);
        self.0.store(index, Ordering::Release);
        previous
    }

    fn restore(&self, previous: usize) {
        self.0.store(previous, Ordering::Release);
    }
}

impl Default for RunningSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Dispatch Report
// ============================================================================

/// What one dispatch pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport<const N: usize> {
    /// Slots invoked, in invocation order
    pub invoked: Vec<SlotIndex, N>,
    /// Invocations that returned a fault or panicked
    pub faulted: u32,
    /// One-shot slots freed
    pub retired: u32,
    /// Activations beyond the first one folded into a single invocation
    pub overruns: u32,
}

impl<const N: usize> DispatchReport<N> {
    /// Was the slot invoked in this pass?
    pub fn ran(&self, slot: SlotIndex) -> bool {
        self.invoked.contains(&slot)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Invokes ready slots in slot order
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// Create a dispatcher
    pub const fn new() -> Self {
        Self
    }

    /// Invoke every ready slot below the running marker
    pub fn dispatch<C: Callable, const N: usize>(
        &self,
        table: &mut TaskTable<C, N>,
        running: &RunningSlot,
    ) -> DispatchReport<N> {
        let mut report = DispatchReport::default();
        let bound = running.bound(N);

        for index in 0..bound {
            let slot = table.slot_mut(index);
            if slot.pending == 0 {
                continue;
            }

            let activations = core::mem::take(&mut slot.pending);
            report.overruns += activations - 1;

            let previous = running.enter(index);
            let outcome = match slot.callable.as_mut() {
                Some(callable) => invoke(callable),
                // Activations on a free slot
                None => table_corrupted(index),
            };
            running.restore(previous);

            // Cannot overflow: each index below N is visited once
            let _ = report.invoked.push(SlotIndex::new(index));

            if let Err(fault) = outcome {
                report.faulted += 1;
                match fault {
                    TaskFault::Panicked => sched_error!("slot {} panicked", index),
                    _ => sched_warn!("slot {} failed: {}", index, fault),
                }
            }

            if slot.is_one_shot() {
                slot.release();
                report.retired += 1;
                sched_trace!("slot {} retired", index);
            }
        }

        report
    }
}

/// Run one task body, turning a panic into a fault where unwinding exists
fn invoke<C: Callable>(callable: &mut C) -> TaskResult {
    #[cfg(feature = "std")]
    {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        catch_unwind(AssertUnwindSafe(|| callable.invoke())).unwrap_or(Err(TaskFault::Panicked))
    }

    #[cfg(not(feature = "std"))]
    {
        callable.invoke()
    }
}
