//! Kernel counters
//!
//! Counters live outside the guarded task table so they can be read from any
//! context, including a task body running inside a pass.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::dispatch::{DispatchReport, RunningSlot};
use crate::types::SlotIndex;

/// Snapshot of the kernel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct KernelStats {
    /// Ticks that ran a pass (including redelivered ones)
    pub accepted_ticks: u32,
    /// Ticks discarded because a pass was in flight
    pub dropped_ticks: u32,
    /// Busy ticks folded into a redelivered pass
    pub deferred_ticks: u32,
    /// Task invocations
    pub invocations: u32,
    /// Invocations that faulted
    pub faults: u32,
    /// One-shot slots freed
    pub retired: u32,
    /// Activations folded into an earlier invocation
    pub overruns: u32,
    /// Slots currently holding a task
    pub occupied_slots: u32,
}

/// Live counters
#[derive(Debug, Default)]
pub struct Monitor {
    running: RunningSlot,
    accepted: AtomicU32,
    dropped: AtomicU32,
    deferred: AtomicU32,
    invocations: AtomicU32,
    faults: AtomicU32,
    retired: AtomicU32,
    overruns: AtomicU32,
    occupied: AtomicUsize,
}

impl Monitor {
    /// Zeroed counters
    pub const fn new() -> Self {
        Self {
            running: RunningSlot::new(),
            accepted: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            deferred: AtomicU32::new(0),
            invocations: AtomicU32::new(0),
            faults: AtomicU32::new(0),
            retired: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            occupied: AtomicUsize::new(0),
        }
    }

    /// Running slot marker driven by the dispatcher
    pub fn running(&self) -> &RunningSlot {
        &self.running
    }

    /// Slot currently executing, if any
    pub fn current_slot(&self) -> Option<SlotIndex> {
        self.running.get()
    }

    pub(crate) fn record_added(&self) {
        self.occupied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pass<const N: usize>(&self, report: &DispatchReport<N>) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.invocations
            .fetch_add(report.invoked.len() as u32, Ordering::Relaxed);
        self.faults.fetch_add(report.faulted, Ordering::Relaxed);
        self.retired.fetch_add(report.retired, Ordering::Relaxed);
        self.overruns.fetch_add(report.overruns, Ordering::Relaxed);
        self.occupied
            .fetch_sub(report.retired as usize, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, ticks: u32) {
        self.dropped.fetch_add(ticks, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self, ticks: u32) {
        self.deferred.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> KernelStats {
        KernelStats {
            accepted_ticks: self.accepted.load(Ordering::Relaxed),
            dropped_ticks: self.dropped.load(Ordering::Relaxed),
            deferred_ticks: self.deferred.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            occupied_slots: self.occupied.load(Ordering::Relaxed) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_monitor() {
        let monitor = Monitor::new();
        assert_eq!(monitor.snapshot(), KernelStats::default());
        assert_eq!(monitor.current_slot(), None);
    }

    #[test]
    fn test_record_pass() {
        let monitor = Monitor::new();
        monitor.record_added();
        monitor.record_added();

        let mut report = DispatchReport::<4>::default();
        report.invoked.push(SlotIndex::new(0)).unwrap();
        report.invoked.push(SlotIndex::new(1)).unwrap();
        report.faulted = 1;
        report.retired = 1;
        report.overruns = 3;
        monitor.record_pass(&report);
        monitor.record_dropped(2);
        monitor.record_deferred(1);

        let stats = monitor.snapshot();
        assert_eq!(stats.accepted_ticks, 1);
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.retired, 1);
        assert_eq!(stats.overruns, 3);
        assert_eq!(stats.occupied_slots, 1);
        assert_eq!(stats.dropped_ticks, 2);
        assert_eq!(stats.deferred_ticks, 1);
    }
}
