//! Tick accounting
//!
//! Runs once per accepted tick, before the dispatcher. For every occupied
//! slot the delay counts down; when it is already zero the slot is activated
//! and the delay reloaded with `period - 1`.
//!
//! A one-shot slot reloads to zero, so until the dispatcher retires it, it is
//! activated again on every tick.

use crate::log::sched_trace;
use crate::table::{table_corrupted, TaskTable};
use crate::types::*;

/// Tick accounting pass
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler {
    policy: PendingPolicy,
}

impl Scheduler {
    /// Create a scheduler using the given activation policy
    pub const fn new(policy: PendingPolicy) -> Self {
        Self { policy }
    }

    /// Activation policy in use
    pub fn policy(&self) -> PendingPolicy {
        self.policy
    }

    /// Advance every occupied slot by one tick
    ///
    /// Returns the number of slots activated by this tick.
    pub fn advance<C, const N: usize>(&self, table: &mut TaskTable<C, N>) -> usize {
        let mut activated = 0;

        for (index, slot) in table.slots_mut().iter_mut().enumerate() {
            if !slot.is_occupied() {
                // Free slots never carry activations
                if slot.pending != 0 {
                    table_corrupted(index);
                }
                continue;
            }

            if slot.delay > 0 {
                slot.delay -= 1;
            } else {
                slot.pending = match self.policy {
                    PendingPolicy::Accumulate => slot.pending.saturating_add(1),
                    PendingPolicy::Saturate => 1,
                };
                slot.delay = slot.period.saturating_sub(1);
                slot.steady = true;
                activated += 1;
                sched_trace!("slot {} activated (pending {})", index, slot.pending);
            }

            if slot.steady && slot.period > 0 && slot.delay >= slot.period {
                table_corrupted(index);
            }
        }

        activated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{assert_aborts_in_child, in_abort_child};
    use crate::task::TaskState;

    fn noop() -> TaskResult {
        Ok(())
    }

    fn table() -> TaskTable<fn() -> TaskResult, 4> {
        TaskTable::new()
    }

    #[test]
    fn test_delay_counts_down() {
        let mut table = table();
        let slot = table.add(noop, 2, 5).unwrap();
        let sched = Scheduler::default();

        assert_eq!(sched.advance(&mut table), 0);
        assert_eq!(table.get(slot).unwrap().delay, 1);
        assert_eq!(sched.advance(&mut table), 0);
        assert_eq!(table.get(slot).unwrap().delay, 0);

        // Third tick activates and reloads period - 1
        assert_eq!(sched.advance(&mut table), 1);
        let info = table.get(slot).unwrap();
        assert_eq!(info.pending, 1);
        assert_eq!(info.delay, 4);
        assert_eq!(info.state, TaskState::Ready);
    }

    #[test]
    fn test_zero_delay_ready_next_tick() {
        let mut table = table();
        let slot = table.add(noop, 0, 0).unwrap();
        Scheduler::default().advance(&mut table);

        let info = table.get(slot).unwrap();
        assert_eq!(info.pending, 1);
        assert_eq!(info.delay, 0);
    }

    #[test]
    fn test_one_shot_rearms_every_tick() {
        let mut table = table();
        let slot = table.add(noop, 0, 0).unwrap();
        let sched = Scheduler::default();
        sched.advance(&mut table);
        sched.advance(&mut table);
        sched.advance(&mut table);
        assert_eq!(table.get(slot).unwrap().pending, 3);
    }

    #[test]
    fn test_accumulate_vs_saturate() {
        let mut acc = table();
        let mut sat = table();
        acc.add(noop, 0, 1).unwrap();
        sat.add(noop, 0, 1).unwrap();

        let accumulate = Scheduler::new(PendingPolicy::Accumulate);
        let saturate = Scheduler::new(PendingPolicy::Saturate);
        for _ in 0..4 {
            accumulate.advance(&mut acc);
            saturate.advance(&mut sat);
        }

        assert_eq!(acc.get(SlotIndex::new(0)).unwrap().pending, 4);
        assert_eq!(sat.get(SlotIndex::new(0)).unwrap().pending, 1);
    }

    #[test]
    fn test_free_slots_untouched() {
        let mut table = table();
        assert_eq!(Scheduler::default().advance(&mut table), 0);
        assert_eq!(table.occupied(), 0);
    }

    #[test]
    fn test_free_slot_with_activations_aborts() {
        if in_abort_child() {
            let mut table = table();
            table.add(noop, 0, 1).unwrap();
            table.slot_mut(2).pending = 1;
            Scheduler::default().advance(&mut table);
            return;
        }
        assert_aborts_in_child("scheduler::tests::test_free_slot_with_activations_aborts");
    }

    #[test]
    fn test_delay_past_period_aborts() {
        if in_abort_child() {
            let mut table = table();
            let slot = table.add(noop, 0, 4).unwrap();
            let sched = Scheduler::default();
            sched.advance(&mut table);
            assert_eq!(table.get(slot).unwrap().delay, 3);

            // Reload value out of range on the next countdown
            table.slot_mut(slot.index()).delay = 9;
            sched.advance(&mut table);
            return;
        }
        assert_aborts_in_child("scheduler::tests::test_delay_past_period_aborts");
    }

    #[test]
    fn test_delay_bounded_by_period_after_activation() {
        let mut table = table();
        let slot = table.add(noop, 7, 3).unwrap();
        let sched = Scheduler::default();
        for _ in 0..20 {
            sched.advance(&mut table);
            let info = table.get(slot).unwrap();
            if info.pending > 0 {
                assert!(info.delay < info.period);
            }
        }
    }
}
