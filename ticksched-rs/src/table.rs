//! Fixed-capacity task table
//!
//! Slots are addressed by [`SlotIndex`]. Slot order matters twice: free slots
//! are reused first-free, and the dispatcher visits ready slots lowest index
//! first, so a lower slot is a higher priority.

use crate::log::{sched_debug, sched_error};
use crate::task::{TaskDescriptor, TaskInfo, TaskState};
use crate::types::*;
use heapless::Vec;

/// Task table with `N` slots
pub struct TaskTable<C, const N: usize = MAX_TASKS> {
    slots: [TaskDescriptor<C>; N],
}

impl<C, const N: usize> TaskTable<C, N> {
    /// Create a table with every slot free
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| TaskDescriptor::vacant()),
        }
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Register a task in the first free slot
    ///
    /// Fails with [`Error::Full`] when every slot is taken; the table is left
    /// untouched in that case.
    pub fn add(&mut self, callable: C, delay: Tick, period: Tick) -> Result<SlotIndex> {
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.is_occupied())
            .ok_or(Error::Full)?;

        self.slots[index].occupy(callable, delay, period);
        sched_debug!(
            "task registered in slot {} (delay {}, period {})",
            index,
            delay,
            period
        );
        Ok(SlotIndex::new(index))
    }

    /// Is the slot holding a task?
    pub fn is_occupied(&self, slot: SlotIndex) -> bool {
        self.slots
            .get(slot.index())
            .map_or(false, TaskDescriptor::is_occupied)
    }

    /// View of an occupied slot
    pub fn get(&self, slot: SlotIndex) -> Option<TaskInfo> {
        self.info(slot.index(), None)
    }

    /// View of an occupied slot, given the slot currently running (if any)
    pub fn view(&self, slot: SlotIndex, running: Option<SlotIndex>) -> Option<TaskInfo> {
        self.info(slot.index(), running)
    }

    /// Lifecycle state of a slot, given the slot currently running (if any)
    pub fn state(&self, slot: SlotIndex, running: Option<SlotIndex>) -> TaskState {
        self.info(slot.index(), running)
            .map_or(TaskState::Unused, |info| info.state)
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    /// Number of free slots
    pub fn free_slots(&self) -> usize {
        N - self.occupied()
    }

    /// No free slot left?
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(TaskDescriptor::is_occupied)
    }

    /// Views of all occupied slots, in slot order
    pub fn iter(&self) -> impl Iterator<Item = TaskInfo> + '_ {
        (0..N).filter_map(move |index| self.info(index, None))
    }

    /// Copy of all occupied slots, in slot order
    pub fn snapshot(&self, running: Option<SlotIndex>) -> Vec<TaskInfo, N> {
        (0..N)
            .filter_map(|index| self.info(index, running))
            .collect()
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut TaskDescriptor<C> {
        &mut self.slots[index]
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [TaskDescriptor<C>; N] {
        &mut self.slots
    }

    fn info(&self, index: usize, running: Option<SlotIndex>) -> Option<TaskInfo> {
        let slot = self.slots.get(index)?;
        if !slot.is_occupied() {
            return None;
        }

        let state = if running.map_or(false, |r| r.index() == index) {
            TaskState::Running
        } else if slot.pending > 0 {
            TaskState::Ready
        } else {
            TaskState::Armed
        };

        Some(TaskInfo {
            slot: SlotIndex::new(index),
            period: slot.period,
            delay: slot.delay,
            pending: slot.pending,
            state,
        })
    }
}

impl<C, const N: usize> Default for TaskTable<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler bookkeeping found the table in an impossible state.
///
/// Continuing would make scheduling behavior undefined, so the process is
/// aborted (or the panic handler runs on targets without `std`).
#[cold]
pub(crate) fn table_corrupted(index: usize) -> ! {
    sched_error!("task table corrupted at slot {}", index);

    #[cfg(feature = "std")]
    std::process::abort();

    #[cfg(not(feature = "std"))]
    panic!("task table corrupted at slot {}", index);
}

/// Runs a test body in a child process and checks that it aborted
///
/// The child is the current test binary filtered down to `test`, with
/// [`ABORT_CHILD_ENV`] set so the test knows to trigger the abort itself.
#[cfg(test)]
pub(crate) fn assert_aborts_in_child(test: &str) {
    let status = std::process::Command::new(std::env::current_exe().unwrap())
        .args([test, "--exact", "--test-threads=1"])
        .env(ABORT_CHILD_ENV, "1")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success(), "{test} exited normally");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        const SIGABRT: i32 = 6;
        assert_eq!(status.signal(), Some(SIGABRT), "{test} ended with {status}");
    }
}

/// Set in the child process started by [`assert_aborts_in_child`]
#[cfg(test)]
pub(crate) const ABORT_CHILD_ENV: &str = "TICKSCHED_ABORT_CHILD";

#[cfg(test)]
pub(crate) fn in_abort_child() -> bool {
    std::env::var_os(ABORT_CHILD_ENV).is_some()
}
