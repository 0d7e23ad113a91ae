//! Task descriptors and the callable capability
//!
//! A task body is anything that can be invoked with no arguments. The
//! scheduler never looks inside it: adapters that reach code living in
//! another runtime implement [`Callable`] themselves, plain closures get it
//! through the blanket impl.

use crate::types::*;

// ============================================================================
// Callable
// ============================================================================

/// Capability invoked by the dispatcher once per activation
pub trait Callable {
    /// Run the task body to completion
    fn invoke(&mut self) -> TaskResult;
}

impl<F> Callable for F
where
    F: FnMut() -> TaskResult,
{
    fn invoke(&mut self) -> TaskResult {
        self()
    }
}

/// Adapt a body that cannot fail
pub fn infallible<F: FnMut()>(mut body: F) -> impl FnMut() -> TaskResult {
    move || {
        body();
        Ok(())
    }
}

/// Heap-allocated task, for tables mixing different closure types
#[cfg(feature = "std")]
pub type BoxedTask = Box<dyn FnMut() -> TaskResult + Send>;

/// Box a task body
#[cfg(feature = "std")]
pub fn boxed<F>(body: F) -> BoxedTask
where
    F: FnMut() -> TaskResult + Send + 'static,
{
    Box::new(body)
}

// ============================================================================
// Task State
// ============================================================================

/// Lifecycle state of a slot
///
/// `Unused -> Armed -> Ready -> Running -> Armed` for periodic tasks,
/// `... -> Running -> Unused` for one-shot tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum TaskState {
    /// Slot is free
    #[default]
    Unused,
    /// Delay counting down
    Armed,
    /// Activated, waiting for the dispatcher
    Ready,
    /// Body currently executing
    Running,
}

// ============================================================================
// Task Descriptor
// ============================================================================

/// Scheduling state of one slot
pub struct TaskDescriptor<C> {
    /// Ticks between activations (0 = one-shot)
    pub(crate) period: Tick,
    /// Ticks until the next activation
    pub(crate) delay: Tick,
    /// Activations since the last dispatch
    pub(crate) pending: u32,
    /// Set once the slot has been activated at least once
    pub(crate) steady: bool,
    /// Task body; `None` marks the slot free
    pub(crate) callable: Option<C>,
}

impl<C> TaskDescriptor<C> {
    /// Free slot
    pub const fn vacant() -> Self {
        Self {
            period: 0,
            delay: 0,
            pending: 0,
            steady: false,
            callable: None,
        }
    }

    pub(crate) fn occupy(&mut self, callable: C, delay: Tick, period: Tick) {
        self.period = period;
        self.delay = delay;
        self.pending = 0;
        self.steady = false;
        self.callable = Some(callable);
    }

    /// Free the slot, dropping the callable
    pub(crate) fn release(&mut self) {
        *self = Self::vacant();
    }

    /// Is a task registered here?
    pub fn is_occupied(&self) -> bool {
        self.callable.is_some()
    }

    /// Period in ticks
    pub fn period(&self) -> Tick {
        self.period
    }

    /// Remaining delay in ticks
    pub fn delay(&self) -> Tick {
        self.delay
    }

    /// Activations waiting for dispatch
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// One-shot tasks free their slot after running
    pub fn is_one_shot(&self) -> bool {
        self.period == 0
    }
}

impl<C> Default for TaskDescriptor<C> {
    fn default() -> Self {
        Self::vacant()
    }
}

/// Copyable view of an occupied slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Serialize))]
pub struct TaskInfo {
    /// Slot holding the task
    pub slot: SlotIndex,
    /// Period in ticks (0 = one-shot)
    pub period: Tick,
    /// Ticks until the next activation
    pub delay: Tick,
    /// Activations waiting for dispatch
    pub pending: u32,
    /// Derived lifecycle state
    pub state: TaskState,
}
