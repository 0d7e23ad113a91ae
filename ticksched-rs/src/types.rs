//! Base types, configuration constants and error codes

use core::fmt;
use core::str::FromStr;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Number of task slots in the task table
pub const MAX_TASKS: usize = 20;

/// Default tick resolution in microseconds (1ms)
pub const DEFAULT_TICK_US: u32 = 1_000;

// ============================================================================
// Basic Types
// ============================================================================

/// Tick count, used for delays and periods
pub type Tick = u32;

/// Handle to a task table slot
///
/// Handed out by the task table only, so the wrapped index is always in range
/// for the table that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(transparent))]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the slot in the table
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<SlotIndex> for usize {
    fn from(slot: SlotIndex) -> usize {
        slot.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Result type for scheduler operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Error {
    /// Every slot of the task table is occupied
    #[cfg_attr(feature = "std", error("task table is full"))]
    Full,
    /// Invalid argument provided
    #[cfg_attr(feature = "std", error("invalid argument"))]
    InvalidArg,
    /// The tick guard is held by an in-flight pass
    #[cfg_attr(feature = "std", error("scheduler is busy"))]
    Busy,
    /// The process-wide tick source was already started
    #[cfg_attr(feature = "std", error("tick source already initialized"))]
    AlreadyInitialized,
    /// The tick source could not be started
    #[cfg_attr(feature = "std", error("tick source failure"))]
    TickSource,
}

/// Failure signalled by a task body
///
/// Never propagated out of a dispatch pass. The dispatcher counts and logs it,
/// then carries on with the next slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum TaskFault {
    /// Task reported a failure with a static reason
    #[cfg_attr(feature = "std", error("task failed: {0}"))]
    Failed(&'static str),
    /// Task reported a numeric error code
    #[cfg_attr(feature = "std", error("task failed with code {0}"))]
    Code(i32),
    /// Task body panicked (caught under `std`)
    #[cfg_attr(feature = "std", error("task panicked"))]
    Panicked,
}

/// Outcome of one task invocation
pub type TaskResult = core::result::Result<(), TaskFault>;

// ============================================================================
// Tick Resolution
// ============================================================================

/// Interval between two tick notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct TickResolution(u32);

impl TickResolution {
    /// Resolution from microseconds; zero is rejected
    pub const fn from_micros(us: u32) -> Result<Self> {
        if us == 0 {
            Err(Error::InvalidArg)
        } else {
            Ok(Self(us))
        }
    }

    /// Resolution from milliseconds
    pub const fn from_millis(ms: u32) -> Result<Self> {
        match ms.checked_mul(1_000) {
            Some(us) => Self::from_micros(us),
            None => Err(Error::InvalidArg),
        }
    }

    /// Resolution in microseconds
    pub const fn as_micros(self) -> u32 {
        self.0
    }

    /// Resolution as a `Duration`
    #[cfg(feature = "std")]
    pub fn as_duration(self) -> std::time::Duration {
        std::time::Duration::from_micros(u64::from(self.0))
    }
}

impl Default for TickResolution {
    fn default() -> Self {
        Self(DEFAULT_TICK_US)
    }
}

// ============================================================================
// Policies
// ============================================================================

/// How activations pile up when a slot is not dispatched in time
///
/// Only observable when the scheduler runs more than once per dispatch, which
/// the kernel does under [`BusyPolicy::CatchUp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum PendingPolicy {
    /// Count every activation (extra ones show up as overruns)
    #[default]
    Accumulate,
    /// Cap the activation count at one
    Saturate,
}

/// What happens to a tick that arrives while a pass is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "kebab-case"))]
pub enum BusyPolicy {
    /// Discard the tick; task delays are not advanced
    #[default]
    Drop,
    /// Run one more pass once the in-flight pass returns.
    /// Any number of busy ticks collapse into that single pass.
    Defer,
    /// Once the in-flight pass returns, account every busy tick in the
    /// scheduler, then dispatch once. Delays stay aligned with the timer and
    /// activations may pile up per the [`PendingPolicy`].
    CatchUp,
}

impl FromStr for PendingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accumulate" => Ok(Self::Accumulate),
            "saturate" => Ok(Self::Saturate),
            _ => Err(Error::InvalidArg),
        }
    }
}

impl FromStr for BusyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop" => Ok(Self::Drop),
            "defer" => Ok(Self::Defer),
            "catch-up" => Ok(Self::CatchUp),
            _ => Err(Error::InvalidArg),
        }
    }
}
