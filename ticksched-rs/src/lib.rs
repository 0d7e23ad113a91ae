//! # ticksched: Tick-Driven Cooperative Task Scheduler
//!
//! A fixed-capacity, run-to-completion task scheduler for single-core
//! controllers. A periodic timer drives everything: each accepted tick
//! advances per-task delay counters, then invokes every ready task in slot
//! order, synchronously, in the timer's own context.
//!
//! ## Model
//!
//! ### 1. Fixed task table
//!
//! At most [`MAX_TASKS`] tasks (const generic, default 20). Registration
//! fills the first free slot; a full table is an error, never a reallocation.
//!
//! ### 2. Tick accounting
//!
//! A task registered with `delay` and `period` first runs on accepted tick
//! `delay + 1`, then every `period` ticks. `period == 0` is a one-shot: its
//! slot is freed as soon as the body returns.
//!
//! ### 3. Cooperative dispatch
//!
//! Task bodies run to completion, in ascending slot order. A slow body delays
//! everything after it; a failing body is logged and counted, never fatal to
//! the pass.
//!
//! ### 4. Reentrancy guard
//!
//! A tick that arrives while a pass is still running is dropped, folded into
//! one redelivered pass with [`BusyPolicy::Defer`], or accounted after the
//! pass with [`BusyPolicy::CatchUp`]. Passes never overlap.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ticksched::prelude::*;
//! use ticksched::hal::posix::SystemTicker;
//!
//! let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());
//! kernel.add_task(boxed(|| { println!("hello"); Ok(()) }), 0, 1000)?;
//!
//! let runtime = kernel.arm(SystemTicker::new())?;
//! loop {
//!     runtime.kernel().wait_for_pass(Duration::from_secs(1));
//! }
//! ```
//!
//! ## License
//!
//! MIT License - Copyright (c) 2026 Elektrokombinacija

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

mod log;

// Core modules
pub mod types;
pub mod task;
pub mod table;
pub mod scheduler;
pub mod dispatch;
pub mod guard;
pub mod monitor;
pub mod kernel;
pub mod hal;

// Re-exports for convenience
pub use types::*;
pub use task::{infallible, Callable, TaskDescriptor, TaskInfo, TaskState};
#[cfg(feature = "std")]
pub use task::{boxed, BoxedTask};
pub use table::TaskTable;
pub use scheduler::Scheduler;
pub use dispatch::{DispatchReport, Dispatcher, RunningSlot};
pub use guard::{GuardToken, TickGuard};
pub use monitor::{KernelStats, Monitor};
pub use kernel::{ArmedKernel, Kernel, KernelConfig, PassReport, TickOutcome};
#[cfg(feature = "std")]
pub use kernel::Runtime;
pub use hal::TickSink;
#[cfg(feature = "std")]
pub use hal::{IdleSignal, ManualTicker, TickSource};

/// Prelude - commonly used items
pub mod prelude {
    pub use crate::types::*;
    pub use crate::task::{infallible, Callable, TaskState};
    #[cfg(feature = "std")]
    pub use crate::task::{boxed, BoxedTask};
    pub use crate::kernel::{ArmedKernel, Kernel, KernelConfig, TickOutcome};
    pub use crate::monitor::KernelStats;
    pub use crate::hal::TickSink;
    #[cfg(feature = "std")]
    pub use crate::hal::{ManualTicker, TickSource};
}

// ============================================================================
// Version
// ============================================================================

/// Major version
pub const VERSION_MAJOR: u32 = 0;
/// Minor version
pub const VERSION_MINOR: u32 = 1;
/// Patch version
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION_STRING: &str = "0.1.0";

/// Get version as packed integer (major << 16 | minor << 8 | patch)
pub const fn version() -> u32 {
    (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH
}
