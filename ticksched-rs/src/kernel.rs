//! Kernel - task table, tick accounting and dispatch behind one guard
//!
//! # Design Philosophy
//!
//! Registration must never race a live tick. Instead of documenting "only
//! call this before the timer starts", the two situations are two types:
//!
//! - [`Kernel`] is unarmed. It owns the table by value, so registration and
//!   manual ticking need `&mut self` and nothing can interleave with them.
//! - [`ArmedKernel`] is what a tick source drives. Everything it shares is
//!   behind the [`TickGuard`]: a notification runs a pass only if it wins the
//!   guard, and registration ([`ArmedKernel::try_add_task`]) takes the same
//!   guard or reports [`Error::Busy`].
//!
//! A tick that finds the guard held is handled by the configured
//! [`BusyPolicy`]: dropped (default), folded into one redelivered pass, or
//! caught up (every owed tick accounted, then one dispatch).

use core::cell::UnsafeCell;

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::guard::{GuardToken, TickGuard};
use crate::hal::TickSink;
#[cfg(feature = "std")]
use crate::hal::TickSource;
#[cfg(feature = "std")]
use crate::log::sched_info;
use crate::log::{sched_debug, sched_trace};
use crate::monitor::{KernelStats, Monitor};
use crate::scheduler::Scheduler;
use crate::table::TaskTable;
use crate::task::{Callable, TaskInfo};
use crate::types::*;

// ============================================================================
// Configuration
// ============================================================================

/// Kernel configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelConfig {
    /// Interval between tick notifications
    pub resolution: TickResolution,
    /// How activations pile up on a slot
    pub pending_policy: PendingPolicy,
    /// What a busy tick turns into
    pub busy_policy: BusyPolicy,
}

impl KernelConfig {
    /// Set tick resolution
    pub fn with_resolution(mut self, resolution: TickResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set activation policy
    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }

    /// Set busy-tick policy
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }
}

// ============================================================================
// Pass Results
// ============================================================================

/// Result of one scheduler + dispatcher pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport<const N: usize> {
    /// Activations raised by the scheduler
    pub activated: usize,
    /// Ticks accounted before dispatching
    pub ticks: u32,
    /// What the dispatcher did
    pub dispatch: DispatchReport<N>,
}

impl<const N: usize> PassReport<N> {
    /// Slots invoked, in invocation order
    pub fn invoked(&self) -> &[SlotIndex] {
        &self.dispatch.invoked
    }
}

/// What became of a tick notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome<const N: usize> {
    /// The tick ran a pass
    Accepted {
        /// Report of that pass
        report: PassReport<N>,
        /// Extra passes run for ticks deferred meanwhile
        redelivered: u32,
    },
    /// A pass was in flight; the tick was discarded
    Dropped,
    /// A pass was in flight; the tick is owed to it and served when it returns
    Deferred,
}

impl<const N: usize> TickOutcome<N> {
    /// Did this notification run a pass?
    pub fn is_accepted(&self) -> bool {
        matches!(self, TickOutcome::Accepted { .. })
    }
}

// ============================================================================
// Core
// ============================================================================

/// Table plus the two passes; the part the guard protects once armed
struct Core<C, const N: usize> {
    table: TaskTable<C, N>,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
}

impl<C: Callable, const N: usize> Core<C, N> {
    fn new(config: &KernelConfig) -> Self {
        Self {
            table: TaskTable::new(),
            scheduler: Scheduler::new(config.pending_policy),
            dispatcher: Dispatcher::new(),
        }
    }

    fn add(&mut self, monitor: &Monitor, callable: C, delay: Tick, period: Tick) -> Result<SlotIndex> {
        let slot = self.table.add(callable, delay, period)?;
        monitor.record_added();
        Ok(slot)
    }

    fn pass(&mut self, monitor: &Monitor) -> PassReport<N> {
        self.catch_up(monitor, 1)
    }

    /// Account `ticks` ticks (at least one), then dispatch once
    fn catch_up(&mut self, monitor: &Monitor, ticks: u32) -> PassReport<N> {
        let ticks = ticks.max(1);
        let mut activated = 0;
        for _ in 0..ticks {
            activated += self.scheduler.advance(&mut self.table);
        }
        let dispatch = self.dispatcher.dispatch(&mut self.table, monitor.running());
        monitor.record_pass(&dispatch);
        PassReport {
            activated,
            ticks,
            dispatch,
        }
    }
}

// ============================================================================
// Unarmed Kernel
// ============================================================================

/// Kernel before its tick source is started
///
/// Owns the task table exclusively: register the initial task set here, or
/// step it by hand with [`Kernel::tick`].
pub struct Kernel<C, const N: usize = MAX_TASKS> {
    core: Core<C, N>,
    monitor: Monitor,
    config: KernelConfig,
}

impl<C: Callable, const N: usize> Kernel<C, N> {
    /// Create kernel with an empty task table
    pub fn new(config: KernelConfig) -> Self {
        Self {
            core: Core::new(&config),
            monitor: Monitor::new(),
            config,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Register a task
    ///
    /// `delay` ticks pass before the first activation; `period == 0` makes it
    /// one-shot.
    pub fn add_task(&mut self, callable: C, delay: Tick, period: Tick) -> Result<SlotIndex> {
        self.core.add(&self.monitor, callable, delay, period)
    }

    /// Run one pass as if a tick had been accepted
    pub fn tick(&mut self) -> PassReport<N> {
        self.core.pass(&self.monitor)
    }

    /// Account `ticks` ticks, then dispatch once
    ///
    /// Models a late notification standing for several timer periods. Zero
    /// counts as one.
    pub fn catch_up(&mut self, ticks: u32) -> PassReport<N> {
        self.core.catch_up(&self.monitor, ticks)
    }

    /// Run `ticks` passes back to back
    pub fn run_ticks(&mut self, ticks: u32) -> KernelStats {
        for _ in 0..ticks {
            self.tick();
        }
        self.stats()
    }

    /// Task table
    pub fn table(&self) -> &TaskTable<C, N> {
        &self.core.table
    }

    /// View of an occupied slot
    pub fn task(&self, slot: SlotIndex) -> Option<TaskInfo> {
        self.core.table.get(slot)
    }

    /// Counter snapshot
    pub fn stats(&self) -> KernelStats {
        self.monitor.snapshot()
    }

    /// Switch to the shared representation driven by a tick source
    ///
    /// Use this directly when the armed kernel has to live in a `static`
    /// (interrupt handlers); on hosts [`Kernel::arm`] does the wiring.
    pub fn into_armed(self) -> ArmedKernel<C, N> {
        ArmedKernel {
            core: UnsafeCell::new(self.core),
            guard: TickGuard::new(),
            monitor: self.monitor,
            config: self.config,
            #[cfg(feature = "std")]
            idle: crate::hal::IdleSignal::new(),
        }
    }
}

#[cfg(feature = "std")]
impl<C, const N: usize> Kernel<C, N>
where
    C: Callable + Send + 'static,
{
    /// Share the kernel and start `source` driving it
    ///
    /// On failure the source is left stopped and the kernel is dropped.
    pub fn arm<S: TickSource>(self, mut source: S) -> Result<Runtime<C, N, S>> {
        let resolution = self.config.resolution;
        let kernel = std::sync::Arc::new(self.into_armed());
        source.start(resolution, kernel.clone())?;
        sched_info!("kernel armed at {} us per tick", resolution.as_micros());
        Ok(Runtime { kernel, source })
    }
}

// ============================================================================
// Armed Kernel
// ============================================================================

/// Kernel shared with a tick source
pub struct ArmedKernel<C, const N: usize = MAX_TASKS> {
    core: UnsafeCell<Core<C, N>>,
    guard: TickGuard,
    monitor: Monitor,
    config: KernelConfig,
    #[cfg(feature = "std")]
    idle: crate::hal::IdleSignal,
}

// SAFETY: `core` is only dereferenced while holding a `GuardToken`, and the
// guard admits one holder at a time. Everything else is atomic.
unsafe impl<C: Send, const N: usize> Sync for ArmedKernel<C, N> {}

impl<C: Callable, const N: usize> ArmedKernel<C, N> {
    /// Tick notification entry point
    pub fn on_tick(&self) -> TickOutcome<N> {
        if let Some(token) = self.guard.try_acquire() {
            let report = self.run_pass(&token);
            let redelivered = self.release(token);
            return TickOutcome::Accepted { report, redelivered };
        }

        match self.config.busy_policy {
            BusyPolicy::Drop => {
                self.monitor.record_dropped(1);
                sched_trace!("tick dropped");
                TickOutcome::Dropped
            }
            BusyPolicy::Defer | BusyPolicy::CatchUp => {
                self.defer(1);
                TickOutcome::Deferred
            }
        }
    }

    /// Notifications the tick source could not deliver on time
    ///
    /// They were due while a pass held the tick path, so they follow the busy
    /// policy like any other busy tick.
    pub fn on_missed(&self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        match self.config.busy_policy {
            BusyPolicy::Drop => {
                self.monitor.record_dropped(ticks);
                sched_trace!("{} ticks missed", ticks);
            }
            BusyPolicy::Defer | BusyPolicy::CatchUp => self.defer(ticks),
        }
    }

    /// Register a task while ticks are live
    ///
    /// Takes the tick guard for the duration of the insertion. Returns
    /// [`Error::Busy`] if a pass is in flight, which is always the case when
    /// called from inside a task body.
    pub fn try_add_task(&self, callable: C, delay: Tick, period: Tick) -> Result<SlotIndex> {
        let token = self.guard.try_acquire().ok_or(Error::Busy)?;
        // SAFETY: guard held
        let core = unsafe { &mut *self.core.get() };
        let result = core.add(&self.monitor, callable, delay, period);
        self.release(token);
        result
    }

    /// Look at the task table under the guard
    pub fn inspect<R>(&self, f: impl FnOnce(&TaskTable<C, N>) -> R) -> Result<R> {
        let token = self.guard.try_acquire().ok_or(Error::Busy)?;
        // SAFETY: guard held
        let core = unsafe { &*self.core.get() };
        let result = f(&core.table);
        self.release(token);
        Ok(result)
    }

    /// View of an occupied slot
    ///
    /// Needs the guard, so it returns [`Error::Busy`] during a pass (and from
    /// inside task bodies). Use [`ArmedKernel::current_slot`] to see which
    /// slot is running.
    pub fn task(&self, slot: SlotIndex) -> Result<Option<TaskInfo>> {
        let running = self.monitor.current_slot();
        self.inspect(|table| table.view(slot, running))
    }

    /// Slot currently executing, if any
    pub fn current_slot(&self) -> Option<SlotIndex> {
        self.monitor.current_slot()
    }

    /// Is a pass in flight?
    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    /// Counter snapshot, readable from any context
    pub fn stats(&self) -> KernelStats {
        self.monitor.snapshot()
    }

    /// Configuration in use
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Back to exclusive ownership
    pub fn into_unarmed(self) -> Kernel<C, N> {
        Kernel {
            core: self.core.into_inner(),
            monitor: self.monitor,
            config: self.config,
        }
    }

    /// Block until the next accepted pass, up to `timeout`
    ///
    /// Returns `false` on timeout. Replaces a busy-wait idle loop.
    #[cfg(feature = "std")]
    pub fn wait_for_pass(&self, timeout: std::time::Duration) -> bool {
        self.idle.wait(timeout)
    }

    fn run_pass(&self, _token: &GuardToken<'_>) -> PassReport<N> {
        // SAFETY: the token proves we hold the guard
        let core = unsafe { &mut *self.core.get() };
        let report = core.pass(&self.monitor);
        #[cfg(feature = "std")]
        self.idle.notify();
        report
    }

    fn run_owed(&self, _token: &GuardToken<'_>, owed: u32) {
        // SAFETY: the token proves we hold the guard
        let core = unsafe { &mut *self.core.get() };
        match self.config.busy_policy {
            BusyPolicy::CatchUp => core.catch_up(&self.monitor, owed),
            _ => core.pass(&self.monitor),
        };
        #[cfg(feature = "std")]
        self.idle.notify();
    }

    /// Let go of the guard, then serve any ticks owed meanwhile
    fn release(&self, token: GuardToken<'_>) -> u32 {
        drop(token);

        let mut redelivered = 0;
        while self.config.busy_policy != BusyPolicy::Drop && self.guard.has_redelivery() {
            // Someone else got in first; they serve the owed ticks on release
            let Some(token) = self.guard.try_acquire() else {
                break;
            };
            let owed = self.guard.take_redelivery();
            if owed > 0 {
                self.run_owed(&token, owed);
                redelivered += 1;
            }
            drop(token);
        }

        if redelivered > 0 {
            sched_debug!("{} deferred passes redelivered", redelivered);
        }
        redelivered
    }

    fn defer(&self, ticks: u32) {
        self.monitor.record_deferred(ticks);
        self.guard.request_redelivery(ticks);
        // The holder may have let go between our failed acquire and the request
        if let Some(token) = self.guard.try_acquire() {
            self.release(token);
        }
    }
}

impl<C: Callable, const N: usize> TickSink for ArmedKernel<C, N> {
    fn on_tick(&self) {
        ArmedKernel::on_tick(self);
    }

    fn on_missed(&self, ticks: u32) {
        ArmedKernel::on_missed(self, ticks);
    }
}

// ============================================================================
// Runtime (std)
// ============================================================================

/// Armed kernel together with the tick source driving it
#[cfg(feature = "std")]
pub struct Runtime<C, const N: usize, S: TickSource> {
    kernel: std::sync::Arc<ArmedKernel<C, N>>,
    source: S,
}

#[cfg(feature = "std")]
impl<C, const N: usize, S> Runtime<C, N, S>
where
    C: Callable + Send + 'static,
    S: TickSource,
{
    /// Shared handle to the armed kernel
    pub fn kernel(&self) -> &std::sync::Arc<ArmedKernel<C, N>> {
        &self.kernel
    }

    /// Tick source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Stop the tick source and take the kernel back
    ///
    /// Returns `None` if other handles to the armed kernel are still alive
    /// (for instance captured by a task body).
    pub fn disarm(mut self) -> Option<Kernel<C, N>> {
        self.source.stop();
        sched_info!("kernel disarmed");
        std::sync::Arc::try_unwrap(self.kernel)
            .ok()
            .map(ArmedKernel::into_unarmed)
    }
}
