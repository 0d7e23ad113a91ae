//! Tick sources
//!
//! A tick source is the periodic timer that drives the kernel. It knows
//! nothing about tasks: it calls [`TickSink::on_tick`] once per period and
//! [`TickSink::on_missed`] when deadlines went by without a notification.
//!
//! # Implementing a tick source
//!
//! ```ignore
//! struct SysTick;
//!
//! #[interrupt]
//! fn SYSTICK() {
//!     // ArmedKernel lives in a static
//!     KERNEL.on_tick();
//! }
//! ```
//!
//! On hosts the [`TickSource`] trait wires a source to a shared sink:
//! [`ManualTicker`] for tests and simulation, [`posix::SystemTicker`] for a
//! real-time timer thread.

#[cfg(feature = "std")]
use crate::types::*;

// ============================================================================
// Sink
// ============================================================================

/// Receiver of tick notifications
pub trait TickSink {
    /// One timer period elapsed
    fn on_tick(&self);

    /// `ticks` periods elapsed without a notification
    fn on_missed(&self, ticks: u32) {
        let _ = ticks;
    }
}

// ============================================================================
// Source (std)
// ============================================================================

/// Sink shared between a tick source and its owner
#[cfg(feature = "std")]
pub type SharedSink = std::sync::Arc<dyn TickSink + Send + Sync>;

/// Periodic timer driving a [`TickSink`]
#[cfg(feature = "std")]
pub trait TickSource {
    /// Start notifying `sink` every `resolution`
    fn start(&mut self, resolution: TickResolution, sink: SharedSink) -> Result<()>;

    /// Stop notifying; a stopped source does not touch the sink again
    fn stop(&mut self);
}

// ============================================================================
// Manual Ticker (std)
// ============================================================================

#[cfg(feature = "std")]
pub use manual::ManualTicker;

#[cfg(feature = "std")]
mod manual {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Tick source fired by hand
    ///
    /// Clones share the attached sink, so a task body holding a clone can
    /// deliver a notification while a pass is in flight.
    #[derive(Clone, Default)]
    pub struct ManualTicker {
        inner: Arc<Mutex<Option<(TickResolution, SharedSink)>>>,
    }

    impl ManualTicker {
        /// Create a detached ticker
        pub fn new() -> Self {
            Self::default()
        }

        /// Is a sink attached?
        pub fn is_running(&self) -> bool {
            self.inner.lock().is_some()
        }

        /// Resolution the ticker was started with
        pub fn resolution(&self) -> Option<TickResolution> {
            self.inner.lock().as_ref().map(|(resolution, _)| *resolution)
        }

        /// Deliver one notification; `false` if no sink is attached
        pub fn fire(&self) -> bool {
            // Released before calling out so nested fires do not deadlock
            let sink = self.inner.lock().as_ref().map(|(_, sink)| sink.clone());
            match sink {
                Some(sink) => {
                    sink.on_tick();
                    true
                }
                None => false,
            }
        }

        /// Deliver `count` notifications back to back
        pub fn fire_n(&self, count: u32) -> u32 {
            (0..count).take_while(|_| self.fire()).count() as u32
        }

        /// Report `ticks` missed deadlines
        pub fn miss(&self, ticks: u32) -> bool {
            let sink = self.inner.lock().as_ref().map(|(_, sink)| sink.clone());
            match sink {
                Some(sink) => {
                    sink.on_missed(ticks);
                    true
                }
                None => false,
            }
        }
    }

    impl TickSource for ManualTicker {
        fn start(&mut self, resolution: TickResolution, sink: SharedSink) -> Result<()> {
            let mut inner = self.inner.lock();
            if inner.is_some() {
                return Err(Error::AlreadyInitialized);
            }
            *inner = Some((resolution, sink));
            Ok(())
        }

        fn stop(&mut self) {
            self.inner.lock().take();
        }
    }
}

// ============================================================================
// Idle Signal (std)
// ============================================================================

#[cfg(feature = "std")]
pub use idle::IdleSignal;

#[cfg(feature = "std")]
mod idle {
    use parking_lot::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    /// Wakes threads waiting for the next accepted pass
    #[derive(Debug, Default)]
    pub struct IdleSignal {
        passes: Mutex<u64>,
        cond: Condvar,
    }

    impl IdleSignal {
        /// Create a signal nobody waits on
        pub fn new() -> Self {
            Self::default()
        }

        /// A pass completed
        pub fn notify(&self) {
            *self.passes.lock() += 1;
            self.cond.notify_all();
        }

        /// Block until the next [`notify`](Self::notify), up to `timeout`
        ///
        /// Returns `false` if the timeout elapsed first.
        pub fn wait(&self, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            let mut passes = self.passes.lock();
            let seen = *passes;
            while *passes == seen {
                if self.cond.wait_until(&mut passes, deadline).timed_out() {
                    return *passes != seen;
                }
            }
            true
        }
    }
}

// ============================================================================
// POSIX Ticker (std)
// ============================================================================

/// Host timer backed by a dedicated thread
#[cfg(feature = "std")]
pub mod posix {
    use super::*;
    use crate::log::{sched_info, sched_warn};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};

    // One system timer per process
    static INITIALIZED: AtomicBool = AtomicBool::new(false);

    /// Real-time tick source
    ///
    /// Fires at absolute deadlines `start + n * resolution`, so lateness of
    /// one notification does not shift later ones. Deadlines that pass while
    /// the sink is still busy are reported through [`TickSink::on_missed`]
    /// and skipped, never replayed.
    ///
    /// Only one `SystemTicker` can ever be started per process; a second
    /// start fails with [`Error::AlreadyInitialized`].
    #[derive(Debug, Default)]
    pub struct SystemTicker {
        stop: Arc<AtomicBool>,
        thread: Option<JoinHandle<()>>,
    }

    impl SystemTicker {
        /// Create an unstarted ticker
        pub fn new() -> Self {
            Self::default()
        }

        /// Is the timer thread alive?
        pub fn is_running(&self) -> bool {
            self.thread.is_some()
        }
    }

    impl TickSource for SystemTicker {
        fn start(&mut self, resolution: TickResolution, sink: SharedSink) -> Result<()> {
            if INITIALIZED.swap(true, Ordering::AcqRel) {
                return Err(Error::AlreadyInitialized);
            }

            let stop = self.stop.clone();
            let period = resolution.as_duration();
            let spawned = std::thread::Builder::new()
                .name("ticksched-timer".into())
                .spawn(move || run(period, &*sink, &stop));

            match spawned {
                Ok(handle) => {
                    self.thread = Some(handle);
                    sched_info!("system ticker started ({} us)", resolution.as_micros());
                    Ok(())
                }
                Err(_) => {
                    INITIALIZED.store(false, Ordering::Release);
                    Err(Error::TickSource)
                }
            }
        }

        fn stop(&mut self) {
            let Some(handle) = self.thread.take() else {
                return;
            };
            self.stop.store(true, Ordering::Release);
            handle.thread().unpark();
            if handle.join().is_err() {
                sched_warn!("system ticker thread panicked");
            }
        }
    }

    impl Drop for SystemTicker {
        fn drop(&mut self) {
            self.stop();
        }
    }

    fn run(period: Duration, sink: &(dyn TickSink + Send + Sync), stop: &AtomicBool) {
        let epoch = Instant::now();
        let period_us = u64::try_from(period.as_micros()).unwrap_or(u64::MAX).max(1);
        let mut due: u64 = 1;

        while !stop.load(Ordering::Acquire) {
            let offset = Duration::from_micros(period_us.saturating_mul(due));
            let Some(deadline) = epoch.checked_add(offset) else {
                sched_warn!("system ticker ran out of deadlines");
                break;
            };
            let now = Instant::now();
            if deadline > now {
                std::thread::park_timeout(deadline - now);
                continue;
            }

            sink.on_tick();

            let elapsed = u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX);
            let next = elapsed / period_us + 1;
            let missed = next.saturating_sub(due + 1);
            if missed > 0 {
                sink.on_missed(u32::try_from(missed).unwrap_or(u32::MAX));
            }
            due = next.max(due + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        ticks: AtomicU32,
        missed: AtomicU32,
    }

    impl TickSink for Counting {
        fn on_tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_missed(&self, ticks: u32) {
            self.missed.fetch_add(ticks, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_manual_ticker_detached() {
        let ticker = ManualTicker::new();
        assert!(!ticker.is_running());
        assert!(!ticker.fire());
        assert_eq!(ticker.fire_n(5), 0);
    }

    #[test]
    fn test_manual_ticker_fires_sink() {
        let sink = Arc::new(Counting::default());
        let mut ticker = ManualTicker::new();
        ticker.start(TickResolution::default(), sink.clone()).unwrap();

        assert_eq!(ticker.fire_n(3), 3);
        assert!(ticker.miss(2));
        assert_eq!(sink.ticks.load(Ordering::SeqCst), 3);
        assert_eq!(sink.missed.load(Ordering::SeqCst), 2);

        // Clones share the sink
        let clone = ticker.clone();
        assert!(clone.fire());
        assert_eq!(sink.ticks.load(Ordering::SeqCst), 4);

        ticker.stop();
        assert!(!clone.fire());
    }

    #[test]
    fn test_manual_ticker_double_start() {
        let sink = Arc::new(Counting::default());
        let mut ticker = ManualTicker::new();
        ticker.start(TickResolution::default(), sink.clone()).unwrap();
        assert_eq!(
            ticker.start(TickResolution::default(), sink),
            Err(Error::AlreadyInitialized)
        );
        assert_eq!(ticker.resolution(), Some(TickResolution::default()));
    }

    #[test]
    fn test_idle_signal() {
        let signal = Arc::new(IdleSignal::new());
        assert!(!signal.wait(Duration::from_millis(5)));

        let notifier = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            notifier.notify();
        });
        assert!(signal.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
