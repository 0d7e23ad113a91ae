//! Armed kernel driven through a tick source

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use ticksched::prelude::*;
use ticksched::Runtime;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn logging(log: &Log, name: &'static str) -> BoxedTask {
    let log = log.clone();
    boxed(move || {
        log.lock().unwrap().push(name);
        Ok(())
    })
}

fn counting(counter: &Arc<AtomicU32>) -> BoxedTask {
    let counter = counter.clone();
    boxed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn arm(kernel: Kernel<BoxedTask>) -> (Runtime<BoxedTask, 20, ManualTicker>, ManualTicker) {
    let ticker = ManualTicker::new();
    let runtime = kernel.arm(ticker.clone()).unwrap();
    (runtime, ticker)
}

#[test]
fn test_periodic_and_one_shot() {
    let periodic = Arc::new(AtomicU32::new(0));
    let once = Arc::new(AtomicU32::new(0));

    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());
    kernel.add_task(counting(&periodic), 0, 1000).unwrap();
    let g = kernel.add_task(counting(&once), 5, 0).unwrap();

    let (runtime, ticker) = arm(kernel);
    assert_eq!(ticker.fire_n(1000), 1000);
    assert_eq!(periodic.load(Ordering::SeqCst), 1);
    assert_eq!(once.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.kernel().task(g).unwrap(), None);

    ticker.fire_n(1000);
    assert_eq!(periodic.load(Ordering::SeqCst), 2);
    assert_eq!(once.load(Ordering::SeqCst), 1);

    let kernel = runtime.disarm().unwrap();
    assert!(!ticker.is_running());
    assert_eq!(kernel.stats().accepted_ticks, 2000);
    assert_eq!(kernel.table().occupied(), 1);
}

#[test]
fn test_dispatch_order_is_slot_order() {
    let log: Log = Arc::default();
    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());
    kernel.add_task(logging(&log, "a"), 0, 3).unwrap();
    kernel.add_task(logging(&log, "b"), 0, 3).unwrap();
    kernel.add_task(logging(&log, "c"), 0, 3).unwrap();

    let (runtime, ticker) = arm(kernel);
    ticker.fire();
    assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    drop(runtime);
}

#[test]
fn test_full_table_rejects_registration() {
    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());
    for _ in 0..MAX_TASKS {
        kernel.add_task(boxed(|| Ok(())), 0, 1).unwrap();
    }
    assert_eq!(kernel.add_task(boxed(|| Ok(())), 0, 1), Err(Error::Full));

    let (runtime, _ticker) = arm(kernel);
    assert_eq!(
        runtime.kernel().try_add_task(boxed(|| Ok(())), 0, 1),
        Err(Error::Full)
    );
}

#[test]
fn test_nested_notification_dropped() {
    let ticker = ManualTicker::new();
    let inner_outcomes = Arc::new(AtomicU32::new(0));
    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());

    let (nested, fired) = (ticker.clone(), inner_outcomes.clone());
    kernel
        .add_task(
            boxed(move || {
                // Pass in flight: this notification must not start another
                nested.fire();
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            0,
            1,
        )
        .unwrap();

    let runtime = kernel.arm(ticker.clone()).unwrap();
    ticker.fire_n(3);

    let stats = runtime.kernel().stats();
    assert_eq!(inner_outcomes.load(Ordering::SeqCst), 3);
    assert_eq!(stats.accepted_ticks, 3);
    assert_eq!(stats.dropped_ticks, 3);
    assert_eq!(stats.invocations, 3);
}

#[test]
fn test_nested_notifications_deferred() {
    let ticker = ManualTicker::new();
    let passes = Arc::new(AtomicU32::new(0));
    let config = KernelConfig::default().with_busy_policy(BusyPolicy::Defer);
    let mut kernel: Kernel<BoxedTask> = Kernel::new(config);

    let nested = ticker.clone();
    kernel
        .add_task(
            boxed(move || {
                nested.fire_n(5);
                Ok(())
            }),
            0,
            0,
        )
        .unwrap();
    kernel.add_task(counting(&passes), 0, 1).unwrap();

    let runtime = kernel.arm(ticker.clone()).unwrap();
    ticker.fire();

    // Five busy ticks coalesce into one extra pass
    let stats = runtime.kernel().stats();
    assert_eq!(stats.deferred_ticks, 5);
    assert_eq!(stats.accepted_ticks, 2);
    assert_eq!(passes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_registration_from_task_is_busy() {
    let shared: Arc<OnceLock<Arc<ArmedKernel<BoxedTask>>>> = Arc::default();
    let result = Arc::new(Mutex::new(None));
    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());

    let (handle, out) = (shared.clone(), result.clone());
    kernel
        .add_task(
            boxed(move || {
                if let Some(kernel) = handle.get() {
                    *out.lock().unwrap() = Some(kernel.try_add_task(boxed(|| Ok(())), 0, 0));
                }
                Ok(())
            }),
            0,
            0,
        )
        .unwrap();

    let (runtime, ticker) = arm(kernel);
    assert!(shared.set(runtime.kernel().clone()).is_ok());
    ticker.fire();

    assert_eq!(*result.lock().unwrap(), Some(Err(Error::Busy)));
    assert_eq!(runtime.kernel().stats().occupied_slots, 0);
}

#[test]
fn test_registration_while_idle() {
    let runs = Arc::new(AtomicU32::new(0));
    let (runtime, ticker) = arm(Kernel::new(KernelConfig::default()));

    let slot = runtime.kernel().try_add_task(counting(&runs), 2, 4).unwrap();
    ticker.fire_n(3);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let info = runtime.kernel().task(slot).unwrap().unwrap();
    assert_eq!(info.state, TaskState::Armed);
    assert_eq!(info.delay, 3);
}

#[test]
fn test_current_slot_visible_to_task() {
    let shared: Arc<OnceLock<Arc<ArmedKernel<BoxedTask>>>> = Arc::default();
    let seen = Arc::new(Mutex::new(None));
    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());
    kernel.add_task(boxed(|| Ok(())), 10, 10).unwrap();

    let (handle, out) = (shared.clone(), seen.clone());
    let slot = kernel
        .add_task(
            boxed(move || {
                if let Some(kernel) = handle.get() {
                    *out.lock().unwrap() = kernel.current_slot();
                }
                Ok(())
            }),
            0,
            0,
        )
        .unwrap();

    let (runtime, ticker) = arm(kernel);
    assert!(shared.set(runtime.kernel().clone()).is_ok());
    ticker.fire();

    assert_eq!(*seen.lock().unwrap(), Some(slot));
    assert_eq!(runtime.kernel().current_slot(), None);
}

#[test]
fn test_faulting_task_does_not_stop_others() {
    let healthy = Arc::new(AtomicU32::new(0));
    let mut kernel: Kernel<BoxedTask> = Kernel::new(KernelConfig::default());
    kernel
        .add_task(boxed(|| Err(TaskFault::Code(-5))), 0, 1)
        .unwrap();
    kernel.add_task(boxed(|| panic!("task bug")), 0, 2).unwrap();
    kernel.add_task(counting(&healthy), 0, 1).unwrap();

    let (runtime, ticker) = arm(kernel);
    ticker.fire_n(4);

    let stats = runtime.kernel().stats();
    assert_eq!(healthy.load(Ordering::SeqCst), 4);
    assert_eq!(stats.faults, 4 + 2);
    assert_eq!(stats.occupied_slots, 3);
}

#[test]
fn test_missed_ticks_follow_busy_policy() {
    let (runtime, ticker) = arm(Kernel::new(KernelConfig::default()));
    ticker.miss(7);
    assert_eq!(runtime.kernel().stats().dropped_ticks, 7);
    assert_eq!(runtime.kernel().stats().accepted_ticks, 0);
}

#[test]
fn test_disarm_blocked_by_outstanding_handle() {
    let (runtime, ticker) = arm(Kernel::new(KernelConfig::default()));
    let extra = runtime.kernel().clone();

    assert!(runtime.disarm().is_none());
    assert!(!ticker.fire());
    drop(extra);
}

#[test]
fn test_wait_for_pass() {
    let (runtime, ticker) = arm(Kernel::new(KernelConfig::default()));
    let kernel = runtime.kernel().clone();

    assert!(!kernel.wait_for_pass(Duration::from_millis(5)));

    let firing = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        ticker.fire();
    });
    assert!(kernel.wait_for_pass(Duration::from_secs(5)));
    firing.join().unwrap();
}
