//! ticksched Node
//!
//! Host process playing the bootstrap role: registers the task plan, arms
//! the system timer, then idles until told to stop. SIGINT keeps its default
//! behavior and ends the process immediately.

mod config;
mod error;
mod tasks;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ticksched::hal::posix::SystemTicker;
use ticksched::{BoxedTask, BusyPolicy, Kernel, PendingPolicy, TickResolution};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{NodeConfig, TaskPlan};

/// Tick-driven cooperative scheduler node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tick resolution in microseconds
    #[arg(long, default_value_t = ticksched::DEFAULT_TICK_US)]
    tick_us: u32,

    /// What to do with a tick that arrives during a pass (drop, defer, catch-up)
    #[arg(long, default_value = "drop")]
    busy_policy: BusyPolicy,

    /// How activations pile up on a slot (accumulate, saturate)
    #[arg(long, default_value = "accumulate")]
    pending_policy: PendingPolicy,

    /// JSON task plan (defaults to the built-in demo set)
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Exit after this many accepted ticks
    #[arg(long)]
    run_ticks: Option<u32>,

    /// Log stats every this many accepted ticks
    #[arg(long)]
    stats_every: Option<u32>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> error::Result<NodeConfig> {
        let resolution = TickResolution::from_micros(self.tick_us)?;
        let mut config = NodeConfig::default()
            .with_resolution(resolution)
            .with_busy_policy(self.busy_policy)
            .with_pending_policy(self.pending_policy);

        if let Some(path) = &self.plan {
            config = config.with_plan(TaskPlan::load(path)?);
        }
        if let Some(ticks) = self.run_ticks {
            config = config.with_run_ticks(ticks);
        }
        if let Some(every) = self.stats_every {
            config = config.with_stats_every(every);
        }
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = args.into_config()?;
    info!(
        "ticksched node starting ({} us tick, busy {:?}, pending {:?})",
        config.kernel.resolution.as_micros(),
        config.kernel.busy_policy,
        config.kernel.pending_policy
    );

    // Register the initial task set before the timer is armed
    let mut kernel: Kernel<BoxedTask> = Kernel::new(config.kernel);
    for (entry, action) in config.plan.validate()? {
        let slot = kernel.add_task(tasks::build(&entry.name, action), entry.delay, entry.period)?;
        info!(
            "task \"{}\" in slot {} (delay {}, period {}, {:?})",
            entry.name, slot, entry.delay, entry.period, action
        );
    }

    let runtime = kernel.arm(SystemTicker::new())?;
    let armed = runtime.kernel();

    // Idle between passes; stats are read lock-free from the monitor
    let mut next_report = config.stats_every;
    loop {
        if !armed.wait_for_pass(Duration::from_secs(1)) {
            warn!("no pass completed within 1s");
        }
        let stats = armed.stats();

        if let (Some(due), Some(every)) = (next_report, config.stats_every) {
            if stats.accepted_ticks >= due {
                info!("stats {}", serde_json::to_string(&stats)?);
                next_report = Some(stats.accepted_ticks.saturating_add(every));
            }
        }

        if config.run_ticks.map_or(false, |limit| stats.accepted_ticks >= limit) {
            break;
        }
    }

    match runtime.disarm() {
        Some(kernel) => {
            let stats = kernel.stats();
            info!(
                "stopped after {} ticks ({} dropped, {} invocations, {} faults)",
                stats.accepted_ticks, stats.dropped_ticks, stats.invocations, stats.faults
            );
        }
        None => warn!("kernel still shared at shutdown"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["ticksched-node"]);
        let config = args.into_config().unwrap();
        assert_eq!(config.kernel.resolution, TickResolution::default());
        assert_eq!(config.kernel.busy_policy, BusyPolicy::Drop);
        assert_eq!(config.plan.tasks.len(), 4);
        assert_eq!(config.run_ticks, None);
    }

    #[test]
    fn test_args_policies() {
        let args = Args::parse_from([
            "ticksched-node",
            "--tick-us",
            "500",
            "--busy-policy",
            "defer",
            "--pending-policy",
            "saturate",
            "--run-ticks",
            "10",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.kernel.resolution.as_micros(), 500);
        assert_eq!(config.kernel.busy_policy, BusyPolicy::Defer);
        assert_eq!(config.kernel.pending_policy, PendingPolicy::Saturate);
        assert_eq!(config.run_ticks, Some(10));
        // Demo periods scale with the tick rate
        assert_eq!(config.plan.tasks[1].period, 2_000);
    }

    #[test]
    fn test_args_reject_bad_values() {
        assert!(Args::try_parse_from(["ticksched-node", "--busy-policy", "queue"]).is_err());

        let args = Args::parse_from(["ticksched-node", "--busy-policy", "catch-up"]);
        assert_eq!(args.busy_policy, BusyPolicy::CatchUp);

        let args = Args::parse_from(["ticksched-node", "--tick-us", "0"]);
        assert!(matches!(
            args.into_config(),
            Err(error::NodeError::Sched(ticksched::Error::InvalidArg))
        ));
    }
}
