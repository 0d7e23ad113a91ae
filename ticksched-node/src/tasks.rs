//! Built-in task bodies
//!
//! Stand-ins for controller work: the node has no real peripherals, so
//! sensors and actuators are simulated and report through the log.

use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use ticksched::{boxed, BoxedTask, TaskFault};
use tracing::{debug, info};

use crate::error::NodeError;

/// Task body selectable from a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Greets with the task name
    Hello,
    /// Samples a simulated load cell
    Sensor,
    /// Steps through drive commands
    Actuate,
    /// Reports uptime
    Housekeeping,
    /// Always fails
    Fail,
    /// Start-up work, meant as a one-shot
    Init,
}

impl FromStr for Action {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hello" => Ok(Action::Hello),
            "sensor" => Ok(Action::Sensor),
            "actuate" => Ok(Action::Actuate),
            "housekeeping" => Ok(Action::Housekeeping),
            "fail" => Ok(Action::Fail),
            "init" => Ok(Action::Init),
            other => Err(NodeError::UnknownAction(other.to_string())),
        }
    }
}

/// Drive commands cycled by the actuator task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Drive {
    const CYCLE: [Drive; 5] = [
        Drive::Forward,
        Drive::Backward,
        Drive::Left,
        Drive::Right,
        Drive::Stop,
    ];

    /// Command issued on the `step`-th invocation
    pub fn at(step: usize) -> Drive {
        Self::CYCLE[step % Self::CYCLE.len()]
    }
}

/// Simulated load cell: a slow triangle wave in grams
pub fn load_cell_sample(step: u32) -> u32 {
    let phase = step % 40;
    if phase < 20 {
        500 + phase * 25
    } else {
        500 + (40 - phase) * 25
    }
}

/// Build the body for `action`
pub fn build(name: &str, action: Action) -> BoxedTask {
    let name = name.to_string();
    match action {
        Action::Hello => boxed(move || {
            info!("hello from {}", name);
            Ok(())
        }),
        Action::Sensor => {
            let mut step = 0u32;
            boxed(move || {
                let grams = load_cell_sample(step);
                step = step.wrapping_add(1);
                debug!(task = %name, grams, "load cell sample");
                Ok(())
            })
        }
        Action::Actuate => {
            let mut step = 0usize;
            boxed(move || {
                let drive = Drive::at(step);
                step = step.wrapping_add(1);
                info!(task = %name, ?drive, "drive command");
                Ok(())
            })
        }
        Action::Housekeeping => {
            let started = Instant::now();
            boxed(move || {
                info!(task = %name, uptime_s = started.elapsed().as_secs(), "housekeeping");
                Ok(())
            })
        }
        Action::Fail => boxed(move || Err(TaskFault::Failed("simulated failure"))),
        Action::Init => boxed(move || {
            info!("{}: peripherals initialized", name);
            Ok(())
        }),
    }
}
