//! Node configuration
//!
//! Kernel settings plus the task plan registered before the system timer is
//! armed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use ticksched::{BusyPolicy, Error, KernelConfig, PendingPolicy, Tick, TickResolution, MAX_TASKS};

use crate::error::{NodeError, Result};
use crate::tasks::Action;

/// One task of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Name used in log lines
    pub name: String,

    /// Ticks before the first activation
    #[serde(default)]
    pub delay: Tick,

    /// Ticks between activations (0 = one-shot)
    #[serde(default)]
    pub period: Tick,

    /// Built-in body to run
    pub action: String,
}

impl TaskEntry {
    /// Create entry
    pub fn new(name: impl Into<String>, delay: Tick, period: Tick, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay,
            period,
            action: action.into(),
        }
    }
}

/// Ordered list of tasks; order decides slot numbers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPlan {
    pub tasks: Vec<TaskEntry>,
}

impl TaskPlan {
    /// Demo set: a start-up one-shot and greeters at 1 s, 5 s and 10 s
    pub fn demo(resolution: TickResolution) -> Self {
        let per_second = (1_000_000 / resolution.as_micros()).max(1);
        Self {
            tasks: vec![
                TaskEntry::new("init", 0, 0, "init"),
                TaskEntry::new("hello-1s", 0, per_second, "hello"),
                TaskEntry::new("hello-5s", 0, per_second.saturating_mul(5), "hello"),
                TaskEntry::new("hello-10s", 0, per_second.saturating_mul(10), "hello"),
            ],
        }
    }

    /// Parse a JSON plan
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON plan from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| NodeError::PlanRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check the plan fits the table and names known actions
    pub fn validate(&self) -> Result<Vec<(&TaskEntry, Action)>> {
        if self.tasks.len() > MAX_TASKS {
            return Err(NodeError::Sched(Error::Full));
        }
        self.tasks
            .iter()
            .map(|entry| Ok((entry, entry.action.parse::<Action>()?)))
            .collect()
    }
}

/// Complete node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Kernel settings
    pub kernel: KernelConfig,

    /// Tasks to register
    pub plan: TaskPlan,

    /// Stop after this many accepted ticks (run forever if unset)
    pub run_ticks: Option<u32>,

    /// Log stats every this many accepted ticks
    pub stats_every: Option<u32>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let kernel = KernelConfig::default();
        Self {
            plan: TaskPlan::demo(kernel.resolution),
            kernel,
            run_ticks: None,
            stats_every: None,
        }
    }
}

impl NodeConfig {
    /// Set tick resolution; a demo plan is rebuilt for the new rate
    pub fn with_resolution(mut self, resolution: TickResolution) -> Self {
        if self.plan == TaskPlan::demo(self.kernel.resolution) {
            self.plan = TaskPlan::demo(resolution);
        }
        self.kernel = self.kernel.with_resolution(resolution);
        self
    }

    /// Set busy-tick policy
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.kernel = self.kernel.with_busy_policy(policy);
        self
    }

    /// Set activation policy
    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.kernel = self.kernel.with_pending_policy(policy);
        self
    }

    /// Replace the task plan
    pub fn with_plan(mut self, plan: TaskPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Stop after `ticks` accepted ticks
    pub fn with_run_ticks(mut self, ticks: u32) -> Self {
        self.run_ticks = Some(ticks);
        self
    }

    /// Log stats periodically
    pub fn with_stats_every(mut self, ticks: u32) -> Self {
        self.stats_every = Some(ticks).filter(|&t| t > 0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_demo_plan() {
        let plan = TaskPlan::demo(TickResolution::default());
        let periods: Vec<_> = plan.tasks.iter().map(|t| t.period).collect();
        assert_eq!(periods, [0, 1_000, 5_000, 10_000]);
        assert_eq!(plan.validate().unwrap().len(), 4);
    }

    #[test]
    fn test_demo_plan_follows_resolution() {
        let config = NodeConfig::default().with_resolution(TickResolution::from_millis(10).unwrap());
        assert_eq!(config.plan.tasks[1].period, 100);
        assert_eq!(config.kernel.resolution.as_micros(), 10_000);
    }

    #[test]
    fn test_config_builder() {
        let plan = TaskPlan {
            tasks: vec![TaskEntry::new("s", 2, 50, "sensor")],
        };
        let config = NodeConfig::default()
            .with_busy_policy(BusyPolicy::Defer)
            .with_pending_policy(PendingPolicy::Saturate)
            .with_plan(plan.clone())
            .with_resolution(TickResolution::from_millis(2).unwrap())
            .with_run_ticks(100)
            .with_stats_every(0);

        assert_eq!(config.kernel.busy_policy, BusyPolicy::Defer);
        assert_eq!(config.kernel.pending_policy, PendingPolicy::Saturate);
        // Custom plans are left alone by resolution changes
        assert_eq!(config.plan, plan);
        assert_eq!(config.run_ticks, Some(100));
        assert_eq!(config.stats_every, None);
    }

    #[test]
    fn test_plan_from_json() {
        let plan = TaskPlan::from_json(
            r#"[
                {"name": "boot", "action": "init"},
                {"name": "drive", "delay": 10, "period": 100, "action": "actuate"}
            ]"#,
        )
        .unwrap();

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0], TaskEntry::new("boot", 0, 0, "init"));
        assert_eq!(plan.tasks[1].delay, 10);
    }

    #[test]
    fn test_plan_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "h", "period": 5, "action": "hello"}}]"#).unwrap();

        let plan = TaskPlan::load(file.path()).unwrap();
        assert_eq!(plan.tasks[0].period, 5);

        let missing = TaskPlan::load(Path::new("/nonexistent/plan.json"));
        assert!(matches!(missing, Err(NodeError::PlanRead { .. })));
    }

    #[test]
    fn test_plan_validation() {
        let unknown = TaskPlan {
            tasks: vec![TaskEntry::new("cam", 0, 0, "camera")],
        };
        assert!(matches!(unknown.validate(), Err(NodeError::UnknownAction(a)) if a == "camera"));

        let crowded = TaskPlan {
            tasks: (0..=MAX_TASKS)
                .map(|i| TaskEntry::new(format!("t{i}"), 0, 1, "hello"))
                .collect(),
        };
        assert!(matches!(crowded.validate(), Err(NodeError::Sched(Error::Full))));

        assert!(matches!(TaskPlan::from_json("{"), Err(NodeError::PlanParse(_))));
    }
}
