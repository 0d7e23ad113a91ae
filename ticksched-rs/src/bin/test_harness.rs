//! ticksched - JSON Test Vector Harness
//!
//! Runs scenario vectors from the spec/test-vectors directory and outputs
//! JSON results, so the same scenarios can be replayed against other builds
//! of the scheduler.

use ticksched::{
    hal::{ManualTicker, TickSource},
    kernel::{Kernel, KernelConfig},
    task::{boxed, BoxedTask},
    types::{BusyPolicy, PendingPolicy, TaskFault, MAX_TASKS},
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::{env, fs, path::Path};

// Use std Result to avoid conflict with ticksched::Result
type Result<T> = std::result::Result<T, String>;

// ============================================================================
// Test Vector Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TestVector {
    id: String,
    #[serde(default)]
    name: String,
    module: String,
    function: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    setup: Setup,
    #[serde(default)]
    input: Input,
    expected: Value,
    #[serde(default)]
    notes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Setup {
    #[serde(default)]
    policy: Policy,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct Policy {
    #[serde(default)]
    pending: PendingPolicy,
    #[serde(default)]
    busy: BusyPolicy,
}

#[derive(Debug, Clone, Deserialize)]
struct TaskSpec {
    name: String,
    #[serde(default)]
    delay: u32,
    #[serde(default)]
    period: u32,
    #[serde(default = "default_action")]
    action: String,
}

fn default_action() -> String {
    "ok".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct Input {
    #[serde(default)]
    ticks: u32,
    /// Notifications fired from inside a `nested` task
    #[serde(default)]
    nested: u32,
}

#[derive(Debug, Serialize)]
struct TestResult {
    id: String,
    module: String,
    function: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual: Option<Value>,
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: test_harness <test_vector.json> [test_vector2.json ...]");
        std::process::exit(1);
    }

    // Task panics are expected in some vectors; keep stderr readable
    std::panic::set_hook(Box::new(|_| {}));

    let mut all_results: Vec<TestResult> = Vec::new();

    for path in &args[1..] {
        match run_test_file(path) {
            Ok(result) => all_results.push(result),
            Err(e) => {
                all_results.push(TestResult {
                    id: Path::new(path)
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    module: "harness".to_string(),
                    function: "load".to_string(),
                    passed: false,
                    error: Some(format!("Failed to load test file: {}", e)),
                    actual: None,
                });
            }
        }
    }

    // Output JSON results
    match serde_json::to_string_pretty(&all_results) {
        Ok(out) => println!("{}", out),
        Err(e) => eprintln!("Failed to serialize results: {}", e),
    }

    // Summary to stderr
    let passed = all_results.iter().filter(|r| r.passed).count();
    let total = all_results.len();
    eprintln!("\n=== Test Summary ===");
    eprintln!(
        "Passed: {}/{} ({:.1}%)",
        passed,
        total,
        100.0 * passed as f64 / total.max(1) as f64
    );

    if passed != total {
        std::process::exit(1);
    }
}

fn run_test_file(path: &str) -> Result<TestResult> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;

    let vector: TestVector =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path, e))?;

    Ok(dispatch_test(&vector))
}

fn dispatch_test(vector: &TestVector) -> TestResult {
    let result = match (vector.module.as_str(), vector.function.as_str()) {
        ("kernel", "run_ticks") => test_run_ticks(vector),
        ("kernel", "on_tick") => test_on_tick(vector),
        _ => Err(format!("No handler for {}.{}", vector.module, vector.function)),
    };

    match result {
        Ok(actual) => {
            let passed = compare_values(&vector.expected, &actual);
            TestResult {
                id: vector.id.clone(),
                module: vector.module.clone(),
                function: vector.function.clone(),
                passed,
                error: if passed { None } else { Some("Result mismatch".to_string()) },
                actual: if passed { None } else { Some(actual) },
            }
        }
        Err(e) => TestResult {
            id: vector.id.clone(),
            module: vector.module.clone(),
            function: vector.function.clone(),
            passed: false,
            error: Some(e),
            actual: None,
        },
    }
}

// ============================================================================
// Scenario Construction
// ============================================================================

/// Invocation trace shared by every task body of a scenario
type Trace = Arc<Mutex<Vec<String>>>;

fn build_task(spec: &TaskSpec, trace: &Trace, ticker: &ManualTicker, nested: u32) -> Result<BoxedTask> {
    let trace = trace.clone();
    let name = spec.name.clone();
    let record = move || trace.lock().push(name.clone());

    let task = match spec.action.as_str() {
        "ok" => boxed(move || {
            record();
            Ok(())
        }),
        "fail" => boxed(move || {
            record();
            Err(TaskFault::Failed("scenario failure"))
        }),
        "panic" => boxed(move || {
            record();
            panic!("scenario panic");
        }),
        "nested" => {
            let ticker = ticker.clone();
            boxed(move || {
                record();
                ticker.fire_n(nested);
                Ok(())
            })
        }
        other => return Err(format!("Unknown action {}", other)),
    };
    Ok(task)
}

fn build_kernel(
    vector: &TestVector,
    trace: &Trace,
    ticker: &ManualTicker,
) -> Result<(Kernel<BoxedTask, MAX_TASKS>, Vec<Value>)> {
    let config = KernelConfig::default()
        .with_pending_policy(vector.setup.policy.pending)
        .with_busy_policy(vector.setup.policy.busy);
    let mut kernel = Kernel::new(config);

    let mut registration = Vec::new();
    for spec in &vector.setup.tasks {
        let task = build_task(spec, trace, ticker, vector.input.nested)?;
        registration.push(match kernel.add_task(task, spec.delay, spec.period) {
            Ok(slot) => json!(slot.index()),
            Err(e) => json!(format!("{:?}", e)),
        });
    }
    Ok((kernel, registration))
}

fn summarize(
    vector: &TestVector,
    trace: &Trace,
    registration: Vec<Value>,
    free_slots: usize,
    stats: Value,
) -> Value {
    let trace = trace.lock().clone();

    let mut runs: BTreeMap<&str, u32> = vector
        .setup
        .tasks
        .iter()
        .map(|t| (t.name.as_str(), 0))
        .collect();
    for name in &trace {
        if let Some(count) = runs.get_mut(name.as_str()) {
            *count += 1;
        }
    }
    let runs: Map<String, Value> = runs
        .into_iter()
        .map(|(name, count)| (name.to_string(), json!(count)))
        .collect();

    json!({
        "registration": registration,
        "runs": runs,
        "trace": trace,
        "free_slots": free_slots,
        "stats": stats,
    })
}

// ============================================================================
// Kernel Tests
// ============================================================================

/// Unarmed kernel stepped tick by tick
fn test_run_ticks(vector: &TestVector) -> Result<Value> {
    let trace: Trace = Arc::default();
    let ticker = ManualTicker::new();
    let (mut kernel, registration) = build_kernel(vector, &trace, &ticker)?;

    let stats = kernel.run_ticks(vector.input.ticks);
    let stats = serde_json::to_value(stats).map_err(|e| e.to_string())?;
    Ok(summarize(
        vector,
        &trace,
        registration,
        kernel.table().free_slots(),
        stats,
    ))
}

/// Armed kernel driven by a manual tick source
fn test_on_tick(vector: &TestVector) -> Result<Value> {
    let trace: Trace = Arc::default();
    let mut ticker = ManualTicker::new();
    let (kernel, registration) = build_kernel(vector, &trace, &ticker)?;

    let runtime = kernel.arm(ticker.clone()).map_err(|e| e.to_string())?;
    ticker.fire_n(vector.input.ticks);
    ticker.stop();

    let armed = runtime.kernel();
    let free_slots = armed
        .inspect(|table| table.free_slots())
        .map_err(|e| e.to_string())?;
    let stats = serde_json::to_value(armed.stats()).map_err(|e| e.to_string())?;
    Ok(summarize(vector, &trace, registration, free_slots, stats))
}

// ============================================================================
// Comparison
// ============================================================================

fn compare_values(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp_map), Value::Object(act_map)) => exp_map.iter().all(|(key, exp_val)| {
            act_map
                .get(key)
                .map_or(false, |act_val| compare_values(exp_val, act_val))
        }),
        (Value::Number(exp), Value::Number(act)) => exp.as_u64() == act.as_u64() && exp.as_i64() == act.as_i64(),
        (Value::Bool(exp), Value::Bool(act)) => exp == act,
        (Value::String(exp), Value::String(act)) => exp == act,
        (Value::Array(exp), Value::Array(act)) => {
            exp.len() == act.len() && exp.iter().zip(act.iter()).all(|(e, a)| compare_values(e, a))
        }
        _ => false,
    }
}
