//! The process backend against the real worker binary.

use std::time::{Duration, Instant};

use exercise_sandbox::backend::{InProcessBackend, IsolationBackend, ProcessBackend, Unit};
use exercise_sandbox::{Config, Exercise, Limits, Solver};

const WORKER: &str = env!("CARGO_BIN_EXE_exercise-sandbox-worker");

#[tokio::test]
async fn worker_answers_ping() {
    ProcessBackend::new(WORKER).ping().await.unwrap();
}

#[tokio::test]
async fn verdicts_match_in_process() {
    let units = [
        Unit::new("a = 1; b = 2", "c = a + b", "c == 3"),
        Unit::new("a = 1; b = 2", "c = a * b", "c == 3"),
        Unit::new("a = 1", "a += 1", "a == 2"),
        Unit::new("s = 'forward'", "s.reverse!", "s == 'drawrof'"),
        Unit::new("xs = (1..5).to_a", "ys = xs.map { |x| x * x }", "ys.sum == 55"),
        Unit::new("", "h = Hash.new(0)\n%w[a b a].each { |w| h[w] += 1 }", "h['a'] == 2"),
    ];
    let limits = Limits::default();
    let process = ProcessBackend::new(WORKER);
    let in_process = InProcessBackend::new();

    for unit in &units {
        let remote = process.evaluate(unit, &limits).await.unwrap();
        let local = in_process.evaluate(unit, &limits).await.unwrap();
        assert_eq!(remote, local, "{}", unit.source());
    }
}

#[tokio::test]
async fn failures_cross_the_boundary() {
    let process = ProcessBackend::new(WORKER);
    let limits = Limits::default();

    let err = process
        .evaluate(&Unit::new("", "ENV['HOME']", "true"), &limits)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("insecure"), "{err:#}");

    let err = process
        .evaluate(&Unit::new("", "c = ", "true"), &limits)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("syntax error"), "{err:#}");
}

#[tokio::test]
async fn runaway_worker_is_stopped() {
    let limits = Limits {
        timeout_ms: 200,
        max_steps: u64::MAX,
        ..Limits::default()
    };
    let process = ProcessBackend::new(WORKER).with_startup_grace(Duration::from_millis(500));

    let started = Instant::now();
    let result = process
        .evaluate(&Unit::new("", "loop { }", "true"), &limits)
        .await;
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn solver_from_config_uses_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let json = serde_json::json!({
        "backend": "process",
        "worker": { "exec": WORKER },
        "limits": { "timeout_ms": 1000 }
    });
    std::fs::write(&path, json.to_string()).unwrap();

    let solver = Solver::from_config(&Config::from_file(&path).unwrap()).unwrap();
    let exercise = Exercise::new("a = 1; b = 2", "c == 3");
    assert!(solver.solve(&exercise, "c = a + b").await);
    assert!(!solver.solve(&exercise, "c = a * b").await);
    assert!(!solver.solve(&exercise, "@goal = 'true'").await);
}
