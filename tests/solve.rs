//! End-to-end behaviour of `Solver::solve` with the in-process backend.

use std::time::{Duration, Instant};

use exercise_sandbox::{solve, Exercise, Limits, Solver};

fn sum_exercise() -> Exercise {
    Exercise::new("a = 1; b = 2", "c == 3")
}

#[tokio::test]
async fn concrete_scenarios() {
    let solver = Solver::new();

    assert!(!solver.solve(&sum_exercise(), "c = a * b").await);
    assert!(solver.solve(&sum_exercise(), "c = a + b").await);
    assert!(solver.solve(&Exercise::new("a = 1", "a == 2"), "a += 1").await);

    let reverse = Exercise::new("s = 'forward'", "s == 'drawrof'");
    assert!(!solver.solve(&reverse, "s.downcase").await);
    assert!(solver.solve(&reverse, "s.reverse!").await);

    let mixed = Exercise::new("a = rand", "b == a * 100");
    assert!(!solver.solve(&mixed, "a *= '100'").await);
}

#[tokio::test]
async fn broken_candidates_are_false() {
    let solver = Solver::new();
    for candidate in [
        "c = ",
        "c = a +",
        "def broken(",
        "c = undefined_thing",
        "c = 1 / 0",
        "raise 'nope'",
        "c = [1, 2].fetch(10)",
        "break",
        "return 3",
    ] {
        assert!(!solver.solve(&sum_exercise(), candidate).await, "{candidate}");
    }
}

#[tokio::test]
async fn a_candidate_cannot_splice_into_the_goal() {
    // Parsed together this would read `c = 3 || c == 3`.
    assert!(!Solver::new().solve(&sum_exercise(), "c = 3 ||").await);
    // An open `if` cannot swallow the goal either.
    assert!(!Solver::new().solve(&sum_exercise(), "c = 3\nif false").await);
}

#[tokio::test]
async fn forbidden_operations_are_false() {
    let solver = Solver::new();
    for candidate in [
        "c = 3; File.read('/etc/passwd')",
        "c = 3; ENV['HOME']",
        "c = 3; system('touch /tmp/pwned')",
        "c = 3; `id`",
        "c = 3; exit",
        "c = 3; eval('c')",
        "c = 3; require 'socket'",
        "c = 3; $stdout",
        "@goal = 'true'",
        "c = 3; 1.send(:+, 2)",
        "c = 3; Process.pid",
    ] {
        assert!(!solver.solve(&sum_exercise(), candidate).await, "{candidate}");
    }
}

#[tokio::test]
async fn rescue_cannot_swallow_violations() {
    let solver = Solver::new();
    let candidate = "begin\n  ENV['HOME']\nrescue Exception\nend\nc = 3";
    assert!(!solver.solve(&sum_exercise(), candidate).await);

    let limits = Limits {
        max_steps: 10_000,
        ..Limits::default()
    };
    let solver = Solver::with_backend(exercise_sandbox::backend::InProcessBackend::new(), limits);
    let candidate = "begin\n  loop { }\nrescue Exception\nend\nc = 3";
    assert!(!solver.solve(&sum_exercise(), candidate).await);
}

#[tokio::test]
async fn exercise_survives_a_violation() {
    let solver = Solver::new();
    let exercise = sum_exercise();

    assert!(!solver.solve(&exercise, "@goal = 'true'").await);
    assert!(!solver.solve(&exercise, "c = 3; ENV.clear").await);
    assert!(solver.solve(&exercise, "c = a + b").await);
    assert_eq!(exercise, sum_exercise());
}

#[tokio::test]
async fn infinite_loop_stops_at_the_deadline() {
    let limits = Limits {
        timeout_ms: 200,
        max_steps: u64::MAX,
        ..Limits::default()
    };
    let solver = Solver::with_backend(exercise_sandbox::backend::InProcessBackend::new(), limits);

    let started = Instant::now();
    assert!(!solver.solve(&sum_exercise(), "loop { }").await);
    assert!(started.elapsed() < Duration::from_secs(5));

    let started = Instant::now();
    assert!(!solver.solve(&sum_exercise(), "while true\nend").await);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn unbounded_allocation_is_false() {
    let solver = Solver::new();
    assert!(!solver.solve(&sum_exercise(), "s = 'x'\nloop { s += s }").await);
    assert!(!solver.solve(&sum_exercise(), "xs = []\nloop { xs << [1, 2, 3] }").await);
}

#[tokio::test]
async fn deep_recursion_is_false() {
    let solver = Solver::new();
    let candidate = "def down(n)\n  down(n + 1)\nend\ndown(0)\nc = 3";
    assert!(!solver.solve(&sum_exercise(), candidate).await);

    let nested = format!("c = {}3{}", "[".repeat(10_000), "]".repeat(10_000));
    assert!(!solver.solve(&sum_exercise(), &nested).await);
}

#[tokio::test]
async fn concurrent_attempts_do_not_interfere() {
    let solver = Solver::new();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let solver = solver.clone();
            tokio::spawn(async move {
                let candidate = if i % 2 == 0 { "c = a + b" } else { "c = a * b" };
                (i, solver.solve(&sum_exercise(), candidate).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, solved) = handle.await.unwrap();
        assert_eq!(solved, i % 2 == 0, "attempt {i}");
    }
}

#[tokio::test]
async fn repeated_solves_agree() {
    let solver = Solver::new();
    let exercise = Exercise::new("xs = [3, 1, 2]", "ys == [1, 2, 3]");
    for _ in 0..5 {
        assert!(solver.solve(&exercise, "ys = xs.sort").await);
        assert!(!solver.solve(&exercise, "ys = xs").await);
    }
}

#[tokio::test]
async fn fragments_are_normalized_before_solving() {
    let exercise = Exercise::build(|e| {
        e.set_context("\n\n  a = 10\n\n  b = 20\n\n");
        e.set_goal("\n  c == a + b\n");
    });
    assert_eq!(exercise.context(), Some("  a = 10\n\n  b = 20"));
    assert!(solve(&exercise, "c = 30").await);
    assert!(!solve(&exercise, "c = 31").await);
}

#[tokio::test]
async fn missing_or_blank_goal_is_false() {
    let no_goal = Exercise::build(|e| {
        e.set_context("a = 1");
    });
    assert!(!solve(&no_goal, "true").await);
    assert!(!solve(&Exercise::new("a = 1", "\n\n"), "true").await);
}

#[tokio::test]
async fn only_nil_and_false_fail_the_goal() {
    let solver = Solver::new();
    assert!(solver.solve(&Exercise::new("", "result"), "result = 0").await);
    assert!(solver.solve(&Exercise::new("", "result"), "result = ''").await);
    assert!(!solver.solve(&Exercise::new("", "result"), "result = nil").await);
    assert!(!solver.solve(&Exercise::new("", "result"), "result = false").await);
}

#[tokio::test]
async fn multiple_assignment() {
    let solver = Solver::new();
    let swap = Exercise::new("a = 1; b = 2", "a == 2 && b == 1");
    assert!(solver.solve(&swap, "a, b = b, a").await);

    let fresh = Exercise::new("", "a == 1 && b == 2");
    assert!(solver.solve(&fresh, "a, b = 1, 2").await);
    assert!(solver.solve(&fresh, "a, b = [1, 2]").await);
    assert!(!solver.solve(&fresh, "a, b = 2, 1").await);
}

#[tokio::test]
async fn spaced_index_on_a_local() {
    let exercise = Exercise::new("x = [1, 2]", "x [0] == 1");
    assert!(Solver::new().solve(&exercise, "").await);
}

#[tokio::test]
async fn walks_over_shared_structure_stop_at_the_deadline() {
    let limits = Limits {
        timeout_ms: 200,
        max_steps: u64::MAX,
        ..Limits::default()
    };
    let solver = Solver::with_backend(exercise_sandbox::backend::InProcessBackend::new(), limits);
    let exercise = Exercise::new("", "true");

    for walk in ["a.join", "a.flatten"] {
        let candidate = format!("a = ['']\n60.times {{ a = [a, a] }}\n{walk}");
        let started = Instant::now();
        assert!(!solver.solve(&exercise, &candidate).await, "{walk}");
        assert!(started.elapsed() < Duration::from_secs(5), "{walk}");
    }
}
