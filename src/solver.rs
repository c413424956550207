//! Sandboxed solver.
//!
//! [`Solver::solve`] composes an exercise and a candidate into a [`Unit`],
//! hands it to an [`IsolationBackend`] and collapses the outcome to a single
//! boolean. Every failure, whatever its cause, becomes `false` in one place.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::backend::{InProcessBackend, IsolationBackend, ProcessBackend, Unit};
use crate::config::{BackendType, Config, Limits};
use crate::exercise::Exercise;
use crate::interpreter::EvalError;

/// Evaluates candidates against exercises behind an isolation backend.
///
/// Cloning is cheap; clones share the backend. Calls to [`solve`] are
/// independent of each other and may run concurrently.
///
/// [`solve`]: Solver::solve
#[derive(Debug, Clone)]
pub struct Solver {
    backend: Arc<dyn IsolationBackend>,
    limits: Limits,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    /// A solver using the in-process backend and default limits.
    pub fn new() -> Self {
        Self::with_backend(InProcessBackend::new(), Limits::default())
    }

    pub fn with_backend(backend: impl IsolationBackend + 'static, limits: Limits) -> Self {
        Self {
            backend: Arc::new(backend),
            limits,
        }
    }

    /// Build a solver from configuration.
    ///
    /// The process backend needs a `worker` section naming the executable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let solver = match config.backend {
            BackendType::InProcess => {
                Self::with_backend(InProcessBackend::new(), config.limits.clone())
            }
            BackendType::Process => {
                let worker = config
                    .worker
                    .as_ref()
                    .context("The process backend requires a `worker` section")?;
                Self::with_backend(ProcessBackend::from_config(worker), config.limits.clone())
            }
        };
        debug!(backend = ?config.backend, "Solver configured");
        Ok(solver)
    }

    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run `candidate` between the exercise's context and goal.
    ///
    /// Returns `true` only when every fragment ran to completion and the
    /// goal's final value was truthy. Nothing about a failure reaches the
    /// caller; the reason is logged at debug level.
    #[instrument(skip_all, fields(candidate_len = candidate.len()))]
    pub async fn solve(&self, exercise: &Exercise, candidate: &str) -> bool {
        match self.attempt(exercise, candidate).await {
            Ok(truthy) => {
                debug!(truthy, "Attempt evaluated");
                truthy
            }
            Err(e) => {
                debug!(kind = failure_kind(&e), reason = %format!("{e:#}"), "Attempt failed");
                false
            }
        }
    }

    async fn attempt(&self, exercise: &Exercise, candidate: &str) -> Result<bool> {
        let goal = exercise.goal().unwrap_or_default();
        anyhow::ensure!(!goal.trim().is_empty(), "Exercise has no goal");

        let unit = Unit::new(exercise.context().unwrap_or_default(), candidate, goal);
        let verdict = self.backend.evaluate(&unit, &self.limits).await?;
        Ok(verdict.truthy)
    }
}

/// Log label for a failed attempt: the script error's kind, or `backend`
/// when the failure happened outside the interpreter.
fn failure_kind(error: &anyhow::Error) -> &'static str {
    error.downcast_ref::<EvalError>().map_or("backend", EvalError::kind)
}

/// Solve with a default [`Solver`].
pub async fn solve(exercise: &Exercise, candidate: &str) -> bool {
    Solver::new().solve(exercise, candidate).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::Verdict;

    /// Remembers the last unit and answers `true` unless told to fail.
    #[derive(Debug, Default)]
    struct Recording {
        calls: AtomicUsize,
        last: std::sync::Mutex<Option<Unit>>,
        fail: bool,
    }

    #[async_trait]
    impl IsolationBackend for Arc<Recording> {
        async fn evaluate(&self, unit: &Unit, _limits: &Limits) -> Result<Verdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(unit.clone());
            anyhow::ensure!(!self.fail, "backend exploded");
            Ok(Verdict { truthy: true })
        }
    }

    #[test]
    fn solver_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Solver>();
    }

    #[tokio::test]
    async fn composes_unit_in_order() {
        let backend = Arc::new(Recording::default());
        let solver = Solver::with_backend(Arc::clone(&backend), Limits::default());

        assert!(solver.solve(&Exercise::new("a = 1", "a == 2"), "a += 1").await);

        let unit = backend.last.lock().unwrap().clone().unwrap();
        assert_eq!(unit, Unit::new("a = 1", "a += 1", "a == 2"));
    }

    #[tokio::test]
    async fn missing_context_is_empty() {
        let backend = Arc::new(Recording::default());
        let solver = Solver::with_backend(Arc::clone(&backend), Limits::default());
        let exercise = Exercise::build(|e| {
            e.set_goal("true");
        });

        assert!(solver.solve(&exercise, "").await);
        assert_eq!(backend.last.lock().unwrap().as_ref().unwrap().context, "");
    }

    #[tokio::test]
    async fn blank_goal_fails_without_evaluating() {
        let backend = Arc::new(Recording::default());
        let solver = Solver::with_backend(Arc::clone(&backend), Limits::default());

        assert!(!solver.solve(&Exercise::default(), "true").await);
        assert!(!solver.solve(&Exercise::new("", "\n \n"), "true").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_errors_become_false() {
        let backend = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let solver = Solver::with_backend(backend, Limits::default());
        assert!(!solver.solve(&Exercise::new("", "true"), "").await);
    }

    #[tokio::test]
    async fn default_solver_evaluates() {
        let exercise = Exercise::new("a = 1; b = 2", "c == 3");
        assert!(Solver::default().solve(&exercise, "c = a + b").await);
        assert!(!solve(&exercise, "c = a * b").await);
    }

    #[tokio::test]
    async fn failures_are_labelled_by_kind() {
        let backend = InProcessBackend::new();
        let err = backend
            .evaluate(&Unit::new("", "1 / 0", "true"), &Limits::default())
            .await
            .unwrap_err();
        assert_eq!(failure_kind(&err), "zero_division");

        let err = backend
            .evaluate(&Unit::new("", "ENV['HOME']", "true"), &Limits::default())
            .await
            .unwrap_err();
        assert_eq!(failure_kind(&err), "security");

        assert_eq!(failure_kind(&anyhow::anyhow!("Worker timed out")), "backend");
    }

    #[test]
    fn from_config_requires_worker_for_process() {
        let config = Config::from_json(r#"{"backend": "process"}"#).unwrap();
        let err = Solver::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("worker"));

        let config = Config::from_json(
            r#"{"backend": "process", "worker": {"exec": "/usr/bin/w"}, "limits": {"max_steps": 10}}"#,
        )
        .unwrap();
        let solver = Solver::from_config(&config).unwrap();
        assert_eq!(solver.limits().max_steps, 10);
    }

    #[test]
    fn from_config_defaults_to_in_process() {
        let solver = Solver::from_config(&Config::default()).unwrap();
        assert_eq!(solver.limits(), &Limits::default());
        assert!(format!("{solver:?}").contains("InProcessBackend"));
    }
}
