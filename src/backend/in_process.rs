//! In-process backend.
//!
//! Runs the interpreter on a dedicated OS thread with a large stack. The
//! awaiting task enforces the deadline and raises a cancellation flag the
//! interpreter polls, so a runaway candidate stops shortly after the caller
//! gives up on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use super::{IsolationBackend, Unit, Verdict};
use crate::config::Limits;
use crate::interpreter::{self, STACK_SIZE};

/// Backend that evaluates on a fresh thread inside the calling process.
#[derive(Debug, Default, Clone)]
pub struct InProcessBackend {}

impl InProcessBackend {
    /// Create a new in-process backend.
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }
}

/// Raises the flag when dropped, including when the awaiting future is
/// dropped before the evaluation ends.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl IsolationBackend for InProcessBackend {
    #[instrument(
        skip(self, unit, limits),
        fields(candidate_len = unit.candidate.len(), timeout_ms = limits.timeout_ms)
    )]
    async fn evaluate(&self, unit: &Unit, limits: &Limits) -> Result<Verdict> {
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));
        let (tx, rx) = oneshot::channel();

        let thread_unit = unit.clone();
        let thread_limits = limits.clone();
        thread::Builder::new()
            .name("exercise-eval".to_string())
            .stack_size(STACK_SIZE)
            .spawn(move || {
                let result =
                    interpreter::evaluate(&thread_unit.fragments(), &thread_limits, cancel);
                // The receiver is gone if the caller timed out.
                let _ = tx.send(result);
            })
            .context("Failed to spawn evaluation thread")?;

        let result = match tokio::time::timeout(limits.timeout(), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => anyhow::bail!("Evaluation thread exited without a result"),
            Err(_) => anyhow::bail!("Evaluation timed out after {}ms", limits.timeout_ms),
        };

        let truthy = result.context("Evaluation failed")?;
        debug!(truthy, "Evaluation completed");
        Ok(Verdict { truthy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn evaluate(context: &str, candidate: &str, goal: &str) -> Result<Verdict> {
        InProcessBackend::new()
            .evaluate(&Unit::new(context, candidate, goal), &Limits::default())
            .await
    }

    #[tokio::test]
    async fn verdict_follows_goal() {
        let verdict = evaluate("a = 1; b = 2", "c = a + b", "c == 3").await.unwrap();
        assert!(verdict.truthy);
        let verdict = evaluate("a = 1; b = 2", "c = a * b", "c == 3").await.unwrap();
        assert!(!verdict.truthy);
    }

    #[tokio::test]
    async fn script_errors_carry_their_reason() {
        let err = evaluate("", "1 / 0", "true").await.unwrap_err();
        assert!(format!("{err:#}").contains("divided by 0"));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let limits = Limits {
            timeout_ms: 100,
            max_steps: u64::MAX,
            ..Limits::default()
        };
        let unit = Unit::new("", "loop { }", "true");
        let started = std::time::Instant::now();
        let err = InProcessBackend::new().evaluate(&unit, &limits).await.unwrap_err();
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        let message = format!("{err:#}");
        assert!(message.contains("timed out") || message.contains("cancelled"), "{message}");
    }

    #[tokio::test]
    async fn deep_recursion_fails_without_crashing() {
        let candidate = "def down(n)\n  down(n + 1)\nend\ndown(0)";
        let err = evaluate("", candidate, "true").await.unwrap_err();
        assert!(format!("{err:#}").contains("stack level too deep"));
    }
}
