//! Worker process backend.
//!
//! Spawns one `exercise-sandbox-worker` process per evaluation and talks to
//! it over stdin/stdout with the framed JSON protocol. The worker starts
//! with an empty environment, `/` as working directory and stderr
//! discarded; it is killed when the deadline passes or the call is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, instrument};

use super::{IsolationBackend, Unit, Verdict};
use crate::config::{Limits, WorkerConfig};
use crate::transport::{recv_json, send_json, WorkerRequest, WorkerResponse};

/// Backend that evaluates in a short-lived worker process.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    exec: PathBuf,
    startup_grace: Duration,
}

impl ProcessBackend {
    /// Create a backend that runs the worker executable at `exec`.
    pub fn new(exec: impl Into<PathBuf>) -> Self {
        Self {
            exec: exec.into(),
            startup_grace: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.exec.clone()).with_startup_grace(Duration::from_millis(config.startup_grace_ms))
    }

    /// Extra time allowed on top of the evaluation timeout for the worker to
    /// start and exit.
    #[must_use]
    pub const fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn exec(&self) -> &Path {
        &self.exec
    }

    /// Check that the worker starts and answers.
    pub async fn ping(&self) -> Result<()> {
        let response = self.exchange(&WorkerRequest::Ping, self.startup_grace).await?;
        match response {
            WorkerResponse::Pong => Ok(()),
            other => anyhow::bail!("Expected Pong from worker, got: {other:?}"),
        }
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.exec)
            .env_clear()
            .current_dir("/")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker: {}", self.exec.display()))
    }

    /// Send one request to a fresh worker and wait up to `deadline` for its
    /// response.
    async fn exchange(&self, request: &WorkerRequest, deadline: Duration) -> Result<WorkerResponse> {
        let mut child = self.spawn()?;
        let mut stdin = child.stdin.take().context("Failed to open worker stdin")?;
        let mut stdout = child.stdout.take().context("Failed to open worker stdout")?;

        // `child` stays outside the future so it can be killed on timeout.
        let talk = async move {
            send_json(&mut stdin, request)
                .await
                .context("Failed to send request to worker")?;
            drop(stdin);
            recv_json::<_, WorkerResponse>(&mut stdout)
                .await
                .context("Failed to read response from worker")
        };

        let response = if let Ok(result) = tokio::time::timeout(deadline, talk).await {
            result?
        } else {
            let _ = child.kill().await;
            anyhow::bail!("Worker timed out after {}ms", deadline.as_millis());
        };

        let status = child.wait().await.context("Failed to wait for worker")?;
        debug!(exit_code = status.code(), "Worker exited");
        Ok(response)
    }
}

#[async_trait]
impl IsolationBackend for ProcessBackend {
    #[instrument(
        skip(self, unit, limits),
        fields(exec = %self.exec.display(), candidate_len = unit.candidate.len(), timeout_ms = limits.timeout_ms)
    )]
    async fn evaluate(&self, unit: &Unit, limits: &Limits) -> Result<Verdict> {
        let request = WorkerRequest::Evaluate {
            unit: unit.clone(),
            limits: limits.clone(),
        };
        let deadline = limits.timeout() + self.startup_grace;

        match self.exchange(&request, deadline).await? {
            WorkerResponse::Verdict { truthy } => {
                debug!(truthy, "Evaluation completed");
                Ok(Verdict { truthy })
            }
            WorkerResponse::Failed { reason } => anyhow::bail!("Worker reported: {reason}"),
            WorkerResponse::Error { message } => anyhow::bail!("Worker error: {message}"),
            WorkerResponse::Pong => anyhow::bail!("Unexpected Pong in reply to Evaluate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_worker_is_an_error() {
        let backend = ProcessBackend::new("/nonexistent/exercise-sandbox-worker");
        let unit = Unit::new("", "x = 1", "x == 1");
        let err = backend.evaluate(&unit, &Limits::default()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn worker"));
    }

    #[tokio::test]
    async fn echoed_request_is_a_protocol_error() {
        // `cat` sends the request straight back, which is not a response.
        let Ok(cat) = which("cat") else {
            return;
        };
        let backend = ProcessBackend::new(cat);
        let err = backend
            .evaluate(&Unit::new("", "", "true"), &Limits::default())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read response from worker"));
    }

    #[test]
    fn config_sets_grace() {
        let config = WorkerConfig {
            exec: PathBuf::from("/usr/bin/worker"),
            startup_grace_ms: 250,
        };
        let backend = ProcessBackend::from_config(&config);
        assert_eq!(backend.exec(), Path::new("/usr/bin/worker"));
        assert_eq!(backend.startup_grace, Duration::from_millis(250));
    }

    fn which(name: &str) -> Result<PathBuf> {
        ["/bin", "/usr/bin"]
            .iter()
            .map(|dir| Path::new(dir).join(name))
            .find(|path| path.exists())
            .context("not found")
    }
}
