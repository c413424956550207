//! Solver configuration.
//!
//! Configuration is optional: every field has a default. Embedders can pass
//! JSON through the `EXERCISE_SANDBOX_CONFIG` environment variable, point at a
//! JSON file, or override individual limits with `EXERCISE_SANDBOX_*`
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable holding the JSON configuration.
pub const CONFIG_ENV: &str = "EXERCISE_SANDBOX_CONFIG";

/// Top-level configuration for a [`Solver`](crate::Solver).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Which isolation backend evaluates candidates.
    #[serde(default)]
    pub backend: BackendType,

    /// Execution ceilings applied to every attempt.
    #[serde(default)]
    pub limits: Limits,

    /// Worker process settings (required for the process backend).
    #[serde(default)]
    pub worker: Option<WorkerConfig>,
}

/// Settings for the out-of-process worker.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Path to the `exercise-sandbox-worker` executable.
    pub exec: PathBuf,

    /// Extra time granted on top of the evaluation timeout for process
    /// startup and teardown.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
}

/// Available isolation backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Dedicated interpreter thread inside the calling process.
    #[default]
    InProcess,
    /// One worker process per attempt.
    Process,
}

/// Ceilings for a single evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Wall-clock deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of evaluator steps.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,

    /// Maximum number of bytes the script may allocate in total.
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,

    /// Maximum depth of nested method and block invocations.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_steps: default_max_steps(),
            max_memory_bytes: default_max_memory_bytes(),
            max_depth: default_max_depth(),
        }
    }
}

impl Limits {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Create from environment variables, falling back to defaults.
    ///
    /// Reads `EXERCISE_SANDBOX_TIMEOUT_MS`, `EXERCISE_SANDBOX_MAX_STEPS`,
    /// `EXERCISE_SANDBOX_MAX_MEMORY` and `EXERCISE_SANDBOX_MAX_DEPTH`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        Self {
            timeout_ms: var("EXERCISE_SANDBOX_TIMEOUT_MS").unwrap_or_else(default_timeout_ms),
            max_steps: var("EXERCISE_SANDBOX_MAX_STEPS").unwrap_or_else(default_max_steps),
            max_memory_bytes: var("EXERCISE_SANDBOX_MAX_MEMORY")
                .unwrap_or_else(default_max_memory_bytes),
            max_depth: var("EXERCISE_SANDBOX_MAX_DEPTH").unwrap_or_else(default_max_depth),
        }
    }
}

impl Config {
    /// Load configuration from the `EXERCISE_SANDBOX_CONFIG` environment
    /// variable.
    ///
    /// An unset variable yields the defaults; a set but malformed one is an
    /// error.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(json) => Self::from_json(&json).context("Failed to parse EXERCISE_SANDBOX_CONFIG"),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(e).context("EXERCISE_SANDBOX_CONFIG is not valid unicode"),
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Create a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }
}

const fn default_timeout_ms() -> u64 {
    2_000
}

const fn default_max_steps() -> u64 {
    5_000_000
}

const fn default_max_memory_bytes() -> u64 {
    64 * 1024 * 1024
}

const fn default_max_depth() -> usize {
    256
}

const fn default_startup_grace_ms() -> u64 {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.backend, BackendType::InProcess);
        assert_eq!(config.limits, Limits::default());
        assert!(config.worker.is_none());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "backend": "process",
            "limits": {
                "timeout_ms": 500,
                "max_steps": 1000
            },
            "worker": {
                "exec": "/usr/libexec/exercise-sandbox-worker"
            }
        }"#;

        let config = Config::from_json(json).unwrap();
        assert_eq!(config.backend, BackendType::Process);
        assert_eq!(config.limits.timeout(), Duration::from_millis(500));
        assert_eq!(config.limits.max_steps, 1000);

        // Check defaults are applied
        assert_eq!(config.limits.max_memory_bytes, 64 * 1024 * 1024);
        assert_eq!(config.limits.max_depth, 256);

        let worker = config.worker.expect("worker should be set");
        assert_eq!(
            worker.exec,
            PathBuf::from("/usr/libexec/exercise-sandbox-worker")
        );
        assert_eq!(worker.startup_grace_ms, 1_000);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Config::from_json(r#"{"backend": "microvm"}"#).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox.json");
        std::fs::write(&path, r#"{"limits": {"max_depth": 16}}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.limits.max_depth, 16);
        assert_eq!(config.limits.timeout_ms, 2_000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn limits_from_env_defaults() {
        // When env vars are not set, from_env() uses the same defaults
        let limits = Limits::from_env();
        assert_eq!(limits, Limits::default());
    }

    #[test]
    fn config_from_env() {
        // The only test touching EXERCISE_SANDBOX_CONFIG; the cases run in order.
        std::env::remove_var(CONFIG_ENV);
        let config = Config::from_env().unwrap();
        assert_eq!(config.backend, BackendType::InProcess);
        assert_eq!(config.limits, Limits::default());

        std::env::set_var(
            CONFIG_ENV,
            r#"{"backend": "process", "worker": {"exec": "/opt/worker"}, "limits": {"max_depth": 8}}"#,
        );
        let config = Config::from_env().unwrap();
        assert_eq!(config.backend, BackendType::Process);
        assert_eq!(config.limits.max_depth, 8);
        assert_eq!(config.worker.unwrap().exec, PathBuf::from("/opt/worker"));

        std::env::set_var(CONFIG_ENV, "{not json");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("Failed to parse EXERCISE_SANDBOX_CONFIG"));

        std::env::remove_var(CONFIG_ENV);
    }

    #[test]
    fn limits_roundtrip_through_json() {
        let limits = Limits {
            timeout_ms: 10,
            max_steps: 20,
            max_memory_bytes: 30,
            max_depth: 40,
        };
        let json = serde_json::to_string(&limits).unwrap();
        let back: Limits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, limits);
    }
}
