//! Isolation backend trait and implementations.
//!
//! A backend evaluates a composed [`Unit`] somewhere the candidate cannot
//! reach its caller: a dedicated interpreter thread, or a worker process.
//! Whatever happens on the other side, the caller gets back either a
//! [`Verdict`] or an error explaining why there is none.

mod in_process;
mod process;

pub use in_process::InProcessBackend;
pub use process::ProcessBackend;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Limits;

/// The three fragments of one attempt, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Setup code; empty when the exercise has none.
    pub context: String,
    /// The untrusted solution.
    pub candidate: String,
    /// Code whose final value decides the attempt.
    pub goal: String,
}

impl Unit {
    pub fn new(
        context: impl Into<String>,
        candidate: impl Into<String>,
        goal: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            candidate: candidate.into(),
            goal: goal.into(),
        }
    }

    /// Context, candidate and goal, each parsed on its own.
    pub fn fragments(&self) -> [&str; 3] {
        [&self.context, &self.candidate, &self.goal]
    }

    /// The fragments joined by newlines, as they would read in one file.
    pub fn source(&self) -> String {
        self.fragments().join("\n")
    }
}

/// Outcome of an evaluation that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the goal's final value was truthy.
    pub truthy: bool,
}

/// Trait for isolation backends.
///
/// Implementations must enforce `limits` themselves, including the
/// wall-clock deadline: a call never takes much longer than
/// `limits.timeout()`.
#[async_trait]
pub trait IsolationBackend: Send + Sync + fmt::Debug {
    /// Evaluate `unit` in isolation.
    ///
    /// # Errors
    /// Any failure to produce a verdict: a fragment that does not parse, a
    /// runtime or security error, an exhausted ceiling, or a broken
    /// isolation boundary (thread panic, worker crash, protocol error).
    async fn evaluate(&self, unit: &Unit, limits: &Limits) -> Result<Verdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_keep_execution_order() {
        let unit = Unit::new("a = 1", "b = 2", "a + b == 3");
        assert_eq!(unit.fragments(), ["a = 1", "b = 2", "a + b == 3"]);
        assert_eq!(unit.source(), "a = 1\nb = 2\na + b == 3");
    }

    #[test]
    fn empty_context_still_occupies_a_line() {
        let unit = Unit::new("", "x = 1", "x == 1");
        assert_eq!(unit.source(), "\nx = 1\nx == 1");
    }

    #[test]
    fn unit_serializes_by_field() {
        let json = serde_json::to_string(&Unit::new("c", "s", "g")).unwrap();
        assert_eq!(json, r#"{"context":"c","candidate":"s","goal":"g"}"#);
    }
}
