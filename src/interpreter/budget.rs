//! Execution budget: steps, accounted memory, nesting depth and deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::error::{EvalError, EvalResult};
use crate::config::Limits;

/// Steps between two checks of the deadline and the cancellation flag.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Hard ceiling on evaluator recursion, independent of `max_depth`.
///
/// Keeps the interpreter thread's native stack bounded even for deeply
/// nested expressions inside deeply nested calls.
pub const MAX_NESTING: usize = 2048;

/// Tracks resource consumption of one evaluation.
#[derive(Debug)]
pub struct Budget {
    steps: u64,
    max_steps: u64,
    allocated: u64,
    max_memory: u64,
    depth: usize,
    max_depth: usize,
    nesting: usize,
    deadline: Instant,
    cancel: Arc<AtomicBool>,
}

impl Budget {
    /// Start a budget whose deadline is measured from now.
    pub fn new(limits: &Limits, cancel: Arc<AtomicBool>) -> Self {
        Self {
            steps: 0,
            max_steps: limits.max_steps,
            allocated: 0,
            max_memory: limits.max_memory_bytes,
            depth: 0,
            max_depth: limits.max_depth,
            nesting: 0,
            deadline: Instant::now() + limits.timeout(),
            cancel,
        }
    }

    /// Account for one evaluator step.
    pub fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvalError::StepLimit(self.max_steps));
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0 {
            self.check_clock()?;
        }
        Ok(())
    }

    /// Account for `n` steps at once (bulk builtin work).
    pub fn tick_n(&mut self, n: u64) -> EvalResult<()> {
        let before = self.steps / CLOCK_CHECK_INTERVAL;
        self.steps = self.steps.saturating_add(n);
        if self.steps > self.max_steps {
            return Err(EvalError::StepLimit(self.max_steps));
        }
        if self.steps / CLOCK_CHECK_INTERVAL != before {
            self.check_clock()?;
        }
        Ok(())
    }

    fn check_clock(&self) -> EvalResult<()> {
        if self.cancel.load(Ordering::Relaxed) || Instant::now() >= self.deadline {
            return Err(EvalError::Cancelled);
        }
        Ok(())
    }

    /// Account for an allocation of `bytes`.
    ///
    /// Accounting is cumulative: freed memory is not credited back.
    pub fn charge(&mut self, bytes: usize) -> EvalResult<()> {
        self.allocated = self.allocated.saturating_add(bytes as u64);
        if self.allocated > self.max_memory {
            return Err(EvalError::MemoryLimit(self.max_memory));
        }
        Ok(())
    }

    /// Account for `count` items of `size` bytes, checking for overflow
    /// before anything is allocated.
    pub fn charge_items(&mut self, count: usize, size: usize) -> EvalResult<()> {
        let bytes = count
            .checked_mul(size)
            .ok_or(EvalError::MemoryLimit(self.max_memory))?;
        self.charge(bytes)
    }

    /// Enter a method or block invocation.
    pub fn enter_call(&mut self) -> EvalResult<()> {
        if self.depth >= self.max_depth {
            return Err(EvalError::DepthLimit(self.max_depth));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Enter one level of evaluator recursion.
    pub fn enter_nesting(&mut self) -> EvalResult<()> {
        if self.nesting >= MAX_NESTING {
            return Err(EvalError::DepthLimit(MAX_NESTING));
        }
        self.nesting += 1;
        Ok(())
    }

    pub fn leave_nesting(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    /// Check that `count` items of `size` bytes would fit without charging
    /// anything.
    pub fn check_fits(&self, count: usize, size: usize) -> EvalResult<()> {
        match count.checked_mul(size) {
            Some(bytes) if bytes as u64 <= self.remaining_memory() => Ok(()),
            _ => Err(EvalError::MemoryLimit(self.max_memory)),
        }
    }

    /// Bytes that may still be charged before the memory ceiling.
    pub const fn remaining_memory(&self) -> u64 {
        self.max_memory.saturating_sub(self.allocated)
    }

    pub const fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits {
            timeout_ms: 60_000,
            max_steps: 10,
            max_memory_bytes: 100,
            max_depth: 2,
        }
    }

    #[test]
    fn step_limit() {
        let mut budget = Budget::new(&limits(), Arc::default());
        for _ in 0..10 {
            budget.tick().unwrap();
        }
        assert_eq!(budget.tick(), Err(EvalError::StepLimit(10)));
    }

    #[test]
    fn memory_limit_is_cumulative() {
        let mut budget = Budget::new(&limits(), Arc::default());
        budget.charge(60).unwrap();
        assert_eq!(budget.charge(60), Err(EvalError::MemoryLimit(100)));
    }

    #[test]
    fn charge_items_rejects_overflow() {
        let mut budget = Budget::new(&limits(), Arc::default());
        assert!(budget.charge_items(usize::MAX, 16).is_err());
    }

    #[test]
    fn depth_limit() {
        let mut budget = Budget::new(&limits(), Arc::default());
        budget.enter_call().unwrap();
        budget.enter_call().unwrap();
        assert_eq!(budget.enter_call(), Err(EvalError::DepthLimit(2)));
        budget.leave_call();
        budget.enter_call().unwrap();
    }

    #[test]
    fn cancellation_is_observed() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut budget = Budget::new(
            &Limits {
                max_steps: u64::MAX,
                ..limits()
            },
            Arc::clone(&cancel),
        );
        cancel.store(true, Ordering::Relaxed);
        assert_eq!(
            budget.tick_n(CLOCK_CHECK_INTERVAL),
            Err(EvalError::Cancelled)
        );
    }

    #[test]
    fn expired_deadline_is_observed() {
        let mut budget = Budget::new(
            &Limits {
                timeout_ms: 0,
                max_steps: u64::MAX,
                ..limits()
            },
            Arc::default(),
        );
        assert_eq!(
            budget.tick_n(CLOCK_CHECK_INTERVAL),
            Err(EvalError::Cancelled)
        );
    }
}
