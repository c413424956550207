//! Interpreter for the exercise script language, a small Ruby-flavoured
//! expression language.
//!
//! The interpreter holds no host capabilities: there is no I/O, no
//! reflection and no way to reach the process it runs in. Every run is
//! bounded by the ceilings in [`Limits`].
//!
//! Values are single-threaded (`Rc`), so an evaluation lives entirely on the
//! thread that calls [`evaluate`]. Backends give that thread a stack of
//! [`STACK_SIZE`] bytes.

mod ast;
mod budget;
mod builtins;
mod error;
mod eval;
mod lexer;
mod parser;
mod value;

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::trace;

pub use error::{EvalError, EvalResult};

use crate::config::Limits;
use eval::Interpreter;

/// Stack size for a thread that runs [`evaluate`].
pub const STACK_SIZE: usize = 256 << 20;

/// Run `fragments` in order against one shared top-level scope and report
/// whether the value of the last one is truthy.
///
/// Every fragment is parsed on its own before anything runs, so a fragment
/// cannot splice tokens into the next one. Local variables, methods and
/// mutations made by earlier fragments are visible to later ones.
///
/// `cancel` is polled while the script runs; setting it aborts the
/// evaluation with [`EvalError::Cancelled`].
pub fn evaluate(fragments: &[&str], limits: &Limits, cancel: Arc<AtomicBool>) -> EvalResult<bool> {
    let mut locals = HashSet::new();
    let bodies = fragments
        .iter()
        .map(|src| parser::parse(src, &mut locals))
        .collect::<EvalResult<Vec<_>>>()?;

    let mut interp = Interpreter::new(limits, cancel);
    let mut truthy = false;
    for body in &bodies {
        truthy = interp.run(body)?.truthy();
    }
    trace!(steps = interp.steps(), truthy, "Evaluation finished");
    Ok(truthy)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Run one fragment on a big-stack thread and inspect its value.
    pub fn run_with(limits: &Limits, src: &str) -> EvalResult<String> {
        let limits = limits.clone();
        let src = src.to_string();
        std::thread::Builder::new()
            .stack_size(STACK_SIZE)
            .spawn(move || {
                let body = parser::parse(&src, &mut HashSet::new())?;
                let mut interp = Interpreter::new(&limits, Arc::default());
                let value = interp.run(&body)?;
                interp.inspect(&value)
            })
            .expect("spawn interpreter thread")
            .join()
            .expect("interpreter thread panicked")
    }

    pub fn run(src: &str) -> EvalResult<String> {
        run_with(&Limits::default(), src)
    }

    /// Like [`run`], but the script must succeed.
    pub fn show(src: &str) -> String {
        run(src).unwrap_or_else(|err| panic!("{src:?} failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(fragments: &[&str]) -> EvalResult<bool> {
        let fragments: Vec<String> = fragments.iter().map(ToString::to_string).collect();
        std::thread::Builder::new()
            .stack_size(STACK_SIZE)
            .spawn(move || {
                let fragments: Vec<&str> = fragments.iter().map(String::as_str).collect();
                evaluate(&fragments, &Limits::default(), Arc::default())
            })
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn candidate_decides_goal() {
        assert_eq!(eval(&["a = 1; b = 2", "c = a * b", "c == 3"]), Ok(false));
        assert_eq!(eval(&["a = 1; b = 2", "c = a + b", "c == 3"]), Ok(true));
        assert_eq!(eval(&["a = 1", "a += 1", "a == 2"]), Ok(true));
        assert_eq!(eval(&["s = 'forward'", "s.downcase", "s == 'drawrof'"]), Ok(false));
        assert_eq!(eval(&["s = 'forward'", "s.reverse!", "s == 'drawrof'"]), Ok(true));
    }

    #[test]
    fn type_errors_surface_as_errors() {
        let result = eval(&["a = rand", "a *= '100'", "b == a * 100"]);
        assert!(matches!(result, Err(EvalError::Type(_))));
    }

    #[test]
    fn host_state_is_out_of_reach() {
        assert!(matches!(eval(&["", "@goal = 'true'", "true"]), Err(EvalError::Security(_))));
        assert!(matches!(eval(&["", "ENV['HOME']", "true"]), Err(EvalError::Security(_))));
        assert!(matches!(eval(&["", "system('ls')", "true"]), Err(EvalError::Security(_))));
    }

    #[test]
    fn fragments_parse_separately() {
        // A dangling operator cannot swallow the goal.
        assert!(matches!(eval(&["", "x = 1 ||", "false"]), Err(EvalError::Syntax { .. })));
        // An unterminated block cannot wrap the goal either.
        assert!(matches!(eval(&["", "if false", "end"]), Err(EvalError::Syntax { .. })));
    }

    #[test]
    fn definitions_carry_into_the_goal() {
        let candidate = "def add(x, y)\n  x + y\nend";
        assert_eq!(eval(&["", candidate, "add(2, 3) == 5"]), Ok(true));
        assert_eq!(eval(&["xs = [3, 1, 2]", "xs.sort!", "xs == [1, 2, 3]"]), Ok(true));
    }

    #[test]
    fn only_nil_and_false_are_falsy() {
        assert_eq!(eval(&["", "", "0"]), Ok(true));
        assert_eq!(eval(&["", "", "''"]), Ok(true));
        assert_eq!(eval(&["", "", "nil"]), Ok(false));
        assert_eq!(eval(&["", "", ""]), Ok(false));
    }

    #[test]
    fn cancellation_stops_a_running_script() {
        let cancel = Arc::new(AtomicBool::new(true));
        let result = std::thread::Builder::new()
            .stack_size(STACK_SIZE)
            .spawn(move || evaluate(&["", "loop { }", "true"], &Limits::default(), cancel))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(result, Err(EvalError::Cancelled));
    }
}
