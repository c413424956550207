//! Exercise definitions.
//!
//! An exercise is a pair of opaque code fragments: the *context*, which sets
//! up state before a candidate runs, and the *goal*, whose final value decides
//! whether the candidate succeeded. Neither fragment is validated here; broken
//! code only surfaces when a candidate is solved against it.

/// A programming exercise: setup code plus a verification goal.
///
/// Both fragments are stored with leading and trailing runs of `\n` removed.
///
/// ```
/// use exercise_sandbox::Exercise;
///
/// let exercise = Exercise::new("a = 1; b = 2", "c == 3");
/// assert_eq!(exercise.context(), Some("a = 1; b = 2"));
///
/// let exercise = Exercise::build(|e| {
///     e.set_context("\n  a = rand(10)\n  b = rand(10)\n");
///     e.set_goal("\n  c == a + b\n");
/// });
/// assert_eq!(exercise.goal(), Some("  c == a + b"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exercise {
    context: Option<String>,
    goal: Option<String>,
}

impl Exercise {
    /// Create an exercise from context code and goal code.
    pub fn new(context: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            context: Some(normalize(&context.into())),
            goal: Some(normalize(&goal.into())),
        }
    }

    /// Create an empty exercise and hand it to `init` so the fragments can be
    /// set one by one.
    pub fn build(init: impl FnOnce(&mut Self)) -> Self {
        let mut exercise = Self::default();
        init(&mut exercise);
        exercise
    }

    /// Set the context code. `None` leaves the current value untouched.
    pub fn set_context<'a>(&mut self, context: impl Into<Option<&'a str>>) -> &mut Self {
        if let Some(context) = context.into() {
            self.context = Some(normalize(context));
        }
        self
    }

    /// Set the goal code. `None` leaves the current value untouched.
    pub fn set_goal<'a>(&mut self, goal: impl Into<Option<&'a str>>) -> &mut Self {
        if let Some(goal) = goal.into() {
            self.goal = Some(normalize(goal));
        }
        self
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }
}

/// Strip the leading and trailing runs of `\n` from `text`.
///
/// Only newline characters are removed; spaces, `\r` and interior blank lines
/// are preserved.
pub fn normalize(text: &str) -> String {
    text.trim_start_matches('\n')
        .trim_end_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_construction() {
        let exercise = Exercise::new("a = [:contents]", "a.empty?");
        assert_eq!(exercise.context(), Some("a = [:contents]"));
        assert_eq!(exercise.goal(), Some("a.empty?"));
    }

    #[test]
    fn callback_construction() {
        let exercise = Exercise::build(|e| {
            e.set_context("\n  a = rand(100)\n  b = rand(100)\n");
            e.set_goal("\n  c == a + b\n");
        });
        assert!(exercise.context().unwrap().contains("a = rand"));
        assert!(exercise.goal().unwrap().contains("c == "));
    }

    #[test]
    fn default_has_no_fragments() {
        let exercise = Exercise::default();
        assert!(exercise.context().is_none());
        assert!(exercise.goal().is_none());
    }

    #[test]
    fn strips_surrounding_newlines() {
        let exercise = Exercise::new("\n\na = 1\n\n", "\n\na == 2\n\n");
        assert_eq!(exercise.context(), Some("a = 1"));
        assert_eq!(exercise.goal(), Some("a == 2"));
    }

    #[test]
    fn preserves_interior_blank_lines() {
        let mut exercise = Exercise::default();
        exercise.set_context("\n\n\na = 1\n\n\nb = 2\n  \n\n");
        assert_eq!(exercise.context(), Some("a = 1\n\n\nb = 2\n  "));
    }

    #[test]
    fn only_newlines_are_stripped() {
        assert_eq!(normalize("  a = 1  "), "  a = 1  ");
        assert_eq!(normalize("\r\na = 1\r\n"), "\r\na = 1\r");
        assert_eq!(normalize("\n\n"), "");
    }

    #[test]
    fn setters_overwrite_and_return_self() {
        let mut exercise = Exercise::new("a = 1", "a == 1");
        exercise.set_context("e = :awesome").set_goal("e == :awesome");
        assert_eq!(exercise.context(), Some("e = :awesome"));
        assert_eq!(exercise.goal(), Some("e == :awesome"));
    }

    #[test]
    fn none_is_a_no_op() {
        let mut exercise = Exercise::new("a = 1", "a == 2");
        exercise.set_context(None).set_goal(None);
        assert_eq!(exercise.context(), Some("a = 1"));
        assert_eq!(exercise.goal(), Some("a == 2"));
    }
}
