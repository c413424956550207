//! Script errors.
//!
//! Every way an evaluation can fail is a variant of [`EvalError`]. The solver
//! never shows these to its caller; they exist so the interpreter can route
//! `rescue` clauses and so failures can be logged.

use thiserror::Error;

/// Result type alias for script evaluation.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A fragment failed to lex or parse.
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("undefined local variable or method `{0}'")]
    Name(String),

    #[error("uninitialized constant {0}")]
    Constant(String),

    #[error("undefined method `{method}' for {receiver}")]
    NoMethod { method: String, receiver: String },

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Argument(String),

    #[error("divided by 0")]
    ZeroDivision,

    #[error("{0}")]
    Index(String),

    #[error("key not found: {0}")]
    Key(String),

    /// Integer overflow and other out-of-range numeric results.
    #[error("{0}")]
    Range(String),

    /// `break`, `next` or `return` used where it has nowhere to go.
    #[error("unexpected {0}")]
    LocalJump(&'static str),

    /// Raised by the script itself via `raise`.
    #[error("{class}: {message}")]
    Raised { class: String, message: String },

    /// The script reached for host state or a host capability.
    #[error("insecure operation: {0}")]
    Security(String),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("memory limit of {0} bytes exceeded")]
    MemoryLimit(u64),

    #[error("stack level too deep (limit {0})")]
    DepthLimit(usize),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    pub fn no_method(method: &str, receiver: impl Into<String>) -> Self {
        Self::NoMethod {
            method: method.to_string(),
            receiver: receiver.into(),
        }
    }

    pub fn wrong_arity(given: usize, expected: &str) -> Self {
        Self::Argument(format!(
            "wrong number of arguments (given {given}, expected {expected})"
        ))
    }

    pub fn overflow() -> Self {
        Self::Range("integer overflow".into())
    }

    /// Whether a `rescue` clause may catch this error.
    ///
    /// Ceilings and isolation violations always terminate the evaluation.
    pub const fn is_rescuable(&self) -> bool {
        !matches!(
            self,
            Self::Syntax { .. }
                | Self::Security(_)
                | Self::StepLimit(_)
                | Self::MemoryLimit(_)
                | Self::DepthLimit(_)
                | Self::Cancelled
        )
    }

    /// Script-visible exception class name.
    pub fn class_name(&self) -> &str {
        match self {
            Self::Syntax { .. } => "SyntaxError",
            Self::Name(_) | Self::Constant(_) => "NameError",
            Self::NoMethod { .. } => "NoMethodError",
            Self::Type(_) => "TypeError",
            Self::Argument(_) => "ArgumentError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Index(_) => "IndexError",
            Self::Key(_) => "KeyError",
            Self::Range(_) => "RangeError",
            Self::LocalJump(_) => "LocalJumpError",
            Self::Raised { class, .. } => class.as_str(),
            Self::Security(_) => "SecurityError",
            Self::StepLimit(_) | Self::MemoryLimit(_) | Self::Cancelled => "Interrupt",
            Self::DepthLimit(_) => "SystemStackError",
        }
    }

    /// Message without the class prefix, as seen by `e.message`.
    pub fn message(&self) -> String {
        match self {
            Self::Raised { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Short machine-readable label used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax",
            Self::Name(_) | Self::Constant(_) => "name",
            Self::NoMethod { .. } => "no_method",
            Self::Type(_) => "type",
            Self::Argument(_) => "argument",
            Self::ZeroDivision => "zero_division",
            Self::Index(_) | Self::Key(_) => "index",
            Self::Range(_) => "range",
            Self::LocalJump(_) => "local_jump",
            Self::Raised { .. } => "raised",
            Self::Security(_) => "security",
            Self::StepLimit(_) => "step_limit",
            Self::MemoryLimit(_) => "memory_limit",
            Self::DepthLimit(_) => "depth_limit",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Ancestry of the script-visible exception classes, child first.
pub fn exception_ancestors(class: &str) -> &'static [&'static str] {
    match class {
        "NoMethodError" => &["NoMethodError", "NameError", "StandardError", "Exception"],
        "KeyError" => &["KeyError", "IndexError", "StandardError", "Exception"],
        "StopIteration" => &["StopIteration", "IndexError", "StandardError", "Exception"],
        "FrozenError" => &["FrozenError", "RuntimeError", "StandardError", "Exception"],
        "FloatDomainError" => &["FloatDomainError", "RangeError", "StandardError", "Exception"],
        "NotImplementedError" => &["NotImplementedError", "ScriptError", "Exception"],
        "ZeroDivisionError" => &["ZeroDivisionError", "StandardError", "Exception"],
        "NameError" => &["NameError", "StandardError", "Exception"],
        "TypeError" => &["TypeError", "StandardError", "Exception"],
        "ArgumentError" => &["ArgumentError", "StandardError", "Exception"],
        "IndexError" => &["IndexError", "StandardError", "Exception"],
        "RangeError" => &["RangeError", "StandardError", "Exception"],
        "LocalJumpError" => &["LocalJumpError", "StandardError", "Exception"],
        "RuntimeError" => &["RuntimeError", "StandardError", "Exception"],
        "StandardError" => &["StandardError", "Exception"],
        _ => &["Exception"],
    }
}

/// Whether an error of class `class` is caught by `rescue wanted`.
pub fn rescues(class: &str, wanted: &str) -> bool {
    class == wanted || exception_ancestors(class).contains(&wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceilings_are_not_rescuable() {
        assert!(!EvalError::StepLimit(10).is_rescuable());
        assert!(!EvalError::Security("ENV".into()).is_rescuable());
        assert!(!EvalError::Cancelled.is_rescuable());
        assert!(EvalError::ZeroDivision.is_rescuable());
        assert!(EvalError::Name("x".into()).is_rescuable());
    }

    #[test]
    fn rescue_matching_follows_ancestry() {
        assert!(rescues("KeyError", "IndexError"));
        assert!(rescues("NoMethodError", "NameError"));
        assert!(rescues("TypeError", "StandardError"));
        assert!(!rescues("TypeError", "ArgumentError"));
        assert!(rescues("CustomError", "CustomError"));
    }

    #[test]
    fn raised_message_has_no_class_prefix() {
        let err = EvalError::Raised {
            class: "RuntimeError".into(),
            message: "boom".into(),
        };
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "RuntimeError: boom");
        assert_eq!(err.class_name(), "RuntimeError");
    }
}
