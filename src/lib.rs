//! exercise-sandbox library
//!
//! Decides whether an untrusted candidate solution satisfies a programming
//! exercise:
//! - [`Exercise`] holds the setup code (context) and the verification code (goal)
//! - [`Solver`] runs context, candidate and goal in one shared scope behind an
//!   isolation backend and reduces the outcome to a boolean
//! - the interpreter for the exercise script language has no filesystem,
//!   network, process or environment access at all
//!
//! ```
//! use exercise_sandbox::{Exercise, Solver};
//!
//! let exercise = Exercise::new("a = 1; b = 2", "c == 3");
//! let solver = Solver::new();
//!
//! tokio_test::block_on(async {
//!     assert!(solver.solve(&exercise, "c = a + b").await);
//!     assert!(!solver.solve(&exercise, "c = a * b").await);
//!     assert!(!solver.solve(&exercise, "File.read('/etc/passwd')").await);
//! });
//! ```

pub mod backend;
pub mod config;
pub mod exercise;
mod interpreter;
pub mod solver;
pub mod transport;
pub mod worker;

pub use config::{Config, Limits};
pub use exercise::Exercise;
pub use solver::{solve, Solver};
