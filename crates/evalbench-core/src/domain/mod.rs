//! Domain models for EvalBench.
//!
//! Canonical definitions for the core entities:
//! - `ProblemDefinition`: prototype, prompts and test cases of one problem
//! - `LlmSolution`: candidate source produced by a model
//! - `SolutionGrade` / `GradingOutput`: what graders produce

pub mod coerce;
pub mod digest;
pub mod error;
pub mod grade;
pub mod problem;
pub mod solution;
pub mod validation;

pub use error::{BenchError, Result, SchemaError};
pub use grade::{GradingOutput, Issue, IssueCategory, SolutionGrade};
pub use problem::{
    FunctionPrototype, LlmProblemInput, MissingInput, Parameter, ProblemDefinition, Prompt,
    ReturnValue, TestCase,
};
pub use solution::LlmSolution;
pub use validation::{validate_problem, validate_problems, validate_solution};
