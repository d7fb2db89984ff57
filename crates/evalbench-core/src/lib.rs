//! EvalBench Core Library
//!
//! Grades machine-generated function implementations: runs candidates in a
//! process sandbox, compares their outputs, scores them with pluggable
//! graders and aggregates the scores into reports.

pub mod compare;
pub mod config;
pub mod domain;
pub mod grader;
pub mod metrics;
pub mod obs;
pub mod parallel;
pub mod report;
pub mod sandbox;
pub mod telemetry;

pub use compare::{matches, Comparator, Tolerance};
pub use config::{BenchConfig, CorrectnessConfig, MemoryConfig, PerformanceConfig};
pub use domain::{
    validate_problem, validate_problems, validate_solution, BenchError, FunctionPrototype,
    GradingOutput, Issue, IssueCategory, LlmProblemInput, LlmSolution, Parameter,
    ProblemDefinition, Prompt, Result, ReturnValue, SchemaError, SolutionGrade, TestCase,
};
pub use grader::{
    halstead_difficulty, memory_score, performance_score, token_similarity, CorrectnessGrader,
    Grader, GraderRegistry, HalsteadGrader, HumanLikeGrader, MemoryGrader, PerformanceGrader,
};
pub use report::{aggregate, render_report_md, ModelReport, Report};
pub use sandbox::{Execution, ExecutionOutcome, Sandbox, SandboxConfig, SandboxError};

pub use metrics::METRICS;
pub use obs::{
    emit_grade_withheld, emit_grader_skipped, emit_grading_finished, emit_grading_started,
    emit_report_aggregated, emit_solution_graded, grading_span, GradingSpan,
};
pub use parallel::run_bounded;
pub use telemetry::init_tracing;

/// EvalBench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
