//! Structured observability hooks for grading runs.
//!
//! This module provides:
//! - Grader-scoped tracing spans: [`grading_span`] for futures and the
//!   [`GradingSpan`] RAII guard for synchronous callers
//! - Emission functions for the grading lifecycle: start, per-solution grade,
//!   finish, skipped graders and report aggregation
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG`.

use tracing::info;

/// RAII guard that enters a grader-scoped span.
///
/// The guard is `!Send`; inside async code instrument the future with
/// [`grading_span`] instead.
///
/// # Example
///
/// ```ignore
/// let _span = GradingSpan::enter("correctness", "gpt-4o");
/// // events logged here carry grader = "correctness", model = "gpt-4o"
/// ```
pub struct GradingSpan {
    _span: tracing::span::EnteredSpan,
}

impl GradingSpan {
    pub fn enter(grader: &str, model: &str) -> Self {
        Self {
            _span: grading_span(grader, model).entered(),
        }
    }
}

/// Span tagged with the grader and model being graded.
pub fn grading_span(grader: &str, model: &str) -> tracing::Span {
    tracing::info_span!("evalbench.grade", grader = %grader, model = %model)
}

/// Emit event: a grader started on a batch of solutions.
pub fn emit_grading_started(grader: &str, problems: usize, solutions: usize) {
    info!(
        event = "grading.started",
        grader = %grader,
        problems = problems,
        solutions = solutions,
    );
}

/// Emit event: one solution was graded.
pub fn emit_solution_graded(grader: &str, problem: &str, prompt: &str, score: f64, issues: usize) {
    info!(
        event = "grading.solution_graded",
        grader = %grader,
        problem = %problem,
        prompt = %prompt,
        score = score,
        issues = issues,
    );
}

/// Emit event: a grader finished with its mean score and duration.
pub fn emit_grading_finished(grader: &str, grades: usize, mean_score: f64, duration_ms: u64) {
    info!(
        event = "grading.finished",
        grader = %grader,
        grades = grades,
        mean_score = mean_score,
        duration_ms = duration_ms,
    );
}

/// Emit event: a grader was skipped as not applicable (warning level).
pub fn emit_grader_skipped(grader: &str, reason: &dyn std::fmt::Display) {
    tracing::warn!(event = "grading.skipped", grader = %grader, reason = %reason);
}

/// Emit event: a solution got no grade because the reference solution could
/// not be measured on any case (warning level).
pub fn emit_grade_withheld(grader: &str, problem: &str, prompt: &str, model: &str, reason: &str) {
    tracing::warn!(
        event = "grading.withheld",
        grader = %grader,
        problem = %problem,
        prompt = %prompt,
        model = %model,
        reason = %reason,
    );
}

/// Emit event: a report was aggregated.
pub fn emit_report_aggregated(models: usize, outputs: usize) {
    info!(event = "report.aggregated", models = models, outputs = outputs);
}
