//! Pluggable grading strategies.
//!
//! A grader is identified by a stable string id, says whether it can grade a
//! problem set, and turns (problems, solutions) into a [`GradingOutput`].
//! Built-in graders compose the [`Sandbox`](crate::sandbox::Sandbox) and the
//! [`Comparator`](crate::compare::Comparator); more can be added through
//! [`GraderRegistry::register`].

pub mod correctness;
pub mod halstead;
pub mod human_like;
pub mod memory;
pub mod performance;
mod reference;
pub mod registry;

use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{
    validate_problems, validate_solution, BenchError, FunctionPrototype, GradingOutput, Issue,
    IssueCategory, LlmSolution, ProblemDefinition, Result, SolutionGrade, TestCase,
};
use crate::metrics::METRICS;
use crate::obs::{self, GradingSpan};
use crate::sandbox::ExecutionOutcome;

pub use correctness::CorrectnessGrader;
pub use halstead::{halstead_difficulty, HalsteadGrader};
pub use human_like::{token_similarity, HumanLikeGrader};
pub use memory::{memory_score, MemoryGrader};
pub use performance::{performance_score, PerformanceGrader};
pub use registry::GraderRegistry;

/// Capability interface shared by all graders.
#[async_trait]
pub trait Grader: Send + Sync {
    /// Stable id used for selection, storage paths and reports.
    fn identifier(&self) -> &str;

    /// Whether this grader can meaningfully grade `problems`.
    fn can_grade(&self, problems: &[ProblemDefinition]) -> bool {
        validate_problems(problems).is_ok()
    }

    /// Grade every solution whose problem is in `problems`.
    ///
    /// Fails only on malformed input or when the grader is not applicable;
    /// per-solution faults become low scores with issues.
    async fn grade(
        &self,
        problems: &[ProblemDefinition],
        solutions: &[LlmSolution],
    ) -> Result<GradingOutput>;
}

/// Validate inputs and pair each solution with its problem.
///
/// Pairs are ordered by problem, then by solution order. Solutions for
/// problems outside `problems` are skipped.
pub fn pair_solutions<'a>(
    grader: &str,
    problems: &'a [ProblemDefinition],
    solutions: &'a [LlmSolution],
) -> Result<Vec<(&'a ProblemDefinition, &'a LlmSolution)>> {
    validate_problems(problems)?;
    for solution in solutions {
        validate_solution(solution)?;
    }

    let mut pairs = Vec::new();
    for problem in problems {
        pairs.extend(
            solutions
                .iter()
                .filter(|s| s.problem_identifier == problem.identifier)
                .map(|s| (problem, s)),
        );
    }

    for solution in solutions {
        if !problems
            .iter()
            .any(|p| p.identifier == solution.problem_identifier)
        {
            warn!(
                event = "grader.unmatched_solution",
                grader = %grader,
                problem = %solution.problem_identifier,
                model = %solution.model_identifier,
            );
        }
    }
    Ok(pairs)
}

/// The problem's reference implementation, unless absent or blank.
pub(crate) fn optimal_source(problem: &ProblemDefinition) -> Option<&str> {
    problem
        .optimal_solution
        .as_deref()
        .filter(|source| !source.trim().is_empty())
}

/// `grade` body shared by graders that only compare source text with the
/// problem's optimal solution. Nothing is executed.
pub(crate) fn grade_source_against_optimal(
    grader: &str,
    problems: &[ProblemDefinition],
    solutions: &[LlmSolution],
    score: impl Fn(&str, &str) -> f64,
) -> Result<GradingOutput> {
    let started = Instant::now();
    let pairs = pair_solutions(grader, problems, solutions)?;

    if let Some((problem, _)) = pairs.iter().find(|(p, _)| optimal_source(p).is_none()) {
        let err = BenchError::NotApplicable {
            grader: grader.to_string(),
            reason: format!("problem {} needs an optimal solution", problem.identifier),
        };
        obs::emit_grader_skipped(grader, &err);
        return Err(err);
    }

    obs::emit_grading_started(grader, problems.len(), pairs.len());
    let mut grades = Vec::with_capacity(pairs.len());
    for (problem, solution) in pairs {
        let Some(optimal) = optimal_source(problem) else {
            continue;
        };
        let _span = GradingSpan::enter(grader, &solution.model_identifier);
        let grade = SolutionGrade::new(
            &problem.identifier,
            &solution.prompt_identifier,
            &solution.model_identifier,
            score(&solution.solution_code, optimal),
        );
        obs::emit_solution_graded(
            grader,
            &grade.problem_identifier,
            &grade.prompt_identifier,
            grade.score,
            0,
        );
        grades.push(grade);
    }

    METRICS.inc_grades(grades.len() as u64);
    let output = GradingOutput::new(grader, grades);
    obs::emit_grading_finished(
        grader,
        output.solution_grades.len(),
        output.overall_score(),
        started.elapsed().as_millis() as u64,
    );
    Ok(output)
}

/// Grade skeleton for one (problem, prompt, model) triple.
pub(crate) fn blank_grade(problem: &ProblemDefinition, solution: &LlmSolution) -> SolutionGrade {
    SolutionGrade::new(
        &problem.identifier,
        &solution.prompt_identifier,
        &solution.model_identifier,
        0.0,
    )
}

/// Prototype the test inputs are keyed by, and prototype the candidate was
/// asked to implement (renamed when the prompt is generic).
pub(crate) fn prototypes(
    problem: &ProblemDefinition,
    prompt_id: &str,
) -> Option<(FunctionPrototype, FunctionPrototype)> {
    let original = problem.function_prototype.clone()?;
    let requested = problem.effective_prototype(prompt_id)?;
    Some((original, requested))
}

pub(crate) fn missing_prototype_issue(problem: &ProblemDefinition) -> Issue {
    Issue::new(
        IssueCategory::RuntimeFailure,
        format!("Problem {} has no function prototype", problem.identifier),
    )
}

pub(crate) fn no_test_cases_issue(prompt_id: &str) -> Issue {
    Issue::new(
        IssueCategory::NoTestCases,
        format!("No test cases available for prompt {prompt_id}"),
    )
}

/// Issue for a test case whose inputs could not be built.
pub(crate) fn missing_input_issue(
    case: &TestCase,
    prototype: &FunctionPrototype,
    err: &impl std::fmt::Display,
) -> Issue {
    Issue::new(
        IssueCategory::RuntimeFailure,
        format!(
            "Input: {}; Error: {err}",
            case.describe_input(Some(prototype))
        ),
    )
}

/// Issue describing a failed or mismatching call, or `None` for a syntax
/// failure (reported once per solution by the caller).
pub(crate) fn case_issue(
    case: &TestCase,
    prototype: &FunctionPrototype,
    expected: &serde_json::Value,
    outcome: &ExecutionOutcome,
    budget_ms: u64,
) -> Option<Issue> {
    let input = case.describe_input(Some(prototype));
    let issue = match outcome {
        ExecutionOutcome::Success { value } => Issue::new(
            IssueCategory::WrongOutput,
            format!("Input: {input}; Expected: {expected}; Observed: {value}"),
        ),
        ExecutionOutcome::RuntimeFailure { message, trace } => {
            let mut description = format!("Input: {input}; Expected: {expected}; Error: {message}");
            if !trace.is_empty() {
                description.push('\n');
                description.push_str(trace.trim_end());
            }
            Issue::new(IssueCategory::RuntimeFailure, description)
        }
        ExecutionOutcome::Timeout { .. } => Issue::new(
            IssueCategory::Timeout,
            format!("Input: {input}; Expected: {expected}; Timed out (budget {budget_ms}ms)"),
        ),
        ExecutionOutcome::SyntaxFailure { .. } => return None,
    };
    Some(issue)
}

pub(crate) fn syntax_issue(message: &str) -> Issue {
    Issue::new(
        IssueCategory::SyntaxFailure,
        format!("Candidate failed to compile: {message}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Prompt, SchemaError};
    use crate::domain::error::BenchError;
    use serde_json::json;
    use std::time::Duration;

    fn problem(id: &str) -> ProblemDefinition {
        ProblemDefinition::new(
            id,
            FunctionPrototype::new("add")
                .with_parameter("a", "int")
                .with_parameter("b", "int")
                .with_return("int"),
        )
        .add_prompt(Prompt::new("p1", "add"))
    }

    #[test]
    fn test_pairs_follow_problem_order() {
        let problems = vec![problem("x"), problem("y")];
        let solutions = vec![
            LlmSolution::new("y", "m", "p1", "def add(a, b): return a + b"),
            LlmSolution::new("x", "m", "p1", "def add(a, b): return a + b"),
            LlmSolution::new("z", "m", "p1", "def add(a, b): return a + b"),
        ];
        let pairs = pair_solutions("correctness", &problems, &solutions).unwrap();
        let ids: Vec<&str> = pairs.iter().map(|(p, _)| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn test_invalid_problem_aborts_pairing() {
        let mut bad = problem("x");
        bad.function_prototype = None;
        let err = pair_solutions("correctness", &[bad], &[]).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Schema(SchemaError::MissingPrototype { .. })
        ));
    }

    #[test]
    fn test_case_issue_descriptions() {
        let proto = FunctionPrototype::new("add")
            .with_parameter("a", "int")
            .with_parameter("b", "int");
        let case = TestCase::new(json!({"a": 4, "b": 7}), vec![json!(11)]);

        let wrong = case_issue(
            &case,
            &proto,
            &json!(11),
            &ExecutionOutcome::Success { value: json!(-3) },
            100,
        )
        .unwrap();
        assert_eq!(wrong.category, IssueCategory::WrongOutput);
        assert_eq!(wrong.description, "Input: a = 4, b = 7; Expected: 11; Observed: -3");

        let slow = case_issue(
            &case,
            &proto,
            &json!(11),
            &ExecutionOutcome::Timeout {
                elapsed: Duration::from_millis(123),
            },
            100,
        )
        .unwrap();
        assert_eq!(slow.category, IssueCategory::Timeout);
        assert!(slow.description.ends_with("Timed out (budget 100ms)"));

        let syntax = case_issue(
            &case,
            &proto,
            &json!(11),
            &ExecutionOutcome::SyntaxFailure {
                message: "bad".into(),
            },
            100,
        );
        assert!(syntax.is_none());
    }
}
