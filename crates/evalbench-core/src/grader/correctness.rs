//! Correctness grading: fraction of test cases a candidate passes.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use super::{
    blank_grade, case_issue, missing_input_issue, missing_prototype_issue, no_test_cases_issue,
    pair_solutions, prototypes, syntax_issue, Grader,
};
use crate::compare::Comparator;
use crate::config::CorrectnessConfig;
use crate::domain::{
    BenchError, GradingOutput, Issue, LlmSolution, ProblemDefinition, Result, SolutionGrade,
    TestCase,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::parallel::run_bounded;
use crate::sandbox::{ExecutionOutcome, Sandbox};

pub const CORRECTNESS: &str = "correctness";

/// Runs every test case of a problem against the candidate and scores the
/// pass rate.
///
/// A candidate that does not compile scores 0.0 with a single
/// `syntax_failure` issue.
#[derive(Debug, Clone)]
pub struct CorrectnessGrader {
    sandbox: Sandbox,
    comparator: Comparator,
    config: CorrectnessConfig,
}

impl CorrectnessGrader {
    pub fn new(sandbox: Sandbox, comparator: Comparator, config: CorrectnessConfig) -> Self {
        Self {
            sandbox,
            comparator,
            config,
        }
    }

    /// Grade one solution inside its own span and report the result.
    async fn grade_pair(
        &self,
        problem: &ProblemDefinition,
        solution: &LlmSolution,
    ) -> SolutionGrade {
        let span = obs::grading_span(CORRECTNESS, &solution.model_identifier);
        async {
            let grade = self.grade_solution(problem, solution).await;
            obs::emit_solution_graded(
                CORRECTNESS,
                &grade.problem_identifier,
                &grade.prompt_identifier,
                grade.score,
                grade.issues.len(),
            );
            grade
        }
        .instrument(span)
        .await
    }

    async fn grade_solution(
        &self,
        problem: &ProblemDefinition,
        solution: &LlmSolution,
    ) -> SolutionGrade {
        let grade = blank_grade(problem, solution);
        let prompt_id = &solution.prompt_identifier;

        let Some((original, requested)) = prototypes(problem, prompt_id) else {
            return grade.with_issues(vec![missing_prototype_issue(problem)]);
        };
        let cases = problem.test_cases_for(prompt_id);
        if cases.is_empty() {
            return grade.with_issues(vec![no_test_cases_issue(prompt_id)]);
        }

        let budget = Duration::from_millis(self.config.case_budget_ms);
        let mut passed = Vec::with_capacity(cases.len());
        let mut issues = Vec::new();

        for case in cases {
            let args = match original.positional_arguments(case) {
                Ok(args) => args,
                Err(err) => {
                    issues.push(missing_input_issue(case, &original, &err));
                    passed.push(false);
                    continue;
                }
            };
            let expected = original.expected_value(case);
            let execution = self
                .sandbox
                .execute(&solution.solution_code, &requested, &args, budget)
                .await;

            match &execution.outcome {
                ExecutionOutcome::SyntaxFailure { message } => {
                    return grade.with_issues(vec![syntax_issue(message)]);
                }
                ExecutionOutcome::Success { value } if self.comparator.matches(&expected, value) => {
                    passed.push(true);
                }
                outcome => {
                    issues.extend(case_issue(
                        case,
                        &original,
                        &expected,
                        outcome,
                        self.config.case_budget_ms,
                    ));
                    passed.push(false);
                }
            }
        }

        let pass_count = passed.iter().filter(|p| **p).count();
        let score = pass_count as f64 / cases.len() as f64;
        let sub_criteria = sub_criteria_scores(problem, cases, &passed, score);

        SolutionGrade::new(
            &problem.identifier,
            prompt_id,
            &solution.model_identifier,
            score,
        )
        .with_issues(issues)
        .with_sub_criteria(sub_criteria)
    }
}

/// Pass rate per test-case tag. Without case tags, each problem tag gets the
/// overall rate; without any tags there are no sub-criteria.
pub fn sub_criteria_scores(
    problem: &ProblemDefinition,
    cases: &[TestCase],
    passed: &[bool],
    overall: f64,
) -> Option<BTreeMap<String, f64>> {
    let mut per_tag: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (case, ok) in cases.iter().zip(passed) {
        for tag in &case.tags {
            let entry = per_tag.entry(tag.as_str()).or_default();
            entry.0 += usize::from(*ok);
            entry.1 += 1;
        }
    }

    if !per_tag.is_empty() {
        return Some(
            per_tag
                .into_iter()
                .map(|(tag, (ok, total))| (tag.to_string(), ok as f64 / total as f64))
                .collect(),
        );
    }

    match &problem.tags {
        Some(tags) if !tags.is_empty() => {
            Some(tags.iter().map(|t| (t.clone(), overall)).collect())
        }
        _ => None,
    }
}

#[async_trait]
impl Grader for CorrectnessGrader {
    fn identifier(&self) -> &str {
        CORRECTNESS
    }

    fn can_grade(&self, problems: &[ProblemDefinition]) -> bool {
        problems.iter().all(ProblemDefinition::has_test_cases)
    }

    async fn grade(
        &self,
        problems: &[ProblemDefinition],
        solutions: &[LlmSolution],
    ) -> Result<GradingOutput> {
        let started = Instant::now();
        let pairs = pair_solutions(CORRECTNESS, problems, solutions)?;

        if let Some((problem, _)) = pairs.iter().find(|(p, _)| !p.has_test_cases()) {
            let err = BenchError::NotApplicable {
                grader: CORRECTNESS.to_string(),
                reason: format!(
                    "problem {} has no correctness test suite or sample inputs/outputs",
                    problem.identifier
                ),
            };
            obs::emit_grader_skipped(CORRECTNESS, &err);
            return Err(err);
        }

        obs::emit_grading_started(CORRECTNESS, problems.len(), pairs.len());

        let tasks: Vec<_> = pairs
            .into_iter()
            .map(|(problem, solution)| self.grade_pair(problem, solution))
            .collect();
        let grades = run_bounded(tasks, self.config.max_concurrency).await;

        METRICS.inc_grades(grades.len() as u64);
        let output = GradingOutput::new(CORRECTNESS, grades);
        obs::emit_grading_finished(
            CORRECTNESS,
            output.solution_grades.len(),
            output.overall_score(),
            started.elapsed().as_millis() as u64,
        );
        Ok(output)
    }
}

/// Issues of a grade rendered one per line, for CLI summaries.
pub fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|i| format!("[{}] {}", i.category, i.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionPrototype, IssueCategory, Prompt};
    use serde_json::json;

    fn tagged_problem() -> ProblemDefinition {
        ProblemDefinition::new("add", FunctionPrototype::new("add"))
            .add_prompt(Prompt::new("p1", "add"))
            .with_tags(&["arithmetic"])
    }

    #[test]
    fn test_sub_criteria_from_case_tags() {
        let cases = vec![
            TestCase::new(json!({}), vec![]).with_tag("edge"),
            TestCase::new(json!({}), vec![]).with_tag("edge"),
            TestCase::new(json!({}), vec![]).with_tag("basic"),
        ];
        let scores =
            sub_criteria_scores(&tagged_problem(), &cases, &[true, false, true], 2.0 / 3.0)
                .unwrap();
        assert_eq!(scores["edge"], 0.5);
        assert_eq!(scores["basic"], 1.0);
        assert!(!scores.contains_key("arithmetic"));
    }

    #[test]
    fn test_sub_criteria_from_problem_tags() {
        let cases = vec![TestCase::new(json!({}), vec![])];
        let scores = sub_criteria_scores(&tagged_problem(), &cases, &[false], 0.0).unwrap();
        assert_eq!(scores["arithmetic"], 0.0);
    }

    #[test]
    fn test_sub_criteria_absent_without_tags() {
        let problem = ProblemDefinition::new("add", FunctionPrototype::new("add"));
        let cases = vec![TestCase::new(json!({}), vec![])];
        assert!(sub_criteria_scores(&problem, &cases, &[true], 1.0).is_none());
    }

    #[test]
    fn test_can_grade_requires_test_cases() {
        let grader = CorrectnessGrader::new(
            Sandbox::default(),
            Comparator::default(),
            CorrectnessConfig::default(),
        );
        let without = tagged_problem();
        assert!(!grader.can_grade(&[without.clone()]));

        let with = without.add_test_case(TestCase::new(json!({}), vec![json!(0)]));
        assert!(grader.can_grade(&[with]));
    }

    #[tokio::test]
    async fn test_grade_rejects_problem_without_tests() {
        let grader = CorrectnessGrader::new(
            Sandbox::default(),
            Comparator::default(),
            CorrectnessConfig::default(),
        );
        let solutions = vec![LlmSolution::new("add", "m", "p1", "def add(): return 0")];
        let err = grader
            .grade(&[tagged_problem()], &solutions)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::NotApplicable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_prompt_without_suite_scores_zero() {
        let grader = CorrectnessGrader::new(
            Sandbox::default(),
            Comparator::default(),
            CorrectnessConfig::default(),
        );
        let problem = tagged_problem();
        let problem = ProblemDefinition {
            prompts: vec![Prompt::new("p1", "add")
                .with_sample(TestCase::new(json!({}), vec![json!(0)]))],
            ..problem
        };
        let solution = LlmSolution::new("add", "m", "other", "def add(): return 0");
        let grade = grader.grade_solution(&problem, &solution).await;
        assert_eq!(grade.score, 0.0);
        assert_eq!(grade.issues.len(), 1);
        assert_eq!(grade.issues[0].category, IssueCategory::NoTestCases);
    }

    #[test]
    fn test_format_issues() {
        let issues = vec![
            Issue::new(IssueCategory::WrongOutput, "a"),
            Issue::new(IssueCategory::Timeout, "b"),
        ];
        assert_eq!(format_issues(&issues), "[wrong_output] a\n[timeout] b");
    }
}
