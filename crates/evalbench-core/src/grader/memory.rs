//! Memory grading: candidate peak allocation relative to a reference
//! solution.
//!
//! Each case runs the candidate and the problem's `optimal_solution` once
//! under allocation tracing. Over the cases where both succeeded the score is
//! `min(1, sum(optimal peaks) / sum(candidate peaks))`, weighted by the
//! candidate's pass fraction and capped like the performance score.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::Instrument;

use super::reference::{ReferenceCache, ReferenceRun};
use super::{
    blank_grade, case_issue, missing_input_issue, missing_prototype_issue, no_test_cases_issue,
    optimal_source, pair_solutions, prototypes, syntax_issue, Grader,
};
use crate::compare::Comparator;
use crate::config::MemoryConfig;
use crate::domain::grade::clamp_score;
use crate::domain::{
    BenchError, FunctionPrototype, GradingOutput, Issue, IssueCategory, LlmSolution,
    ProblemDefinition, Result, SolutionGrade,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::parallel::run_bounded;
use crate::sandbox::{ExecutionOutcome, Sandbox};

pub const MEMORY: &str = "memory";

/// Peak-allocation totals for one solution, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryTally {
    pub candidate: u64,
    pub optimal: u64,
    pub measured: usize,
    pub failed: usize,
}

/// Score a tally. Bounded to `[0, 1]`; using no more memory than the
/// reference scores 1.0 before failure weighting.
pub fn memory_score(config: &MemoryConfig, tally: &MemoryTally) -> f64 {
    let considered = tally.measured + tally.failed;
    if tally.measured == 0 {
        return 0.0;
    }

    let pass_fraction = tally.measured as f64 / considered as f64;
    let mut score = relative_memory(tally.candidate, tally.optimal) * pass_fraction;
    if tally.failed as f64 / considered as f64 > config.max_failure_fraction {
        score = score.min(config.failure_score_cap);
    }
    clamp_score(score)
}

fn relative_memory(candidate: u64, optimal: u64) -> f64 {
    (optimal.max(1) as f64 / candidate.max(1) as f64).min(1.0)
}

/// Compares peak memory of candidates against the problem's reference.
#[derive(Debug, Clone)]
pub struct MemoryGrader {
    sandbox: Sandbox,
    comparator: Comparator,
    config: MemoryConfig,
}

impl MemoryGrader {
    pub fn new(sandbox: Sandbox, comparator: Comparator, config: MemoryConfig) -> Self {
        Self {
            sandbox,
            comparator,
            config,
        }
    }

    fn applicable(problem: &ProblemDefinition) -> bool {
        optimal_source(problem).is_some() && problem.has_test_cases()
    }

    async fn grade_pair(
        &self,
        problem: &ProblemDefinition,
        solution: &LlmSolution,
        references: &ReferenceCache<u64>,
    ) -> Option<SolutionGrade> {
        let span = obs::grading_span(MEMORY, &solution.model_identifier);
        async {
            let grade = self.grade_solution(problem, solution, references).await?;
            obs::emit_solution_graded(
                MEMORY,
                &grade.problem_identifier,
                &grade.prompt_identifier,
                grade.score,
                grade.issues.len(),
            );
            Some(grade)
        }
        .instrument(span)
        .await
    }

    async fn reference_peak(
        &self,
        problem: &ProblemDefinition,
        optimal: &str,
        original: &FunctionPrototype,
        args: &[Value],
        references: &ReferenceCache<u64>,
    ) -> ReferenceRun<u64> {
        let key = ReferenceCache::<u64>::key(problem, args);
        if let Some(run) = references.get(&key) {
            return run;
        }

        let budget = Duration::from_millis(self.config.case_budget_ms);
        let reference = self
            .sandbox
            .execute_profiled(optimal, original, args, budget)
            .await;
        let run = match (&reference.outcome, reference.peak_memory) {
            (ExecutionOutcome::Success { .. }, Some(peak)) => ReferenceRun::Measured(peak),
            (ExecutionOutcome::Success { .. }, None) => {
                ReferenceRun::Failed("no memory measurement was collected".to_string())
            }
            (outcome, _) => ReferenceRun::Failed(outcome.summary()),
        };
        references.insert(key, run)
    }

    async fn grade_solution(
        &self,
        problem: &ProblemDefinition,
        solution: &LlmSolution,
        references: &ReferenceCache<u64>,
    ) -> Option<SolutionGrade> {
        let grade = blank_grade(problem, solution);
        let prompt_id = &solution.prompt_identifier;

        let Some((original, requested)) = prototypes(problem, prompt_id) else {
            return Some(grade.with_issues(vec![missing_prototype_issue(problem)]));
        };
        let Some(optimal) = optimal_source(problem) else {
            return Some(grade.with_issues(vec![Issue::new(
                IssueCategory::ReferenceFailure,
                format!("Problem {} has no optimal solution", problem.identifier),
            )]));
        };
        let cases = problem.test_cases_for(prompt_id);
        if cases.is_empty() {
            return Some(grade.with_issues(vec![no_test_cases_issue(prompt_id)]));
        }

        let budget = Duration::from_millis(self.config.case_budget_ms);
        let mut tally = MemoryTally::default();
        let mut issues = Vec::new();
        let mut reference_failures = 0usize;

        for case in cases {
            let args = match original.positional_arguments(case) {
                Ok(args) => args,
                Err(err) => {
                    issues.push(missing_input_issue(case, &original, &err));
                    tally.failed += 1;
                    continue;
                }
            };
            let expected = original.expected_value(case);

            let candidate = self
                .sandbox
                .execute_profiled(&solution.solution_code, &requested, &args, budget)
                .await;
            let candidate_peak = match &candidate.outcome {
                ExecutionOutcome::SyntaxFailure { message } => {
                    return Some(grade.with_issues(vec![syntax_issue(message)]));
                }
                ExecutionOutcome::Success { value } if self.comparator.matches(&expected, value) => {
                    candidate.peak_memory
                }
                outcome => {
                    issues.extend(case_issue(
                        case,
                        &original,
                        &expected,
                        outcome,
                        self.config.case_budget_ms,
                    ));
                    tally.failed += 1;
                    continue;
                }
            };
            let Some(candidate_peak) = candidate_peak else {
                issues.push(Issue::new(
                    IssueCategory::RuntimeFailure,
                    format!(
                        "Input: {}; no memory measurement was collected",
                        case.describe_input(Some(&original))
                    ),
                ));
                tally.failed += 1;
                continue;
            };

            match self
                .reference_peak(problem, optimal, &original, &args, references)
                .await
            {
                ReferenceRun::Measured(optimal_peak) => {
                    tally.candidate += candidate_peak;
                    tally.optimal += optimal_peak;
                    tally.measured += 1;
                }
                ReferenceRun::Failed(reason) => {
                    reference_failures += 1;
                    issues.push(Issue::new(
                        IssueCategory::ReferenceFailure,
                        format!(
                            "Input: {}; reference solution failed: {}",
                            case.describe_input(Some(&original)),
                            reason
                        ),
                    ));
                }
            }
        }

        if tally.measured == 0 && reference_failures > 0 {
            obs::emit_grade_withheld(
                MEMORY,
                &problem.identifier,
                prompt_id,
                &solution.model_identifier,
                &format!("reference solution failed on {reference_failures} case(s)"),
            );
            return None;
        }

        let sub_criteria = (tally.measured > 0).then(|| {
            BTreeMap::from([
                (
                    "relative_memory".to_string(),
                    relative_memory(tally.candidate, tally.optimal),
                ),
                (
                    "pass_fraction".to_string(),
                    tally.measured as f64 / (tally.measured + tally.failed) as f64,
                ),
            ])
        });

        Some(
            SolutionGrade::new(
                &problem.identifier,
                prompt_id,
                &solution.model_identifier,
                memory_score(&self.config, &tally),
            )
            .with_issues(issues)
            .with_sub_criteria(sub_criteria),
        )
    }
}

#[async_trait]
impl Grader for MemoryGrader {
    fn identifier(&self) -> &str {
        MEMORY
    }

    fn can_grade(&self, problems: &[ProblemDefinition]) -> bool {
        problems.iter().all(Self::applicable)
    }

    async fn grade(
        &self,
        problems: &[ProblemDefinition],
        solutions: &[LlmSolution],
    ) -> Result<GradingOutput> {
        let started = Instant::now();
        let pairs = pair_solutions(MEMORY, problems, solutions)?;

        if let Some((problem, _)) = pairs.iter().find(|(p, _)| !Self::applicable(p)) {
            let err = BenchError::NotApplicable {
                grader: MEMORY.to_string(),
                reason: format!(
                    "problem {} needs an optimal solution and test cases",
                    problem.identifier
                ),
            };
            obs::emit_grader_skipped(MEMORY, &err);
            return Err(err);
        }

        obs::emit_grading_started(MEMORY, problems.len(), pairs.len());

        let references = ReferenceCache::default();
        let tasks: Vec<_> = pairs
            .into_iter()
            .map(|(problem, solution)| self.grade_pair(problem, solution, &references))
            .collect();
        let grades: Vec<_> = run_bounded(tasks, self.config.max_concurrency)
            .await
            .into_iter()
            .flatten()
            .collect();

        METRICS.inc_grades(grades.len() as u64);
        let output = GradingOutput::new(MEMORY, grades);
        obs::emit_grading_finished(
            MEMORY,
            output.solution_grades.len(),
            output.overall_score(),
            started.elapsed().as_millis() as u64,
        );
        Ok(output)
    }
}
