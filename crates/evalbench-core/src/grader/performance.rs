//! Performance grading: candidate speed relative to a reference solution.
//!
//! Both the candidate and the problem's `optimal_solution` are timed on the
//! same inputs (median of several repetitions per case). With
//! `r = sum(candidate medians) / sum(optimal medians)` over the cases where
//! both succeeded, the speed score is `min(1, 1/r) ^ decay_exponent`. It is
//! then weighted by the candidate's pass fraction, and capped at
//! `failure_score_cap` when more than `max_failure_fraction` of the cases
//! fail. Wrong answers count as failures, so fast-but-wrong code is not
//! rewarded.
//!
//! The reference is timed once per input within a `grade` call. A solution
//! whose passing cases all hit a failing reference gets no grade at all; it
//! is logged as `grading.withheld` instead of being scored 0.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, Instrument};

use super::reference::{ReferenceCache, ReferenceRun};
use super::{
    blank_grade, case_issue, missing_input_issue, missing_prototype_issue, no_test_cases_issue,
    optimal_source, pair_solutions, prototypes, syntax_issue, Grader,
};
use crate::compare::Comparator;
use crate::config::PerformanceConfig;
use crate::domain::grade::clamp_score;
use crate::domain::{
    BenchError, FunctionPrototype, GradingOutput, Issue, IssueCategory, LlmSolution,
    ProblemDefinition, Result, SolutionGrade,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::parallel::run_bounded;
use crate::sandbox::{ExecutionOutcome, Sandbox};

pub const PERFORMANCE: &str = "performance";

/// Timing totals for one solution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingTally {
    pub candidate: Duration,
    pub optimal: Duration,
    /// Cases where both solutions succeeded and were timed.
    pub timed: usize,
    /// Cases the candidate failed (error, timeout or wrong output).
    pub failed: usize,
}

/// Score a tally. Monotonic in the time ratio and bounded to `[0, 1]`.
pub fn performance_score(config: &PerformanceConfig, tally: &TimingTally) -> f64 {
    let considered = tally.timed + tally.failed;
    if tally.timed == 0 || considered == 0 {
        return 0.0;
    }

    let speed = relative_speed(tally.candidate, tally.optimal);
    let pass_fraction = tally.timed as f64 / considered as f64;
    let mut score = speed.powf(config.decay_exponent) * pass_fraction;

    let failure_fraction = tally.failed as f64 / considered as f64;
    if failure_fraction > config.max_failure_fraction {
        score = score.min(config.failure_score_cap);
    }
    clamp_score(score)
}

/// `optimal / candidate`, clipped to 1.0 when the candidate is at least as fast.
pub fn relative_speed(candidate: Duration, optimal: Duration) -> f64 {
    let candidate = candidate.as_nanos().max(1) as f64;
    let optimal = optimal.as_nanos().max(1) as f64;
    (optimal / candidate).min(1.0)
}

/// Times candidates against the problem's reference solution.
#[derive(Debug, Clone)]
pub struct PerformanceGrader {
    sandbox: Sandbox,
    comparator: Comparator,
    config: PerformanceConfig,
}

impl PerformanceGrader {
    pub fn new(sandbox: Sandbox, comparator: Comparator, config: PerformanceConfig) -> Self {
        Self {
            sandbox,
            comparator,
            config,
        }
    }

    fn applicable(problem: &ProblemDefinition) -> bool {
        optimal_source(problem).is_some() && problem.has_test_cases()
    }

    /// Grade one solution inside its own span and report the result.
    async fn grade_pair(
        &self,
        problem: &ProblemDefinition,
        solution: &LlmSolution,
        references: &ReferenceCache<Duration>,
    ) -> Option<SolutionGrade> {
        let span = obs::grading_span(PERFORMANCE, &solution.model_identifier);
        async {
            let grade = self.grade_solution(problem, solution, references).await?;
            obs::emit_solution_graded(
                PERFORMANCE,
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

    /// Median of the reference on `args`, measured at most once per
    /// `grade` call.
    async fn reference_median(
        &self,
        problem: &ProblemDefinition,
        optimal: &str,
        original: &FunctionPrototype,
        args: &[Value],
        references: &ReferenceCache<Duration>,
    ) -> ReferenceRun<Duration> {
        let key = ReferenceCache::<Duration>::key(problem, args);
        if let Some(run) = references.get(&key) {
            return run;
        }

        let budget = Duration::from_millis(self.config.case_budget_ms);
        let reference = self
            .sandbox
            .execute_timed(optimal, original, args, budget, self.config.repetitions.max(1))
            .await;
        let run = match (&reference.outcome, reference.median_timing()) {
            (ExecutionOutcome::Success { .. }, Some(median)) => ReferenceRun::Measured(median),
            (ExecutionOutcome::Success { .. }, None) => {
                ReferenceRun::Failed("no timing samples were collected".to_string())
            }
            (outcome, _) => ReferenceRun::Failed(outcome.summary()),
        };
        references.insert(key, run)
    }

    /// `None` when the reference could not be measured on any case the
    /// candidate passed, so there is nothing to compare against.
    async fn grade_solution(
        &self,
        problem: &ProblemDefinition,
        solution: &LlmSolution,
        references: &ReferenceCache<Duration>,
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
        let repetitions = self.config.repetitions.max(1);
        let mut tally = TimingTally::default();
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
                .execute_timed(&solution.solution_code, &requested, &args, budget, repetitions)
                .await;
            let candidate_median = match &candidate.outcome {
                ExecutionOutcome::SyntaxFailure { message } => {
                    return Some(grade.with_issues(vec![syntax_issue(message)]));
                }
                ExecutionOutcome::Success { value } if self.comparator.matches(&expected, value) => {
                    candidate.median_timing()
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
            let Some(candidate_median) = candidate_median else {
                issues.push(Issue::new(
                    IssueCategory::RuntimeFailure,
                    format!(
                        "Input: {}; no timing samples were collected",
                        case.describe_input(Some(&original))
                    ),
                ));
                tally.failed += 1;
                continue;
            };

            match self
                .reference_median(problem, optimal, &original, &args, references)
                .await
            {
                ReferenceRun::Measured(optimal_median) => {
                    tally.candidate += candidate_median;
                    tally.optimal += optimal_median;
                    tally.timed += 1;
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

        if tally.timed == 0 && reference_failures > 0 {
            obs::emit_grade_withheld(
                PERFORMANCE,
                &problem.identifier,
                prompt_id,
                &solution.model_identifier,
                &format!("reference solution failed on {reference_failures} case(s)"),
            );
            return None;
        }

        let score = performance_score(&self.config, &tally);
        let sub_criteria = (tally.timed > 0).then(|| {
            BTreeMap::from([
                (
                    "relative_speed".to_string(),
                    relative_speed(tally.candidate, tally.optimal),
                ),
                (
                    "pass_fraction".to_string(),
                    tally.timed as f64 / (tally.timed + tally.failed) as f64,
                ),
            ])
        });

        Some(
            SolutionGrade::new(
                &problem.identifier,
                prompt_id,
                &solution.model_identifier,
                score,
            )
            .with_issues(issues)
            .with_sub_criteria(sub_criteria),
        )
    }
}

#[async_trait]
impl Grader for PerformanceGrader {
    fn identifier(&self) -> &str {
        PERFORMANCE
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
        let pairs = pair_solutions(PERFORMANCE, problems, solutions)?;

        if let Some((problem, _)) = pairs.iter().find(|(p, _)| !Self::applicable(p)) {
            let err = BenchError::NotApplicable {
                grader: PERFORMANCE.to_string(),
                reason: format!(
                    "problem {} needs an optimal solution and test cases",
                    problem.identifier
                ),
            };
            obs::emit_grader_skipped(PERFORMANCE, &err);
            return Err(err);
        }

        obs::emit_grading_started(PERFORMANCE, problems.len(), pairs.len());

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
        debug!(
            event = "grading.reference_runs",
            grader = PERFORMANCE,
            measured = references.len(),
        );

        METRICS.inc_grades(grades.len() as u64);
        let output = GradingOutput::new(PERFORMANCE, grades);
        obs::emit_grading_finished(
            PERFORMANCE,
            output.solution_grades.len(),
            output.overall_score(),
            started.elapsed().as_millis() as u64,
        );
        Ok(output)
    }
}
