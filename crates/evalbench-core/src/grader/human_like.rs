//! Human-likeness grading: token overlap with the reference solution.
//!
//! Both sources are split on whitespace into token sets; the score is their
//! Jaccard similarity `|A ∩ B| / |A ∪ B|`. Two empty sources are identical.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{grade_source_against_optimal, optimal_source, Grader};
use crate::domain::{GradingOutput, LlmSolution, ProblemDefinition, Result};

pub const HUMAN_LIKENESS: &str = "humanlikeness";

/// Jaccard similarity of the whitespace-separated tokens of `a` and `b`.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 1.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Scores how closely the candidate's wording follows the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct HumanLikeGrader;

impl HumanLikeGrader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Grader for HumanLikeGrader {
    fn identifier(&self) -> &str {
        HUMAN_LIKENESS
    }

    fn can_grade(&self, problems: &[ProblemDefinition]) -> bool {
        problems.iter().all(|p| optimal_source(p).is_some())
    }

    async fn grade(
        &self,
        problems: &[ProblemDefinition],
        solutions: &[LlmSolution],
    ) -> Result<GradingOutput> {
        grade_source_against_optimal(HUMAN_LIKENESS, problems, solutions, token_similarity)
    }
}
