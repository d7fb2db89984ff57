//! Grades, issues and grader output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::digest::compute_digest;
use super::error::Result;

/// Why a test case (or a whole solution) lost points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueCategory {
    /// The candidate returned, but not the expected value.
    WrongOutput,
    /// The candidate raised, or the call could not be set up.
    RuntimeFailure,
    /// The candidate source does not compile.
    SyntaxFailure,
    /// The candidate exceeded its time budget.
    Timeout,
    /// The problem offers nothing to grade against.
    NoTestCases,
    /// The reference implementation itself failed.
    ReferenceFailure,
    /// Category defined by an external grader.
    Custom(String),
}

impl IssueCategory {
    pub fn as_str(&self) -> &str {
        match self {
            IssueCategory::WrongOutput => "wrong_output",
            IssueCategory::RuntimeFailure => "runtime_failure",
            IssueCategory::SyntaxFailure => "syntax_failure",
            IssueCategory::Timeout => "timeout",
            IssueCategory::NoTestCases => "no_test_cases",
            IssueCategory::ReferenceFailure => "reference_failure",
            IssueCategory::Custom(s) => s,
        }
    }
}

impl From<String> for IssueCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "wrong_output" => IssueCategory::WrongOutput,
            "runtime_failure" => IssueCategory::RuntimeFailure,
            "syntax_failure" => IssueCategory::SyntaxFailure,
            "timeout" => IssueCategory::Timeout,
            "no_test_cases" => IssueCategory::NoTestCases,
            "reference_failure" => IssueCategory::ReferenceFailure,
            _ => IssueCategory::Custom(s),
        }
    }
}

impl From<IssueCategory> for String {
    fn from(c: IssueCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorised, human-readable grading finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "issue_category")]
    pub category: IssueCategory,
    #[serde(rename = "issue_description")]
    pub description: String,
}

impl Issue {
    pub fn new(category: IssueCategory, description: impl Into<String>) -> Self {
        Self {
            category,
            description: description.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Issue({}, {})", self.category, self.description)
    }
}

/// The grade for one (problem, prompt, model) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionGrade {
    pub problem_identifier: String,
    pub prompt_identifier: String,
    pub model_identifier: String,
    /// Always within `[0.0, 1.0]`.
    pub score: f64,
    #[serde(default)]
    pub sub_criteria_scores: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl SolutionGrade {
    /// Create a grade; `score` is clamped to `[0.0, 1.0]` and NaN becomes 0.0.
    pub fn new(problem: &str, prompt: &str, model: &str, score: f64) -> Self {
        Self {
            problem_identifier: problem.to_string(),
            prompt_identifier: prompt.to_string(),
            model_identifier: model.to_string(),
            score: clamp_score(score),
            sub_criteria_scores: None,
            issues: Vec::new(),
        }
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_sub_criteria(mut self, scores: Option<BTreeMap<String, f64>>) -> Self {
        self.sub_criteria_scores =
            scores.map(|m| m.into_iter().map(|(k, v)| (k, clamp_score(v))).collect());
        self
    }

    /// Issues of a given category.
    pub fn issues_of<'a>(&'a self, category: &'a IssueCategory) -> impl Iterator<Item = &'a Issue> {
        self.issues.iter().filter(move |i| &i.category == category)
    }
}

/// Clamp a raw score into `[0.0, 1.0]`.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// All grades produced by one grader run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingOutput {
    #[serde(default)]
    pub grader_identifier: String,
    #[serde(default)]
    pub solution_grades: Vec<SolutionGrade>,
}

impl GradingOutput {
    pub fn new(grader_identifier: &str, solution_grades: Vec<SolutionGrade>) -> Self {
        Self {
            grader_identifier: grader_identifier.to_string(),
            solution_grades,
        }
    }

    /// Mean score over all grades; 0.0 when there are none.
    pub fn overall_score(&self) -> f64 {
        if self.solution_grades.is_empty() {
            return 0.0;
        }
        let total: f64 = self.solution_grades.iter().map(|g| g.score).sum();
        total / self.solution_grades.len() as f64
    }

    /// SHA-256 of the canonical JSON form; identical grades hash identically.
    pub fn digest(&self) -> Result<String> {
        compute_digest(&serde_json::to_value(self)?)
    }
}

impl fmt::Display for GradingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GradingOutput ({}):", self.grader_identifier)?;
        writeln!(f, "  Overall Score: {:.4}", self.overall_score())?;
        write!(f, "  Solutions Count: {}", self.solution_grades.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_category_serializes_as_string() {
        let issue = Issue::new(IssueCategory::WrongOutput, "expected 11, observed 3");
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(v["issue_category"], json!("wrong_output"));
        assert_eq!(v["issue_description"], json!("expected 11, observed 3"));
    }

    #[test]
    fn test_custom_category_roundtrip() {
        let c: IssueCategory = serde_json::from_value(json!("style")).unwrap();
        assert_eq!(c, IssueCategory::Custom("style".into()));
        assert_eq!(serde_json::to_value(&c).unwrap(), json!("style"));
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(SolutionGrade::new("p", "q", "m", 1.7).score, 1.0);
        assert_eq!(SolutionGrade::new("p", "q", "m", -0.2).score, 0.0);
        assert_eq!(SolutionGrade::new("p", "q", "m", f64::NAN).score, 0.0);
    }

    #[test]
    fn test_overall_score() {
        let out = GradingOutput::new(
            "correctness",
            vec![
                SolutionGrade::new("a", "p", "m", 1.0),
                SolutionGrade::new("b", "p", "m", 0.5),
                SolutionGrade::new("c", "p", "m", 0.0),
            ],
        );
        assert!((out.overall_score() - 0.5).abs() < 1e-12);
        assert_eq!(GradingOutput::new("x", vec![]).overall_score(), 0.0);
    }

    #[test]
    fn test_digest_is_stable() {
        let out = GradingOutput::new(
            "correctness",
            vec![SolutionGrade::new("a", "p", "m", 1.0)
                .with_issues(vec![Issue::new(IssueCategory::Timeout, "slow")])],
        );
        assert_eq!(out.digest().unwrap(), out.clone().digest().unwrap());
        let other = GradingOutput::new("correctness", vec![SolutionGrade::new("a", "p", "m", 0.0)]);
        assert_ne!(out.digest().unwrap(), other.digest().unwrap());
    }
}
