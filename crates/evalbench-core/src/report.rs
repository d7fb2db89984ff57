//! Report aggregation over many grading outputs.
//!
//! A [`Report`] is a pure function of its inputs: grades are grouped by model,
//! then averaged per grader ("criterion") and per (problem set, grader) pair.
//! Cells without any contributing grade are left out, never zero-filled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{GradingOutput, SolutionGrade};
use crate::obs;

/// Aggregated results for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    /// Raw grades by grader, in input order.
    pub grades: BTreeMap<String, Vec<SolutionGrade>>,
    /// Grader -> mean score over all of this model's grades for that grader.
    pub average_per_criterion: BTreeMap<String, f64>,
    /// Problem set -> grader -> mean score.
    pub average_per_problem_set: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ModelReport {
    pub fn grade_count(&self, grader: &str) -> usize {
        self.grades.get(grader).map_or(0, Vec::len)
    }
}

/// Aggregated results for every model seen in the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub models: BTreeMap<String, ModelReport>,
}

impl Report {
    pub fn model(&self, model: &str) -> Option<&ModelReport> {
        self.models.get(model)
    }

    /// Mean score of `model` on `problem_set` under `grader`, if any grade
    /// contributed.
    pub fn problem_set_average(&self, model: &str, problem_set: &str, grader: &str) -> Option<f64> {
        self.models
            .get(model)?
            .average_per_problem_set
            .get(problem_set)?
            .get(grader)
            .copied()
    }

    pub fn criterion_average(&self, model: &str, grader: &str) -> Option<f64> {
        self.models
            .get(model)?
            .average_per_criterion
            .get(grader)
            .copied()
    }
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Build a report from grading outputs.
///
/// `memberships` maps problem identifiers to problem-set names. Grades for
/// problems without a membership count toward per-criterion averages only.
pub fn aggregate(memberships: &BTreeMap<String, String>, outputs: &[GradingOutput]) -> Report {
    let mut grades: BTreeMap<String, BTreeMap<String, Vec<SolutionGrade>>> = BTreeMap::new();
    let mut per_criterion: BTreeMap<(String, String), Mean> = BTreeMap::new();
    let mut per_set: BTreeMap<(String, String, String), Mean> = BTreeMap::new();

    for output in outputs {
        let grader = &output.grader_identifier;
        for grade in &output.solution_grades {
            let model = &grade.model_identifier;
            grades
                .entry(model.clone())
                .or_default()
                .entry(grader.clone())
                .or_default()
                .push(grade.clone());

            per_criterion
                .entry((model.clone(), grader.clone()))
                .or_default()
                .add(grade.score);

            if let Some(set) = memberships.get(&grade.problem_identifier) {
                per_set
                    .entry((model.clone(), set.clone(), grader.clone()))
                    .or_default()
                    .add(grade.score);
            }
        }
    }

    let mut models: BTreeMap<String, ModelReport> = grades
        .into_iter()
        .map(|(model, grades)| {
            (
                model,
                ModelReport {
                    grades,
                    ..ModelReport::default()
                },
            )
        })
        .collect();

    for ((model, grader), mean) in per_criterion {
        if let Some(report) = models.get_mut(&model) {
            report.average_per_criterion.insert(grader, mean.value());
        }
    }
    for ((model, set, grader), mean) in per_set {
        if let Some(report) = models.get_mut(&model) {
            report
                .average_per_problem_set
                .entry(set)
                .or_default()
                .insert(grader, mean.value());
        }
    }

    obs::emit_report_aggregated(models.len(), outputs.len());
    Report { models }
}

/// Render a stable Markdown summary of a report.
pub fn render_report_md(report: &Report) -> String {
    let mut out = String::from("# Benchmark Report\n");
    if report.models.is_empty() {
        out.push_str("\nNo grades.\n");
        return out;
    }

    for (model, summary) in &report.models {
        out.push_str(&format!("\n## Model `{model}`\n\n"));

        out.push_str("### Average per criterion\n");
        out.push_str("| Criterion | Average | Grades |\n|---|---|---|\n");
        for (grader, average) in &summary.average_per_criterion {
            out.push_str(&format!(
                "| {grader} | {average:.4} | {} |\n",
                summary.grade_count(grader)
            ));
        }

        if !summary.average_per_problem_set.is_empty() {
            out.push_str("\n### Average per problem set\n");
            out.push_str("| Problem set | Criterion | Average |\n|---|---|---|\n");
            for (set, by_grader) in &summary.average_per_problem_set {
                for (grader, average) in by_grader {
                    out.push_str(&format!("| {set} | {grader} | {average:.4} |\n"));
                }
            }
        }
    }
    out
}
