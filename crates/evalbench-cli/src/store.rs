//! On-disk layout of a problem set.
//!
//! ```text
//! <set>/problems/<file>.json
//! <set>/solutions/<model>/<problem>/<prompt>.json
//! <set>/grades/<model>/<grader>/<problem>/<prompt>.json
//! ```
//!
//! The problem-set name is the directory name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use evalbench_core::{GradingOutput, LlmSolution, ProblemDefinition, Report, SolutionGrade};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A problem-set directory and its problems.
#[derive(Debug, Clone)]
pub struct ProblemSet {
    pub name: String,
    pub root: PathBuf,
    pub problems: Vec<ProblemDefinition>,
}

impl ProblemSet {
    /// Load every `problems/*.json` file, in file-name order.
    pub fn load(root: &Path) -> Result<Self> {
        let mut problems = Vec::new();
        for (path, problem) in load_problem_files(root)? {
            let problem = problem.with_context(|| format!("Invalid problem file {:?}", path))?;
            problems.push(problem);
        }
        Ok(Self {
            name: set_name(root),
            root: root.to_path_buf(),
            problems,
        })
    }

    /// Problem id -> problem-set name.
    pub fn memberships(&self) -> BTreeMap<String, String> {
        self.problems
            .iter()
            .map(|p| (p.identifier.clone(), self.name.clone()))
            .collect()
    }

    /// Every stored solution of `model`, sorted by problem then prompt.
    pub fn load_solutions(&self, model: &str) -> Result<Vec<LlmSolution>> {
        let dir = self.root.join("solutions").join(model);
        nested_json_files(&dir)?
            .iter()
            .map(|path| read_json_file(path))
            .collect()
    }

    /// Stored grades of `model` under `grader`.
    pub fn load_grades(&self, model: &str, grader: &str) -> Result<GradingOutput> {
        let dir = self.root.join("grades").join(model).join(grader);
        let grades = nested_json_files(&dir)?
            .iter()
            .map(|path| read_json_file::<SolutionGrade>(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(GradingOutput::new(grader, grades))
    }

    /// Write each grade to its own file, replacing earlier grades.
    pub fn save_grades(&self, output: &GradingOutput) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(output.solution_grades.len());
        for grade in &output.solution_grades {
            let path = self
                .root
                .join("grades")
                .join(&grade.model_identifier)
                .join(&output.grader_identifier)
                .join(&grade.problem_identifier)
                .join(format!("{}.json", grade.prompt_identifier));
            write_json_file(&path, grade)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Parse each problem file without failing on the first bad one.
pub fn load_problem_files(
    root: &Path,
) -> Result<Vec<(PathBuf, serde_json::Result<ProblemDefinition>)>> {
    let dir = root.join("problems");
    let mut files = json_files(&dir)
        .with_context(|| format!("Failed to list problems in {:?}", dir))?;
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let parsed = serde_json::from_str(&text);
            Ok((path, parsed))
        })
        .collect()
}

/// Write the JSON report and its Markdown summary. Returns the JSON path.
pub fn write_report(
    report_dir: &Path,
    model: &str,
    timestamp: &str,
    report: &Report,
    markdown: &str,
) -> Result<PathBuf> {
    let stem = format!("report-{model}-{timestamp}");
    let json_path = report_dir.join(format!("{stem}.json"));
    write_json_file(&json_path, report)?;

    let md_path = report_dir.join(format!("{stem}.md"));
    std::fs::write(&md_path, markdown)
        .with_context(|| format!("Failed to write {:?}", md_path))?;
    Ok(json_path)
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json + "\n").with_context(|| format!("Failed to write {:?}", path))
}

fn set_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| root.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

fn json_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

/// `<dir>/<problem>/*.json`, sorted. A missing `dir` yields nothing.
fn nested_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let path = entry?.path();
        if path.is_dir() {
            files.extend(json_files(&path).with_context(|| format!("Failed to list {:?}", path))?);
        }
    }
    files.sort();
    Ok(files)
}
