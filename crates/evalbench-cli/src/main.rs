//! EvalBench CLI
//!
//! The `evalbench` command grades machine-generated solutions stored next to
//! their problem sets and aggregates the grades into reports.
//!
//! ## Commands
//!
//! - `validate`: Check problem files against the schema
//! - `grade`: Run graders over stored solutions and persist the grades
//! - `report`: Aggregate stored grades into JSON and Markdown reports
//! - `graders`: List the available grader ids

mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use evalbench_core::{
    aggregate, emit_grader_skipped, render_report_md, validate_problem, validate_problems,
    BenchConfig, BenchError, GraderRegistry, Report, METRICS,
};
use store::{load_problem_files, write_report, ProblemSet};

#[derive(Parser)]
#[command(name = "evalbench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grade machine-generated functions in a process sandbox", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Benchmark configuration file (TOML)
    #[arg(long, global = true, env = "EVALBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Python interpreter used by the sandbox (overrides the config file)
    #[arg(long, global = true, env = "EVALBENCH_PYTHON")]
    python: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the problem files of one or more problem sets
    Validate {
        /// Problem-set directories
        #[arg(required = true)]
        sets: Vec<PathBuf>,
    },

    /// Grade stored solutions and write the grades next to them
    Grade {
        /// Problem-set directories
        #[arg(required = true)]
        sets: Vec<PathBuf>,

        /// Model whose solutions are graded (repeatable)
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,

        /// Grader to run (repeatable)
        #[arg(short, long = "grader", default_value = "correctness")]
        graders: Vec<String>,
    },

    /// Aggregate stored grades into reports
    Report {
        /// Problem-set directories
        #[arg(required = true)]
        sets: Vec<PathBuf>,

        /// Model to report on (repeatable)
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,

        /// Grader whose grades are included (repeatable)
        #[arg(short, long = "grader", default_value = "correctness")]
        graders: Vec<String>,

        /// Directory the reports are written to
        #[arg(long, default_value = "reports")]
        report_path: PathBuf,
    },

    /// List the available graders
    Graders,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    evalbench_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.python)?;

    match cli.command {
        Commands::Validate { sets } => cmd_validate(&sets),
        Commands::Grade {
            sets,
            models,
            graders,
        } => cmd_grade(&config, &sets, &models, &graders).await,
        Commands::Report {
            sets,
            models,
            graders,
            report_path,
        } => cmd_report(&config, &sets, &models, &graders, &report_path),
        Commands::Graders => cmd_graders(&config),
    }
}

fn load_config(path: Option<&Path>, python: Option<String>) -> Result<BenchConfig> {
    let mut config = match path {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => BenchConfig::default(),
    };
    if let Some(python) = python {
        config.sandbox.python = python;
        config.validate().context("Invalid --python override")?;
    }
    Ok(config)
}

/// Validate every problem file; fails if any file is invalid.
fn cmd_validate(sets: &[PathBuf]) -> Result<()> {
    let mut checked = 0usize;
    let mut invalid = 0usize;

    for dir in sets {
        for (path, parsed) in load_problem_files(dir)? {
            checked += 1;
            let verdict = parsed
                .map_err(|e| e.to_string())
                .and_then(|problem| validate_problem(&problem).map_err(|e| e.to_string()));
            match verdict {
                Ok(()) => println!("ok       {}", path.display()),
                Err(reason) => {
                    invalid += 1;
                    println!("invalid  {}: {}", path.display(), reason);
                }
            }
        }
    }

    println!("{} problem file(s) checked, {} invalid", checked, invalid);
    if invalid > 0 {
        anyhow::bail!("{} invalid problem file(s)", invalid);
    }
    Ok(())
}

/// Grade every model's stored solutions with each requested grader.
async fn cmd_grade(
    config: &BenchConfig,
    sets: &[PathBuf],
    models: &[String],
    graders: &[String],
) -> Result<()> {
    let registry = GraderRegistry::with_builtin(config);
    let graders = registry.resolve(graders)?;

    for dir in sets {
        let set = ProblemSet::load(dir)?;
        validate_problems(&set.problems)
            .with_context(|| format!("Problem set {} failed validation", set.name))?;
        info!(set = %set.name, problems = set.problems.len(), "problem set loaded");

        for model in models {
            let solutions = set.load_solutions(model)?;
            if solutions.is_empty() {
                warn!(set = %set.name, model = %model, "no stored solutions");
                continue;
            }

            for grader in &graders {
                let id = grader.identifier();
                if !grader.can_grade(&set.problems) {
                    let reason = BenchError::NotApplicable {
                        grader: id.to_string(),
                        reason: format!("problem set {}", set.name),
                    };
                    emit_grader_skipped(id, &reason);
                    println!("[{}] {} skipped: not applicable", set.name, id);
                    continue;
                }

                let output = grader
                    .grade(&set.problems, &solutions)
                    .await
                    .with_context(|| format!("Grader {} failed on {}", id, set.name))?;
                set.save_grades(&output)?;

                println!(
                    "[{}] {} / {}: {} grade(s), mean {:.4}",
                    set.name,
                    model,
                    id,
                    output.solution_grades.len(),
                    output.overall_score()
                );
            }
        }
    }

    METRICS.flush();
    Ok(())
}

/// Aggregate stored grades and write one report per model.
fn cmd_report(
    config: &BenchConfig,
    sets: &[PathBuf],
    models: &[String],
    graders: &[String],
    report_dir: &Path,
) -> Result<()> {
    GraderRegistry::with_builtin(config).resolve(graders)?;

    let mut memberships = BTreeMap::new();
    let mut outputs = Vec::new();
    for dir in sets {
        let set = ProblemSet::load(dir)?;
        memberships.extend(set.memberships());
        for model in models {
            for grader in graders {
                outputs.push(set.load_grades(model, grader)?);
            }
        }
    }

    let report = aggregate(&memberships, &outputs);
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    for model in models {
        let Some(summary) = report.model(model) else {
            println!("No grades for model {}", model);
            continue;
        };
        let single = Report {
            models: BTreeMap::from([(model.clone(), summary.clone())]),
        };
        let markdown = render_report_md(&single);
        let path = write_report(report_dir, model, &timestamp, &single, &markdown)?;
        println!("Report for {}: {}", model, path.display());
    }
    Ok(())
}

fn cmd_graders(config: &BenchConfig) -> Result<()> {
    for id in GraderRegistry::with_builtin(config).identifiers() {
        println!("{}", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use evalbench_core::{
        FunctionPrototype, GradingOutput, LlmSolution, ProblemDefinition, Prompt, Sandbox,
        SolutionGrade, TestCase,
    };
    use serde_json::json;

    fn write(path: &Path, value: &impl serde::Serialize) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn add_problem() -> ProblemDefinition {
        ProblemDefinition::new(
            "add",
            FunctionPrototype::new("add")
                .with_parameter("a", "int")
                .with_parameter("b", "int")
                .with_return("int"),
        )
        .add_prompt(Prompt::new("p1", "Add two integers."))
        .add_test_case(TestCase::new(json!({"a": 4, "b": 7}), vec![json!(11)]))
        .add_test_case(TestCase::new(json!({"a": -3, "b": 3}), vec![json!(0)]))
    }

    fn problem_set(root: &Path) -> PathBuf {
        let set = root.join("basic");
        write(&set.join("problems").join("add.json"), &add_problem());
        set
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_grade_args_parse_repeatable_flags() {
        let cli = Cli::try_parse_from([
            "evalbench", "grade", "sets/basic", "-m", "m1", "-m", "m2", "-g", "correctness", "-g",
            "performance",
        ])
        .unwrap();
        match cli.command {
            Commands::Grade {
                sets,
                models,
                graders,
            } => {
                assert_eq!(sets, vec![PathBuf::from("sets/basic")]);
                assert_eq!(models, vec!["m1", "m2"]);
                assert_eq!(graders, vec!["correctness", "performance"]);
            }
            _ => panic!("expected grade command"),
        }
    }

    #[test]
    fn test_report_defaults() {
        let cli = Cli::try_parse_from(["evalbench", "report", "sets/basic", "--model", "m"]).unwrap();
        match cli.command {
            Commands::Report {
                graders,
                report_path,
                ..
            } => {
                assert_eq!(graders, vec!["correctness"]);
                assert_eq!(report_path, PathBuf::from("reports"));
            }
            _ => panic!("expected report command"),
        }
    }

    #[test]
    fn test_load_config_python_override() {
        let config = load_config(None, Some("python3.12".to_string())).unwrap();
        assert_eq!(config.sandbox.python, "python3.12");
        assert_eq!(config.performance, BenchConfig::default().performance);
    }

    #[test]
    fn test_validate_accepts_valid_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = problem_set(dir.path());
        cmd_validate(&[set]).unwrap();
    }

    #[test]
    fn test_validate_rejects_invalid_problem() {
        let dir = tempfile::tempdir().unwrap();
        let set = problem_set(dir.path());
        let mut bad = add_problem();
        bad.prompts.clear();
        write(&set.join("problems").join("bad.json"), &bad);

        let err = cmd_validate(&[set]).unwrap_err();
        assert!(err.to_string().contains("1 invalid"));
    }

    #[test]
    fn test_report_writes_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let set = problem_set(dir.path());
        let loaded = ProblemSet::load(&set).unwrap();
        loaded
            .save_grades(&GradingOutput::new(
                "correctness",
                vec![SolutionGrade::new("add", "p1", "m", 0.5)],
            ))
            .unwrap();

        let reports = dir.path().join("reports");
        cmd_report(
            &BenchConfig::default(),
            &[set],
            &["m".to_string()],
            &["correctness".to_string()],
            &reports,
        )
        .unwrap();

        let mut files: Vec<String> = std::fs::read_dir(&reports)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[0].starts_with("report-m-") && files[0].ends_with(".json"));
        assert!(files[1].ends_with(".md"));

        let report: Report =
            store::read_json_file(&reports.join(&files[0])).unwrap();
        assert_eq!(report.problem_set_average("m", "basic", "correctness"), Some(0.5));
    }

    #[test]
    fn test_report_rejects_unknown_grader() {
        let dir = tempfile::tempdir().unwrap();
        let set = problem_set(dir.path());
        let err = cmd_report(
            &BenchConfig::default(),
            &[set],
            &["m".to_string()],
            &["vectorization".to_string()],
            &dir.path().join("reports"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("vectorization"));
    }

    #[tokio::test]
    async fn test_grade_persists_grades() {
        if Sandbox::default().interpreter_version().await.is_err() {
            eprintln!("skipping: no python interpreter");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let set = problem_set(dir.path());
        write(
            &set.join("solutions").join("m").join("add").join("p1.json"),
            &LlmSolution::new("add", "m", "p1", "def add(a, b):\n    return a - b\n"),
        );

        cmd_grade(
            &BenchConfig::default(),
            &[set.clone()],
            &["m".to_string()],
            &["correctness".to_string(), "performance".to_string()],
        )
        .await
        .unwrap();

        let grade: SolutionGrade = store::read_json_file(
            &set.join("grades/m/correctness/add/p1.json"),
        )
        .unwrap();
        assert_eq!(grade.score, 0.0);
        assert_eq!(grade.issues.len(), 2);
        // no optimal solution: performance is skipped
        assert!(!set.join("grades/m/performance").exists());
    }

    #[tokio::test]
    async fn test_grade_with_source_graders() {
        let dir = tempfile::tempdir().unwrap();
        let set = dir.path().join("basic");
        let optimal = "def add(a, b):\n    return a + b\n";
        write(
            &set.join("problems").join("add.json"),
            &add_problem().with_optimal_solution(optimal),
        );
        write(
            &set.join("solutions").join("m").join("add").join("p1.json"),
            &LlmSolution::new("add", "m", "p1", optimal),
        );

        cmd_grade(
            &BenchConfig::default(),
            &[set.clone()],
            &["m".to_string()],
            &["halstead".to_string(), "humanlikeness".to_string()],
        )
        .await
        .unwrap();

        for grader in ["halstead", "humanlikeness"] {
            let grade: SolutionGrade = store::read_json_file(
                &set.join("grades/m").join(grader).join("add/p1.json"),
            )
            .unwrap();
            assert_eq!(grade.score, 1.0, "{grader}");
        }
    }
}
