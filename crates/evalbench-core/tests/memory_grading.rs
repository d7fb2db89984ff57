//! Memory grading against a reference implementation.

use evalbench_core::grader::memory::MEMORY;
use evalbench_core::{
    BenchConfig, BenchError, Comparator, FunctionPrototype, Grader, GraderRegistry, IssueCategory,
    LlmSolution, MemoryConfig, MemoryGrader, ProblemDefinition, Prompt, Sandbox, TestCase,
};
use serde_json::json;

async fn python_available() -> bool {
    match Sandbox::default().interpreter_version().await {
        Ok(_) => true,
        Err(err) => {
            eprintln!("skipping: no python interpreter ({err})");
            false
        }
    }
}

fn grader() -> MemoryGrader {
    MemoryGrader::new(Sandbox::default(), Comparator::default(), MemoryConfig::default())
}

const LEAN: &str = "def squares(n):\n    return sum(i * i for i in range(n))\n";
const WASTEFUL: &str = "def squares(n):\n    values = [i * i for i in range(n)]\n    return sum(values)\n";

fn squares_problem() -> ProblemDefinition {
    ProblemDefinition::new(
        "squares",
        FunctionPrototype::new("squares")
            .with_parameter("n", "int")
            .with_return("int"),
    )
    .add_prompt(Prompt::new("p1", "Sum the squares below n."))
    .add_test_case(TestCase::new(json!({"n": 10}), vec![json!(285)]))
    .add_test_case(TestCase::new(
        json!({"n": 200000}),
        vec![json!(2666646666700000u64)],
    ))
    .with_optimal_solution(LEAN)
}

#[tokio::test]
async fn test_wasteful_candidate_scores_below_lean_one() {
    if !python_available().await {
        return;
    }
    let solutions = vec![
        LlmSolution::new("squares", "lean", "p1", LEAN),
        LlmSolution::new("squares", "wasteful", "p1", WASTEFUL),
    ];
    let output = grader()
        .grade(&[squares_problem()], &solutions)
        .await
        .unwrap();

    assert_eq!(output.grader_identifier, MEMORY);
    let lean = &output.solution_grades[0];
    let wasteful = &output.solution_grades[1];
    assert!(lean.issues.is_empty(), "{:?}", lean.issues);
    assert!(lean.score > 0.5, "lean {}", lean.score);
    assert!(wasteful.score < 0.5, "wasteful {}", wasteful.score);
    assert!(wasteful.score < lean.score);

    let sub = wasteful.sub_criteria_scores.as_ref().unwrap();
    assert_eq!(sub["pass_fraction"], 1.0);
    assert!(sub["relative_memory"] < 0.5);
}

#[tokio::test]
async fn test_wrong_candidate_is_not_rewarded() {
    if !python_available().await {
        return;
    }
    let output = grader()
        .grade(
            &[squares_problem()],
            &[LlmSolution::new("squares", "m", "p1", "def squares(n):\n    return 0\n")],
        )
        .await
        .unwrap();

    let grade = &output.solution_grades[0];
    assert_eq!(grade.score, 0.0);
    assert_eq!(grade.issues_of(&IssueCategory::WrongOutput).count(), 2);
}

#[tokio::test]
async fn test_broken_reference_withholds_grade() {
    if !python_available().await {
        return;
    }
    let problem = squares_problem()
        .with_optimal_solution("def squares(n):\n    raise MemoryError('bad reference')\n");
    let output = grader()
        .grade(&[problem], &[LlmSolution::new("squares", "m", "p1", LEAN)])
        .await
        .unwrap();
    assert!(output.solution_grades.is_empty());
}

#[tokio::test]
async fn test_missing_optimal_solution_is_not_applicable() {
    let mut problem = squares_problem();
    problem.optimal_solution = Some("   ".to_string());

    let grader = grader();
    assert!(!grader.can_grade(&[problem.clone()]));
    let err = grader
        .grade(&[problem], &[LlmSolution::new("squares", "m", "p1", LEAN)])
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::NotApplicable { grader, .. } if grader == "memory"));
}

#[test]
fn test_builtin_registry_includes_memory_grader() {
    let registry = GraderRegistry::with_builtin(&BenchConfig::default());
    let grader = registry.get(MEMORY).unwrap();
    assert!(grader.can_grade(&[squares_problem()]));
}
