//! Structural validation of problems and solutions.
//!
//! Runs before any candidate is executed. A problem that fails here aborts
//! the grading run; nothing is sent to the sandbox.

use std::collections::HashSet;

use super::error::SchemaError;
use super::problem::ProblemDefinition;
use super::solution::LlmSolution;

/// Python keywords that cannot name a function or parameter.
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Whether `name` can be bound as a function or parameter name.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic());
    first_ok
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !RESERVED_WORDS.contains(&name)
}

/// Validate a single problem definition.
///
/// Checks:
/// 1. The identifier is non-empty.
/// 2. There is at least one prompt and prompt ids are unique.
/// 3. A prototype is present and its function name is a valid identifier.
/// 4. Parameter names are valid and unique; declared types are non-empty.
pub fn validate_problem(problem: &ProblemDefinition) -> Result<(), SchemaError> {
    let id = problem.identifier.trim();
    if id.is_empty() {
        return Err(SchemaError::EmptyProblemId);
    }

    if problem.prompts.is_empty() {
        return Err(SchemaError::NoPrompts {
            problem: id.to_string(),
        });
    }

    let mut prompt_ids = HashSet::new();
    for prompt in &problem.prompts {
        if !prompt_ids.insert(prompt.prompt_id.as_str()) {
            return Err(SchemaError::DuplicatePrompt {
                problem: id.to_string(),
                prompt: prompt.prompt_id.clone(),
            });
        }
    }

    let proto = problem
        .function_prototype
        .as_ref()
        .ok_or_else(|| SchemaError::MissingPrototype {
            problem: id.to_string(),
        })?;

    if !is_valid_identifier(&proto.function_name) {
        return Err(SchemaError::InvalidFunctionName {
            problem: id.to_string(),
            name: proto.function_name.clone(),
        });
    }

    let mut names = HashSet::new();
    for param in &proto.parameters {
        if !is_valid_identifier(&param.name) {
            return Err(SchemaError::InvalidParameterName {
                problem: id.to_string(),
                name: param.name.clone(),
            });
        }
        if !names.insert(param.name.as_str()) {
            return Err(SchemaError::DuplicateParameter {
                problem: id.to_string(),
                name: param.name.clone(),
            });
        }
        if param.declared_type.trim().is_empty() {
            return Err(SchemaError::EmptyDeclaredType {
                problem: id.to_string(),
                position: format!("parameter {}", param.name),
            });
        }
    }

    for (index, rv) in proto.return_values.iter().enumerate() {
        if rv.declared_type.trim().is_empty() {
            return Err(SchemaError::EmptyDeclaredType {
                problem: id.to_string(),
                position: format!("return value {index}"),
            });
        }
    }

    Ok(())
}

/// Validate every problem, stopping at the first failure.
pub fn validate_problems(problems: &[ProblemDefinition]) -> Result<(), SchemaError> {
    problems.iter().try_for_each(validate_problem)
}

/// Validate the identifying fields of a solution.
pub fn validate_solution(solution: &LlmSolution) -> Result<(), SchemaError> {
    let fields = [
        ("problem_identifier", &solution.problem_identifier),
        ("model_identifier", &solution.model_identifier),
        ("prompt_identifier", &solution.prompt_identifier),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(SchemaError::EmptySolutionField { field });
        }
    }
    Ok(())
}
