//! Candidate solutions produced by models.

use serde::{Deserialize, Serialize};

/// Source text for a single function, attributed to a model and prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSolution {
    #[serde(default)]
    pub problem_identifier: String,
    #[serde(default)]
    pub model_identifier: String,
    #[serde(default)]
    pub prompt_identifier: String,
    #[serde(default)]
    pub solution_code: String,
    /// Free-form feedback returned alongside the code, if any.
    #[serde(default)]
    pub feedback: Option<serde_json::Value>,
}

impl LlmSolution {
    pub fn new(problem: &str, model: &str, prompt: &str, solution_code: &str) -> Self {
        Self {
            problem_identifier: problem.to_string(),
            model_identifier: model.to_string(),
            prompt_identifier: prompt.to_string(),
            solution_code: solution_code.to_string(),
            feedback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let s: LlmSolution = serde_json::from_str(r#"{"solution_code": "def f(): pass"}"#).unwrap();
        assert!(s.problem_identifier.is_empty());
        assert!(s.feedback.is_none());
        assert_eq!(s.solution_code, "def f(): pass");
    }
}
