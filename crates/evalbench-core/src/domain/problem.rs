//! Problem definitions: prototypes, prompts and test cases.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::coerce::coerce_literal;

/// A single declared parameter of the target function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,

    /// Declared type hint (e.g. `int`, `List[int]`, `Optional[str]`).
    #[serde(rename = "type")]
    pub declared_type: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.declared_type)
    }
}

/// A declared return value of the target function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReturnValue {
    #[serde(rename = "type")]
    pub declared_type: String,
}

impl ReturnValue {
    pub fn new(declared_type: impl Into<String>) -> Self {
        Self {
            declared_type: declared_type.into(),
        }
    }
}

/// No test-case input was supplied for a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("test case has no input for parameter `{0}`")]
pub struct MissingInput(pub String);

/// Signature of the function a candidate must implement.
///
/// Declared types are advisory: they drive literal coercion and nothing is
/// enforced statically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionPrototype {
    pub function_name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub return_values: Vec<ReturnValue>,
}

impl FunctionPrototype {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            parameters: Vec::new(),
            return_values: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, declared_type: &str) -> Self {
        self.parameters.push(Parameter::new(name, declared_type));
        self
    }

    pub fn with_return(mut self, declared_type: &str) -> Self {
        self.return_values.push(ReturnValue::new(declared_type));
        self
    }

    /// The anonymised prototype shown to models when a prompt asks for it:
    /// the function is called `function` and parameters become `a`, `b`, ...
    pub fn genericize(&self) -> Self {
        Self {
            function_name: "function".to_string(),
            parameters: self
                .parameters
                .iter()
                .enumerate()
                .map(|(i, p)| Parameter::new(generic_parameter_name(i), p.declared_type.clone()))
                .collect(),
            return_values: self.return_values.clone(),
        }
    }

    /// Build the positional argument list for a test case.
    ///
    /// Inputs are looked up by parameter name and coerced by declared type.
    pub fn positional_arguments(&self, test_case: &TestCase) -> Result<Vec<Value>, MissingInput> {
        self.parameters
            .iter()
            .map(|param| {
                test_case
                    .input
                    .get(&param.name)
                    .map(|raw| coerce_literal(&param.declared_type, raw))
                    .ok_or_else(|| MissingInput(param.name.clone()))
            })
            .collect()
    }

    /// The value a correct candidate returns for `test_case`.
    ///
    /// One declared return value compares against the first expected output;
    /// several compare as an ordered sequence (a tuple on the candidate side).
    pub fn expected_value(&self, test_case: &TestCase) -> Value {
        let expected = &test_case.expected_output;
        if self.return_values.is_empty() {
            return match expected.len() {
                0 => Value::Null,
                1 => expected[0].clone(),
                _ => Value::Array(expected.clone()),
            };
        }

        let mut coerced: Vec<Value> = self
            .return_values
            .iter()
            .zip(expected.iter())
            .map(|(rv, raw)| coerce_literal(&rv.declared_type, raw))
            .collect();

        match coerced.len() {
            0 => Value::Null,
            1 => coerced.remove(0),
            _ => Value::Array(coerced),
        }
    }
}

impl fmt::Display for FunctionPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        let returns: Vec<&str> = self
            .return_values
            .iter()
            .map(|r| r.declared_type.as_str())
            .collect();
        write!(
            f,
            "{}({}) -> {}",
            self.function_name,
            params.join(", "),
            returns.join(", ")
        )
    }
}

fn generic_parameter_name(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'a' + i).to_string(),
        _ => format!("p{index}"),
    }
}

/// One input/expected-output pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TestCase {
    /// Parameter name -> literal value.
    #[serde(default)]
    pub input: Map<String, Value>,

    /// Expected outputs, index-aligned with the declared return values.
    #[serde(default, deserialize_with = "one_or_many")]
    pub expected_output: Vec<Value>,

    /// Optional labels used for per-tag sub-scores.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TestCase {
    pub fn new(input: Value, expected_output: Vec<Value>) -> Self {
        let input = match input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            input,
            expected_output,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Render inputs as `a = 4, b = 7`, following the prototype's parameter
    /// order when one is given.
    pub fn describe_input(&self, prototype: Option<&FunctionPrototype>) -> String {
        let mut parts = Vec::new();
        match prototype {
            Some(proto) => {
                for param in &proto.parameters {
                    if let Some(v) = self.input.get(&param.name) {
                        parts.push(format!("{} = {}", param.name, v));
                    }
                }
                for (k, v) in &self.input {
                    if !proto.parameters.iter().any(|p| &p.name == k) {
                        parts.push(format!("{k} = {v}"));
                    }
                }
            }
            None => {
                for (k, v) in &self.input {
                    parts.push(format!("{k} = {v}"));
                }
            }
        }
        parts.join(", ")
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

/// A prompt variant of a problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub prompt_id: String,
    #[serde(default)]
    pub prompt: String,
    /// Ask the model for the anonymised prototype.
    #[serde(default)]
    pub genericize: Option<bool>,
    #[serde(default)]
    pub sample_inputs_outputs: Vec<TestCase>,
    #[serde(default)]
    pub input_code: Option<String>,
}

impl Prompt {
    pub fn new(prompt_id: &str, prompt: &str) -> Self {
        Self {
            prompt_id: prompt_id.to_string(),
            prompt: prompt.to_string(),
            genericize: None,
            sample_inputs_outputs: Vec::new(),
            input_code: None,
        }
    }

    pub fn genericized(mut self) -> Self {
        self.genericize = Some(true);
        self
    }

    pub fn with_sample(mut self, test_case: TestCase) -> Self {
        self.sample_inputs_outputs.push(test_case);
        self
    }

    pub fn is_generic(&self) -> bool {
        self.genericize.unwrap_or(false)
    }
}

/// A validated problem as received from the problem-set loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemDefinition {
    #[serde(default)]
    pub identifier: String,

    #[serde(default)]
    pub prompts: Vec<Prompt>,

    #[serde(default)]
    pub function_prototype: Option<FunctionPrototype>,

    #[serde(default)]
    pub correctness_test_suite: Option<Vec<TestCase>>,

    /// Reference implementation used by the performance grader.
    #[serde(default)]
    pub optimal_solution: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    /// Unknown keys, preserved verbatim.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl ProblemDefinition {
    pub fn new(identifier: &str, prototype: FunctionPrototype) -> Self {
        Self {
            identifier: identifier.to_string(),
            prompts: Vec::new(),
            function_prototype: Some(prototype),
            correctness_test_suite: None,
            optimal_solution: None,
            tags: None,
            additional_fields: Map::new(),
        }
    }

    pub fn add_prompt(mut self, prompt: Prompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    pub fn add_test_case(mut self, test_case: TestCase) -> Self {
        self.correctness_test_suite
            .get_or_insert_with(Vec::new)
            .push(test_case);
        self
    }

    pub fn with_optimal_solution(mut self, source: &str) -> Self {
        self.optimal_solution = Some(source.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn prompt(&self, prompt_id: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.prompt_id == prompt_id)
    }

    /// Test cases used to grade solutions to `prompt_id`.
    ///
    /// The problem-level suite wins; when it is absent or empty the prompt's
    /// sample inputs/outputs are used instead.
    pub fn test_cases_for(&self, prompt_id: &str) -> &[TestCase] {
        match &self.correctness_test_suite {
            Some(suite) if !suite.is_empty() => suite,
            _ => self
                .prompt(prompt_id)
                .map(|p| p.sample_inputs_outputs.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Whether every prompt of this problem has at least one test case.
    pub fn has_test_cases(&self) -> bool {
        !self.prompts.is_empty()
            && self
                .prompts
                .iter()
                .all(|p| !self.test_cases_for(&p.prompt_id).is_empty())
    }

    /// The prototype a solution to `prompt_id` was asked to implement.
    pub fn effective_prototype(&self, prompt_id: &str) -> Option<FunctionPrototype> {
        let proto = self.function_prototype.as_ref()?;
        match self.prompt(prompt_id) {
            Some(p) if p.is_generic() => Some(proto.genericize()),
            _ => Some(proto.clone()),
        }
    }

    /// Per-prompt inputs handed to model-querying collaborators.
    pub fn llm_problem_inputs(&self) -> Vec<LlmProblemInput> {
        self.prompts
            .iter()
            .filter_map(|prompt| {
                let function_prototype = self.effective_prototype(&prompt.prompt_id)?;
                Some(LlmProblemInput {
                    problem_id: self.identifier.clone(),
                    prompt_id: prompt.prompt_id.clone(),
                    prompt: prompt.prompt.clone(),
                    sample_inputs_outputs: prompt.sample_inputs_outputs.clone(),
                    input_code: prompt.input_code.clone(),
                    function_prototype,
                })
            })
            .collect()
    }
}

/// What a model sees for one (problem, prompt) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmProblemInput {
    pub problem_id: String,
    pub prompt_id: String,
    pub prompt: String,
    pub sample_inputs_outputs: Vec<TestCase>,
    pub input_code: Option<String>,
    pub function_prototype: FunctionPrototype,
}
