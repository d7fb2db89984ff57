//! Domain-level error taxonomy for EvalBench.

/// Errors produced by problem/solution schema validation.
///
/// These surface before any candidate code runs and are fatal to the
/// offending item only when the caller validates items one by one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("problem identifier must not be empty")]
    EmptyProblemId,

    #[error("problem {problem} has no prompts")]
    NoPrompts { problem: String },

    #[error("problem {problem} has duplicate prompt id: {prompt}")]
    DuplicatePrompt { problem: String, prompt: String },

    #[error("problem {problem} has no function prototype")]
    MissingPrototype { problem: String },

    #[error("problem {problem} has invalid function name: {name:?}")]
    InvalidFunctionName { problem: String, name: String },

    #[error("problem {problem} has invalid parameter name: {name:?}")]
    InvalidParameterName { problem: String, name: String },

    #[error("problem {problem} declares parameter {name} more than once")]
    DuplicateParameter { problem: String, name: String },

    #[error("problem {problem} has an empty declared type for {position}")]
    EmptyDeclaredType { problem: String, position: String },

    #[error("solution field {field} must not be empty")]
    EmptySolutionField { field: &'static str },
}

/// EvalBench domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("unknown grader: {0}")]
    UnknownGrader(String),

    #[error("grader {grader} cannot grade this problem set: {reason}")]
    NotApplicable { grader: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for EvalBench domain operations.
pub type Result<T> = std::result::Result<T, BenchError>;
