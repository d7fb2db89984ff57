//! Error types for the sandbox module.
//!
//! These describe faults in the sandbox machinery itself, never in the
//! candidate. They stay inside the sandbox: [`Sandbox::execute`] converts
//! every one of them into a `RuntimeFailure` outcome.
//!
//! [`Sandbox::execute`]: super::Sandbox::execute

/// Errors produced while launching or talking to the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("failed to launch interpreter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to exchange data with interpreter: {0}")]
    Io(#[from] std::io::Error),

    #[error("interpreter exited ({status}) without a result: {stderr}")]
    NoReply { status: String, stderr: String },

    #[error("interpreter produced {count} result lines")]
    AmbiguousReply { count: usize },

    #[error("result line does not belong to this call")]
    ForeignReply,

    #[error("malformed driver reply: {0}")]
    MalformedReply(#[from] serde_json::Error),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
