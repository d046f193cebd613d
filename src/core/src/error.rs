use thiserror::Error;

/// Dockerfile tooling error types
#[derive(Error, Debug)]
pub enum DockerfileError {
    /// Leading parser directive could not be parsed
    #[error("Directive error at line {line}: {message}")]
    Directive { line: usize, message: String },

    /// Instruction grammar could not be parsed
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A parsed node could not be turned into a structured instruction
    #[error("Instruction error: {0}")]
    Instruction(String),

    /// Variable substitution failed
    #[error("Substitution error: {0}")]
    Substitution(String),

    /// Image reference is malformed
    #[error("Invalid reference: {0}")]
    Reference(String),

    /// Reprinting the AST failed
    #[error("Print error: {0}")]
    Print(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DockerfileError {
    /// Whether the error was raised before any AST existed.
    pub fn is_parse_stage(&self) -> bool {
        matches!(self, Self::Directive { .. } | Self::Parse { .. })
    }
}

impl From<serde_json::Error> for DockerfileError {
    fn from(err: serde_json::Error) -> Self {
        DockerfileError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DockerfileError {
    fn from(err: serde_yaml::Error) -> Self {
        DockerfileError::Serialization(err.to_string())
    }
}

impl From<std::fmt::Error> for DockerfileError {
    fn from(err: std::fmt::Error) -> Self {
        DockerfileError::Print(err.to_string())
    }
}

/// Result type alias for Dockerfile operations
pub type Result<T> = std::result::Result<T, DockerfileError>;
