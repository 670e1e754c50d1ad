//! Domain-specific error types for eco-agents

use thiserror::Error;

use crate::clients::ModelError;

/// Main error type for the energy and footprint pipelines
#[derive(Error, Debug)]
pub enum EcoAgentError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Model error: {0}")]
    Model(#[source] ModelError),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

impl EcoAgentError {
    /// Stable short label used in HTTP error bodies
    pub fn label(&self) -> &'static str {
        match self {
            EcoAgentError::Config { .. } => "Configuration error",
            EcoAgentError::Model(_) => "Model error",
            EcoAgentError::Parse { .. } => "Parse error",
            EcoAgentError::Validation { .. } => "Validation error",
            EcoAgentError::InvalidParams { .. } => "Invalid parameters",
            EcoAgentError::Io { .. } => "I/O error",
        }
    }
}

impl From<serde_json::Error> for EcoAgentError {
    fn from(err: serde_json::Error) -> Self {
        EcoAgentError::Parse {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EcoAgentError {
    fn from(err: reqwest::Error) -> Self {
        EcoAgentError::Model(ModelError::Transport(format!(
            "HTTP request failed: {}",
            err
        )))
    }
}

impl From<std::io::Error> for EcoAgentError {
    fn from(err: std::io::Error) -> Self {
        EcoAgentError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type alias for eco-agents operations
pub type Result<T> = std::result::Result<T, EcoAgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_are_parse_errors() {
        let err: EcoAgentError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, EcoAgentError::Parse { .. }));
        assert_eq!(err.label(), "Parse error");
    }

    #[test]
    fn reqwest_errors_are_model_transport_errors() {
        let err: EcoAgentError = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err()
            .into();
        assert!(matches!(err, EcoAgentError::Model(ModelError::Transport(_))));
        assert_eq!(err.label(), "Model error");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EcoAgentError = io.into();
        assert!(matches!(err, EcoAgentError::Io { .. }));
    }
}
