use std::io;
use thiserror::Error;

/// Unified error type for the gpt-commands crate
#[derive(Error, Debug)]
pub enum GptError {
    /// Schema translation hit a type outside the supported universe
    #[error(
        "unsupported type: {0}. Only primitives, lists, string-keyed maps, Optional and records are supported"
    )]
    UnsupportedType(String),

    /// Map schemas require string keys
    #[error("unsupported map key type: {0}. Only string keys are supported")]
    UnsupportedKeyType(String),

    /// A registered function carries no description
    #[error("missing documentation for function `{0}`")]
    MissingFunctionDoc(String),

    /// A parameter was registered without a type
    #[error("missing type for parameter `{parameter}` in function `{function}`")]
    MissingParameterType { function: String, parameter: String },

    /// A parameter was registered without a description
    #[error("missing documentation for parameter `{parameter}` in function `{function}`")]
    MissingParameterDoc { function: String, parameter: String },

    /// Two functions were registered under the same name
    #[error("duplicate function `{0}`")]
    DuplicateFunction(String),

    /// The model called a function that is not in the registry
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// A required argument was absent from the model's call
    #[error("missing argument `{parameter}` in function `{function}`")]
    MissingArgument { function: String, parameter: String },

    /// An argument's text could not be decoded into the declared type
    #[error("argument decode failed for `{parameter}`: {reason}")]
    ArgumentDecode { parameter: String, reason: String },

    /// A decoded value did not match the expected type
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// The invoked operation itself failed
    #[error("function execution failed in `{function}`: {source}")]
    Execution {
        function: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The API answered with a non-200 status
    #[error("API returned status code {status}: {body}")]
    Transport { status: u16, body: String },

    /// Connection-level failures
    #[error("network error: {0}")]
    Network(String),

    /// The stream carried an error object instead of a completion chunk
    #[error("API returned error: {0}")]
    Upstream(String),

    /// An event payload did not parse as a completion chunk
    #[error("malformed stream payload: {0}")]
    Protocol(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl From<reqwest::Error> for GptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GptError::Network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            GptError::Network(format!("connection failed: {}", err))
        } else {
            GptError::Network(format!("request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for GptError {
    fn from(err: serde_json::Error) -> Self {
        GptError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for GptError {
    fn from(err: serde_yml::Error) -> Self {
        GptError::Config(format!("YAML error: {}", err))
    }
}
