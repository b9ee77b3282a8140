use tch::TchError;
use thiserror::Error;

/// Errors raised while building, running or training the agent.
#[derive(Error, Debug)]
pub enum DrqnError {
    /// Variant wrapping error captured by [`tch`]
    #[error("Torch error: {source} in context: {context}")]
    Torch {
        #[source]
        source: TchError,
        context: String,
    },
    #[error("Action index {index} out of range for {num_actions} actions")]
    InvalidAction { index: usize, num_actions: usize },
    #[error("Observation has {found} features, expected {expected}")]
    ObservationLength { expected: usize, found: usize },
    #[error("LSTM state has {found} units, expected {expected}")]
    LstmStateSize { expected: usize, found: usize },
    #[error("Environment error: {0}")]
    Environment(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Empty training batch")]
    EmptyBatch,
    #[error("Input/Output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "python")]
    #[error("Python error: {0}")]
    Python(#[from] pyo3::PyErr),
}

impl DrqnError {
    /// Returns closure usable in `map_err` that attaches context to a torch error.
    pub fn torch(context: &str) -> impl FnOnce(TchError) -> Self + '_ {
        move |source| Self::Torch {
            source,
            context: context.to_string(),
        }
    }
}

impl From<TchError> for DrqnError {
    fn from(value: TchError) -> Self {
        Self::Torch {
            source: value,
            context: String::from("unspecified"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DrqnError>;
