//! # Errors
//!
//! One error type for the whole analytics core. Every failure is reported once,
//! at the point it happens, and converted into a single JSON error object at the
//! request boundary.
//!
//! | Variant      | Status | Raised by                                        |
//! |--------------|--------|--------------------------------------------------|
//! | `Validation` | 400    | request validation, unknown method / file type   |
//! | `Load`       | 400    | tabular decoding                                 |
//! | `Data`       | 400    | empty corpus, empty vocabulary                   |
//! | `ModelFit`   | 500    | degenerate or failed numeric fits                |
//! | `Embedding`  | 500    | embedding provider failures                      |
//! | `Render`     | 500    | chart generation                                 |

use serde_json::{json, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Error decoding file: {0}")]
    Load(String),

    #[error("{0}")]
    Data(String),

    #[error("Error during topic modeling: {0}")]
    ModelFit(String),

    #[error("Embedding provider failed: {0}")]
    Embedding(String),

    #[error("Error rendering chart: {0}")]
    Render(String),
}

impl AnalyticsError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AnalyticsError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status the request boundary answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalyticsError::Validation { .. } | AnalyticsError::Load(_) | AnalyticsError::Data(_) => 400,
            AnalyticsError::ModelFit(_) | AnalyticsError::Embedding(_) | AnalyticsError::Render(_) => 500,
        }
    }

    /// The JSON error object returned to the caller.
    pub fn to_body(&self) -> Value {
        match self {
            AnalyticsError::Validation { field, .. } => json!({
                "error": self.to_string(),
                "field": field,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}
