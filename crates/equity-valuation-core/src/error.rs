use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("No convergence: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    NoConvergence {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ValuationError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValuationError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
