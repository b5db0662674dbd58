//! Error types for the access model

use thiserror::Error;

/// Access model errors
#[derive(Debug, Error)]
pub enum TypesError {
    /// Field name is neither a known account field nor a 32-byte slot
    #[error("invalid field identifier: {0}")]
    InvalidField(String),

    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for access model operations
pub type TypesResult<T> = Result<T, TypesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::InvalidField("balanse".into());
        assert!(err.to_string().contains("balanse"));
    }
}
