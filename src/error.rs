//! ═══════════════════════════════════════════════════════════════════════════════
//! ERROR — Unified Error Type
//! ═══════════════════════════════════════════════════════════════════════════════
//! Sensor and camera degradation never surface as errors (the pipeline falls
//! back to neutral values); what remains is config handling and trace I/O.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::fmt;

/// The unified error type for the spectral core.
#[derive(Debug)]
pub enum EngineError {
    /// I/O error (config files, recorded traces)
    Io(std::io::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// Configuration failed validation
    InvalidConfig(String),
    /// A recorded sensor trace could not be interpreted
    Trace(String),
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            EngineError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io(e) => write!(f, "I/O error: {}", e),
            EngineError::Json(e) => write!(f, "JSON error: {}", e),
            EngineError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            EngineError::Trace(msg) => write!(f, "Trace error: {}", msg),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Json(err)
    }
}

/// Type alias for Result with EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidConfig("max_speed must be positive".to_string());
        assert!(err.to_string().contains("max_speed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
