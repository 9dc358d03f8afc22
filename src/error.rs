use thiserror::Error;

/// Altimeter error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AltimeterError {
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Sensor callback failed: {0}")]
    SensorCallback(String),

    #[error("Location authorization denied")]
    AuthorizationDenied,

    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(String),
}

impl AltimeterError {
    /// Routine per-callback failures: a missed fix or one bad sample.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AltimeterError::SensorCallback(_) | AltimeterError::InvalidReading(_)
        )
    }
}

impl From<std::io::Error> for AltimeterError {
    fn from(err: std::io::Error) -> Self {
        AltimeterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AltimeterError {
    fn from(err: serde_json::Error) -> Self {
        AltimeterError::InvalidConfig(err.to_string())
    }
}

/// Result type for altimeter operations
pub type AltResult<T> = Result<T, AltimeterError>;
