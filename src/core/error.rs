//! Unified error handling for the relay
//!
//! Every layer (components, collaborators, the orchestrator) returns
//! `RelayError`, so a failure raised deep inside a component reaches the
//! caller of `RelayService` unchanged.

use std::fmt;

use http::StatusCode;

/// Unified error types for the relay
#[derive(Debug)]
pub enum RelayError {
    /// Configuration-related errors, including invalid component options
    Configuration(String),

    /// Network and I/O errors (bind, accept)
    Network(std::io::Error),

    /// `start_server` was called on an instance that is already running
    ServerAlreadyRunning,

    /// Beacon node errors
    Beacon(String),

    /// Malformed request input
    Validation(String),

    /// Request body exceeds the configured limit, in bytes
    PayloadTooLarge(usize),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            RelayError::Network(err) => write!(f, "Network error: {err}"),
            RelayError::ServerAlreadyRunning => write!(f, "server already running"),
            RelayError::Beacon(msg) => write!(f, "Beacon node error: {msg}"),
            RelayError::Validation(msg) => write!(f, "Validation error: {msg}"),
            RelayError::PayloadTooLarge(limit) => {
                write!(f, "Request body exceeds {limit} bytes")
            }
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl RelayError {
    /// HTTP status used when this error escapes a route handler
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Error conversions
impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Network(err)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Validation(format!("invalid JSON: {err}"))
    }
}

impl From<hex::FromHexError> for RelayError {
    fn from(err: hex::FromHexError) -> Self {
        RelayError::Validation(format!("invalid hex: {err}"))
    }
}

/// Result type alias for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::RelayError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::RelayError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::core::error::RelayError::Validation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::RelayError::Validation(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_running_message() {
        assert_eq!(
            RelayError::ServerAlreadyRunning.to_string(),
            "server already running"
        );
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            validation_error!("bad slot").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::PayloadTooLarge(1024).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            config_error!("fork version {}", "0x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error;

        let err = RelayError::from(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        ));
        assert!(err.source().is_some());
        assert!(matches!(err, RelayError::Network(ref e) if e.kind() == std::io::ErrorKind::AddrInUse));
    }
}
