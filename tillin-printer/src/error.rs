//! Error types for the printer library

use thiserror::Error;

/// Printer error types
///
/// Every fallible operation surfaces exactly one of these to its caller.
/// Nothing is retried internally.
#[derive(Debug, Error)]
pub enum PrintError {
    /// Encoding name did not resolve to a codec
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Device service could not be bound
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Device service is not bound yet (call `initialize()` first)
    #[error("Printer service not ready. Call initialize() first.")]
    ServiceNotReady,

    /// Opening a transport failed, or a connection is already active
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No active printer connection
    #[error("No active printer connection")]
    NotConnected,

    /// Image source could not be decoded
    #[error("Could not decode image: {0}")]
    ImageDecode(String),

    /// Asynchronous failure reported by the transport channel
    #[error("Transport IO error: {0}")]
    TransportIo(#[from] std::io::Error),

    /// Malformed caller input (bad base64, oversized barcode payload)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl PrintError {
    /// Stable error code for front ends
    pub fn code(&self) -> &'static str {
        match self {
            PrintError::UnsupportedEncoding(_) => "E_ENCODING",
            PrintError::ServiceUnavailable(_) => "E_SERVICE",
            PrintError::ServiceNotReady => "E_NOT_READY",
            PrintError::ConnectionFailed(_) => "E_CONNECT",
            PrintError::NotConnected => "E_NOT_CONNECTED",
            PrintError::ImageDecode(_) => "E_IMAGE",
            PrintError::TransportIo(_) => "E_PRINTER",
            PrintError::InvalidRequest(_) => "E_REQUEST",
            PrintError::InvalidConfig(_) => "E_CONFIG",
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PrintError::NotConnected.code(), "E_NOT_CONNECTED");
        assert_eq!(PrintError::ServiceNotReady.code(), "E_NOT_READY");
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(PrintError::from(io).code(), "E_PRINTER");
    }
}
