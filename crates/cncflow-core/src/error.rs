//! Error handling for cncflow
//!
//! Provides error types for the layers of the driver:
//! - Connection errors (serial / TCP transport)
//! - Controller errors (protocol and lifecycle)
//! - G-code errors (program loading and expression handling)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Errors related to the byte transport toward the firmware, including
/// serial port and TCP socket failures.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open the transport
    #[error("Failed to open {target}: {reason}")]
    FailedToOpen {
        /// The port path or network address that failed to open.
        target: String,
        /// The reason the open failed.
        reason: String,
    },

    /// Transport is not open
    #[error("Transport is not open")]
    NotOpen,

    /// Connection lost unexpectedly
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// TCP connection error
    #[error("TCP connection error: {reason}")]
    TcpError {
        /// The reason for the TCP error.
        reason: String,
    },

    /// Write failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },
}

/// Controller error type
///
/// Errors related to driver lifecycle and the send/response protocol.
#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    /// Controller is already connected
    #[error("Controller already connected")]
    AlreadyConnected,

    /// Outbound command exceeds the firmware serial input buffer
    #[error("Command length {length} exceeds serial buffer limit {limit}")]
    CommandTooLong {
        /// The length of the rejected command in bytes.
        length: usize,
        /// The firmware serial input buffer limit.
        limit: usize,
    },

    /// Command name is not part of the command surface
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The unrecognized command name.
        name: String,
    },

    /// Command arguments failed to parse
    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments {
        /// The command name.
        name: String,
        /// The reason the arguments are invalid.
        reason: String,
    },
}

/// G-code error type
///
/// Errors related to program loading and `%`-line expression handling.
#[derive(Error, Debug, Clone)]
pub enum GcodeError {
    /// Loaded program has no content
    #[error("Empty G-code program")]
    EmptyProgram,

    /// Expression failed to evaluate
    #[error("Failed to evaluate expression '{expr}': {reason}")]
    BadExpression {
        /// The expression text.
        expr: String,
        /// The reason the evaluation failed.
        reason: String,
    },
}

/// Main error type for cncflow
///
/// A unified error type representing any error from all layers; this is the
/// primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// G-code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this error is terminal for the controller instance
    ///
    /// A lost connection tears the controller down; everything else is
    /// surfaced and swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectionLost { .. })
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_lost_is_fatal() {
        let err = Error::from(ConnectionError::ConnectionLost {
            reason: "EOF".to_string(),
        });
        assert!(err.is_fatal());
        assert!(err.is_connection_error());
    }

    #[test]
    fn command_too_long_formats_limit() {
        let err = Error::from(ControllerError::CommandTooLong {
            length: 300,
            limit: 254,
        });
        assert_eq!(
            err.to_string(),
            "Command length 300 exceeds serial buffer limit 254"
        );
        assert!(!err.is_fatal());
    }
}
