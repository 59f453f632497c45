//! Driver configuration.
//!
//! Only the in-memory configuration section the driver reads at runtime is
//! modelled here; the persistent store that produces it lives outside the
//! core.

use serde::{Deserialize, Serialize};

/// Exception handling behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionConfig {
    /// Keep streaming when the firmware reports an error for a program line.
    ///
    /// When false (the default), a non-zero footer status while a program is
    /// running pauses the workflow.
    pub ignore_errors: bool,
}

impl Default for ExceptionConfig {
    fn default() -> Self {
        Self {
            ignore_errors: false,
        }
    }
}

/// Transport defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDefaults {
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout_ms: 50,
        }
    }
}

/// Configuration section consumed by the driver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Exception handling behavior
    pub exception: ExceptionConfig,
    /// Transport defaults
    pub connection: ConnectionDefaults,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_errors_fatal() {
        let config = DriverConfig::default();
        assert!(!config.exception.ignore_errors);
        assert_eq!(config.connection.baud_rate, 115_200);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: DriverConfig =
            serde_json::from_str(r#"{"exception":{"ignore_errors":true}}"#).unwrap();
        assert!(config.exception.ignore_errors);
        assert_eq!(config.connection.timeout_ms, 50);
    }
}
