//! Serial port transport.
//!
//! Direct hardware connection to the controller board via USB or RS-232,
//! backed by the `serialport` crate. Reads use a short timeout so the IO
//! loop can keep spinning; a timeout is reported as "no data", not an error.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use cncflow_core::{ConnectionError, Result};

use super::{ConnectionParams, Transport};

/// Serial transport toward the controller board
pub struct SerialTransport {
    params: ConnectionParams,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    /// Create a transport for the given parameters; does not open the port
    pub fn new(params: ConnectionParams) -> Self {
        Self { params, port: None }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        let port = serialport::new(&self.params.port, self.params.baud_rate)
            .timeout(Duration::from_millis(self.params.timeout_ms))
            .open()
            .map_err(|e| ConnectionError::FailedToOpen {
                target: self.params.port.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(port = %self.params.port, baud = self.params.baud_rate, "Serial port open");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            tracing::info!(port = %self.params.port, "Serial port closed");
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(ConnectionError::NotOpen)?;
        let written = port.write(data).map_err(|e| ConnectionError::WriteFailed {
            reason: e.to_string(),
        })?;
        port.flush().map_err(|e| ConnectionError::WriteFailed {
            reason: e.to_string(),
        })?;
        Ok(written)
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(ConnectionError::NotOpen)?;
        let mut buf = [0u8; 512];
        match port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Err(e) => {
                // A vanished USB device shows up as a hard read error.
                self.port = None;
                Err(ConnectionError::ConnectionLost {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn description(&self) -> String {
        format!("{}@{}", self.params.port, self.params.baud_rate)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("params", &self.params)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_before_open_fails() {
        let mut transport = SerialTransport::new(ConnectionParams {
            port: "/dev/null".to_string(),
            ..Default::default()
        });
        assert!(!transport.is_open());
        assert!(transport.write(b"{ej:1}\n").is_err());
    }

    #[test]
    fn description_includes_baud() {
        let transport = SerialTransport::new(ConnectionParams {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 50,
        });
        assert_eq!(transport.description(), "/dev/ttyACM0@115200");
    }
}
