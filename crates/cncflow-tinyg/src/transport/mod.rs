//! Byte transports toward the firmware.
//!
//! The driver talks to a TinyG/g2core board over a serial link or a raw TCP
//! socket; both are abstracted behind the [`Transport`] trait. Reads are
//! polled by the IO loop: a transport returns an empty buffer when no data
//! is pending and a `ConnectionLost` error when the peer is gone.

pub mod serial;
pub mod tcp;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use cncflow_core::Result;

/// Abstract byte-duplex toward the firmware
pub trait Transport: Send {
    /// Open the transport
    fn open(&mut self) -> Result<()>;

    /// Close the transport
    fn close(&mut self) -> Result<()>;

    /// Write raw bytes; returns the number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Poll for inbound bytes; empty when no data is pending
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Whether the transport is currently open
    fn is_open(&self) -> bool;

    /// Human-readable target (port path or network address)
    fn description(&self) -> String;
}

/// Serial connection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    ///
    /// Kept short so the IO loop can interleave reads with writes and the
    /// query tick.
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            timeout_ms: 50,
        }
    }
}

/// Transport that accepts everything and produces nothing
///
/// Inert placeholder used before a real connection is configured; writes
/// are discarded and reads never yield data.
#[derive(Debug, Default)]
pub struct NoOpTransport {
    open: bool,
}

impl NoOpTransport {
    /// Create a closed no-op transport
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for NoOpTransport {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn description(&self) -> String {
        "noop".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_transport_swallows_io() {
        let mut transport = NoOpTransport::new();
        assert!(!transport.is_open());

        transport.open().unwrap();
        assert!(transport.is_open());
        assert_eq!(transport.write(b"{ej:1}\n").unwrap(), 7);
        assert!(transport.read().unwrap().is_empty());

        transport.close().unwrap();
        assert!(!transport.is_open());
    }
}
