//! Raw TCP socket transport.
//!
//! Some boards (and all simulators) expose the g2core serial protocol on a
//! plain TCP port. Reads use a short timeout like the serial transport; an
//! EOF read maps to `ConnectionLost`, which the controller treats as
//! terminal.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use cncflow_core::{ConnectionError, Result};

use super::Transport;

/// TCP transport toward a networked controller
pub struct TcpTransport {
    addr: String,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create a transport for `host:port`; does not connect
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        let stream = TcpStream::connect(&self.addr).map_err(|e| ConnectionError::FailedToOpen {
            target: self.addr.clone(),
            reason: e.to_string(),
        })?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| ConnectionError::TcpError {
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).ok();

        tracing::info!(addr = %self.addr, "TCP connection open");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(std::net::Shutdown::Both).ok();
            tracing::info!(addr = %self.addr, "TCP connection closed");
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotOpen)?;
        stream
            .write_all(data)
            .map_err(|e| ConnectionError::WriteFailed {
                reason: e.to_string(),
            })?;
        Ok(data.len())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotOpen)?;
        let mut buf = [0u8; 512];
        match stream.read(&mut buf) {
            // EOF: the peer closed the socket.
            Ok(0) => {
                self.stream = None;
                Err(ConnectionError::ConnectionLost {
                    reason: "peer closed connection".to_string(),
                }
                .into())
            }
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(Vec::new())
            }
            Err(e) => {
                self.stream = None;
                Err(ConnectionError::ConnectionLost {
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn description(&self) -> String {
        self.addr.clone()
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connects_and_reads_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut transport = TcpTransport::new(addr.to_string(), Duration::from_millis(50));
        transport.open().unwrap();
        assert!(transport.is_open());

        // Accept and immediately drop the server side.
        let (sock, _) = listener.accept().unwrap();
        drop(sock);

        // Eventually the read observes EOF and reports a lost connection.
        let mut lost = false;
        for _ in 0..20 {
            match transport.read() {
                Ok(data) if data.is_empty() => continue,
                Ok(_) => continue,
                Err(e) => {
                    assert!(e.is_fatal());
                    lost = true;
                    break;
                }
            }
        }
        assert!(lost);
        assert!(!transport.is_open());
    }

    #[test]
    fn open_failure_reports_target() {
        // Port 1 is essentially never listening.
        let mut transport = TcpTransport::new("127.0.0.1:1", Duration::from_millis(50));
        let err = transport.open().unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
