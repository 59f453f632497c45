//! Bring-up handshake tests for the async controller.
//!
//! Runs under tokio's paused clock so the bootloader and probe delays
//! elapse instantly.

use std::sync::{Arc, Mutex};

use cncflow_core::{DriverConfig, Result};
use cncflow_tinyg::transport::Transport;
use cncflow_tinyg::TinygController;

struct MockTransport {
    open: bool,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn description(&self) -> String {
        "mock".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn handshake_configures_json_mode_and_reports() {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let transport = MockTransport {
        open: false,
        writes: writes.clone(),
    };

    let mut controller = TinygController::new(Box::new(transport), DriverConfig::default());
    controller.connect().await.unwrap();
    assert!(controller.is_ready());

    let written: Vec<String> = writes
        .lock()
        .unwrap()
        .iter()
        .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
        .collect();

    // JSON mode, verbosity, report filtering, and the report interval come
    // first and in order.
    assert_eq!(
        &written[..5],
        &["{ej:1}", "{jv:4}", "{qv:1}", "{sv:1}", "{si:100}"]
    );

    // All six capability probes go out.
    for probe in ["{spe:n}", "{spd:n}", "{spc:n}", "{sps:n}", "{com:n}", "{cof:n}"] {
        assert!(written.contains(&probe.to_string()), "missing {}", probe);
    }

    // The status-report selection is relaxed JSON with the default fields.
    let selection = written
        .iter()
        .find(|w| w.starts_with("{sr:{"))
        .expect("no status-report selection written");
    assert!(selection.contains("posx:t"));
    assert!(selection.contains("stat:t"));
    assert!(!selection.contains('"'));

    // Mirrored-state priming queries follow the selection.
    for prime in ["{sys:n}", "{mt:n}", "{pwr:n}", "{qr:n}", "{sr:n}"] {
        assert!(written.contains(&prime.to_string()), "missing {}", prime);
    }

    controller.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_rejected() {
    let writes = Arc::new(Mutex::new(Vec::new()));
    let transport = MockTransport {
        open: false,
        writes,
    };

    let mut controller = TinygController::new(Box::new(transport), DriverConfig::default());
    controller.connect().await.unwrap();
    assert!(controller.connect().await.is_err());
    controller.disconnect().await.unwrap();
}
