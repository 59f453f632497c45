//! Async controller wrapper.
//!
//! Owns the flow controller behind a mutex, runs the IO loop (transport
//! reads plus the query tick) as a tokio task, and drives the bring-up
//! handshake with its bootloader and probe delays. Command dispatches from
//! clients go straight through to the driver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cncflow_core::constants::{BOOTLOADER_DELAY, PROBE_SPACING, QUERY_INTERVAL};
use cncflow_core::{ControllerError, DriverConfig, EventBus, Result};

use crate::commands::{MacroStore, ProgramLoader};
use crate::driver::TinygDriver;
use crate::event_trigger::TaskRunner;
use crate::transport::Transport;

const IO_LOOP_DELAY: Duration = Duration::from_millis(10);

/// JSON-mode setup, issued in order at the start of the handshake.
const SETUP_COMMANDS: [&str; 5] = ["{ej:1}", "{jv:4}", "{qv:1}", "{sv:1}", "{si:100}"];

/// Capability probes; a `null` reply clears the matching report-mask bit.
const PROBE_COMMANDS: [&str; 6] = [
    "{spe:n}", "{spd:n}", "{spc:n}", "{sps:n}", "{com:n}", "{cof:n}",
];

/// Queries that prime the mirrored state after the report selection.
const PRIME_COMMANDS: [&str; 5] = ["{sys:n}", "{mt:n}", "{pwr:n}", "{qr:n}", "{sr:n}"];

/// TinyG/g2core controller instance
///
/// Created per connection; destroyed when the transport closes.
pub struct TinygController {
    driver: Arc<Mutex<TinygDriver>>,
    bus: Arc<EventBus>,
    io_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TinygController {
    /// Create a controller over a transport
    pub fn new(transport: Box<dyn Transport>, config: DriverConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let driver = TinygDriver::new(transport, bus.clone(), config);
        Self {
            driver: Arc::new(Mutex::new(driver)),
            bus,
            io_task: None,
            shutdown_tx: None,
        }
    }

    /// The broadcast bus clients subscribe to
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Shared handle to the flow controller
    pub fn driver(&self) -> Arc<Mutex<TinygDriver>> {
        self.driver.clone()
    }

    /// Install a macro store
    pub fn set_macro_store(&self, macros: Box<dyn MacroStore>) {
        self.driver.lock().set_macro_store(macros);
    }

    /// Install a watch-directory program loader
    pub fn set_program_loader(&self, loader: Box<dyn ProgramLoader>) {
        self.driver.lock().set_program_loader(loader);
    }

    /// Install a task runner for system-typed event triggers
    pub fn set_task_runner(&self, runner: Box<dyn TaskRunner>) {
        self.driver.lock().set_task_runner(runner);
    }

    /// Whether the controller completed its handshake
    pub fn is_ready(&self) -> bool {
        self.driver.lock().is_ready()
    }

    /// Open the transport, start the IO loop, and run the handshake
    pub async fn connect(&mut self) -> Result<()> {
        if self.io_task.is_some() {
            return Err(ControllerError::AlreadyConnected.into());
        }

        {
            let mut driver = self.driver.lock();
            driver.open_transport()?;
            driver.on_open();
        }

        self.start_io_loop();
        self.initialize().await;
        Ok(())
    }

    /// Stop the IO loop and close the transport
    pub async fn disconnect(&mut self) -> Result<()> {
        self.stop_io_loop();
        self.driver.lock().on_close(None);
        Ok(())
    }

    /// Dispatch a named command
    pub fn command(&self, name: &str, args: &Value) -> Result<()> {
        self.driver.lock().command(name, args)
    }

    fn start_io_loop(&mut self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let driver = self.driver.clone();
        let handle = tokio::spawn(async move {
            let mut last_tick = Instant::now();
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                // Read phase; a terminal transport failure ends the loop.
                let alive = driver.lock().pump();
                if !alive {
                    tracing::info!("Transport gone, IO loop exiting");
                    break;
                }

                // Query tick phase.
                if last_tick.elapsed() >= QUERY_INTERVAL {
                    driver.lock().tick(Instant::now());
                    last_tick = Instant::now();
                }

                tokio::time::sleep(IO_LOOP_DELAY).await;
            }
        });

        self.io_task = Some(handle);
    }

    fn stop_io_loop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.io_task.take() {
            handle.abort();
        }
    }

    /// The bring-up handshake
    ///
    /// Waits out the bootloader, configures JSON mode and report verbosity,
    /// probes capabilities, selects the status-report fields from whatever
    /// survived the probes, primes the mirrored state, and fires the
    /// `controller:ready` trigger.
    async fn initialize(&self) {
        tokio::time::sleep(BOOTLOADER_DELAY).await;
        self.driver.lock().set_ready(true);

        {
            let mut driver = self.driver.lock();
            for command in SETUP_COMMANDS {
                init_write(&mut driver, command);
            }
        }

        for probe in PROBE_COMMANDS {
            init_write(&mut self.driver.lock(), probe);
            tokio::time::sleep(PROBE_SPACING).await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        {
            let mut driver = self.driver.lock();
            let selection = driver.status_report_command();
            init_write(&mut driver, &selection);
            for command in PRIME_COMMANDS {
                init_write(&mut driver, command);
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        self.driver.lock().fire_trigger("controller:ready");
    }
}

/// One handshake write; an oversized command is dropped with an error log
fn init_write(driver: &mut TinygDriver, command: &str) {
    if let Err(e) = driver.write_init(command) {
        tracing::error!(command, error = %e, "Dropping initialization command");
    }
}

impl Drop for TinygController {
    fn drop(&mut self) {
        self.stop_io_loop();
    }
}

impl std::fmt::Debug for TinygController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinygController")
            .field("running", &self.io_task.is_some())
            .finish()
    }
}
