//! The flow controller.
//!
//! Binds the frame decoder, the two streaming pipelines, and the workflow
//! state machine to one transport, implementing the send/response +
//! planner-watermark protocol:
//!
//! - every sender line waits for its `r` acknowledgement before the next
//!   one is transmitted;
//! - a queue report at or below the low-water mark blocks the sender until
//!   a report at or above the high-water mark arrives (hysteresis);
//! - `%wait` holds a pipeline until a queue report shows the planner has
//!   drained completely;
//! - non-zero footer status codes pause a running program unless the
//!   configuration says to ignore errors.
//!
//! The driver is single-owner: every transition happens on the thread that
//! currently holds it, in response to transport bytes, query ticks, or
//! command dispatches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use cncflow_core::constants::{
    CTRL_KILL_JOB, CTRL_RESET_BOARD, FINISH_SETTLE_TIME, OVERRIDE_MAX, OVERRIDE_MIN,
    PLANNER_BUFFER_HIGH_WATER_MARK, PLANNER_BUFFER_LOW_WATER_MARK, SERIAL_BUFFER_LIMIT,
};
use cncflow_core::{
    ConnectionEvent, ControllerEvent, DriverConfig, DriverEvent, EventBus, FeederEvent,
    FirmwareSettings, HoldReason, MachineModel, SenderEvent, WorkflowEvent,
};

use crate::commands::{Command, EmptyMacroStore, FsProgramLoader, MacroStore, ProgramLoader};
use crate::event_trigger::{EventTrigger, TaskRunner};
use crate::expression::{format_number, Context};
use crate::feeder::Feeder;
use crate::pipeline::{self, StageHold};
use crate::runner::{Runner, RunnerEvent};
use crate::sender::Sender;
use crate::status_codes;
use crate::transport::Transport;
use crate::workflow::Workflow;

/// Gate between an acknowledgement and the next sender transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderGate {
    /// Nothing pending
    #[default]
    None,
    /// The next transmission has been released
    Next,
    /// An acknowledgement arrived while blocked; the `ack`/`next` pair is
    /// pending a queue report above the watermark
    Ack,
}

/// The TinyG/g2core flow controller
pub struct TinygDriver {
    transport: Box<dyn Transport>,
    runner: Runner,
    feeder: Feeder,
    sender: Sender,
    workflow: Workflow,
    triggers: EventTrigger,
    bus: Arc<EventBus>,
    config: DriverConfig,
    macros: Box<dyn MacroStore>,
    loader: Box<dyn ProgramLoader>,
    shared_context: HashMap<String, f64>,
    settings_mirror: FirmwareSettings,
    state_mirror: MachineModel,
    ready: bool,
    blocked: bool,
    gate: SenderGate,
    last_write: String,
}

impl TinygDriver {
    /// Create a driver over a transport
    pub fn new(transport: Box<dyn Transport>, bus: Arc<EventBus>, config: DriverConfig) -> Self {
        Self {
            transport,
            runner: Runner::new(),
            feeder: Feeder::new(),
            sender: Sender::new(),
            workflow: Workflow::new(),
            triggers: EventTrigger::new(),
            bus,
            config,
            macros: Box::new(EmptyMacroStore),
            loader: Box::new(FsProgramLoader),
            shared_context: HashMap::new(),
            settings_mirror: FirmwareSettings::default(),
            state_mirror: MachineModel::default(),
            ready: false,
            blocked: false,
            gate: SenderGate::None,
            last_write: String::new(),
        }
    }

    /// Install a macro store
    pub fn set_macro_store(&mut self, macros: Box<dyn MacroStore>) {
        self.macros = macros;
    }

    /// Install a watch-directory program loader
    pub fn set_program_loader(&mut self, loader: Box<dyn ProgramLoader>) {
        self.loader = loader;
    }

    /// Install a task runner for system-typed event triggers
    pub fn set_task_runner(&mut self, runner: Box<dyn TaskRunner>) {
        self.triggers.set_task_runner(runner);
    }

    /// Event trigger table
    pub fn triggers_mut(&mut self) -> &mut EventTrigger {
        &mut self.triggers
    }

    /// The broadcast bus
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// The frame decoder and state mirror
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// The manual-command feeder
    pub fn feeder(&self) -> &Feeder {
        &self.feeder
    }

    /// The program sender
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// The workflow state machine
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Whether the handshake completed and the transport is healthy
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether the planner watermark hysteresis is blocking the sender
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Current acknowledgement gate
    pub fn sender_gate(&self) -> SenderGate {
        self.gate
    }

    /// The underlying transport
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Open the transport directly (the async controller normally does this)
    pub fn open_transport(&mut self) -> cncflow_core::Result<()> {
        self.transport.open()
    }

    // ------------------------------------------------------------------
    // Inbound path
    // ------------------------------------------------------------------

    /// Pull pending bytes off the transport and process them
    ///
    /// Returns false when the transport reported a terminal failure and the
    /// instance has been torn down.
    pub fn pump(&mut self) -> bool {
        match self.transport.read() {
            Ok(bytes) if bytes.is_empty() => true,
            Ok(bytes) => {
                self.receive(&bytes);
                true
            }
            Err(e) if e.is_fatal() => {
                self.on_close(Some(e.to_string()));
                false
            }
            Err(e) => {
                self.ready = false;
                self.emit(DriverEvent::Connection(ConnectionEvent::Error {
                    message: e.to_string(),
                }));
                true
            }
        }
    }

    /// Process inbound transport bytes
    pub fn receive(&mut self, bytes: &[u8]) {
        let events = self.runner.push_bytes(bytes);
        for event in events {
            match event {
                RunnerEvent::Line(line) => {
                    self.emit(DriverEvent::Connection(ConnectionEvent::Read { line }));
                }
                RunnerEvent::Response { line_number } => self.on_response(line_number),
                RunnerEvent::QueueReport(q) => self.on_queue_report(q),
                RunnerEvent::StatusReport => {
                    // Mirrored and diffed by the query tick.
                }
                RunnerEvent::Footer(footer) => self.on_footer(footer.status_code),
                RunnerEvent::Raw(line) => {
                    if self.workflow.is_idle() {
                        tracing::debug!(line, "Unrecognized frame");
                    }
                }
            }
        }
    }

    /// Handle an `r` acknowledgement frame
    fn on_response(&mut self, line_number: Option<u32>) {
        if self.workflow.is_running() {
            self.gate = SenderGate::Ack;
            if !self.blocked {
                self.ack_and_next(line_number);
                self.gate = SenderGate::Next;
            }
            return;
        }

        if self.workflow.is_paused() && self.sender.received() < self.sender.sent() {
            // Drain the line the firmware accepted before the pause took
            // effect; the sender hold makes the `next` a no-op.
            self.ack_and_next(line_number);
            self.gate = SenderGate::Next;
            return;
        }

        self.feeder.settle();
        self.feeder_next();
    }

    /// Handle a `qr` planner queue report
    fn on_queue_report(&mut self, q: u32) {
        if q <= PLANNER_BUFFER_LOW_WATER_MARK {
            tracing::debug!(q, "Planner queue below low-water mark, blocking");
            self.blocked = true;
            return;
        }
        if q >= PLANNER_BUFFER_HIGH_WATER_MARK && self.blocked {
            tracing::debug!(q, "Planner queue above high-water mark, unblocking");
            self.blocked = false;
        }

        let pool = self.runner.planner_buffer_pool_size();

        if self.workflow.is_running() && self.gate == SenderGate::Next {
            // A `%wait` hold releases once the planner has fully drained.
            if self.sender.is_holding()
                && self.sender.received() >= self.sender.sent()
                && q >= pool
            {
                self.sender.unhold();
                self.sender_next();
                self.gate = SenderGate::Next;
            }
            return;
        }

        if (self.workflow.is_running() || self.workflow.is_paused())
            && self.gate == SenderGate::Ack
        {
            self.ack_and_next(None);
            self.gate = SenderGate::Next;
            return;
        }

        if self.workflow.is_idle() {
            if matches!(self.feeder.hold_reason(), Some(HoldReason::Wait)) && q >= pool {
                self.feeder.unhold();
            }
            self.feeder_next();
        }
    }

    /// Handle a response footer status code
    fn on_footer(&mut self, status_code: u16) {
        if status_code == 0 {
            return;
        }
        let message = status_codes::message(status_code);

        if self.workflow.is_running() {
            self.emit(DriverEvent::Connection(ConnectionEvent::Read {
                line: format!("> {}", self.last_write),
            }));
            self.emit(DriverEvent::Controller(ControllerEvent::Error {
                code: status_code,
                message: message.clone(),
                line: Some(self.last_write.clone()),
            }));
            if !self.config.exception.ignore_errors {
                self.workflow_pause(HoldReason::Error { err: message });
            }
            return;
        }

        self.emit(DriverEvent::Controller(ControllerEvent::Error {
            code: status_code,
            message,
            line: None,
        }));
        self.feeder.settle();
        self.feeder_next();
    }

    fn ack_and_next(&mut self, line_number: Option<u32>) {
        let finished = self.sender.ack();
        if let Some(n) = line_number {
            let received = self.sender.received() as u32;
            if n != received {
                tracing::warn!(
                    echoed = n,
                    received,
                    "Line-number echo out of step, trusting local counters"
                );
            }
        }
        if finished {
            self.emit_sender_status();
        }
        self.sender_next();
    }

    // ------------------------------------------------------------------
    // Outbound path
    // ------------------------------------------------------------------

    /// Transmit the next sender line, if the sender will give one up
    fn sender_next(&mut self) {
        let item = self
            .sender
            .next(&mut self.shared_context, self.runner.state());
        let Some(item) = item else { return };

        if let Some(data) = item.pause {
            self.workflow_pause(HoldReason::Pause { data });
        }
        self.write_line(&item.line);
    }

    /// Pump the feeder until a line hits the wire or the queue drains
    fn feeder_next(&mut self) {
        loop {
            if self.feeder.is_holding() {
                return;
            }
            let Some((line, mut job)) = self.feeder.take() else {
                return;
            };

            if self.runner.is_alarm() {
                self.feeder.reset();
                tracing::warn!("Machine is alarmed; dropping queued commands");
                self.emit_feeder_status();
                return;
            }

            let outcome = {
                let model = self.runner.state();
                pipeline::process(&line, &mut job, &mut self.shared_context, model)
            };

            match outcome.hold {
                Some(StageHold::Wait) => self.feeder.hold(HoldReason::Wait),
                Some(StageHold::Pause { data }) => self.feeder.hold(HoldReason::Pause { data }),
                None => {}
            }

            if outcome.line.trim().is_empty() {
                self.feeder.settle();
                continue;
            }

            self.write_line(&outcome.line);
            return;
        }
    }

    /// Write a newline-terminated line to the transport
    fn write_line(&mut self, line: &str) {
        if !self.transport.is_open() {
            tracing::warn!(line, "Transport closed, dropping line");
            return;
        }
        self.last_write = line.to_string();
        self.emit(DriverEvent::Connection(ConnectionEvent::Write {
            line: line.to_string(),
        }));
        let framed = format!("{}\n", line);
        if let Err(e) = self.transport.write(framed.as_bytes()) {
            self.on_write_error(e);
        }
    }

    /// Write an out-of-band control byte, bypassing both pipelines
    fn write_control(&mut self, byte: u8) {
        if !self.transport.is_open() {
            tracing::warn!(byte, "Transport closed, dropping control byte");
            return;
        }
        let label = match byte {
            CTRL_KILL_JOB => "^d".to_string(),
            CTRL_RESET_BOARD => "^x".to_string(),
            other => (other as char).to_string(),
        };
        self.emit(DriverEvent::Connection(ConnectionEvent::Write { line: label }));
        if let Err(e) = self.transport.write(&[byte]) {
            self.on_write_error(e);
        }
    }

    /// Initialization write with the firmware RX buffer guard
    ///
    /// A command that would overflow the firmware's serial input buffer is
    /// never written; the caller gets the error and drops the command.
    pub fn write_init(&mut self, line: &str) -> cncflow_core::Result<()> {
        if line.len() + 1 >= SERIAL_BUFFER_LIMIT {
            return Err(cncflow_core::ControllerError::CommandTooLong {
                length: line.len(),
                limit: SERIAL_BUFFER_LIMIT,
            }
            .into());
        }
        self.write_line(line);
        Ok(())
    }

    fn on_write_error(&mut self, e: cncflow_core::Error) {
        self.ready = false;
        self.emit(DriverEvent::Connection(ConnectionEvent::Error {
            message: e.to_string(),
        }));
    }

    // ------------------------------------------------------------------
    // Workflow transitions (protocol side effects included)
    // ------------------------------------------------------------------

    fn workflow_start(&mut self) {
        self.workflow.start();
        self.broadcast_workflow();
        self.blocked = false;
        self.gate = SenderGate::None;
        self.sender.rewind();
    }

    fn workflow_stop(&mut self) {
        self.workflow.stop();
        self.broadcast_workflow();
        // Rewinding here means a subsequent start re-runs the program.
        self.blocked = false;
        self.gate = SenderGate::None;
        self.sender.rewind();
    }

    fn workflow_pause(&mut self, reason: HoldReason) {
        self.workflow.pause();
        self.broadcast_workflow();
        self.sender.hold(reason);
    }

    fn workflow_resume(&mut self) {
        self.workflow.resume();
        self.broadcast_workflow();
        self.feeder.reset();
        self.sender.unhold();
        self.sender_next();
    }

    fn broadcast_workflow(&mut self) {
        self.emit(DriverEvent::Workflow(WorkflowEvent {
            state: self.workflow.state(),
        }));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Apply the open side effects after the transport opened successfully
    pub fn on_open(&mut self) {
        self.emit(DriverEvent::Connection(ConnectionEvent::Open {
            target: self.transport.description(),
        }));
        self.emit(DriverEvent::Connection(ConnectionEvent::Change {
            connected: true,
        }));
        self.emit(DriverEvent::Controller(ControllerEvent::Type {
            firmware: "TinyG".to_string(),
        }));

        self.workflow_stop();
        self.blocked = false;
        self.gate = SenderGate::None;
        self.sender.set_finish_time(None);
        if self.sender.is_loaded() {
            self.sender.unload();
            self.emit(DriverEvent::Sender(SenderEvent::Unload));
        }
    }

    /// Mark the handshake complete
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Tear down after a terminal transport failure
    pub fn on_close(&mut self, error: Option<String>) {
        self.ready = false;
        let _ = self.transport.close();
        self.emit(DriverEvent::Connection(ConnectionEvent::Close { error }));
        self.emit(DriverEvent::Connection(ConnectionEvent::Change {
            connected: false,
        }));
    }

    /// Fire a named event trigger
    pub fn fire_trigger(&mut self, event: &str) {
        if let Some(code) = self.triggers.trigger(event) {
            let lines: Vec<String> = code.lines().map(str::to_string).collect();
            self.feeder.feed(&lines, Context::new());
            self.feeder_next();
        }
    }

    /// The status-report field selection command, relaxed-JSON encoded
    ///
    /// Quotes are stripped and `true` collapses to `t` so the command fits
    /// the firmware's serial input buffer.
    pub fn status_report_command(&self) -> String {
        let mut body = serde_json::Map::new();
        for field in self.runner.report_mask().enabled_fields() {
            body.insert(field.to_string(), Value::Bool(true));
        }
        let mut wrapper = serde_json::Map::new();
        wrapper.insert("sr".to_string(), Value::Object(body));
        relax_json(&Value::Object(wrapper).to_string())
    }

    // ------------------------------------------------------------------
    // Query timer
    // ------------------------------------------------------------------

    /// One 250 ms query tick
    pub fn tick(&mut self, now: Instant) {
        if !self.transport.is_open() {
            return;
        }

        if self.feeder.peek() {
            self.emit_feeder_status();
        }
        if self.sender.is_loaded() {
            self.emit_sender_status();
        }

        // Captured before the mirror syncs: a matching work position means
        // the machine has not moved since the last tick.
        let prev_wpos = self.state_mirror.wpos;

        if self.settings_mirror != *self.runner.settings() {
            self.settings_mirror = self.runner.settings().clone();
            let settings = self.settings_mirror.clone();
            self.emit(DriverEvent::Controller(ControllerEvent::Settings {
                settings: settings.clone(),
                legacy: false,
            }));
            self.emit(DriverEvent::Controller(ControllerEvent::Settings {
                settings,
                legacy: true,
            }));
        }

        if self.state_mirror != *self.runner.state() {
            self.state_mirror = self.runner.state().clone();
            let state = self.state_mirror.clone();
            self.emit(DriverEvent::Controller(ControllerEvent::State {
                state: state.clone(),
                legacy: false,
            }));
            self.emit(DriverEvent::Controller(ControllerEvent::State {
                state,
                legacy: true,
            }));
        }

        if self.ready {
            if let Some(finish) = self.sender.finish_time() {
                let zero_offset = prev_wpos == self.runner.state().wpos;
                let machine_idle = zero_offset && self.runner.is_idle();
                if !machine_idle {
                    // Still moving; keep waiting.
                    self.sender.set_finish_time(Some(now));
                } else if now.duration_since(finish) > FINISH_SETTLE_TIME {
                    self.sender.set_finish_time(None);
                    tracing::info!("Program finished and machine idle, stopping workflow");
                    let _ = self.handle(Command::SenderStop { force: false });
                }
            }
        }
    }

    fn emit_feeder_status(&mut self) {
        self.emit(DriverEvent::Feeder(FeederEvent {
            status: self.feeder.status(),
        }));
    }

    fn emit_sender_status(&mut self) {
        self.emit(DriverEvent::Sender(SenderEvent::Status {
            status: self.sender.status(),
        }));
    }

    fn emit(&self, event: DriverEvent) {
        self.bus.publish(event);
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    /// Dispatch a named command; unknown names are logged and ignored
    pub fn command(&mut self, name: &str, args: &Value) -> cncflow_core::Result<()> {
        let command = match Command::from_name(name, args) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(name, error = %e, "Ignoring command");
                return Err(e);
            }
        };
        self.handle(command)
    }

    /// Handle a parsed command
    pub fn handle(&mut self, command: Command) -> cncflow_core::Result<()> {
        match command {
            Command::SenderLoad {
                name,
                content,
                context,
            } => {
                if !self.workflow.is_idle() {
                    tracing::warn!("Refusing to load a program while the workflow is active");
                    return Err(cncflow_core::ControllerError::InvalidArguments {
                        name: "sender:load".to_string(),
                        reason: "workflow is not idle".to_string(),
                    }
                    .into());
                }
                self.sender.load(&name, &content, context)?;
                self.emit(DriverEvent::Sender(SenderEvent::Load {
                    name,
                    total: self.sender.total(),
                }));
                self.emit_sender_status();
            }
            Command::SenderUnload => {
                if !self.workflow.is_idle() {
                    self.workflow_stop();
                }
                self.sender.unload();
                self.emit(DriverEvent::Sender(SenderEvent::Unload));
            }
            Command::SenderStart => {
                if !self.sender.is_loaded() {
                    tracing::warn!("No program loaded, ignoring start");
                    return Ok(());
                }
                self.fire_trigger("sender:start");
                self.workflow_start();
                self.sender_next();
            }
            Command::SenderStop { force } => {
                self.fire_trigger("sender:stop");
                self.workflow_stop();
                if force {
                    self.force_stop();
                }
                self.write_line("{\"qr\":\"\"}");
            }
            Command::SenderPause => {
                self.fire_trigger("sender:pause");
                self.workflow_pause(HoldReason::Manual);
                self.write_line("!");
                self.write_line("{\"qr\":\"\"}");
            }
            Command::SenderResume => {
                self.fire_trigger("sender:resume");
                self.write_line("~");
                self.write_line("{\"qr\":\"\"}");
                self.workflow_resume();
            }
            Command::FeederStart => {
                if self.workflow.is_running() {
                    tracing::warn!("Workflow is running, ignoring feeder start");
                    return Ok(());
                }
                self.write_line("~");
                self.write_line("{\"qr\":\"\"}");
                self.feeder.unhold();
                self.feeder_next();
            }
            Command::FeederStop => {
                self.feeder.reset();
                self.emit_feeder_status();
            }
            Command::Feedhold => {
                self.write_line("!");
                self.write_line("{\"qr\":\"\"}");
            }
            Command::Cyclestart => {
                self.write_line("~");
                self.write_line("{\"qr\":\"\"}");
            }
            Command::Homing => {
                self.fire_trigger("homing");
                self.feed_gcode("G28.2 X0 Y0 Z0", Context::new());
            }
            Command::Sleep => {
                // Not supported by TinyG.
                tracing::info!("Sleep is not supported by this firmware");
            }
            Command::Unlock => {
                self.write_line("{clear:null}");
            }
            Command::Reset => {
                self.workflow_stop();
                self.feeder.reset();
                self.write_control(CTRL_RESET_BOARD);
            }
            Command::OverrideFeed { delta } => {
                let value = apply_override(self.runner.settings().mfo, delta);
                self.write_line(&format!("{{mfo:{}}}", format_number(value)));
            }
            Command::OverrideSpindle { delta } => {
                let value = apply_override(self.runner.settings().sso, delta);
                self.write_line(&format!("{{sso:{}}}", format_number(value)));
            }
            Command::OverrideRapid { level } => {
                let value = match level {
                    0 => 1.0,
                    25 => 0.25,
                    50 => 0.5,
                    100 => 1.0,
                    other => {
                        tracing::warn!(level = other, "Unsupported rapid override level");
                        return Ok(());
                    }
                };
                self.write_line(&format!("{{mto:{}}}", format_number(value)));
            }
            Command::MotorEnable { timeout } => {
                if let Some(seconds) = timeout {
                    self.write_line(&format!("{{mt:{}}}", seconds));
                }
                self.write_line("{me:0}");
                self.write_line("{pwr:n}");
            }
            Command::MotorDisable => {
                self.write_line("{md:0}");
                self.write_line("{pwr:n}");
            }
            Command::MotorTimeout { seconds } => {
                self.write_line(&format!("{{mt:{}}}", seconds));
                self.write_line("{mt:n}");
            }
            Command::LaserTest {
                power,
                duration_ms,
                max_s,
            } => {
                if power <= 0.0 {
                    self.feed_gcode("M5S0", Context::new());
                    return Ok(());
                }
                let s = (max_s * (power / 100.0)).max(0.0);
                let mut lines = format!("M3S{}", format_number(s));
                if duration_ms > 0 {
                    lines.push_str(&format!(
                        "\nG4P{}\nM5S0",
                        format_number(duration_ms as f64 / 1000.0)
                    ));
                }
                self.feed_gcode(&lines, Context::new());
            }
            Command::Gcode { lines, context } => {
                self.feed_gcode(&lines, context);
            }
            Command::MacroRun { id, context } => {
                let Some(record) = self.macros.get(&id) else {
                    tracing::warn!(id, "Macro not found");
                    return Err(cncflow_core::Error::other(format!("macro not found: {}", id)));
                };
                self.fire_trigger("macro:run");
                self.feed_gcode(&record.content, context);
            }
            Command::MacroLoad { id, context } => {
                let Some(record) = self.macros.get(&id) else {
                    tracing::warn!(id, "Macro not found");
                    return Err(cncflow_core::Error::other(format!("macro not found: {}", id)));
                };
                self.fire_trigger("macro:load");
                return self.handle(Command::SenderLoad {
                    name: record.name,
                    content: record.content,
                    context,
                });
            }
            Command::WatchdirLoad { path } => {
                let content = self.loader.load(&path)?;
                return self.handle(Command::SenderLoad {
                    name: path,
                    content,
                    context: Context::new(),
                });
            }
        }
        Ok(())
    }

    fn feed_gcode(&mut self, code: &str, context: Context) {
        let lines: Vec<String> = code.lines().map(str::to_string).collect();
        self.feeder.feed(&lines, context);
        self.feeder_next();
    }

    /// The force-stop firmware dialect, selected by build number
    fn force_stop(&mut self) {
        let fb = self.runner.settings().fb;
        if fb >= 101.0 {
            self.write_control(CTRL_KILL_JOB);
        } else if fb >= 100.0 {
            self.write_control(CTRL_KILL_JOB);
            self.write_line("M30");
        } else {
            self.write_line("!");
            self.write_line("%");
            self.write_line("M30");
        }
    }
}

impl std::fmt::Debug for TinygDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinygDriver")
            .field("workflow", &self.workflow.state())
            .field("gate", &self.gate)
            .field("blocked", &self.blocked)
            .field("ready", &self.ready)
            .finish()
    }
}

/// Override arithmetic shared by feed and spindle overrides
///
/// A zero delta resets to 100%; anything else moves the current fraction by
/// the delta and clamps to [5%, 200%].
fn apply_override(current: f64, delta: f64) -> f64 {
    if delta == 0.0 {
        return 1.0;
    }
    ((current * 100.0 + delta) / 100.0).clamp(OVERRIDE_MIN, OVERRIDE_MAX)
}

/// Relaxed-JSON encoding: no quotes, `true` collapsed to `t`
///
/// A firmware requirement for the status-report selection command, which
/// would otherwise overflow the serial input buffer.
fn relax_json(json: &str) -> String {
    json.replace('"', "").replace("true", "t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_arithmetic() {
        assert_eq!(apply_override(1.0, 10.0), 1.1);
        assert_eq!(apply_override(1.0, -10.0), 0.9);
        assert!((apply_override(1.1, -20.0) - 0.9).abs() < 1e-9);
        assert_eq!(apply_override(1.0, 0.0), 1.0);
        assert_eq!(apply_override(0.5, 0.0), 1.0);
    }

    #[test]
    fn override_clamps() {
        assert_eq!(apply_override(0.1, -20.0), OVERRIDE_MIN);
        assert_eq!(apply_override(1.9, 50.0), OVERRIDE_MAX);
    }

    #[test]
    fn relaxed_json() {
        assert_eq!(
            relax_json(r#"{"sr":{"posx":true,"stat":true}}"#),
            "{sr:{posx:t,stat:t}}"
        );
    }
}
