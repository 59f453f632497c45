//! Event type definitions for the broadcast bus.
//!
//! Every event the driver broadcasts toward clients is defined here,
//! organized by category. Each event knows its wire name (the string
//! identifier clients subscribe to) and a short description for logging.

use serde::{Deserialize, Serialize};

use crate::data::{
    FeederStatus, FirmwareSettings, MachineModel, SenderStatus, WorkflowState,
};

/// Root event enum for all client-facing broadcasts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DriverEvent {
    /// Transport connection events
    Connection(ConnectionEvent),
    /// Controller identity, settings, and state mirrors
    Controller(ControllerEvent),
    /// Manual-command feeder status
    Feeder(FeederEvent),
    /// Program sender lifecycle
    Sender(SenderEvent),
    /// Workflow state machine
    Workflow(WorkflowEvent),
}

impl DriverEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            DriverEvent::Connection(_) => EventCategory::Connection,
            DriverEvent::Controller(_) => EventCategory::Controller,
            DriverEvent::Feeder(_) => EventCategory::Feeder,
            DriverEvent::Sender(_) => EventCategory::Sender,
            DriverEvent::Workflow(_) => EventCategory::Workflow,
        }
    }

    /// The protocol-level event name clients subscribe to
    pub fn wire_name(&self) -> &'static str {
        match self {
            DriverEvent::Connection(e) => e.wire_name(),
            DriverEvent::Controller(e) => e.wire_name(),
            DriverEvent::Feeder(_) => "feeder:status",
            DriverEvent::Sender(e) => e.wire_name(),
            DriverEvent::Workflow(_) => "workflow:state",
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            DriverEvent::Connection(e) => e.description(),
            DriverEvent::Controller(e) => e.description(),
            DriverEvent::Feeder(e) => {
                format!("Feeder status: {} queued, hold={}", e.status.queue, e.status.hold)
            }
            DriverEvent::Sender(e) => e.description(),
            DriverEvent::Workflow(e) => format!("Workflow state: {}", e.state),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Transport connection events.
    Connection,
    /// Controller settings and state events.
    Controller,
    /// Feeder status events.
    Feeder,
    /// Sender lifecycle events.
    Sender,
    /// Workflow transitions.
    Workflow,
}

/// Connection-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// The transport opened.
    Open {
        /// Transport description (port path or network address).
        target: String,
    },
    /// The transport closed; terminal for the controller instance.
    Close {
        /// Error that caused the close, if any.
        error: Option<String>,
    },
    /// A transport error that did not close the connection.
    Error {
        /// The error message.
        message: String,
    },
    /// A line arrived from the firmware.
    Read {
        /// The raw line, without the trailing newline.
        line: String,
    },
    /// A line was written to the firmware.
    Write {
        /// The raw line, without the trailing newline.
        line: String,
    },
    /// Connection state changed.
    Change {
        /// Whether the transport is currently open.
        connected: bool,
    },
}

impl ConnectionEvent {
    fn wire_name(&self) -> &'static str {
        match self {
            ConnectionEvent::Open { .. } => "connection:open",
            ConnectionEvent::Close { .. } => "connection:close",
            ConnectionEvent::Error { .. } => "connection:error",
            ConnectionEvent::Read { .. } => "connection:read",
            ConnectionEvent::Write { .. } => "connection:write",
            ConnectionEvent::Change { .. } => "connection:change",
        }
    }

    fn description(&self) -> String {
        match self {
            ConnectionEvent::Open { target } => format!("Connection open: {}", target),
            ConnectionEvent::Close { error: Some(e) } => format!("Connection closed: {}", e),
            ConnectionEvent::Close { error: None } => "Connection closed".to_string(),
            ConnectionEvent::Error { message } => format!("Connection error: {}", message),
            ConnectionEvent::Read { line } => format!("< {}", line),
            ConnectionEvent::Write { line } => format!("> {}", line),
            ConnectionEvent::Change { connected } => {
                format!("Connection {}", if *connected { "up" } else { "down" })
            }
        }
    }
}

/// Controller identity and mirrored-state events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerEvent {
    /// Controller firmware type announcement.
    Type {
        /// Firmware family name.
        firmware: String,
    },
    /// Mirrored settings changed.
    Settings {
        /// The full settings snapshot.
        settings: FirmwareSettings,
        /// Whether this is the backward-compatible duplicate broadcast.
        legacy: bool,
    },
    /// Mirrored machine state changed.
    State {
        /// The full machine state snapshot.
        state: MachineModel,
        /// Whether this is the backward-compatible duplicate broadcast.
        legacy: bool,
    },
    /// A firmware error was decoded from a response footer.
    Error {
        /// Firmware status code.
        code: u16,
        /// Human-readable message from the status-code table.
        message: String,
        /// The offending source line, when known.
        line: Option<String>,
    },
}

impl ControllerEvent {
    fn wire_name(&self) -> &'static str {
        match self {
            ControllerEvent::Type { .. } => "controller:type",
            ControllerEvent::Settings { legacy: false, .. } => "controller:settings",
            ControllerEvent::Settings { legacy: true, .. } => "TinyG:settings",
            ControllerEvent::State { legacy: false, .. } => "controller:state",
            ControllerEvent::State { legacy: true, .. } => "TinyG:state",
            ControllerEvent::Error { .. } => "controller:error",
        }
    }

    fn description(&self) -> String {
        match self {
            ControllerEvent::Type { firmware } => format!("Controller type: {}", firmware),
            ControllerEvent::Settings { settings, .. } => {
                format!("Controller settings (fb {})", settings.fb)
            }
            ControllerEvent::State { state, .. } => {
                format!("Controller state: {}", state.state)
            }
            ControllerEvent::Error { code, message, .. } => {
                format!("Firmware error {}: {}", code, message)
            }
        }
    }
}

/// Feeder status broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederEvent {
    /// The feeder status snapshot.
    pub status: FeederStatus,
}

/// Sender lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SenderEvent {
    /// Sender status snapshot.
    Status {
        /// The sender status snapshot.
        status: SenderStatus,
    },
    /// A program was loaded.
    Load {
        /// Program name.
        name: String,
        /// Total number of lines.
        total: usize,
    },
    /// The loaded program was unloaded.
    Unload,
}

impl SenderEvent {
    fn wire_name(&self) -> &'static str {
        match self {
            SenderEvent::Status { .. } => "sender:status",
            SenderEvent::Load { .. } => "sender:load",
            SenderEvent::Unload => "sender:unload",
        }
    }

    fn description(&self) -> String {
        match self {
            SenderEvent::Status { status } => format!(
                "Sender status: {}/{}/{}",
                status.received, status.sent, status.total
            ),
            SenderEvent::Load { name, total } => format!("Loaded {} ({} lines)", name, total),
            SenderEvent::Unload => "Program unloaded".to_string(),
        }
    }
}

/// Workflow transition broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// The new workflow state.
    pub state: WorkflowState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_protocol() {
        let open = DriverEvent::Connection(ConnectionEvent::Open {
            target: "/dev/ttyUSB0".to_string(),
        });
        assert_eq!(open.wire_name(), "connection:open");

        let settings = DriverEvent::Controller(ControllerEvent::Settings {
            settings: FirmwareSettings::default(),
            legacy: false,
        });
        assert_eq!(settings.wire_name(), "controller:settings");

        let legacy = DriverEvent::Controller(ControllerEvent::Settings {
            settings: FirmwareSettings::default(),
            legacy: true,
        });
        assert_eq!(legacy.wire_name(), "TinyG:settings");
    }

    #[test]
    fn categories() {
        let ev = DriverEvent::Workflow(WorkflowEvent {
            state: WorkflowState::Running,
        });
        assert_eq!(ev.category(), EventCategory::Workflow);
        assert_eq!(ev.wire_name(), "workflow:state");
    }
}
