//! Data models mirrored from TinyG/g2core status frames
//!
//! This module provides:
//! - Position tracking with full 6-axis support (X, Y, Z, A, B, C)
//! - Machine state decoded from the firmware `stat` number
//! - Modal group tracking (motion, WCS, plane, units, distance, feed-rate
//!   mode, path control, spindle, coolant)
//! - Response footer representation
//! - Mirrored firmware settings
//! - Pipeline status snapshots broadcast to clients

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric, G21)
    MM,
    /// Inches (imperial, G20)
    INCH,
    /// Unknown or uninitialized
    #[default]
    Unknown,
}

impl Units {
    /// Decode the TinyG `unit` status field (0 = inches, 1 = millimeters)
    pub fn from_stat(value: u8) -> Self {
        match value {
            0 => Units::INCH,
            1 => Units::MM,
            _ => Units::Unknown,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
            Units::Unknown => write!(f, "unknown"),
        }
    }
}

/// A 6-axis machine coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// A-axis (4th axis) position
    pub a: f64,
    /// B-axis (5th axis) position
    pub b: f64,
    /// C-axis (6th axis) position
    pub c: f64,
}

impl Position {
    /// Create a position from linear axes, rotary axes at zero
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// Set one axis by letter; unknown letters are ignored
    pub fn set_axis(&mut self, axis: char, value: f64) {
        match axis.to_ascii_lowercase() {
            'x' => self.x = value,
            'y' => self.y = value,
            'z' => self.z = value,
            'a' => self.a = value,
            'b' => self.b = value,
            'c' => self.c = value,
            _ => {}
        }
    }
}

/// Machine state decoded from the TinyG `stat` status field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// Machine is initializing (stat 0)
    #[default]
    Initializing,
    /// Machine is ready for use (stat 1)
    Ready,
    /// Machine is in a soft alarm state (stat 2)
    Alarm,
    /// Program stop or no more blocks (stat 3)
    ProgramStop,
    /// Program end via M2 or M30 (stat 4)
    ProgramEnd,
    /// Motion is running (stat 5)
    Run,
    /// Motion is holding (stat 6)
    Hold,
    /// Probe cycle active (stat 7)
    Probe,
    /// Machine is running (cycling) (stat 8)
    Cycle,
    /// Machine is homing (stat 9)
    Homing,
    /// Unrecognized stat value
    Unknown,
}

impl MachineState {
    /// Decode a raw `stat` number
    pub fn from_stat(stat: u8) -> Self {
        match stat {
            0 => MachineState::Initializing,
            1 => MachineState::Ready,
            2 => MachineState::Alarm,
            3 => MachineState::ProgramStop,
            4 => MachineState::ProgramEnd,
            5 => MachineState::Run,
            6 => MachineState::Hold,
            7 => MachineState::Probe,
            8 => MachineState::Cycle,
            9 => MachineState::Homing,
            _ => MachineState::Unknown,
        }
    }

    /// Whether the machine is idle (ready, program stop, or program end)
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            MachineState::Ready | MachineState::ProgramStop | MachineState::ProgramEnd
        )
    }

    /// Whether the machine is alarmed
    pub fn is_alarm(&self) -> bool {
        matches!(self, MachineState::Alarm)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::Initializing => "Initializing",
            MachineState::Ready => "Ready",
            MachineState::Alarm => "Alarm",
            MachineState::ProgramStop => "Stop",
            MachineState::ProgramEnd => "End",
            MachineState::Run => "Run",
            MachineState::Hold => "Hold",
            MachineState::Probe => "Probe",
            MachineState::Cycle => "Cycle",
            MachineState::Homing => "Homing",
            MachineState::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// Current modal group, tracked from status reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalGroup {
    /// Motion mode (G0, G1, G2, G3, G80)
    pub motion: String,
    /// Work coordinate system (G53..G59)
    pub wcs: String,
    /// Plane selection (G17, G18, G19)
    pub plane: String,
    /// Units mode (G20, G21)
    pub units: String,
    /// Distance mode (G90, G91)
    pub distance: String,
    /// Feed rate mode (G93, G94, G95)
    pub feedrate: String,
    /// Path control mode (G61, G61.1, G64)
    pub path: String,
    /// Spindle state (M3, M4, M5)
    pub spindle: String,
    /// Active coolant words (M7 and/or M8); empty means M9
    pub coolant: Vec<String>,
}

impl Default for ModalGroup {
    fn default() -> Self {
        Self {
            motion: "G0".to_string(),
            wcs: "G54".to_string(),
            plane: "G17".to_string(),
            units: "G21".to_string(),
            distance: "G90".to_string(),
            feedrate: "G94".to_string(),
            path: "G61".to_string(),
            spindle: "M5".to_string(),
            coolant: Vec::new(),
        }
    }
}

/// Response footer attached to acknowledgement frames
///
/// The array layout is `[protocol, status, rx, checksum]`; only the status
/// code participates in error handling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Footer {
    /// Footer protocol revision
    pub protocol: i64,
    /// Firmware status code; non-zero means the command failed
    pub status_code: u16,
    /// RX buffer information
    pub rx: i64,
    /// Line checksum
    pub checksum: i64,
}

impl Footer {
    /// Build a footer from the raw `f` array; missing elements default to 0
    pub fn from_values(values: &[i64]) -> Self {
        Self {
            protocol: values.first().copied().unwrap_or(0),
            status_code: values.get(1).copied().unwrap_or(0) as u16,
            rx: values.get(2).copied().unwrap_or(0),
            checksum: values.get(3).copied().unwrap_or(0),
        }
    }
}

/// Mirrored firmware settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FirmwareSettings {
    /// Firmware build number
    pub fb: f64,
    /// Hardware platform
    pub hp: f64,
    /// Manual feed rate override fraction
    pub mfo: f64,
    /// Spindle speed override fraction
    pub sso: f64,
    /// Rapid (traverse) override fraction
    pub mto: f64,
    /// Motor disable timeout in seconds
    pub mt: f64,
}

/// Mirrored machine state, updated on each decoded frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineModel {
    /// Machine state from `stat`
    pub state: MachineState,
    /// Coordinate units from `unit`
    pub units: Units,
    /// Last echoed line number
    pub line: u32,
    /// Current velocity
    pub vel: f64,
    /// Current feed rate
    pub feed: f64,
    /// Machine position (absolute)
    pub mpos: Position,
    /// Work position (offset by the active WCS)
    pub wpos: Position,
    /// Modal group
    pub modal: ModalGroup,
    /// Active tool number
    pub tool: u32,
    /// Last planner queue report (free slots)
    pub qr: u32,
    /// Last response footer
    pub footer: Footer,
}

/// Why a pipeline is holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HoldReason {
    /// Client-requested pause
    Manual,
    /// `%wait` pseudo-command: hold until the planner queue is empty
    Wait,
    /// Program pause raised by M0/M1/M6
    Pause {
        /// The pausing word (`M0`, `M1`, or `M6`)
        data: String,
    },
    /// Hold raised by a firmware error while a program was running
    Error {
        /// The firmware error message
        err: String,
    },
}

/// Feeder status snapshot broadcast as `feeder:status`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeederStatus {
    /// Whether the feeder is holding
    pub hold: bool,
    /// Why the feeder is holding
    pub hold_reason: Option<HoldReason>,
    /// Number of queued lines
    pub queue: usize,
    /// Whether a line is being processed
    pub pending: bool,
}

/// Sender status snapshot broadcast as `sender:status`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SenderStatus {
    /// Name of the loaded program
    pub name: String,
    /// Total number of program lines
    pub total: usize,
    /// Lines handed to the transport
    pub sent: usize,
    /// Lines acknowledged by the firmware
    pub received: usize,
    /// Whether the sender is holding
    pub hold: bool,
    /// Why the sender is holding
    pub hold_reason: Option<HoldReason>,
}

/// Workflow state of the loaded program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// No program is running
    #[default]
    Idle,
    /// A program is streaming
    Running,
    /// A running program is paused
    Paused,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::Running => write!(f, "running"),
            WorkflowState::Paused => write!(f, "paused"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_decoding_covers_protocol_range() {
        assert_eq!(MachineState::from_stat(0), MachineState::Initializing);
        assert_eq!(MachineState::from_stat(2), MachineState::Alarm);
        assert_eq!(MachineState::from_stat(5), MachineState::Run);
        assert_eq!(MachineState::from_stat(9), MachineState::Homing);
        assert_eq!(MachineState::from_stat(42), MachineState::Unknown);
    }

    #[test]
    fn idle_states() {
        assert!(MachineState::Ready.is_idle());
        assert!(MachineState::ProgramStop.is_idle());
        assert!(MachineState::ProgramEnd.is_idle());
        assert!(!MachineState::Run.is_idle());
        assert!(!MachineState::Hold.is_idle());
    }

    #[test]
    fn footer_from_short_array() {
        let f = Footer::from_values(&[1, 20]);
        assert_eq!(f.protocol, 1);
        assert_eq!(f.status_code, 20);
        assert_eq!(f.rx, 0);
    }

    #[test]
    fn position_set_axis() {
        let mut p = Position::default();
        p.set_axis('X', 10.5);
        p.set_axis('c', -1.0);
        p.set_axis('q', 99.0);
        assert_eq!(p.x, 10.5);
        assert_eq!(p.c, -1.0);
        assert_eq!(p.y, 0.0);
    }
}
