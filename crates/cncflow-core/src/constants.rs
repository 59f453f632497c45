//! Protocol constants for the TinyG/g2core wire protocol.

use std::time::Duration;

/// Planner-queue free-slot count at or below which the sender blocks.
pub const PLANNER_BUFFER_LOW_WATER_MARK: u32 = 8;

/// Planner-queue free-slot count at or above which a blocked sender releases.
pub const PLANNER_BUFFER_HIGH_WATER_MARK: u32 = 20;

/// Maximum bytes accepted by the firmware's serial input buffer in one line.
///
/// Initialization commands at or above this length are dropped; the firmware
/// would otherwise overflow its RX buffer and corrupt the handshake.
pub const SERIAL_BUFFER_LIMIT: usize = 254;

/// Period of the query timer that diffs mirrored state and detects
/// program completion.
pub const QUERY_INTERVAL: Duration = Duration::from_millis(250);

/// How long the machine must stay idle after the last sender line is
/// acknowledged before the program counts as finished.
pub const FINISH_SETTLE_TIME: Duration = Duration::from_millis(500);

/// Delay after opening the transport, giving the firmware bootloader time
/// to pass control to the application.
pub const BOOTLOADER_DELAY: Duration = Duration::from_millis(1000);

/// Spacing between capability probes during initialization.
pub const PROBE_SPACING: Duration = Duration::from_millis(100);

/// Kill job (^d).
pub const CTRL_KILL_JOB: u8 = 0x04;

/// Reset board (^x).
pub const CTRL_RESET_BOARD: u8 = 0x18;

/// Lower clamp for feed/spindle override fractions.
pub const OVERRIDE_MIN: f64 = 0.05;

/// Upper clamp for feed/spindle override fractions.
pub const OVERRIDE_MAX: f64 = 2.0;
