//! The named command surface.
//!
//! Clients dispatch commands by name with positional JSON arguments; the
//! names map onto a [`Command`] enum handled by the driver. Unknown names
//! and malformed arguments are reported, logged by the dispatcher, and
//! otherwise ignored.

use serde_json::Value;

use cncflow_core::{ControllerError, Result};

use crate::expression::Context;

/// Macro store seam; resolves macro ids to G-code content
pub trait MacroStore: Send {
    /// Look up a macro by id
    fn get(&self, id: &str) -> Option<MacroRecord>;
}

/// A stored macro
#[derive(Debug, Clone, PartialEq)]
pub struct MacroRecord {
    /// Display name
    pub name: String,
    /// G-code content
    pub content: String,
}

/// Macro store with no macros; the default until a host installs one
#[derive(Debug, Default)]
pub struct EmptyMacroStore;

impl MacroStore for EmptyMacroStore {
    fn get(&self, _id: &str) -> Option<MacroRecord> {
        None
    }
}

/// Program loader seam; resolves watch-directory paths to file content
pub trait ProgramLoader: Send {
    /// Load program content from a path
    fn load(&self, path: &str) -> std::io::Result<String>;
}

/// Loader reading straight from the filesystem
#[derive(Debug, Default)]
pub struct FsProgramLoader;

impl ProgramLoader for FsProgramLoader {
    fn load(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// A parsed client command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Load a program into the sender
    SenderLoad {
        /// Program name
        name: String,
        /// Program content
        content: String,
        /// Evaluation context for the program
        context: Context,
    },
    /// Unload the program
    SenderUnload,
    /// Start (or restart) the loaded program
    SenderStart,
    /// Stop the program; `force` kills the job on the firmware side
    SenderStop {
        /// Whether to force-kill the running job
        force: bool,
    },
    /// Pause the running program
    SenderPause,
    /// Resume the paused program
    SenderResume,
    /// Release the feeder and issue a cycle start
    FeederStart,
    /// Drop all queued feeder lines
    FeederStop,
    /// Raw feed hold
    Feedhold,
    /// Raw cycle start
    Cyclestart,
    /// Home X, Y, and Z
    Homing,
    /// Sleep (not supported by this firmware; logged no-op)
    Sleep,
    /// Clear a firmware alarm
    Unlock,
    /// Stop everything and reset the board
    Reset,
    /// Adjust the feed rate override by a percentage delta; 0 resets
    OverrideFeed {
        /// Percentage delta
        delta: f64,
    },
    /// Adjust the spindle override by a percentage delta; 0 resets
    OverrideSpindle {
        /// Percentage delta
        delta: f64,
    },
    /// Set the rapid override level (0, 25, 50, or 100)
    OverrideRapid {
        /// Requested level
        level: u8,
    },
    /// Energize motors, optionally setting the timeout first
    MotorEnable {
        /// Motor timeout in seconds, applied before energizing
        timeout: Option<u32>,
    },
    /// De-energize motors
    MotorDisable,
    /// Set the motor timeout
    MotorTimeout {
        /// Timeout in seconds
        seconds: u32,
    },
    /// Pulse the laser for focusing
    LaserTest {
        /// Power as a percentage of `max_s`
        power: f64,
        /// Pulse duration in milliseconds; 0 leaves the laser on
        duration_ms: u64,
        /// The S value that maps to 100% power
        max_s: f64,
    },
    /// Feed G-code lines through the feeder
    Gcode {
        /// Newline-separated lines
        lines: String,
        /// Evaluation context
        context: Context,
    },
    /// Run a macro through the feeder
    MacroRun {
        /// Macro id
        id: String,
        /// Evaluation context
        context: Context,
    },
    /// Load a macro into the sender
    MacroLoad {
        /// Macro id
        id: String,
        /// Evaluation context
        context: Context,
    },
    /// Load a file from the watch directory into the sender
    WatchdirLoad {
        /// File path
        path: String,
    },
}

impl Command {
    /// Parse a named command with positional JSON arguments
    pub fn from_name(name: &str, args: &Value) -> Result<Command> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);

        let cmd = match name {
            "sender:load" => Command::SenderLoad {
                name: require_str(name, &arg(0), "name")?,
                content: require_str(name, &arg(1), "content")?,
                context: parse_context(&arg(2)),
            },
            "sender:unload" => Command::SenderUnload,
            "sender:start" => Command::SenderStart,
            "sender:stop" => Command::SenderStop {
                force: arg(0)
                    .get("force")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            "sender:pause" => Command::SenderPause,
            "sender:resume" => Command::SenderResume,
            "feeder:start" => Command::FeederStart,
            "feeder:stop" => Command::FeederStop,
            "feedhold" => Command::Feedhold,
            "cyclestart" => Command::Cyclestart,
            "homing" => Command::Homing,
            "sleep" => Command::Sleep,
            "unlock" => Command::Unlock,
            "reset" => Command::Reset,
            "override:feed" => Command::OverrideFeed {
                delta: require_number(name, &arg(0), "delta")?,
            },
            "override:spindle" => Command::OverrideSpindle {
                delta: require_number(name, &arg(0), "delta")?,
            },
            "override:rapid" => Command::OverrideRapid {
                level: require_number(name, &arg(0), "level")? as u8,
            },
            "motor:enable" => Command::MotorEnable {
                timeout: arg(0).as_u64().map(|t| t as u32),
            },
            "motor:disable" => Command::MotorDisable,
            "motor:timeout" => Command::MotorTimeout {
                seconds: require_number(name, &arg(0), "seconds")? as u32,
            },
            "lasertest" => Command::LaserTest {
                power: require_number(name, &arg(0), "power")?,
                duration_ms: arg(1).as_u64().unwrap_or(0),
                max_s: arg(2).as_f64().unwrap_or(1000.0),
            },
            "gcode" => Command::Gcode {
                lines: require_str(name, &arg(0), "lines")?,
                context: parse_context(&arg(1)),
            },
            "macro:run" => Command::MacroRun {
                id: require_str(name, &arg(0), "id")?,
                context: parse_context(&arg(1)),
            },
            "macro:load" => Command::MacroLoad {
                id: require_str(name, &arg(0), "id")?,
                context: parse_context(&arg(1)),
            },
            "watchdir:load" => Command::WatchdirLoad {
                path: require_str(name, &arg(0), "path")?,
            },
            _ => {
                return Err(ControllerError::UnknownCommand {
                    name: name.to_string(),
                }
                .into())
            }
        };
        Ok(cmd)
    }
}

fn require_str(command: &str, value: &Value, what: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(command, what))
}

fn require_number(command: &str, value: &Value, what: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| invalid(command, what))
}

fn invalid(command: &str, what: &str) -> cncflow_core::Error {
    ControllerError::InvalidArguments {
        name: command.to_string(),
        reason: format!("missing or invalid '{}'", what),
    }
    .into()
}

fn parse_context(value: &Value) -> Context {
    match value.as_object() {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None => Context::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_load() {
        let cmd = Command::from_name(
            "sender:load",
            &json!(["part.nc", "G0 X0", {"xmin": -5}]),
        )
        .unwrap();
        match cmd {
            Command::SenderLoad { name, content, context } => {
                assert_eq!(name, "part.nc");
                assert_eq!(content, "G0 X0");
                assert_eq!(context.get("xmin").and_then(Value::as_f64), Some(-5.0));
            }
            other => panic!("wrong command: {:?}", other),
        }
    }

    #[test]
    fn parses_force_stop() {
        let cmd = Command::from_name("sender:stop", &json!([{"force": true}])).unwrap();
        assert_eq!(cmd, Command::SenderStop { force: true });

        let cmd = Command::from_name("sender:stop", &json!([])).unwrap();
        assert_eq!(cmd, Command::SenderStop { force: false });
    }

    #[test]
    fn parses_overrides() {
        assert_eq!(
            Command::from_name("override:feed", &json!([10])).unwrap(),
            Command::OverrideFeed { delta: 10.0 }
        );
        assert_eq!(
            Command::from_name("override:rapid", &json!([25])).unwrap(),
            Command::OverrideRapid { level: 25 }
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = Command::from_name("brew:coffee", &json!([])).unwrap_err();
        assert!(err.to_string().contains("brew:coffee"));
    }

    #[test]
    fn missing_arguments_are_rejected() {
        assert!(Command::from_name("sender:load", &json!([])).is_err());
        assert!(Command::from_name("override:feed", &json!(["ten"])).is_err());
    }

    #[test]
    fn lasertest_defaults() {
        let cmd = Command::from_name("lasertest", &json!([50])).unwrap();
        assert_eq!(
            cmd,
            Command::LaserTest {
                power: 50.0,
                duration_ms: 0,
                max_s: 1000.0,
            }
        );
    }
}
