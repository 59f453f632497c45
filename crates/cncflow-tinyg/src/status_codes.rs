//! TinyG/g2core firmware status codes.
//!
//! Every response footer carries a status code in element 1; non-zero codes
//! are looked up here before being surfaced to clients.

/// Look up the human-readable message for a firmware status code
pub fn lookup(code: u16) -> Option<&'static str> {
    let msg = match code {
        0 => "OK",
        1 => "Error",
        2 => "Eagain",
        3 => "No-op",
        4 => "Complete",
        5 => "Terminated",
        6 => "Hard reset",
        7 => "End of line",
        8 => "End of file",
        9 => "File not open",
        10 => "Max file size exceeded",
        11 => "No such device",
        12 => "Buffer empty",
        13 => "Buffer full non-fatal",
        14 => "Buffer full fatal",
        15 => "Initializing",
        16 => "Entering boot loader",
        17 => "Function is stubbed",
        20 => "Internal error",
        21 => "Internal range error",
        22 => "Floating point error",
        23 => "Divide by zero",
        24 => "Invalid address",
        25 => "Read-only address",
        26 => "Initialization failure",
        27 => "System alarm - shutting down",
        28 => "Failed to get planner buffer",
        29 => "Generic exception report",
        30 => "Move time is infinite",
        31 => "Move time is NAN",
        32 => "Float is infinite",
        33 => "Float is NAN",
        34 => "Persistence error",
        35 => "Bad status report setting",
        100 => "Unrecognized command",
        101 => "Expected command letter",
        102 => "Bad number format",
        103 => "Input exceeds max length",
        104 => "Input value too small",
        105 => "Input value too large",
        106 => "Input value range error",
        107 => "Input value unsupported",
        108 => "JSON syntax error",
        109 => "JSON input has too many pairs",
        110 => "JSON output too long",
        111 => "Out of buffer space",
        112 => "Config rejected during cycle",
        130 => "Generic gcode input error",
        131 => "Gcode command unsupported",
        132 => "M code unsupported",
        133 => "Gcode modal group violation",
        134 => "Axis word missing",
        135 => "Axis cannot be present",
        136 => "Axis invalid for this command",
        137 => "Axis disabled",
        138 => "Axis target position missing",
        139 => "Axis target position invalid",
        140 => "Selected plane missing",
        141 => "Selected plane invalid",
        142 => "Feed rate not specified",
        200 => "Generic error",
        201 => "Minimum length move",
        202 => "Minimum time move",
        203 => "Machine alarmed - command not processed",
        204 => "Limit switch hit - shutdown occurred",
        205 => "Planner failed to converge",
        220 => "Soft limit exceeded",
        221 => "Soft limit exceeded - X min",
        222 => "Soft limit exceeded - X max",
        223 => "Soft limit exceeded - Y min",
        224 => "Soft limit exceeded - Y max",
        225 => "Soft limit exceeded - Z min",
        226 => "Soft limit exceeded - Z max",
        240 => "Homing cycle failed",
        241 => "Homing error - bad or no axis specified",
        242 => "Homing error - switch misconfiguration",
        243 => "Homing error - zero search distance",
        250 => "Probe cycle failed",
        251 => "Probe endpoint is starting point",
        _ => return None,
    };
    Some(msg)
}

/// Message for a code, falling back to a generic label
pub fn message(code: u16) -> String {
    match lookup(code) {
        Some(msg) => msg.to_string(),
        None => format!("Unknown status code {}", code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(lookup(0), Some("OK"));
        assert_eq!(lookup(108), Some("JSON syntax error"));
        assert_eq!(lookup(203), Some("Machine alarmed - command not processed"));
    }

    #[test]
    fn unknown_code_falls_back() {
        assert_eq!(lookup(999), None);
        assert_eq!(message(999), "Unknown status code 999");
    }
}
