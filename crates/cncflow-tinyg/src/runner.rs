//! Frame decoder and state mirror.
//!
//! Accumulates transport bytes, splits newline-delimited JSON frames, and
//! classifies them into the events the flow controller acts on. Along the
//! way it maintains a mirror of machine state (positions, modal group, tool,
//! footer) and firmware settings (build, platform, overrides, motor
//! timeout), plus the status-report field mask that capability probes prune.

use serde_json::Value;

use cncflow_core::{FirmwareSettings, Footer, MachineModel, MachineState};

/// Decoded frame events, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// A raw line arrived (before classification)
    Line(String),
    /// Acknowledgement frame
    Response {
        /// Line-number echo from the firmware, when present
        line_number: Option<u32>,
    },
    /// Planner queue report: free-slot count
    QueueReport(u32),
    /// Status report was decoded and applied to the mirror
    StatusReport,
    /// Response footer
    Footer(Footer),
    /// Unparseable or unrecognized line
    Raw(String),
}

/// Status-report field selection
///
/// Starts with every field enabled; the bring-up capability probes clear
/// the bits the firmware answers `null` for.
#[derive(Debug, Clone)]
pub struct StatusReportMask {
    fields: Vec<(&'static str, bool)>,
}

const DEFAULT_FIELDS: [&str; 31] = [
    "stat", "line", "vel", "feed", "unit", "coor", "momo", "plan", "path", "dist", "admo",
    "frmo", "tool", "posx", "posy", "posz", "posa", "posb", "posc", "mpox", "mpoy", "mpoz",
    "mpoa", "mpob", "mpoc", "spe", "spd", "spc", "sps", "com", "cof",
];

impl Default for StatusReportMask {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS.iter().map(|f| (*f, true)).collect(),
        }
    }
}

impl StatusReportMask {
    /// Disable a field
    pub fn clear(&mut self, key: &str) {
        for (field, enabled) in &mut self.fields {
            if *field == key {
                *enabled = false;
                return;
            }
        }
    }

    /// Whether a field is still enabled
    pub fn is_set(&self, key: &str) -> bool {
        self.fields
            .iter()
            .any(|(field, enabled)| *field == key && *enabled)
    }

    /// Enabled fields, in protocol order
    pub fn enabled_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(field, _)| *field)
            .collect()
    }
}

/// Frame decoder with mirrored machine state
#[derive(Debug)]
pub struct Runner {
    buffer: String,
    mask: StatusReportMask,
    settings: FirmwareSettings,
    state: MachineModel,
    pool_size: u32,
    // Raw spindle/coolant bits from the last status report.
    spindle_enable: bool,
    spindle_direction: bool,
    coolant_mist: bool,
    coolant_flood: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            buffer: String::new(),
            mask: StatusReportMask::default(),
            settings: FirmwareSettings {
                mfo: 1.0,
                sso: 1.0,
                mto: 1.0,
                ..Default::default()
            },
            state: MachineModel::default(),
            pool_size: 0,
            spindle_enable: false,
            spindle_direction: false,
            coolant_mist: false,
            coolant_flood: false,
        }
    }
}

const PROBE_FIELDS: [&str; 6] = ["spe", "spd", "spc", "sps", "com", "cof"];

impl Runner {
    /// Create a fresh runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed transport bytes; returns the decoded events in arrival order
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<RunnerEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);

            if line.is_empty() {
                continue;
            }
            events.push(RunnerEvent::Line(line.clone()));
            self.decode_line(&line, &mut events);
        }
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<RunnerEvent>) {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => {
                events.push(RunnerEvent::Raw(line.to_string()));
                return;
            }
        };
        let Some(obj) = value.as_object() else {
            events.push(RunnerEvent::Raw(line.to_string()));
            return;
        };

        if let Some(payload) = obj.get("r") {
            let line_number = self.apply_response_payload(payload, events);
            // The footer rides beside the payload on current firmware and
            // inside it on older builds.
            let footer = obj.get("f").or_else(|| payload.get("f"));
            if let Some(footer) = footer.and_then(Value::as_array) {
                let values: Vec<i64> = footer.iter().filter_map(Value::as_i64).collect();
                let footer = Footer::from_values(&values);
                self.state.footer = footer;
                events.push(RunnerEvent::Footer(footer));
            }
            events.push(RunnerEvent::Response { line_number });
        } else if let Some(qr) = obj.get("qr").and_then(Value::as_u64) {
            self.apply_queue_report(qr as u32);
            events.push(RunnerEvent::QueueReport(qr as u32));
        } else if let Some(sr) = obj.get("sr").and_then(Value::as_object) {
            self.apply_status_report(sr);
            events.push(RunnerEvent::StatusReport);
        } else if let Some(fb) = obj.get("fb").and_then(Value::as_f64) {
            self.settings.fb = fb;
        } else if let Some(hp) = obj.get("hp").and_then(Value::as_f64) {
            self.settings.hp = hp;
        } else if let Some(footer) = obj.get("f").and_then(Value::as_array) {
            let values: Vec<i64> = footer.iter().filter_map(Value::as_i64).collect();
            let footer = Footer::from_values(&values);
            self.state.footer = footer;
            events.push(RunnerEvent::Footer(footer));
        } else {
            events.push(RunnerEvent::Raw(line.to_string()));
        }
    }

    fn apply_response_payload(
        &mut self,
        payload: &Value,
        events: &mut Vec<RunnerEvent>,
    ) -> Option<u32> {
        let obj = payload.as_object()?;

        // Capability probes answer null for unsupported fields; those
        // fields must not appear in the status-report selection.
        for probe in PROBE_FIELDS {
            if matches!(obj.get(probe), Some(Value::Null)) {
                tracing::debug!(field = probe, "Capability unsupported, clearing mask bit");
                self.mask.clear(probe);
            }
        }

        if let Some(fb) = obj.get("fb").and_then(Value::as_f64) {
            self.settings.fb = fb;
        }
        if let Some(hp) = obj.get("hp").and_then(Value::as_f64) {
            self.settings.hp = hp;
        }
        if let Some(mt) = obj.get("mt").and_then(Value::as_f64) {
            self.settings.mt = mt;
        }
        if let Some(mfo) = obj.get("mfo").and_then(Value::as_f64) {
            self.settings.mfo = mfo;
        }
        if let Some(sso) = obj.get("sso").and_then(Value::as_f64) {
            self.settings.sso = sso;
        }
        if let Some(mto) = obj.get("mto").and_then(Value::as_f64) {
            self.settings.mto = mto;
        }
        if let Some(sys) = obj.get("sys").and_then(Value::as_object) {
            for (key, value) in sys {
                if let Some(n) = value.as_f64() {
                    match key.as_str() {
                        "fb" => self.settings.fb = n,
                        "hp" => self.settings.hp = n,
                        "mt" => self.settings.mt = n,
                        "mfo" => self.settings.mfo = n,
                        "sso" => self.settings.sso = n,
                        "mto" => self.settings.mto = n,
                        _ => {}
                    }
                }
            }
        }

        if let Some(sr) = obj.get("sr").and_then(Value::as_object) {
            self.apply_status_report(sr);
            events.push(RunnerEvent::StatusReport);
        }
        if let Some(qr) = obj.get("qr").and_then(Value::as_u64) {
            self.apply_queue_report(qr as u32);
            events.push(RunnerEvent::QueueReport(qr as u32));
        }

        obj.get("n").and_then(Value::as_u64).map(|n| n as u32)
    }

    fn apply_queue_report(&mut self, qr: u32) {
        self.state.qr = qr;
        // The largest report ever seen is the planner's pool size; the
        // firmware reports a full queue right after reset.
        if qr > self.pool_size {
            self.pool_size = qr;
        }
    }

    fn apply_status_report(&mut self, sr: &serde_json::Map<String, Value>) {
        for (key, value) in sr {
            match key.as_str() {
                "stat" => {
                    if let Some(stat) = value.as_u64() {
                        self.state.state = MachineState::from_stat(stat as u8);
                    }
                }
                "line" => {
                    if let Some(line) = value.as_u64() {
                        self.state.line = line as u32;
                    }
                }
                "vel" => self.state.vel = value.as_f64().unwrap_or(self.state.vel),
                "feed" => self.state.feed = value.as_f64().unwrap_or(self.state.feed),
                "momo" => {
                    if let Some(m) = value.as_u64() {
                        self.state.modal.motion = momo_word(m).to_string();
                    }
                }
                "coor" => {
                    if let Some(c) = value.as_u64() {
                        self.state.modal.wcs = coor_word(c).to_string();
                    }
                }
                "plan" => {
                    if let Some(p) = value.as_u64() {
                        self.state.modal.plane = plan_word(p).to_string();
                    }
                }
                "unit" => {
                    if let Some(u) = value.as_u64() {
                        self.state.modal.units = unit_word(u).to_string();
                        self.state.units = cncflow_core::Units::from_stat(u as u8);
                    }
                }
                "dist" => {
                    if let Some(d) = value.as_u64() {
                        self.state.modal.distance = dist_word(d).to_string();
                    }
                }
                "frmo" => {
                    if let Some(f) = value.as_u64() {
                        self.state.modal.feedrate = frmo_word(f).to_string();
                    }
                }
                "path" => {
                    if let Some(p) = value.as_u64() {
                        self.state.modal.path = path_word(p).to_string();
                    }
                }
                "tool" => {
                    if let Some(t) = value.as_u64() {
                        self.state.tool = t as u32;
                    }
                }
                "spe" => self.spindle_enable = value.as_u64().unwrap_or(0) != 0,
                "spd" => self.spindle_direction = value.as_u64().unwrap_or(0) != 0,
                "com" => self.coolant_mist = value.as_u64().unwrap_or(0) != 0,
                "cof" => self.coolant_flood = value.as_u64().unwrap_or(0) != 0,
                _ => {
                    if let Some(axis) = key.strip_prefix("pos") {
                        if let (Some(axis), Some(v)) = (axis.chars().next(), value.as_f64()) {
                            self.state.wpos.set_axis(axis, v);
                        }
                    } else if let Some(axis) = key.strip_prefix("mpo") {
                        if let (Some(axis), Some(v)) = (axis.chars().next(), value.as_f64()) {
                            self.state.mpos.set_axis(axis, v);
                        }
                    }
                }
            }
        }

        self.state.modal.spindle = if self.spindle_enable {
            if self.spindle_direction {
                "M4".to_string()
            } else {
                "M3".to_string()
            }
        } else {
            "M5".to_string()
        };

        let mut coolant = Vec::new();
        if self.coolant_mist {
            coolant.push("M7".to_string());
        }
        if self.coolant_flood {
            coolant.push("M8".to_string());
        }
        self.state.modal.coolant = coolant;
    }

    /// Machine position (absolute)
    pub fn machine_position(&self) -> cncflow_core::Position {
        self.state.mpos
    }

    /// Work position, from this runner's state or an override snapshot
    pub fn work_position(&self, state: Option<&MachineModel>) -> cncflow_core::Position {
        state.unwrap_or(&self.state).wpos
    }

    /// Current modal group
    pub fn modal_group(&self) -> &cncflow_core::ModalGroup {
        &self.state.modal
    }

    /// Active tool number
    pub fn tool(&self) -> u32 {
        self.state.tool
    }

    /// Whether the machine is alarmed
    pub fn is_alarm(&self) -> bool {
        self.state.state.is_alarm()
    }

    /// Whether the machine is idle
    pub fn is_idle(&self) -> bool {
        self.state.state.is_idle()
    }

    /// Planner buffer pool size, derived from queue reports
    pub fn planner_buffer_pool_size(&self) -> u32 {
        self.pool_size
    }

    /// Mirrored firmware settings
    pub fn settings(&self) -> &FirmwareSettings {
        &self.settings
    }

    /// Mirrored machine state
    pub fn state(&self) -> &MachineModel {
        &self.state
    }

    /// Status-report field mask
    pub fn report_mask(&self) -> &StatusReportMask {
        &self.mask
    }
}

fn momo_word(value: u64) -> &'static str {
    match value {
        0 => "G0",
        1 => "G1",
        2 => "G2",
        3 => "G3",
        4 => "G80",
        _ => "G0",
    }
}

fn coor_word(value: u64) -> &'static str {
    match value {
        0 => "G53",
        1 => "G54",
        2 => "G55",
        3 => "G56",
        4 => "G57",
        5 => "G58",
        6 => "G59",
        _ => "G54",
    }
}

fn plan_word(value: u64) -> &'static str {
    match value {
        0 => "G17",
        1 => "G18",
        2 => "G19",
        _ => "G17",
    }
}

fn unit_word(value: u64) -> &'static str {
    match value {
        0 => "G20",
        1 => "G21",
        _ => "G21",
    }
}

fn dist_word(value: u64) -> &'static str {
    match value {
        0 => "G90",
        1 => "G91",
        _ => "G90",
    }
}

fn frmo_word(value: u64) -> &'static str {
    match value {
        0 => "G93",
        1 => "G94",
        2 => "G95",
        _ => "G94",
    }
}

fn path_word(value: u64) -> &'static str {
    match value {
        0 => "G61",
        1 => "G61.1",
        2 => "G64",
        _ => "G61",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(runner: &mut Runner, s: &str) -> Vec<RunnerEvent> {
        runner.push_bytes(s.as_bytes())
    }

    #[test]
    fn assembles_partial_lines() {
        let mut runner = Runner::new();
        assert!(push(&mut runner, "{\"qr\":").is_empty());
        let events = push(&mut runner, "28}\n");
        assert!(events.contains(&RunnerEvent::QueueReport(28)));
    }

    #[test]
    fn classifies_response_with_footer() {
        let mut runner = Runner::new();
        let events = push(&mut runner, "{\"r\":{\"n\":5},\"f\":[1,0,10,8772]}\n");
        assert!(matches!(
            events[1],
            RunnerEvent::Footer(Footer { status_code: 0, .. })
        ));
        assert!(matches!(
            events[2],
            RunnerEvent::Response {
                line_number: Some(5)
            }
        ));
    }

    #[test]
    fn footer_inside_payload_still_decodes() {
        let mut runner = Runner::new();
        let events = push(&mut runner, "{\"r\":{\"f\":[1,20,10,0]}}\n");
        assert!(matches!(
            events[1],
            RunnerEvent::Footer(Footer {
                status_code: 20,
                ..
            })
        ));
    }

    #[test]
    fn capability_null_clears_mask_bit() {
        let mut runner = Runner::new();
        assert!(runner.report_mask().is_set("spe"));
        push(&mut runner, "{\"r\":{\"spe\":null},\"f\":[1,0,10,0]}\n");
        assert!(!runner.report_mask().is_set("spe"));
        assert!(runner.report_mask().is_set("spd"));
    }

    #[test]
    fn status_report_updates_positions_and_modal() {
        let mut runner = Runner::new();
        push(
            &mut runner,
            "{\"sr\":{\"stat\":5,\"posx\":1.5,\"posy\":2.0,\"mpox\":10.0,\"momo\":1,\"coor\":2,\"unit\":1,\"tool\":3}}\n",
        );
        let state = runner.state();
        assert_eq!(state.state, MachineState::Run);
        assert_eq!(state.wpos.x, 1.5);
        assert_eq!(state.mpos.x, 10.0);
        assert_eq!(state.modal.motion, "G1");
        assert_eq!(state.modal.wcs, "G55");
        assert_eq!(state.modal.units, "G21");
        assert_eq!(state.units, cncflow_core::Units::MM);
        assert_eq!(runner.tool(), 3);
        assert!(!runner.is_idle());
    }

    #[test]
    fn spindle_and_coolant_modals() {
        let mut runner = Runner::new();
        push(&mut runner, "{\"sr\":{\"spe\":1,\"spd\":0,\"com\":1,\"cof\":1}}\n");
        assert_eq!(runner.modal_group().spindle, "M3");
        assert_eq!(runner.modal_group().coolant, vec!["M7", "M8"]);

        push(&mut runner, "{\"sr\":{\"spe\":0,\"com\":0,\"cof\":0}}\n");
        assert_eq!(runner.modal_group().spindle, "M5");
        assert!(runner.modal_group().coolant.is_empty());
    }

    #[test]
    fn queue_report_tracks_pool_size() {
        let mut runner = Runner::new();
        push(&mut runner, "{\"qr\":28}\n");
        assert_eq!(runner.planner_buffer_pool_size(), 28);
        push(&mut runner, "{\"qr\":4}\n");
        assert_eq!(runner.planner_buffer_pool_size(), 28);
        assert_eq!(runner.state().qr, 4);
    }

    #[test]
    fn firmware_build_from_response() {
        let mut runner = Runner::new();
        push(&mut runner, "{\"r\":{\"fb\":100.10},\"f\":[1,0,10,0]}\n");
        assert_eq!(runner.settings().fb, 100.10);

        push(&mut runner, "{\"r\":{\"sys\":{\"fb\":101.02,\"mt\":2.0}}}\n");
        assert_eq!(runner.settings().fb, 101.02);
        assert_eq!(runner.settings().mt, 2.0);
    }

    #[test]
    fn nested_status_report_in_response() {
        let mut runner = Runner::new();
        let events = push(&mut runner, "{\"r\":{\"sr\":{\"stat\":3}},\"f\":[1,0,10,0]}\n");
        assert!(events.contains(&RunnerEvent::StatusReport));
        assert!(runner.is_idle());
    }

    #[test]
    fn garbage_is_raw() {
        let mut runner = Runner::new();
        let events = push(&mut runner, "SYSTEM READY\n");
        assert_eq!(events[1], RunnerEvent::Raw("SYSTEM READY".to_string()));
    }

    #[test]
    fn alarm_state() {
        let mut runner = Runner::new();
        push(&mut runner, "{\"sr\":{\"stat\":2}}\n");
        assert!(runner.is_alarm());
    }
}
