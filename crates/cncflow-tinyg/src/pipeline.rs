//! The shared expression stage.
//!
//! Every line pulled from the feeder or the sender passes through here
//! before transmission: comment stripping, `%wait` dwell substitution,
//! `%` assignment evaluation, `[expr]` translation, and pause-word
//! inspection. The stage reports what happened through a [`StageOutcome`];
//! the owning pipeline applies the side effects (feeder hold vs workflow
//! pause), which keeps feeder, sender, and workflow free of back-pointers.

use std::collections::HashMap;

use cncflow_core::MachineModel;

use crate::expression::{self, Context};
use crate::gcode;

/// The `%wait` pseudo-command: hold until the planner queue is empty.
pub const WAIT: &str = "%wait";

/// A short dwell transmitted in place of `%wait` so the planner keeps one
/// trailing segment to drain.
const WAIT_DWELL: &str = "G4 P0.5";

/// What the stage wants the owning pipeline to do
#[derive(Debug, Clone, PartialEq)]
pub enum StageHold {
    /// Hold until a queue report shows the planner is empty
    Wait,
    /// Program pause (`M0`, `M1`) or tool change (`M6`)
    Pause {
        /// The word that raised the pause
        data: String,
    },
}

/// Result of passing one line through the stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    /// The line to transmit; empty means nothing is transmitted
    pub line: String,
    /// Hold to raise on the owning pipeline
    pub hold: Option<StageHold>,
}

/// Process one raw source line
pub fn process(
    raw: &str,
    job: &mut Context,
    shared: &mut HashMap<String, f64>,
    model: &MachineModel,
) -> StageOutcome {
    // Trailing `;` comments never reach the firmware.
    let line = match raw.find(';') {
        Some(pos) => raw[..pos].trim(),
        None => raw.trim(),
    };

    if let Some(rest) = line.strip_prefix('%') {
        if line == WAIT {
            tracing::debug!("Waiting for the planner queue to empty");
            return StageOutcome {
                line: WAIT_DWELL.to_string(),
                hold: Some(StageHold::Wait),
            };
        }

        expression::apply_assignments(rest, job, shared, model);
        return StageOutcome {
            line: String::new(),
            hold: None,
        };
    }

    let ctx = expression::build_context(shared, job, model);
    let translated = expression::translate(line, &ctx);

    let words = gcode::words(&translated);
    let hold = if gcode::has_word(&words, 'M', 0.0) {
        Some(StageHold::Pause {
            data: "M0".to_string(),
        })
    } else if gcode::has_word(&words, 'M', 1.0) {
        Some(StageHold::Pause {
            data: "M1".to_string(),
        })
    } else if gcode::has_word(&words, 'M', 6.0) {
        Some(StageHold::Pause {
            data: "M6".to_string(),
        })
    } else {
        None
    };

    StageOutcome {
        line: translated,
        hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn run(line: &str) -> StageOutcome {
        let mut job = Context::new();
        let mut shared = HashMap::new();
        process(line, &mut job, &mut shared, &MachineModel::default())
    }

    #[test]
    fn strips_comments() {
        let out = run("G0 X0 ; rapid home");
        assert_eq!(out.line, "G0 X0");
        assert_eq!(out.hold, None);
    }

    #[test]
    fn wait_becomes_dwell_and_holds() {
        let out = run("%wait ; Wait for the planner to empty");
        assert_eq!(out.line, "G4 P0.5");
        assert_eq!(out.hold, Some(StageHold::Wait));
    }

    #[test]
    fn assignments_transmit_nothing() {
        let mut job = Context::new();
        let mut shared = HashMap::new();
        let out = process(
            "%zsafe = zmax + 2",
            &mut job,
            &mut shared,
            &MachineModel::default(),
        );
        assert_eq!(out.line, "");
        assert_eq!(out.hold, None);
        assert_eq!(job.get("zsafe").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn m0_raises_program_pause() {
        let out = run("M0");
        assert_eq!(
            out.hold,
            Some(StageHold::Pause {
                data: "M0".to_string()
            })
        );
        assert_eq!(out.line, "M0");
    }

    #[test]
    fn m1_and_m6_raise_holds() {
        assert_eq!(
            run("M1").hold,
            Some(StageHold::Pause {
                data: "M1".to_string()
            })
        );
        assert_eq!(
            run("T2 M6").hold,
            Some(StageHold::Pause {
                data: "M6".to_string()
            })
        );
    }

    #[test]
    fn m30_does_not_pause() {
        assert_eq!(run("M30").hold, None);
    }

    #[test]
    fn brackets_translate_before_inspection() {
        let mut job = Context::new();
        job.insert("p".to_string(), Value::from(0.0));
        let mut shared = HashMap::new();
        let out = process("M[p]", &mut job, &mut shared, &MachineModel::default());
        assert_eq!(out.line, "M0");
        assert!(out.hold.is_some());
    }
}
