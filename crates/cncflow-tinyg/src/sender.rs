//! Program sender.
//!
//! Streams a loaded program under the send/response discipline: at most one
//! line is in flight between a transmission and the matching acknowledgement.
//! Counters obey `received <= sent <= total` at all times; `rewind` puts the
//! program back to line zero so a stopped job can be re-run.

use std::collections::HashMap;
use std::time::Instant;

use cncflow_core::{GcodeError, HoldReason, MachineModel, Result, SenderStatus};

use crate::expression::Context;
use crate::pipeline::{self, StageHold, WAIT};

/// A line ready for the wire, possibly carrying a pause request
#[derive(Debug, Clone, PartialEq)]
pub struct SendItem {
    /// The wire line: whitespace removed, leading `N<sent>` applied
    pub line: String,
    /// Workflow pause requested by M0/M1/M6 on this line
    pub pause: Option<String>,
}

/// Streaming driver for a loaded program
#[derive(Debug, Default)]
pub struct Sender {
    name: String,
    lines: Vec<String>,
    total: usize,
    sent: usize,
    received: usize,
    hold: bool,
    hold_reason: Option<HoldReason>,
    start_time: Option<Instant>,
    finish_time: Option<Instant>,
    context: Context,
}

impl Sender {
    /// Create a sender with no program loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a program
    ///
    /// Splits on LF or CRLF and appends a final `%wait` so the job does not
    /// count as finished until the planner has drained. Rejects empty
    /// content.
    pub fn load(&mut self, name: &str, content: &str, context: Context) -> Result<()> {
        if content.trim().is_empty() {
            return Err(GcodeError::EmptyProgram.into());
        }

        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        lines.push(format!("{} ; Wait for the planner to empty", WAIT));

        self.name = name.to_string();
        self.total = lines.len();
        self.lines = lines;
        self.sent = 0;
        self.received = 0;
        self.hold = false;
        self.hold_reason = None;
        self.start_time = None;
        self.finish_time = None;
        self.context = context;

        tracing::info!(name, total = self.total, "Program loaded");
        Ok(())
    }

    /// Clear the loaded program and all counters
    pub fn unload(&mut self) {
        *self = Self::default();
    }

    /// Whether a program is loaded
    pub fn is_loaded(&self) -> bool {
        self.total > 0
    }

    /// Rewind to line zero and clear any hold
    pub fn rewind(&mut self) {
        self.sent = 0;
        self.received = 0;
        self.hold = false;
        self.hold_reason = None;
        self.start_time = Some(Instant::now());
        self.finish_time = None;
    }

    /// Produce the next wire line
    ///
    /// No-op while holding, drained, or with a line already in flight (the
    /// send/response discipline allows exactly one). Lines that transmit
    /// nothing (assignments, comment-only lines) are consumed and
    /// acknowledged locally so the counters keep pairing with firmware
    /// acks.
    pub fn next(
        &mut self,
        shared: &mut HashMap<String, f64>,
        model: &MachineModel,
    ) -> Option<SendItem> {
        loop {
            if self.hold || self.sent >= self.total || self.received < self.sent {
                return None;
            }

            let raw = self.lines[self.sent].clone();
            let outcome = pipeline::process(&raw, &mut self.context, shared, model);
            self.sent += 1;

            let mut pause = None;
            match outcome.hold {
                Some(StageHold::Wait) => {
                    self.hold(HoldReason::Wait);
                }
                Some(StageHold::Pause { data }) => {
                    pause = Some(data);
                }
                None => {}
            }

            let stripped: String = outcome.line.chars().filter(|c| !c.is_whitespace()).collect();
            if stripped.is_empty() {
                // Nothing hit the wire, so no ack will come back for it.
                self.ack_local();
                continue;
            }

            return Some(SendItem {
                line: format!("N{}{}", self.sent, strip_line_number(&stripped)),
                pause,
            });
        }
    }

    /// Record a firmware acknowledgement; returns true when the program
    /// just completed
    pub fn ack(&mut self) -> bool {
        if self.received >= self.sent {
            tracing::warn!(
                received = self.received,
                sent = self.sent,
                "Acknowledgement with nothing in flight"
            );
            return false;
        }
        self.received += 1;
        self.check_end()
    }

    fn ack_local(&mut self) {
        if self.received < self.sent {
            self.received += 1;
            self.check_end();
        }
    }

    fn check_end(&mut self) -> bool {
        if self.received == self.total {
            self.finish_time = Some(Instant::now());
            tracing::info!(name = %self.name, total = self.total, "Program complete");
            true
        } else {
            false
        }
    }

    /// Raise a hold; idempotent
    pub fn hold(&mut self, reason: HoldReason) {
        if self.hold {
            return;
        }
        tracing::debug!(?reason, "Sender hold");
        self.hold = true;
        self.hold_reason = Some(reason);
    }

    /// Release a hold; idempotent
    pub fn unhold(&mut self) {
        if !self.hold {
            return;
        }
        tracing::debug!("Sender unhold");
        self.hold = false;
        self.hold_reason = None;
    }

    /// Whether the sender is holding
    pub fn is_holding(&self) -> bool {
        self.hold
    }

    /// Lines handed to the transport
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Lines acknowledged
    pub fn received(&self) -> usize {
        self.received
    }

    /// Total program lines
    pub fn total(&self) -> usize {
        self.total
    }

    /// When the last line was acknowledged, if the program completed
    pub fn finish_time(&self) -> Option<Instant> {
        self.finish_time
    }

    /// Slide or clear the completion timestamp
    ///
    /// The query timer pushes the timestamp forward while the machine is
    /// still moving and clears it once completion has been handled.
    pub fn set_finish_time(&mut self, at: Option<Instant>) {
        self.finish_time = at;
    }

    /// Status snapshot for broadcasting
    pub fn status(&self) -> SenderStatus {
        SenderStatus {
            name: self.name.clone(),
            total: self.total,
            sent: self.sent,
            received: self.received,
            hold: self.hold,
            hold_reason: self.hold_reason.clone(),
        }
    }
}

/// Drop a leading `N<digits>` so the sender's own numbering wins
fn strip_line_number(line: &str) -> &str {
    let rest = match line.strip_prefix('N').or_else(|| line.strip_prefix('n')) {
        Some(rest) => rest,
        None => return line,
    };
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return line;
    }
    &rest[digits..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_line(sender: &mut Sender) -> Option<SendItem> {
        let mut shared = HashMap::new();
        sender.next(&mut shared, &MachineModel::default())
    }

    #[test]
    fn load_appends_wait_and_rejects_empty() {
        let mut sender = Sender::new();
        assert!(sender.load("empty", "  \n ", Context::new()).is_err());

        sender.load("job", "G0 X0\nG1 X1", Context::new()).unwrap();
        assert_eq!(sender.total(), 3);
        assert!(sender.is_loaded());
    }

    #[test]
    fn next_numbers_lines_and_strips_whitespace() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0 Y10\nG1 X1", Context::new()).unwrap();

        let item = next_line(&mut sender).unwrap();
        assert_eq!(item.line, "N1G0X0Y10");
        assert_eq!(sender.sent(), 1);

        sender.ack();
        let item = next_line(&mut sender).unwrap();
        assert_eq!(item.line, "N2G1X1");
    }

    #[test]
    fn existing_line_numbers_are_rewritten() {
        let mut sender = Sender::new();
        sender.load("job", "N99 G0 X0", Context::new()).unwrap();
        let item = next_line(&mut sender).unwrap();
        assert_eq!(item.line, "N1G0X0");
    }

    #[test]
    fn counters_stay_ordered() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0\nG1 X1", Context::new()).unwrap();

        next_line(&mut sender);
        assert!(sender.received() <= sender.sent());
        assert!(!sender.ack() && sender.received() == 1);

        // Ack with nothing in flight is protocol drift, not a counter bump.
        assert!(!sender.ack());
        assert_eq!(sender.received(), 1);
    }

    #[test]
    fn one_line_in_flight() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0\nG1 X1", Context::new()).unwrap();

        assert!(next_line(&mut sender).is_some());
        // The first line has not been acknowledged yet.
        assert!(next_line(&mut sender).is_none());

        sender.ack();
        assert!(next_line(&mut sender).is_some());
    }

    #[test]
    fn hold_blocks_next() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0", Context::new()).unwrap();
        sender.hold(HoldReason::Pause {
            data: "M0".to_string(),
        });
        assert!(next_line(&mut sender).is_none());
        sender.unhold();
        assert!(next_line(&mut sender).is_some());
    }

    #[test]
    fn final_wait_holds_sender() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0", Context::new()).unwrap();

        assert_eq!(next_line(&mut sender).unwrap().line, "N1G0X0");
        sender.ack();

        // The appended %wait transmits a dwell and raises the hold.
        let item = next_line(&mut sender).unwrap();
        assert_eq!(item.line, "N2G4P0.5");
        assert!(sender.is_holding());

        assert!(sender.ack());
        assert_eq!(sender.received(), sender.total());
        assert!(sender.finish_time().is_some());
    }

    #[test]
    fn m0_returns_pause_request_and_still_transmits() {
        let mut sender = Sender::new();
        sender.load("job", "M0\nG0 X0", Context::new()).unwrap();
        let item = next_line(&mut sender).unwrap();
        assert_eq!(item.line, "N1M0");
        assert_eq!(item.pause.as_deref(), Some("M0"));
    }

    #[test]
    fn assignment_lines_ack_locally() {
        let mut sender = Sender::new();
        sender
            .load("job", "%zsafe = 2\nG0 Z[zsafe]", Context::new())
            .unwrap();

        let item = next_line(&mut sender).unwrap();
        // The assignment was consumed and locally acknowledged; the first
        // wire line is the translated move, numbered by consumed count.
        assert_eq!(item.line, "N2G0Z2");
        assert_eq!(sender.sent(), 2);
        assert_eq!(sender.received(), 1);
    }

    #[test]
    fn rewind_restores_line_zero() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0\nG1 X1", Context::new()).unwrap();
        next_line(&mut sender);
        sender.ack();
        sender.rewind();
        assert_eq!(sender.sent(), 0);
        assert_eq!(sender.received(), 0);
        assert_eq!(next_line(&mut sender).unwrap().line, "N1G0X0");
    }

    #[test]
    fn unload_then_reload_restores_state() {
        let mut sender = Sender::new();
        sender.load("job", "G0 X0\nG1 X1", Context::new()).unwrap();
        let first = sender.status();
        sender.unload();
        assert!(!sender.is_loaded());
        sender.load("job", "G0 X0\nG1 X1", Context::new()).unwrap();
        assert_eq!(sender.status(), first);
    }
}
