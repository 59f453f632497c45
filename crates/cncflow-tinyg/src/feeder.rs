//! Manual-command feeder.
//!
//! An unbounded FIFO for interactive and jogging commands. One line leaves
//! the queue at a time, on demand, whenever the flow controller decides the
//! firmware can take it. Holdable; hold and unhold are idempotent.

use std::collections::VecDeque;

use cncflow_core::{FeederStatus, HoldReason};

use crate::expression::Context;

/// FIFO of pending manual command lines
#[derive(Debug, Default)]
pub struct Feeder {
    queue: VecDeque<(String, Context)>,
    hold: bool,
    hold_reason: Option<HoldReason>,
    pending: bool,
}

impl Feeder {
    /// Create an empty feeder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append lines that share one evaluation context
    pub fn feed(&mut self, lines: &[String], context: Context) {
        for line in lines {
            self.queue.push_back((line.clone(), context.clone()));
        }
        tracing::debug!(queued = self.queue.len(), "Feeder queued lines");
    }

    /// Take the next line, unless holding or empty
    pub fn take(&mut self) -> Option<(String, Context)> {
        if self.hold {
            return None;
        }
        let item = self.queue.pop_front();
        self.pending = item.is_some();
        item
    }

    /// Mark the in-flight line as finished
    pub fn settle(&mut self) {
        self.pending = false;
    }

    /// Whether there is pending work without consuming anything
    pub fn peek(&self) -> bool {
        !self.queue.is_empty() || self.pending
    }

    /// Raise a hold; idempotent
    pub fn hold(&mut self, reason: HoldReason) {
        if self.hold {
            return;
        }
        tracing::debug!(?reason, "Feeder hold");
        self.hold = true;
        self.hold_reason = Some(reason);
    }

    /// Release a hold; idempotent
    pub fn unhold(&mut self) {
        if !self.hold {
            return;
        }
        tracing::debug!("Feeder unhold");
        self.hold = false;
        self.hold_reason = None;
    }

    /// Whether the feeder is holding
    pub fn is_holding(&self) -> bool {
        self.hold
    }

    /// The current hold reason
    pub fn hold_reason(&self) -> Option<&HoldReason> {
        self.hold_reason.as_ref()
    }

    /// Drain the queue and clear any hold
    pub fn reset(&mut self) {
        self.queue.clear();
        self.hold = false;
        self.hold_reason = None;
        self.pending = false;
    }

    /// Number of queued lines
    pub fn size(&self) -> usize {
        self.queue.len()
    }

    /// Status snapshot for broadcasting
    pub fn status(&self) -> FeederStatus {
        FeederStatus {
            hold: self.hold,
            hold_reason: self.hold_reason.clone(),
            queue: self.queue.len(),
            pending: self.pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fifo_order() {
        let mut feeder = Feeder::new();
        feeder.feed(&lines(&["G0 X0", "G0 X1"]), Context::new());
        assert_eq!(feeder.take().unwrap().0, "G0 X0");
        assert_eq!(feeder.take().unwrap().0, "G0 X1");
        assert!(feeder.take().is_none());
    }

    #[test]
    fn hold_blocks_take() {
        let mut feeder = Feeder::new();
        feeder.feed(&lines(&["G0 X0"]), Context::new());
        feeder.hold(HoldReason::Wait);
        assert!(feeder.take().is_none());
        assert!(feeder.peek());

        feeder.unhold();
        assert!(feeder.take().is_some());
    }

    #[test]
    fn hold_and_unhold_are_idempotent() {
        let mut feeder = Feeder::new();
        feeder.hold(HoldReason::Wait);
        feeder.hold(HoldReason::Pause {
            data: "M0".to_string(),
        });
        // The first reason wins.
        assert_eq!(feeder.hold_reason(), Some(&HoldReason::Wait));
        feeder.unhold();
        feeder.unhold();
        assert!(!feeder.is_holding());
    }

    #[test]
    fn reset_drains_and_clears_hold() {
        let mut feeder = Feeder::new();
        feeder.feed(&lines(&["G0 X0", "G0 X1"]), Context::new());
        feeder.hold(HoldReason::Wait);
        feeder.reset();
        assert_eq!(feeder.size(), 0);
        assert!(!feeder.is_holding());
        assert!(!feeder.peek());
    }

    #[test]
    fn status_snapshot() {
        let mut feeder = Feeder::new();
        feeder.feed(&lines(&["G0 X0"]), Context::new());
        let status = feeder.status();
        assert_eq!(status.queue, 1);
        assert!(!status.hold);
    }
}
