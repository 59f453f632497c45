//! Workflow state machine.
//!
//! Three states over the loaded program: idle, running, paused. Transitions
//! that make no sense from the current state are ignored and logged; the
//! flow controller applies the protocol side effects on every accepted
//! transition.

use cncflow_core::WorkflowState;

/// The workflow state machine
#[derive(Debug, Default)]
pub struct Workflow {
    state: WorkflowState,
}

impl Workflow {
    /// Create a workflow in the idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Whether the workflow is idle
    pub fn is_idle(&self) -> bool {
        self.state == WorkflowState::Idle
    }

    /// Whether the workflow is running
    pub fn is_running(&self) -> bool {
        self.state == WorkflowState::Running
    }

    /// Whether the workflow is paused
    pub fn is_paused(&self) -> bool {
        self.state == WorkflowState::Paused
    }

    /// Start (or restart) the program; returns true if the state changed
    pub fn start(&mut self) -> bool {
        self.transition(WorkflowState::Running, "start")
    }

    /// Stop the program; returns true if the state changed
    pub fn stop(&mut self) -> bool {
        self.transition(WorkflowState::Idle, "stop")
    }

    /// Pause a running program; returns true if the state changed
    pub fn pause(&mut self) -> bool {
        if self.state != WorkflowState::Running {
            tracing::debug!(from = %self.state, "Ignoring pause");
            return false;
        }
        self.transition(WorkflowState::Paused, "pause")
    }

    /// Resume a paused program; returns true if the state changed
    pub fn resume(&mut self) -> bool {
        if self.state != WorkflowState::Paused {
            tracing::debug!(from = %self.state, "Ignoring resume");
            return false;
        }
        self.transition(WorkflowState::Running, "resume")
    }

    fn transition(&mut self, to: WorkflowState, what: &str) -> bool {
        if self.state == to {
            tracing::debug!(state = %self.state, "Ignoring {}", what);
            return false;
        }
        tracing::info!(from = %self.state, to = %to, "Workflow {}", what);
        self.state = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let workflow = Workflow::new();
        assert!(workflow.is_idle());
    }

    #[test]
    fn start_pause_resume_stop() {
        let mut workflow = Workflow::new();
        assert!(workflow.start());
        assert!(workflow.is_running());
        assert!(workflow.pause());
        assert!(workflow.is_paused());
        assert!(workflow.resume());
        assert!(workflow.is_running());
        assert!(workflow.stop());
        assert!(workflow.is_idle());
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let mut workflow = Workflow::new();
        assert!(!workflow.pause());
        assert!(!workflow.resume());
        assert!(workflow.is_idle());

        workflow.start();
        assert!(!workflow.resume());
        assert!(workflow.is_running());
    }

    #[test]
    fn pause_from_paused_is_ignored() {
        let mut workflow = Workflow::new();
        workflow.start();
        workflow.pause();
        assert!(!workflow.pause());
        assert!(workflow.is_paused());
    }
}
