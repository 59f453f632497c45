//! Named-event triggers.
//!
//! Clients can attach an action to lifecycle events (`controller:ready`,
//! `sender:start`, ...): either a G-code snippet injected through the feeder
//! path or a shell command handed to the external task runner.

use std::collections::HashMap;

/// External task runner seam; executes shell commands configured on
/// `system`-typed triggers
pub trait TaskRunner: Send {
    /// Run a shell command; failures are the runner's problem to report
    fn run(&mut self, command: &str);
}

/// Task runner that only logs; the default until a host installs one
#[derive(Debug, Default)]
pub struct NoopTaskRunner;

impl TaskRunner for NoopTaskRunner {
    fn run(&mut self, command: &str) {
        tracing::info!(command, "No task runner installed, skipping system trigger");
    }
}

/// What a trigger does when it fires
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    /// Inject this G-code through the feeder
    Gcode(String),
    /// Hand this command to the task runner
    System(String),
}

/// Event-name to action mapping
pub struct EventTrigger {
    actions: HashMap<String, TriggerAction>,
    runner: Box<dyn TaskRunner>,
}

impl EventTrigger {
    /// Create an empty trigger table with the logging task runner
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
            runner: Box::new(NoopTaskRunner),
        }
    }

    /// Replace the task runner
    pub fn set_task_runner(&mut self, runner: Box<dyn TaskRunner>) {
        self.runner = runner;
    }

    /// Configure an action for an event name
    pub fn set(&mut self, event: impl Into<String>, action: TriggerAction) {
        self.actions.insert(event.into(), action);
    }

    /// Remove the action for an event name
    pub fn remove(&mut self, event: &str) {
        self.actions.remove(event);
    }

    /// Fire an event
    ///
    /// System actions run immediately; a G-code action is returned so the
    /// caller can inject it through the feeder.
    pub fn trigger(&mut self, event: &str) -> Option<String> {
        match self.actions.get(event) {
            Some(TriggerAction::Gcode(code)) => {
                tracing::debug!(event, "Trigger fires G-code");
                Some(code.clone())
            }
            Some(TriggerAction::System(command)) => {
                tracing::debug!(event, command, "Trigger fires system task");
                let command = command.clone();
                self.runner.run(&command);
                None
            }
            None => None,
        }
    }
}

impl Default for EventTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTrigger")
            .field("actions", &self.actions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingRunner {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl TaskRunner for RecordingRunner {
        fn run(&mut self, command: &str) {
            self.calls.lock().unwrap().push(command.to_string());
        }
    }

    #[test]
    fn gcode_action_is_returned() {
        let mut triggers = EventTrigger::new();
        triggers.set(
            "controller:ready",
            TriggerAction::Gcode("G21\nG90".to_string()),
        );
        assert_eq!(
            triggers.trigger("controller:ready").as_deref(),
            Some("G21\nG90")
        );
        assert_eq!(triggers.trigger("sender:start"), None);
    }

    #[test]
    fn system_action_runs_task() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut triggers = EventTrigger::new();
        triggers.set_task_runner(Box::new(RecordingRunner {
            calls: calls.clone(),
        }));
        triggers.set(
            "sender:stop",
            TriggerAction::System("beep.sh".to_string()),
        );

        assert_eq!(triggers.trigger("sender:stop"), None);
        assert_eq!(calls.lock().unwrap().as_slice(), ["beep.sh"]);
    }

    #[test]
    fn removed_trigger_stops_firing() {
        let mut triggers = EventTrigger::new();
        triggers.set("e", TriggerAction::Gcode("M5".to_string()));
        triggers.remove("e");
        assert_eq!(triggers.trigger("e"), None);
    }
}
