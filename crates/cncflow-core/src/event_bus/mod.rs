//! Broadcast event distribution toward clients.
//!
//! The driver core publishes every client-facing event through a single
//! [`EventBus`]; the multi-client layer subscribes and fans out.

mod bus;
mod events;

pub use bus::{EventBus, EventBusConfig, EventFilter, SubscriptionId};
pub use events::{
    ConnectionEvent, ControllerEvent, DriverEvent, EventCategory, FeederEvent, SenderEvent,
    WorkflowEvent,
};
