//! # cncflow Core
//!
//! Core types, events, and configuration for the cncflow CNC controller
//! driver. Provides the data model mirrored from TinyG/g2core status
//! reports, the error types used across the workspace, the broadcast
//! event bus toward clients, and the driver configuration section.

pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod event_bus;
pub mod logging;

pub use config::{ConnectionDefaults, DriverConfig, ExceptionConfig};
pub use data::{
    FeederStatus, FirmwareSettings, Footer, HoldReason, MachineModel, MachineState, ModalGroup,
    Position, SenderStatus, Units, WorkflowState,
};
pub use error::{ConnectionError, ControllerError, Error, GcodeError, Result};
pub use event_bus::{
    ConnectionEvent, ControllerEvent, DriverEvent, EventBus, EventBusConfig, EventCategory,
    EventFilter, FeederEvent, SenderEvent, SubscriptionId, WorkflowEvent,
};
pub use logging::init_logging;
