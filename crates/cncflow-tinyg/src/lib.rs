//! # cncflow TinyG driver
//!
//! A CNC controller driver mediating between an interactive client layer
//! and TinyG/g2core firmware reached over a serial link or a raw TCP
//! socket. Streams G-code through two pipelines sharing one transport (an
//! unbounded manual feeder and a program sender) under a strict
//! send/response + planner-queue watermark protocol, mirrors machine state
//! from the firmware's JSON frames, and exposes the lifecycle command
//! surface (load, start, pause, resume, stop, overrides, homing, reset).

pub mod commands;
pub mod controller;
pub mod driver;
pub mod event_trigger;
pub mod expression;
pub mod feeder;
pub mod gcode;
pub mod pipeline;
pub mod runner;
pub mod sender;
pub mod status_codes;
pub mod transport;
pub mod workflow;

pub use commands::{Command, EmptyMacroStore, FsProgramLoader, MacroRecord, MacroStore, ProgramLoader};
pub use controller::TinygController;
pub use driver::{SenderGate, TinygDriver};
pub use event_trigger::{EventTrigger, NoopTaskRunner, TaskRunner, TriggerAction};
pub use feeder::Feeder;
pub use runner::{Runner, RunnerEvent, StatusReportMask};
pub use sender::{SendItem, Sender};
pub use transport::{ConnectionParams, NoOpTransport, SerialTransport, TcpTransport, Transport};
pub use workflow::Workflow;
