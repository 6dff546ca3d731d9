//! Plotter Command Queue
//!
//! Drives a two-axis positioning device by queueing Home, XY and Delay
//! commands, sending their directives and waiting for the device's
//! completion reports, which arrive asynchronously and in any order.

pub mod ack;
pub mod command;
pub mod device;
pub mod queue;
pub mod transport;

pub use plotter_shared::{AckKind, Axis, Command, CommandError, Directive, Program, ProgramError};
pub use queue::{Dispatcher, EventReceiver, LogLine, QueueConfig, QueueEvent};
