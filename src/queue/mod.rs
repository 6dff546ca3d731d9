//! Command queue execution
//!
//! This module handles:
//! - The FIFO of pending commands and its single traversal
//! - Dispatching each command's device directives
//! - Bounding acknowledgement waits with a timeout
//! - The progress event stream

mod dispatcher;
pub mod events;

pub use dispatcher::{DispatchError, Dispatcher, QueueConfig};
pub use events::{EventReceiver, LogLine, QueueEvent};
