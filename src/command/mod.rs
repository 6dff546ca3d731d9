//! Commands as awaitable units
//!
//! This module handles:
//! - Per-operation completion gates
//! - Wrapping a queued command with the gates for one execution
//! - Waiting for a command to become logically complete

mod active;
mod gate;

pub use active::ActiveCommand;
pub use gate::Gate;
