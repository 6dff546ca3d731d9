//! Plotter Shared Types
//!
//! This crate provides the command data model, the device wire codec and the
//! persisted program format shared by the queue engine and any tool that
//! composes command lists.

pub mod codec;
pub mod program;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

pub use program::{Program, ProgramError};

/// Protocol parameters for the device link
pub mod protocol {
    /// Acknowledgement phrase for a finished home cycle
    pub const HOME_DONE: &str = "home done";

    /// Acknowledgement phrase for a finished X seek
    pub const X_DONE: &str = "x done";

    /// Acknowledgement phrase for a finished Y seek
    pub const Y_DONE: &str = "y done";

    /// Longest inbound line accepted before the partial line is discarded
    pub const MAX_LINE_LEN: usize = 256;

    /// Default bound on how long a command waits for its acknowledgements
    pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 10_000;

    /// Simulated device seek time, lower bound
    pub const SIM_MIN_LATENCY_MS: u64 = 100;

    /// Simulated device seek time, upper bound
    pub const SIM_MAX_LATENCY_MS: u64 = 500;
}

/// Errors raised when building a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("XY command needs at least one coordinate")]
    EmptyXy,
}

/// One motion axis of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Both axes, in dispatch order
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// A queued unit of device intent.
///
/// The serialized form is a `Type`-tagged record carrying only the fields
/// that are present, e.g. `{"Type":"XY","X":5}`. Record names written by the
/// older desktop tool (`HomeCommand`, `XYCommand`, `DelayCommand`) are
/// accepted on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum Command {
    /// Run the device's home cycle
    #[serde(alias = "HomeCommand")]
    Home,

    /// Seek one or both axes
    #[serde(rename = "XY", alias = "XYCommand")]
    Xy {
        #[serde(rename = "X", default, skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(rename = "Y", default, skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
    },

    /// Pause on the host side; the device is not involved
    #[serde(alias = "DelayCommand")]
    Delay {
        #[serde(rename = "Delay", default, deserialize_with = "null_as_zero")]
        ms: u32,
    },
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Command {
    /// Create a home command
    pub fn home() -> Self {
        Command::Home
    }

    /// Create an XY command, rejecting one with no coordinate at all
    pub fn xy(x: Option<i32>, y: Option<i32>) -> Result<Self, CommandError> {
        let command = Command::Xy { x, y };
        command.validate()?;
        Ok(command)
    }

    /// Create a host-side delay
    pub fn delay(ms: u32) -> Self {
        Command::Delay { ms }
    }

    /// Check the payload invariants
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::Xy { x: None, y: None } => Err(CommandError::EmptyXy),
            _ => Ok(()),
        }
    }

    /// Target coordinate for an axis, if this is an XY command that moves it
    pub fn coordinate(&self, axis: Axis) -> Option<i32> {
        match (self, axis) {
            (Command::Xy { x, .. }, Axis::X) => *x,
            (Command::Xy { y, .. }, Axis::Y) => *y,
            _ => None,
        }
    }

    /// Number of device-side sub-operations this command waits on
    pub fn pending_operations(&self) -> usize {
        match self {
            Command::Home => 1,
            Command::Xy { x, y } => usize::from(x.is_some()) + usize::from(y.is_some()),
            Command::Delay { .. } => 0,
        }
    }

    /// Variant name, identical to the persisted `Type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Home => "Home",
            Command::Xy { .. } => "XY",
            Command::Delay { .. } => "Delay",
        }
    }
}

/// Human-readable label: variant name followed by the present payload values
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            Command::Home => Ok(()),
            Command::Xy { x, y } => {
                if let Some(x) = x {
                    write!(f, " {}", x)?;
                }
                if let Some(y) = y {
                    write!(f, " {}", y)?;
                }
                Ok(())
            }
            Command::Delay { ms } => write!(f, " {}", ms),
        }
    }
}

/// A single outbound instruction to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Home,
    Move { axis: Axis, position: i32 },
}

impl Directive {
    /// Build a move directive for one axis
    pub fn move_to(axis: Axis, position: i32) -> Self {
        Directive::Move { axis, position }
    }

    /// Phrase the device reports when this directive has finished
    pub fn ack_phrase(&self) -> &'static str {
        match self {
            Directive::Home => protocol::HOME_DONE,
            Directive::Move { axis: Axis::X, .. } => protocol::X_DONE,
            Directive::Move { axis: Axis::Y, .. } => protocol::Y_DONE,
        }
    }
}

/// Wire form without the line terminator: `home`, `x <pos>`, `y <pos>`
impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Home => write!(f, "home"),
            Directive::Move { axis: Axis::X, position } => write!(f, "x {}", position),
            Directive::Move { axis: Axis::Y, position } => write!(f, "y {}", position),
        }
    }
}

/// A completion report recognized in inbound device text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Home,
    Axis(Axis),
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckKind::Home => write!(f, "{}", protocol::HOME_DONE),
            AckKind::Axis(Axis::X) => write!(f, "{}", protocol::X_DONE),
            AckKind::Axis(Axis::Y) => write!(f, "{}", protocol::Y_DONE),
        }
    }
}
