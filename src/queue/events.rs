//! Progress events emitted by the queue
//!
//! Every event is mirrored into `tracing` and delivered over an unbounded
//! channel so that emitting never blocks the dispatcher or the ack path.

use plotter_shared::{AckKind, Axis};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Events from the command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// A command became current
    Running { command: String },
    /// Raw text arrived from the device
    Received { text: String },
    /// Home acknowledgement matched the current command
    Homed,
    /// Axis acknowledgement matched the current command
    AxisDone { axis: Axis, position: Option<i32> },
    /// A host-side delay finished
    DelayDone { ms: u32 },
    /// The FIFO drained and the traversal ended
    QueueEmpty,
    /// An ack did not match the current command and was dropped
    Mismatch { ack: AckKind, current: Option<String> },
    /// An ack for a gate that had already fired was dropped
    DuplicateAck { ack: AckKind, command: String },
    /// An inbound line could not be decoded
    DecodeFailed { reason: String },
    /// The device did not acknowledge in time; the command was abandoned
    Timeout { command: String, after: Duration },
    /// A directive could not be written; the command was abandoned
    DeviceError { command: String, reason: String },
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueEvent::Running { command } => write!(f, "RUNNING {}", command),
            QueueEvent::Received { text } => write!(f, "Received: {}", text),
            QueueEvent::Homed => write!(f, "Homed"),
            QueueEvent::AxisDone { axis, position } => match position {
                Some(position) => write!(f, "{} Done {}", axis, position),
                None => write!(f, "{} Done", axis),
            },
            QueueEvent::DelayDone { ms } => write!(f, "Delay Done {}", ms),
            QueueEvent::QueueEmpty => write!(f, "QUEUE EMPTY"),
            QueueEvent::Mismatch { ack, current } => match current {
                Some(command) => write!(f, "Unexpected '{}' while running {}", ack, command),
                None => write!(f, "Unexpected '{}' with no command running", ack),
            },
            QueueEvent::DuplicateAck { ack, command } => {
                write!(f, "Duplicate '{}' for {}", ack, command)
            }
            QueueEvent::DecodeFailed { reason } => write!(f, "Bad device line: {}", reason),
            QueueEvent::Timeout { command, after } => write!(
                f,
                "TIMEOUT: device not responding to {} after {}ms",
                command,
                after.as_millis()
            ),
            QueueEvent::DeviceError { command, reason } => {
                write!(f, "DEVICE ERROR: {} abandoned: {}", command, reason)
            }
        }
    }
}

/// One line for a log sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub message: String,
    pub include_timestamp: bool,
}

impl LogLine {
    /// A line printed without a timestamp (listings, echoes)
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            include_timestamp: false,
        }
    }

    /// Render the line, prefixed with local wall-clock time when requested
    pub fn render(&self) -> String {
        if self.include_timestamp {
            format!("{}: {}", chrono::Local::now().format("%H:%M:%S%.3f"), self.message)
        } else {
            self.message.clone()
        }
    }
}

impl From<&QueueEvent> for LogLine {
    fn from(event: &QueueEvent) -> Self {
        Self {
            message: event.to_string(),
            include_timestamp: true,
        }
    }
}

/// Sending half of the event stream
pub type EventSender = mpsc::UnboundedSender<QueueEvent>;

/// Receiving half of the event stream
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<QueueEvent>,
}

impl EventReceiver {
    /// Receive the next event
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is ready
    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected event sender/receiver pair
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, EventReceiver { rx })
}

/// Log an event and forward it to the sink.
///
/// A closed sink is not an error; the queue keeps running without a listener.
pub fn emit(events: &EventSender, event: QueueEvent) {
    match &event {
        QueueEvent::Mismatch { .. }
        | QueueEvent::DuplicateAck { .. }
        | QueueEvent::DecodeFailed { .. } => warn!("[ACK] {}", event),
        QueueEvent::Timeout { .. } | QueueEvent::DeviceError { .. } => error!("[QUEUE] {}", event),
        QueueEvent::Received { .. } | QueueEvent::Homed | QueueEvent::AxisDone { .. } => {
            info!("[ACK] {}", event)
        }
        _ => info!("[QUEUE] {}", event),
    }

    let _ = events.send(event);
}
