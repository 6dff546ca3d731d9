//! FIFO command dispatcher
//!
//! At most one traversal of the queue runs at a time. Every enqueue makes a
//! non-blocking attempt to start one; if a traversal is already running the
//! attempt returns and the running traversal picks the new commands up.

use parking_lot::Mutex;
use plotter_shared::{protocol, AckKind, Axis, Command, Directive};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use super::events::{emit, event_channel, EventReceiver, EventSender, QueueEvent};
use crate::ack::{AckDemux, CurrentCommand};
use crate::command::ActiveCommand;
use crate::device::{DeviceChannel, InboundReceiver};

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a Home or XY command may wait for its acknowledgements
    pub ack_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(protocol::DEFAULT_ACK_TIMEOUT_MS),
        }
    }
}

/// Reasons a command is abandoned
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no acknowledgement for {command} within {}ms", .after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("failed to send '{directive}': {reason}")]
    Device { directive: Directive, reason: String },
}

/// Traversal state
#[derive(Debug)]
enum DispatchState {
    /// No traversal running
    Idle,
    /// A traversal owns the queue; `current` is the command awaiting completion
    Dispatching { current: Option<Arc<ActiveCommand>> },
}

#[derive(Debug)]
struct QueueState {
    fifo: VecDeque<Command>,
    state: DispatchState,
}

struct Shared {
    queue: Mutex<QueueState>,
    channel: Arc<dyn DeviceChannel>,
    events: EventSender,
    config: QueueConfig,
    runtime: Handle,
    /// Dropped with the last reference; stops the ack task
    _stop: oneshot::Sender<()>,
}

impl CurrentCommand for Shared {
    fn current(&self) -> Option<Arc<ActiveCommand>> {
        match &self.queue.lock().state {
            DispatchState::Dispatching { current } => current.clone(),
            DispatchState::Idle => None,
        }
    }
}

// The ack task must not keep the dispatcher alive
impl CurrentCommand for Weak<Shared> {
    fn current(&self) -> Option<Arc<ActiveCommand>> {
        self.upgrade().and_then(|shared| shared.current())
    }
}

/// Returns the queue to Idle if a traversal unwinds without reaching the
/// empty-queue exit
struct TraversalPermit {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for TraversalPermit {
    fn drop(&mut self) {
        if self.armed {
            self.shared.queue.lock().state = DispatchState::Idle;
        }
    }
}

/// Owns the command FIFO and drives commands to completion in order
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher on a device channel and start routing its inbound
    /// data to the ack demultiplexer.
    ///
    /// The routing task ends, releasing the channel, once every handle is
    /// dropped and no traversal is running. Must be called from within a
    /// Tokio runtime.
    pub fn new(
        channel: Arc<dyn DeviceChannel>,
        mut inbound: InboundReceiver,
        config: QueueConfig,
    ) -> (Self, EventReceiver) {
        let (events, event_rx) = event_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let runtime = Handle::current();

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                fifo: VecDeque::new(),
                state: DispatchState::Idle,
            }),
            channel,
            events: events.clone(),
            config,
            runtime: runtime.clone(),
            _stop: stop_tx,
        });

        let demux = AckDemux::new(Arc::new(Arc::downgrade(&shared)), events);
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    chunk = inbound.recv() => match chunk {
                        Some(chunk) => demux.handle_chunk(&chunk),
                        None => {
                            debug!("[ACK] Inbound stream closed");
                            break;
                        }
                    },
                    _ = &mut stop_rx => {
                        debug!("[ACK] Dispatcher dropped, releasing device channel");
                        break;
                    }
                }
            }
        });

        (Self { shared }, event_rx)
    }

    /// Append a command and make sure a traversal is running
    pub fn enqueue(&self, command: Command) {
        self.shared.queue.lock().fifo.push_back(command);
        self.run();
    }

    /// Append a sequence atomically with respect to other enqueues, then make
    /// one run attempt
    pub fn enqueue_all(&self, commands: impl IntoIterator<Item = Command>) {
        // Caller's iterator runs outside the lock
        let commands: Vec<Command> = commands.into_iter().collect();
        self.shared.queue.lock().fifo.extend(commands);
        self.run();
    }

    /// Commands waiting behind the current one
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().fifo.len()
    }

    /// Whether a traversal is in progress
    pub fn is_running(&self) -> bool {
        matches!(self.shared.queue.lock().state, DispatchState::Dispatching { .. })
    }

    /// Label of the command awaiting completion, if any
    pub fn current(&self) -> Option<String> {
        self.shared
            .current()
            .map(|active| active.command().to_string())
    }

    /// Try to start a traversal; returns at once if one is already running
    fn run(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if matches!(queue.state, DispatchState::Dispatching { .. }) {
                debug!("[QUEUE] Traversal already running");
                return;
            }
            queue.state = DispatchState::Dispatching { current: None };
        }

        let shared = self.shared.clone();
        self.shared.runtime.spawn(shared.traverse());
    }
}

impl Shared {
    async fn traverse(self: Arc<Self>) {
        let mut permit = TraversalPermit {
            shared: self.clone(),
            armed: true,
        };

        loop {
            let active = {
                let mut queue = self.queue.lock();
                match queue.fifo.pop_front() {
                    Some(command) => {
                        let active = Arc::new(ActiveCommand::new(command));
                        queue.state = DispatchState::Dispatching {
                            current: Some(active.clone()),
                        };
                        active
                    }
                    None => {
                        // Go idle under the same lock as the emptiness check
                        queue.state = DispatchState::Idle;
                        permit.armed = false;
                        emit(&self.events, QueueEvent::QueueEmpty);
                        return;
                    }
                }
            };

            emit(
                &self.events,
                QueueEvent::Running {
                    command: active.command().to_string(),
                },
            );
            debug!(
                "[QUEUE] {} awaits {} device acknowledgement(s)",
                active.command(),
                active.command().pending_operations()
            );

            if let Err(e) = self.dispatch(&active).await {
                let command = active.command().to_string();
                let event = match e {
                    DispatchError::Timeout { after, .. } => QueueEvent::Timeout { command, after },
                    DispatchError::Device { .. } => QueueEvent::DeviceError {
                        command,
                        reason: e.to_string(),
                    },
                };
                emit(&self.events, event);
            }

            // Acks arriving from here on belong to no command
            {
                let mut queue = self.queue.lock();
                if let DispatchState::Dispatching { current } = &mut queue.state {
                    *current = None;
                }
            }
        }
    }

    async fn dispatch(&self, active: &ActiveCommand) -> Result<(), DispatchError> {
        match active.command() {
            Command::Home => {
                if let Some(gate) = active.gate_for(AckKind::Home) {
                    gate.issue();
                }
                self.send(Directive::Home).await?;
                self.await_acks(active).await
            }
            Command::Xy { .. } => {
                // Both axes move concurrently; issue every directive before waiting
                for axis in Axis::ALL {
                    match active.command().coordinate(axis) {
                        Some(position) => {
                            if let Some(gate) = active.axis_gate(axis) {
                                gate.issue();
                            }
                            self.send(Directive::move_to(axis, position)).await?
                        }
                        None => {
                            if let Some(gate) = active.axis_gate(axis) {
                                gate.signal();
                            }
                        }
                    }
                }
                self.await_acks(active).await
            }
            Command::Delay { ms } => {
                active.wait_complete().await;
                emit(&self.events, QueueEvent::DelayDone { ms: *ms });
                Ok(())
            }
        }
    }

    async fn send(&self, directive: Directive) -> Result<(), DispatchError> {
        debug!("[QUEUE] Sending '{}' via {}", directive, self.channel.name());
        self.channel
            .send(directive)
            .await
            .map_err(|e| DispatchError::Device {
                directive,
                reason: e.to_string(),
            })
    }

    async fn await_acks(&self, active: &ActiveCommand) -> Result<(), DispatchError> {
        let after = self.config.ack_timeout;
        timeout(after, active.wait_complete())
            .await
            .map_err(|_| DispatchError::Timeout {
                command: active.command().to_string(),
                after,
            })
    }
}
