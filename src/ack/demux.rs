//! Acknowledgement demultiplexer
//!
//! The device protocol carries no sequence numbers. An acknowledgement is
//! attributed to whichever command is current when it arrives; anything that
//! does not fit the current command is logged and dropped.

use plotter_shared::codec;
use plotter_shared::AckKind;
use std::str::Utf8Error;
use std::sync::Arc;
use thiserror::Error;

use crate::command::ActiveCommand;
use crate::queue::events::{emit, EventSender, QueueEvent};

/// Errors for a single inbound line
#[derive(Error, Debug)]
pub enum AckError {
    #[error("not valid text: {0}")]
    Decode(#[from] Utf8Error),
}

/// Read access to the command currently being dispatched
pub trait CurrentCommand: Send + Sync {
    fn current(&self) -> Option<Arc<ActiveCommand>>;
}

/// Routes device acknowledgements to the gates of the current command
pub struct AckDemux {
    source: Arc<dyn CurrentCommand>,
    events: EventSender,
}

impl AckDemux {
    pub fn new(source: Arc<dyn CurrentCommand>, events: EventSender) -> Self {
        Self { source, events }
    }

    /// Process one inbound chunk, which may hold several lines.
    ///
    /// A bad line is reported and skipped; the remaining lines are still
    /// processed.
    pub fn handle_chunk(&self, chunk: &[u8]) {
        emit(
            &self.events,
            QueueEvent::Received {
                text: String::from_utf8_lossy(chunk).trim_end().to_string(),
            },
        );

        for line in chunk.split(|b| *b == b'\n') {
            if let Err(e) = self.handle_line(line) {
                emit(
                    &self.events,
                    QueueEvent::DecodeFailed {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn handle_line(&self, line: &[u8]) -> Result<(), AckError> {
        let line = std::str::from_utf8(line)?;

        // Unknown device chatter is ignored
        let Some(ack) = codec::parse_ack(line) else {
            return Ok(());
        };

        let current = self.source.current();
        let Some(active) = current else {
            self.mismatch(ack, None);
            return Ok(());
        };

        match active.gate_for(ack) {
            // Directive not sent yet, so the ack belongs to an earlier command
            Some(gate) if !gate.is_issued() => {
                self.mismatch(ack, Some(active.command().to_string()))
            }
            Some(gate) if gate.signal() => {
                let event = match ack {
                    AckKind::Home => QueueEvent::Homed,
                    AckKind::Axis(axis) => QueueEvent::AxisDone {
                        axis,
                        position: active.command().coordinate(axis),
                    },
                };
                emit(&self.events, event);
            }
            Some(_) => emit(
                &self.events,
                QueueEvent::DuplicateAck {
                    ack,
                    command: active.command().to_string(),
                },
            ),
            None => self.mismatch(ack, Some(active.command().to_string())),
        }

        Ok(())
    }

    fn mismatch(&self, ack: AckKind, current: Option<String>) {
        emit(&self.events, QueueEvent::Mismatch { ack, current });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::events::{event_channel, EventReceiver};
    use parking_lot::Mutex;
    use plotter_shared::{Axis, Command};

    #[derive(Default)]
    struct Slot(Mutex<Option<Arc<ActiveCommand>>>);

    impl CurrentCommand for Slot {
        fn current(&self) -> Option<Arc<ActiveCommand>> {
            self.0.lock().clone()
        }
    }

    /// Demux with `command` current and every present directive already sent
    fn setup(command: Option<Command>) -> (AckDemux, Option<Arc<ActiveCommand>>, EventReceiver) {
        let active = command.map(|c| {
            let active = ActiveCommand::new(c);
            for ack in [AckKind::Home, AckKind::Axis(Axis::X), AckKind::Axis(Axis::Y)] {
                let present = match ack {
                    AckKind::Home => true,
                    AckKind::Axis(axis) => active.command().coordinate(axis).is_some(),
                };
                if let Some(gate) = active.gate_for(ack).filter(|_| present) {
                    gate.issue();
                }
            }
            Arc::new(active)
        });
        setup_with(active)
    }

    fn setup_with(
        active: Option<Arc<ActiveCommand>>,
    ) -> (AckDemux, Option<Arc<ActiveCommand>>, EventReceiver) {
        let slot = Arc::new(Slot(Mutex::new(active.clone())));
        let (tx, rx) = event_channel();
        (AckDemux::new(slot, tx), active, rx)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<QueueEvent> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    #[test]
    fn test_home_ack() {
        let (demux, active, mut rx) = setup(Some(Command::home()));
        demux.handle_chunk(b"Home Done\r\n");

        let active = active.unwrap();
        assert!(active.gate_for(AckKind::Home).unwrap().is_signaled());
        assert!(drain(&mut rx).contains(&QueueEvent::Homed));
    }

    #[test]
    fn test_both_axes_in_one_chunk() {
        let (demux, active, mut rx) = setup(Some(Command::xy(Some(3), Some(7)).unwrap()));
        demux.handle_chunk(b"y done\nx done\n");

        let active = active.unwrap();
        assert!(active.axis_gate(Axis::X).unwrap().is_signaled());
        assert!(active.axis_gate(Axis::Y).unwrap().is_signaled());

        let events = drain(&mut rx);
        assert!(events.contains(&QueueEvent::AxisDone {
            axis: Axis::Y,
            position: Some(7)
        }));
        assert!(events.contains(&QueueEvent::AxisDone {
            axis: Axis::X,
            position: Some(3)
        }));
    }

    #[test]
    fn test_axis_ack_while_home_is_current() {
        let (demux, active, mut rx) = setup(Some(Command::home()));
        demux.handle_chunk(b"x done\n");

        assert!(!active.unwrap().gate_for(AckKind::Home).unwrap().is_signaled());
        assert!(drain(&mut rx).contains(&QueueEvent::Mismatch {
            ack: AckKind::Axis(Axis::X),
            current: Some("Home".into()),
        }));
    }

    #[test]
    fn test_ack_while_delay_is_current() {
        let (demux, _active, mut rx) = setup(Some(Command::delay(50)));
        demux.handle_chunk(b"home done\n");

        assert!(drain(&mut rx).contains(&QueueEvent::Mismatch {
            ack: AckKind::Home,
            current: Some("Delay 50".into()),
        }));
    }

    #[test]
    fn test_ack_with_nothing_running() {
        let (demux, _active, mut rx) = setup(None);
        demux.handle_chunk(b"y done\n");

        assert!(drain(&mut rx).contains(&QueueEvent::Mismatch {
            ack: AckKind::Axis(Axis::Y),
            current: None,
        }));
    }

    #[test]
    fn test_duplicate_ack_dropped() {
        let (demux, _active, mut rx) = setup(Some(Command::xy(Some(1), None).unwrap()));
        demux.handle_chunk(b"x done\n");
        demux.handle_chunk(b"x done\n");

        let duplicates = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, QueueEvent::DuplicateAck { .. }))
            .count();
        assert_eq!(duplicates, 1);
    }

    #[test]
    fn test_ack_for_absent_axis_is_mismatch() {
        let (demux, active, mut rx) = setup(Some(Command::xy(None, Some(4)).unwrap()));
        demux.handle_chunk(b"x done\n");

        assert!(!active.unwrap().axis_gate(Axis::X).unwrap().is_signaled());
        assert!(drain(&mut rx).contains(&QueueEvent::Mismatch {
            ack: AckKind::Axis(Axis::X),
            current: Some("XY 4".into()),
        }));
    }

    #[test]
    fn test_ack_before_directive_sent_is_mismatch() {
        // X is out, Y has not been sent yet; a stale "y done" cannot be ours
        let active = Arc::new(ActiveCommand::new(Command::xy(Some(1), Some(2)).unwrap()));
        active.axis_gate(Axis::X).unwrap().issue();
        let (demux, active, mut rx) = setup_with(Some(active));

        demux.handle_chunk(b"y done\n");

        let active = active.unwrap();
        assert!(!active.axis_gate(Axis::Y).unwrap().is_signaled());
        assert!(drain(&mut rx).contains(&QueueEvent::Mismatch {
            ack: AckKind::Axis(Axis::Y),
            current: Some("XY 1 2".into()),
        }));

        active.axis_gate(Axis::Y).unwrap().issue();
        demux.handle_chunk(b"y done\n");
        assert!(active.axis_gate(Axis::Y).unwrap().is_signaled());
    }

    #[test]
    fn test_bad_line_does_not_stop_chunk() {
        let (demux, active, mut rx) = setup(Some(Command::xy(Some(1), Some(2)).unwrap()));
        demux.handle_chunk(b"x done\n\xff\xfe garbage\ny done\n");

        let active = active.unwrap();
        assert!(active.axis_gate(Axis::X).unwrap().is_signaled());
        assert!(active.axis_gate(Axis::Y).unwrap().is_signaled());
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, QueueEvent::DecodeFailed { .. })));
    }

    #[test]
    fn test_chatter_ignored() {
        let (demux, active, mut rx) = setup(Some(Command::home()));
        demux.handle_chunk(b"firmware 1.0 ready\n");

        assert!(!active.unwrap().gate_for(AckKind::Home).unwrap().is_signaled());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], QueueEvent::Received { .. }));
    }
}
