//! A command while it is queued or being executed

use futures::future::join_all;
use plotter_shared::{AckKind, Axis, Command};
use std::time::Duration;

use super::gate::Gate;

/// Gates owned by one execution of a command
#[derive(Debug)]
enum Gates {
    Home { busy: Gate },
    Xy { busy_x: Gate, busy_y: Gate },
    Delay,
}

/// A command paired with the completion state of one execution
#[derive(Debug)]
pub struct ActiveCommand {
    command: Command,
    gates: Gates,
}

impl ActiveCommand {
    /// Wrap a command with fresh gates
    pub fn new(command: Command) -> Self {
        let gates = match &command {
            Command::Home => Gates::Home { busy: Gate::new() },
            Command::Xy { .. } => Gates::Xy {
                busy_x: Gate::new(),
                busy_y: Gate::new(),
            },
            Command::Delay { .. } => Gates::Delay,
        };

        Self { command, gates }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Gate for an axis of an XY command
    pub fn axis_gate(&self, axis: Axis) -> Option<&Gate> {
        match (&self.gates, axis) {
            (Gates::Xy { busy_x, .. }, Axis::X) => Some(busy_x),
            (Gates::Xy { busy_y, .. }, Axis::Y) => Some(busy_y),
            _ => None,
        }
    }

    /// Gate an acknowledgement should fire, or `None` if the ack does not
    /// belong to this kind of command
    pub fn gate_for(&self, ack: AckKind) -> Option<&Gate> {
        match (&self.gates, ack) {
            (Gates::Home { busy }, AckKind::Home) => Some(busy),
            (Gates::Xy { .. }, AckKind::Axis(axis)) => self.axis_gate(axis),
            _ => None,
        }
    }

    /// Suspend until the command is logically complete.
    ///
    /// Only the gates of present sub-operations are awaited; a Delay sleeps
    /// locally for its duration. Waiting again after an abandoned wait
    /// resolves only once the gates have actually fired.
    pub async fn wait_complete(&self) {
        match &self.gates {
            Gates::Home { busy } => busy.wait().await,
            Gates::Xy { .. } => {
                let waits = Axis::ALL
                    .into_iter()
                    .filter(|axis| self.command.coordinate(*axis).is_some())
                    .filter_map(|axis| self.axis_gate(axis))
                    .map(|gate| gate.wait());
                join_all(waits).await;
            }
            Gates::Delay => {
                if let Command::Delay { ms } = self.command {
                    tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(x: Option<i32>, y: Option<i32>) -> ActiveCommand {
        ActiveCommand::new(Command::xy(x, y).unwrap())
    }

    #[test]
    fn test_gate_routing() {
        let home = ActiveCommand::new(Command::home());
        assert!(home.gate_for(AckKind::Home).is_some());
        assert!(home.gate_for(AckKind::Axis(Axis::X)).is_none());

        let motion = xy(Some(1), Some(2));
        assert!(motion.gate_for(AckKind::Home).is_none());
        assert!(motion.gate_for(AckKind::Axis(Axis::Y)).is_some());

        let delay = ActiveCommand::new(Command::delay(5));
        assert!(delay.gate_for(AckKind::Home).is_none());
        assert!(delay.gate_for(AckKind::Axis(Axis::X)).is_none());
    }

    #[tokio::test]
    async fn test_absent_axis_never_awaited() {
        // Only Y is present; the X gate is never fired
        let motion = xy(None, Some(4));
        motion.axis_gate(Axis::Y).unwrap().signal();

        tokio::time::timeout(Duration::from_millis(100), motion.wait_complete())
            .await
            .expect("wait_complete blocked on an absent axis");
        assert!(!motion.axis_gate(Axis::X).unwrap().is_signaled());
    }

    #[tokio::test]
    async fn test_xy_waits_for_both_axes() {
        let motion = xy(Some(3), Some(7));
        motion.axis_gate(Axis::Y).unwrap().signal();

        let pending = tokio::time::timeout(Duration::from_millis(50), motion.wait_complete()).await;
        assert!(pending.is_err(), "completed with X still outstanding");

        motion.axis_gate(Axis::X).unwrap().signal();
        tokio::time::timeout(Duration::from_millis(100), motion.wait_complete())
            .await
            .expect("XY did not complete");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_again_after_timeout_still_needs_ack() {
        let home = ActiveCommand::new(Command::home());

        for _ in 0..2 {
            let waited = tokio::time::timeout(Duration::from_millis(100), home.wait_complete()).await;
            assert!(waited.is_err(), "Home completed without an ack");
        }

        home.gate_for(AckKind::Home).unwrap().signal();
        tokio::time::timeout(Duration::from_millis(100), home.wait_complete())
            .await
            .expect("Home did not complete after its ack");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_sleeps_locally() {
        let delay = ActiveCommand::new(Command::delay(250));
        let started = tokio::time::Instant::now();
        delay.wait_complete().await;
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
