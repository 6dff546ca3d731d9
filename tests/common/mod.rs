//! Hand-driven device for queue tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use plotter_queue::device::{inbound_channel, DeviceChannel, InboundReceiver, InboundSender};
use plotter_queue::{Directive, EventReceiver, QueueEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Device whose acknowledgements are written by the test
pub struct ManualDevice {
    sent_tx: mpsc::UnboundedSender<Directive>,
}

/// Test-side controls for a [`ManualDevice`]
pub struct DeviceHandle {
    sent_rx: mpsc::UnboundedReceiver<Directive>,
    inbound_tx: InboundSender,
}

impl ManualDevice {
    pub fn new() -> (Arc<Self>, InboundReceiver, DeviceHandle) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = inbound_channel();
        (
            Arc::new(Self { sent_tx }),
            inbound_rx,
            DeviceHandle {
                sent_rx,
                inbound_tx,
            },
        )
    }
}

#[async_trait]
impl DeviceChannel for ManualDevice {
    async fn send(&self, directive: Directive) -> Result<()> {
        let _ = self.sent_tx.send(directive);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Manual"
    }
}

/// Device whose port is gone: every write fails
pub struct FailingDevice {
    // Held so the inbound stream stays open
    _inbound_tx: InboundSender,
}

impl FailingDevice {
    pub fn new() -> (Arc<Self>, InboundReceiver) {
        let (inbound_tx, inbound_rx) = inbound_channel();
        (
            Arc::new(Self {
                _inbound_tx: inbound_tx,
            }),
            inbound_rx,
        )
    }
}

#[async_trait]
impl DeviceChannel for FailingDevice {
    async fn send(&self, _directive: Directive) -> Result<()> {
        Err(anyhow!("port gone"))
    }

    fn name(&self) -> &'static str {
        "Failing"
    }
}

impl DeviceHandle {
    /// Wait for the next directive the dispatcher sends
    pub async fn next_directive(&mut self) -> Directive {
        timeout(Duration::from_secs(2), self.sent_rx.recv())
            .await
            .expect("no directive sent")
            .expect("device dropped")
    }

    /// Assert nothing further is sent within a short window
    pub async fn assert_quiet(&mut self) {
        let next = timeout(Duration::from_millis(100), self.sent_rx.recv()).await;
        assert!(next.is_err(), "unexpected directive: {:?}", next);
    }

    /// Deliver raw text as if the device had written it
    pub async fn reply(&self, text: &str) {
        self.inbound_tx
            .send(Bytes::copy_from_slice(text.as_bytes()))
            .await
            .expect("inbound closed");
    }
}

/// Wait for the next event matching `pred`, returning every event seen
pub async fn events_until(
    events: &mut EventReceiver,
    pred: impl Fn(&QueueEvent) -> bool,
) -> Vec<QueueEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed");
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Wait until the queue reports empty
pub async fn until_empty(events: &mut EventReceiver) -> Vec<QueueEvent> {
    events_until(events, |e| *e == QueueEvent::QueueEmpty).await
}

/// Event lines as they would appear in the log
pub fn lines(events: &[QueueEvent]) -> Vec<String> {
    events.iter().map(ToString::to_string).collect()
}
