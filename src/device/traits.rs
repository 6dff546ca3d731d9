//! Device channel abstraction

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use plotter_shared::Directive;
use tokio::sync::mpsc;

/// Raw inbound chunks from the device
pub type InboundReceiver = mpsc::Receiver<Bytes>;

/// Producer side of the inbound chunk stream
pub type InboundSender = mpsc::Sender<Bytes>;

/// Capacity of the inbound chunk channel
pub const INBOUND_CAPACITY: usize = 100;

/// Create the inbound chunk channel a device implementation feeds
pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::channel(INBOUND_CAPACITY)
}

/// Outbound half of a device link.
///
/// Inbound data is delivered separately as raw byte chunks through the
/// [`InboundReceiver`] returned when the channel is created.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Queue a directive for the device without waiting for it to execute
    async fn send(&self, directive: Directive) -> Result<()>;

    /// Human-readable name for this channel
    fn name(&self) -> &'static str;
}
