//! Device channels
//!
//! Supports a simulated device for development and a line-oriented byte
//! stream for a device reachable over TCP.

mod sim;
mod stream;
mod traits;

pub use sim::{SimConfig, SimulatedDevice};
pub use stream::{StreamChannel, StreamConfig};
pub use traits::{inbound_channel, DeviceChannel, InboundReceiver, InboundSender};

use crate::transport::{TcpConnector, TransportConnector};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Which device to drive
#[derive(Debug, Clone)]
pub enum DeviceConfig {
    /// In-memory device with randomized acknowledgement latency
    Simulated(SimConfig),
    /// Device bridged to a TCP address (e.g. "127.0.0.1:5000")
    Tcp { address: String, stream: StreamConfig },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // Default to the simulator for development
        Self::Simulated(SimConfig::default())
    }
}

impl DeviceConfig {
    /// Open the configured device
    pub async fn connect(self) -> Result<(Arc<dyn DeviceChannel>, InboundReceiver)> {
        match self {
            DeviceConfig::Simulated(config) => {
                let (device, inbound) = SimulatedDevice::new(config);
                info!("[DEVICE] Using simulated device");
                let device: Arc<dyn DeviceChannel> = device;
                Ok((device, inbound))
            }
            DeviceConfig::Tcp { address, stream } => {
                let connector = TcpConnector::new(address);
                let socket = connector.connect().await?;
                info!("[DEVICE] Connected via {}", connector.name());
                let (channel, inbound) = StreamChannel::spawn(socket, stream);
                let channel: Arc<dyn DeviceChannel> = channel;
                Ok((channel, inbound))
            }
        }
    }
}
