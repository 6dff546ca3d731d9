//! Simulated device
//!
//! Acknowledges every directive after an independent random seek time. The
//! axes run concurrently on real hardware, so acknowledgements are not
//! ordered: a Y seek sent after an X seek may well finish first.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use plotter_shared::{protocol, Directive};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{inbound_channel, DeviceChannel, InboundReceiver, InboundSender};

/// Configuration for the simulated device
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Shortest simulated seek time
    pub min_latency: Duration,
    /// Longest simulated seek time
    pub max_latency: Duration,
    /// Fixed RNG seed for repeatable runs
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(protocol::SIM_MIN_LATENCY_MS),
            max_latency: Duration::from_millis(protocol::SIM_MAX_LATENCY_MS),
            seed: None,
        }
    }
}

/// In-memory device that answers directives with delayed acknowledgements
pub struct SimulatedDevice {
    config: SimConfig,
    rng: Mutex<StdRng>,
    inbound_tx: InboundSender,
    sent: Mutex<Vec<Directive>>,
}

impl SimulatedDevice {
    /// Create a simulated device and the inbound stream it feeds
    pub fn new(config: SimConfig) -> (Arc<Self>, InboundReceiver) {
        let (inbound_tx, inbound_rx) = inbound_channel();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let device = Arc::new(Self {
            config,
            rng: Mutex::new(rng),
            inbound_tx,
            sent: Mutex::new(Vec::new()),
        });

        (device, inbound_rx)
    }

    /// Every directive received so far, in arrival order
    pub fn sent(&self) -> Vec<Directive> {
        self.sent.lock().clone()
    }

    fn next_latency(&self) -> Duration {
        let min = self.config.min_latency.as_millis() as u64;
        let max = self.config.max_latency.as_millis() as u64;
        if max <= min {
            return self.config.min_latency;
        }
        Duration::from_millis(self.rng.lock().gen_range(min..=max))
    }
}

#[async_trait]
impl DeviceChannel for SimulatedDevice {
    async fn send(&self, directive: Directive) -> Result<()> {
        self.sent.lock().push(directive);

        let latency = self.next_latency();
        debug!("[SIM] '{}' completes in {}ms", directive, latency.as_millis());

        // Seeks run concurrently; do not wait for this one before accepting the next
        let inbound_tx = self.inbound_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let ack = Bytes::from(format!("{}\r\n", directive.ack_phrase()));
            let _ = inbound_tx.send(ack).await;
        });

        Ok(())
    }

    fn name(&self) -> &'static str {
        "Simulated"
    }
}
