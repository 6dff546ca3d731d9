//! Device channel over a byte stream
//!
//! Works with any bidirectional stream: a TCP bridge in front of the device's
//! serial port, a pipe, or an in-memory duplex in tests. Opening the
//! underlying port is left to the caller.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use plotter_shared::codec::{self, LineDecoder};
use plotter_shared::{protocol, Directive};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::traits::{inbound_channel, DeviceChannel, InboundReceiver, InboundSender};

/// Configuration for a stream channel
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Longest inbound line accepted
    pub max_line_len: usize,
    /// Capacity of the outbound directive queue
    pub outbound_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_line_len: protocol::MAX_LINE_LEN,
            outbound_capacity: 100,
        }
    }
}

/// Device channel backed by reader and writer tasks on a stream
pub struct StreamChannel {
    outbound_tx: mpsc::Sender<Directive>,
}

impl StreamChannel {
    /// Split the stream and start the reader and writer tasks
    pub fn spawn<S>(stream: S, config: StreamConfig) -> (Arc<Self>, InboundReceiver)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Directive>(config.outbound_capacity);
        let (inbound_tx, inbound_rx) = inbound_channel();

        tokio::spawn(async move {
            if let Err(e) = write_loop(writer, outbound_rx).await {
                error!("[STREAM] Write error: {}", e);
            }
        });

        let max_line_len = config.max_line_len;
        tokio::spawn(async move {
            if let Err(e) = read_loop(reader, inbound_tx, max_line_len).await {
                error!("[STREAM] Read error: {}", e);
            }
        });

        (Arc::new(Self { outbound_tx }), inbound_rx)
    }
}

#[async_trait]
impl DeviceChannel for StreamChannel {
    async fn send(&self, directive: Directive) -> Result<()> {
        self.outbound_tx
            .send(directive)
            .await
            .map_err(|_| anyhow!("Device stream closed"))
    }

    fn name(&self) -> &'static str {
        "Stream"
    }
}

/// Drain queued directives onto the stream
async fn write_loop<W>(mut writer: W, mut outbound_rx: mpsc::Receiver<Directive>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(directive) = outbound_rx.recv().await {
        debug!("[STREAM] >> {}", directive);
        writer.write_all(&codec::encode(&directive)).await?;
        writer.flush().await?;
    }

    info!("[STREAM] Outbound queue closed");
    Ok(())
}

/// Assemble inbound bytes into lines and forward each complete line
async fn read_loop<R>(mut reader: R, inbound_tx: InboundSender, max_line_len: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = LineDecoder::new(max_line_len);
    let mut read_buf = vec![0u8; 1024];

    loop {
        let n = tokio::select! {
            n = reader.read(&mut read_buf) => n?,
            _ = inbound_tx.closed() => {
                info!("[STREAM] Inbound receiver dropped, releasing the stream");
                return Ok(());
            }
        };
        if n == 0 {
            info!("[STREAM] Device closed the stream");
            return Ok(());
        }

        decoder.extend(&read_buf[..n]);

        loop {
            match decoder.decode_next() {
                Ok(Some(line)) => {
                    if inbound_tx.send(line).await.is_err() {
                        return Err(anyhow!("Inbound receiver dropped"));
                    }
                }
                Ok(None) => break,
                Err(e) => warn!("[STREAM] Discarding input: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotter_shared::Axis;
    use std::time::Duration;

    #[tokio::test]
    async fn test_directives_written_as_lines() {
        let (host, mut device) = tokio::io::duplex(256);
        let (channel, _inbound) = StreamChannel::spawn(host, StreamConfig::default());

        channel.send(Directive::Home).await.unwrap();
        channel.send(Directive::move_to(Axis::X, 40)).await.unwrap();

        let mut received = Vec::new();
        while received.len() < b"home\nx 40\n".len() {
            let mut buf = [0u8; 64];
            let n = tokio::time::timeout(Duration::from_secs(1), device.read(&mut buf))
                .await
                .expect("timed out")
                .unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(&received[..], b"home\nx 40\n");
    }

    #[tokio::test]
    async fn test_fragmented_acks_reassembled() {
        let (host, mut device) = tokio::io::duplex(256);
        let (_channel, mut inbound) = StreamChannel::spawn(host, StreamConfig::default());

        device.write_all(b"x do").await.unwrap();
        device.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        device.write_all(b"ne\r\ny done\r\n").await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), inbound.recv())
            .await
            .expect("timed out")
            .expect("closed");
        assert_eq!(&first[..], b"x done\r\n");

        let second = tokio::time::timeout(Duration::from_secs(1), inbound.recv())
            .await
            .expect("timed out")
            .expect("closed");
        assert_eq!(&second[..], b"y done\r\n");
    }

    #[tokio::test]
    async fn test_dropping_channel_closes_stream() {
        let (host, mut device) = tokio::io::duplex(64);
        let (channel, inbound) = StreamChannel::spawn(host, StreamConfig::default());

        drop(channel);
        drop(inbound);

        // Both halves are released, so the device side reads EOF
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(1), device.read(&mut buf))
            .await
            .expect("stream still open after channel dropped")
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (host, device) = tokio::io::duplex(16);
        drop(device);
        let (channel, mut inbound) = StreamChannel::spawn(host, StreamConfig::default());

        // Reader sees EOF and drops the inbound sender
        let closed = tokio::time::timeout(Duration::from_secs(1), inbound.recv())
            .await
            .expect("timed out");
        assert!(closed.is_none());

        // Writer task exits on the first failed write; later sends report the closed queue
        let mut result = Ok(());
        for _ in 0..10 {
            result = channel.send(Directive::Home).await;
            if result.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(result.is_err());
    }
}
