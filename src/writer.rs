//! Dedicated writer task for outbound messages.
//!
//! Every write to the connection socket happens on this task. Handlers,
//! the router and the read loop hand it encoded messages via an mpsc
//! channel, so tool code running elsewhere never touches the socket.
//!
//! ```text
//! Read loop (handshake ack) ─┐
//! DevToolsService replies   ─┼─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► TcpStream
//! V8Debugger async events   ─┘
//! ```
//!
//! Ready messages are batched into a single `write_vectored` call. A
//! semaphore bounds how many messages may be queued or in flight.

use std::io::IoSlice;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

use crate::error::{DevToolsError, Result};
use crate::protocol::WireMessage;

/// Default maximum pending messages before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Bytes ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Encoded header block, or a raw line such as the handshake ack.
    pub head: Bytes,
    /// Payload bytes (may be empty).
    pub payload: Bytes,
}

impl OutboundMessage {
    /// Encode a wire message.
    pub fn from_message(message: &WireMessage) -> Self {
        let (head, payload) = message.encode_parts();
        Self { head, payload }
    }

    /// Raw bytes written as-is.
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self {
            head: bytes.into(),
            payload: Bytes::new(),
        }
    }

    /// Total size on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.head.len() + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum pending messages before backpressure kicks in.
    pub max_pending_messages: usize,
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    #[serde(with = "duration_millis", rename = "backpressure_timeout_ms")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Handle for sending messages to the writer task.
///
/// Cheaply cloneable; every clone feeds the same socket. Each queued
/// message holds a semaphore permit until the writer has flushed it.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Queued>,
    permits: Arc<Semaphore>,
    max_pending: usize,
    timeout: Duration,
}

/// A message on its way to the writer, with its backpressure permit.
type Queued = (OutboundMessage, OwnedSemaphorePermit);

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<Queued>,
        permits: Arc<Semaphore>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            permits,
            max_pending,
            timeout,
        }
    }

    /// Queue a message, waiting while backpressure is active.
    ///
    /// Fails with `BackpressureTimeout` after the configured timeout and with
    /// `ConnectionClosed` once the writer task has stopped.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        let permit = tokio::time::timeout(self.timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| DevToolsError::BackpressureTimeout)?
            .map_err(|_| DevToolsError::ConnectionClosed)?;

        self.tx
            .send((message, permit))
            .await
            .map_err(|_| DevToolsError::ConnectionClosed)
    }

    /// Queue a message without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_send(&self, message: OutboundMessage) -> Result<()> {
        let permit = self.permits.clone().try_acquire_owned().map_err(|e| match e {
            TryAcquireError::NoPermits => DevToolsError::BackpressureTimeout,
            TryAcquireError::Closed => DevToolsError::ConnectionClosed,
        })?;

        self.tx.try_send((message, permit)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DevToolsError::BackpressureTimeout,
            mpsc::error::TrySendError::Closed(_) => DevToolsError::ConnectionClosed,
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Messages queued or being written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.max_pending.saturating_sub(self.permits.available_permits())
    }

    /// Whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Spawn the writer task and return a handle for sending messages.
///
/// The task ends cleanly once every `WriterHandle` has been dropped, or
/// with an error on the first failed write.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let max_pending = config.max_pending_messages.max(1);
    let permits = Arc::new(Semaphore::new(max_pending));

    let handle = WriterHandle::new(tx, permits.clone(), max_pending, config.backpressure_timeout);

    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer).await;
        // Senders still waiting for a permit fail instead of timing out.
        permits.close();
        result
    });

    (handle, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<Queued>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some((first, permit)) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        let mut permits = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        permits.push(permit);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok((message, permit)) => {
                    batch.push(message);
                    permits.push(permit);
                }
                Err(_) => break,
            }
        }

        let result = write_batch(&mut writer, &batch).await;
        drop(permits);

        if let Err(e) = result {
            tracing::debug!("Writer stopped: {}", e);
            return Err(e);
        }
        tracing::trace!("Wrote {} outbound message(s)", batch.len());
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Write a batch with scatter/gather I/O, continuing after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundMessage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundMessage::size).sum();
    if total_size == 0 {
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(DevToolsError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[OutboundMessage], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for message in batch {
        for part in [&message.head, &message.payload] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start_in_part = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start_in_part..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn ping_message() -> WireMessage {
        WireMessage::from_payload(&b"hello"[..]).with_header("Tool", "T")
    }

    #[test]
    fn test_outbound_from_message() {
        let message = ping_message();
        let outbound = OutboundMessage::from_message(&message);

        assert_eq!(outbound.payload.len(), 5);
        assert_eq!(outbound.size(), message.to_wire_string().len());
    }

    #[test]
    fn test_outbound_raw() {
        let outbound = OutboundMessage::raw(&b"ChromeDevToolsHandshake\r\n"[..]);
        assert!(outbound.payload.is_empty());
        assert_eq!(outbound.size(), 25);
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_messages, DEFAULT_MAX_PENDING_MESSAGES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        let message = ping_message();
        handle
            .send(OutboundMessage::from_message(&message))
            .await
            .unwrap();

        let expected = message.to_wire_string();
        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();

        assert_eq!(buf, expected);
    }

    #[tokio::test]
    async fn test_writer_preserves_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        let mut expected = Vec::new();
        for i in 0..10u32 {
            let message = WireMessage::from_payload(i.to_string()).with_header("Destination", "1");
            expected.extend(message.to_wire_string());
            handle
                .send(OutboundMessage::from_message(&message))
                .await
                .unwrap();
        }

        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);
    }

    fn blocked_handle(max_pending: usize, timeout: Duration) -> (WriterHandle, mpsc::Receiver<Queued>) {
        let (tx, rx) = mpsc::channel(10);
        let handle = WriterHandle::new(tx, Arc::new(Semaphore::new(0)), max_pending, timeout);
        (handle, rx)
    }

    #[tokio::test]
    async fn test_try_send_at_capacity() {
        let (handle, _rx) = blocked_handle(100, Duration::from_secs(1));

        let result = handle.try_send(OutboundMessage::raw(&b"x"[..]));
        assert!(matches!(result, Err(DevToolsError::BackpressureTimeout)));
        assert!(handle.is_backpressure_active());
        assert_eq!(handle.pending_count(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_under_backpressure() {
        let (handle, _rx) = blocked_handle(1, Duration::from_millis(250));

        let result = handle.send(OutboundMessage::raw(&b"x"[..])).await;
        assert!(matches!(result, Err(DevToolsError::BackpressureTimeout)));
    }

    #[tokio::test]
    async fn test_try_send_after_close() {
        let (tx, rx) = mpsc::channel::<Queued>(10);
        drop(rx);
        let handle = WriterHandle::new(tx, Arc::new(Semaphore::new(10)), 10, Duration::from_secs(1));

        let result = handle.try_send(OutboundMessage::raw(&b"x"[..]));
        assert!(matches!(result, Err(DevToolsError::ConnectionClosed)));
        assert_eq!(handle.pending_count(), 0);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_permits_return_after_write() {
        let (client, mut server) = duplex(4096);
        let config = WriterConfig {
            max_pending_messages: 2,
            ..WriterConfig::default()
        };
        let (handle, _task) = spawn_writer_task(client, config);

        let message = ping_message();
        let mut expected = Vec::new();
        for _ in 0..4 {
            handle
                .send(OutboundMessage::from_message(&message))
                .await
                .unwrap();
            expected.extend(message.to_wire_string());
        }

        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, expected);

        while handle.pending_count() > 0 {
            tokio::task::yield_now().await;
        }
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_failed_write_closes_handle() {
        let (client, server) = duplex(64);
        drop(server);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        handle
            .send(OutboundMessage::from_message(&ping_message()))
            .await
            .unwrap();

        assert!(matches!(task.await.unwrap(), Err(DevToolsError::Io(_))));
        handle.closed().await;
        assert!(handle.is_closed());

        let result = handle.send(OutboundMessage::raw(&b"x"[..])).await;
        assert!(matches!(result, Err(DevToolsError::ConnectionClosed)));
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![OutboundMessage::from_message(&ping_message())];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_head() {
        let outbound = OutboundMessage::from_message(&ping_message());
        let head_len = outbound.head.len();
        let batch = vec![outbound];

        let slices = build_remaining_slices(&batch, 3);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), head_len - 3);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn test_build_remaining_slices_skip_head() {
        let outbound = OutboundMessage::from_message(&ping_message());
        let head_len = outbound.head.len();
        let batch = vec![outbound];

        let slices = build_remaining_slices(&batch, head_len + 2);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 3);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());

        let batch: Vec<_> = (0..5)
            .map(|_| OutboundMessage::from_message(&ping_message()))
            .collect();
        let expected: usize = batch.iter().map(OutboundMessage::size).sum();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), expected);
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
