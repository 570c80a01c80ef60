//! Loopback TCP listener with a single connection slot.
//!
//! # Example
//!
//! ```ignore
//! use devtools_remote::transport::{ConnectionListener, ListenerOptions, MessageSender};
//!
//! let sender = MessageSender::new();
//! let listener = ConnectionListener::listen(
//!     "127.0.0.1".parse()?,
//!     9222,
//!     sender.clone(),
//!     delegate,
//!     ListenerOptions::default(),
//! )
//! .await?;
//! println!("listening on {}", listener.local_addr());
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::sender::ActiveConnection;
use super::{ConnectionDelegate, MessageSender};
use crate::config::ConnectionPolicy;
use crate::error::{DevToolsError, Result};
use crate::protocol::{FramerEvent, MessageFramer, DEFAULT_MAX_PAYLOAD_SIZE, HANDSHAKE_LINE};
use crate::writer::{spawn_writer_task, OutboundMessage, WriterConfig, WriterHandle};

/// Read buffer size per connection.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bind a TCP listener on a loopback address.
///
/// Non-loopback addresses are refused: the protocol has no authentication.
pub async fn bind_loopback(address: IpAddr, port: u16) -> Result<TcpListener> {
    if !address.is_loopback() {
        return Err(DevToolsError::Config(format!(
            "refusing to listen on non-loopback address {}",
            address
        )));
    }

    let addr = SocketAddr::new(address, port);
    TcpListener::bind(addr)
        .await
        .map_err(|source| DevToolsError::Bind { addr, source })
}

/// Per-listener settings.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// What to do with a client arriving while another is connected.
    pub policy: ConnectionPolicy,
    /// Largest accepted `Content-Length`.
    pub max_payload_size: usize,
    /// Writer task settings for each accepted connection.
    pub writer: WriterConfig,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            policy: ConnectionPolicy::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

/// Accepts remote debugger connections and feeds them to a delegate.
///
/// Dropping the listener stops accepting; use [`shutdown`](Self::shutdown)
/// to also close the active connection.
pub struct ConnectionListener {
    local_addr: SocketAddr,
    sender: MessageSender,
    accept_task: JoinHandle<()>,
}

impl ConnectionListener {
    /// Bind and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns `Bind` when the address/port cannot be bound and `Config`
    /// for non-loopback addresses.
    pub async fn listen(
        address: IpAddr,
        port: u16,
        sender: MessageSender,
        delegate: Arc<dyn ConnectionDelegate>,
        options: ListenerOptions,
    ) -> Result<Self> {
        let listener = bind_loopback(address, port).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Remote debugging listener on {}", local_addr);

        let accept_task = tokio::spawn(accept_loop(listener, sender.clone(), delegate, options));

        Ok(Self {
            local_addr,
            sender,
            accept_task,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for sending to the active connection.
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Stop accepting and close the active connection.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        self.sender.disconnect();
    }
}

impl Drop for ConnectionListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    sender: MessageSender,
    delegate: Arc<dyn ConnectionDelegate>,
    options: ListenerOptions,
) {
    let mut next_id: u64 = 1;

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        if sender.is_connected() && options.policy == ConnectionPolicy::RefuseNew {
            tracing::warn!(
                "Refusing connection from {}: a remote debugger is already connected",
                peer
            );
            drop(stream);
            continue;
        }

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }

        let id = next_id;
        next_id += 1;

        let (reader, write_half) = stream.into_split();
        // The read loop watches the handle for writer failure.
        let (writer, _writer_task) = spawn_writer_task(write_half, options.writer.clone());

        if let Some(previous) = sender.occupy(ActiveConnection::new(id, peer, writer.clone())) {
            tracing::info!(
                "Connection from {} replaces {}",
                peer,
                previous.peer()
            );
            previous.close();
        }

        let task = tokio::spawn(serve_connection(
            id,
            peer,
            reader,
            writer,
            sender.clone(),
            delegate.clone(),
            options.max_payload_size,
        ));
        sender.attach_task(id, task.abort_handle());
    }
}

/// Read loop for one accepted connection.
///
/// Handshake acknowledgements go through the writer task like every other
/// outbound byte. The loop also ends when that writer task stops after a
/// failed write. When the connection ends and still holds the slot, the
/// delegate is told the connection was lost.
async fn serve_connection<R>(
    id: u64,
    peer: SocketAddr,
    mut reader: R,
    writer: WriterHandle,
    sender: MessageSender,
    delegate: Arc<dyn ConnectionDelegate>,
    max_payload_size: usize,
) where
    R: AsyncRead + Unpin,
{
    tracing::info!("Remote debugger connected from {}", peer);

    let mut framer = MessageFramer::with_max_payload(max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = 'read: loop {
        let read = tokio::select! {
            read = reader.read(&mut buf) => Some(read),
            () = writer.closed() => None,
        };
        let n = match read {
            Some(Ok(0)) => break "closed by peer",
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                tracing::warn!("Read error from {}: {}", peer, e);
                break "read error";
            }
            None => {
                tracing::warn!("Write to {} failed, dropping connection", peer);
                break "write failed";
            }
        };
        tracing::trace!("Read {} bytes from {}", n, peer);

        for event in framer.feed(&buf[..n]) {
            match event {
                FramerEvent::Handshake => {
                    if writer.send(OutboundMessage::raw(HANDSHAKE_LINE)).await.is_err() {
                        break 'read "write side closed";
                    }
                }
                FramerEvent::Message(message) => {
                    tracing::trace!(
                        "Message for tool {:?} ({} payload bytes)",
                        message.tool(),
                        message.content_length()
                    );
                    delegate.on_message(message);
                }
            }
        }

        if framer.is_invalid() {
            break "protocol violation";
        }
    };

    drop(writer);

    if sender.release(id) {
        tracing::info!("Remote debugger {} disconnected: {}", peer, reason);
        delegate.on_connection_lost();
    } else {
        tracing::debug!("Superseded connection {} ended: {}", peer, reason);
    }
}
