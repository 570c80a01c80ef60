//! The single connection slot and its outbound handle.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;

use crate::error::Result;
use crate::protocol::WireMessage;
use crate::writer::{OutboundMessage, WriterHandle};

/// The currently accepted connection.
pub(crate) struct ActiveConnection {
    id: u64,
    peer: SocketAddr,
    writer: WriterHandle,
    read_task: Option<AbortHandle>,
}

impl ActiveConnection {
    pub(crate) fn new(id: u64, peer: SocketAddr, writer: WriterHandle) -> Self {
        Self {
            id,
            peer,
            writer,
            read_task: None,
        }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Stop reading; dropping the writer handle lets the writer task finish
    /// and close the socket.
    pub(crate) fn close(self) {
        if let Some(task) = self.read_task {
            task.abort();
        }
    }
}

/// Cloneable handle used to send messages to the connected remote debugger.
///
/// At most one connection is active at a time. When none is, messages are
/// silently dropped: asynchronous replies may race a disconnect.
///
/// # Example
///
/// ```no_run
/// # async fn demo(sender: devtools_remote::transport::MessageSender) -> devtools_remote::Result<()> {
/// use devtools_remote::protocol::WireMessage;
///
/// let reply = WireMessage::from_payload(&b"{\"command\":\"ping\",\"result\":0}"[..])
///     .with_header("Tool", "DevToolsService");
/// sender.send(reply).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MessageSender {
    slot: Arc<Mutex<Option<ActiveConnection>>>,
}

impl MessageSender {
    /// Create a sender with an empty connection slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the active connection, waiting on backpressure.
    pub async fn send(&self, message: WireMessage) -> Result<()> {
        let Some(writer) = self.writer() else {
            tracing::trace!(
                "No active connection, dropping message for tool {:?}",
                message.tool()
            );
            return Ok(());
        };
        writer.send(OutboundMessage::from_message(&message)).await
    }

    /// Queue a message without waiting.
    pub fn try_send(&self, message: &WireMessage) -> Result<()> {
        match self.writer() {
            Some(writer) => writer.try_send(OutboundMessage::from_message(message)),
            None => {
                tracing::trace!(
                    "No active connection, dropping message for tool {:?}",
                    message.tool()
                );
                Ok(())
            }
        }
    }

    /// Whether a remote debugger is connected.
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Address of the connected remote debugger.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock().as_ref().map(|c| c.peer)
    }

    fn writer(&self) -> Option<WriterHandle> {
        self.lock().as_ref().map(|c| c.writer.clone())
    }

    /// Install a new connection, returning the one it replaces.
    pub(crate) fn occupy(&self, connection: ActiveConnection) -> Option<ActiveConnection> {
        self.lock().replace(connection)
    }

    /// Record the read task of connection `id` if it is still active.
    pub(crate) fn attach_task(&self, id: u64, task: AbortHandle) {
        if let Some(connection) = self.lock().as_mut().filter(|c| c.id == id) {
            connection.read_task = Some(task);
        }
    }

    /// Free the slot if connection `id` still holds it.
    ///
    /// Returns `true` when the slot was released, i.e. the connection was
    /// still the active one.
    pub(crate) fn release(&self, id: u64) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|c| c.id == id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Drop the active connection, if any.
    pub(crate) fn disconnect(&self) {
        let previous = self.lock().take();
        if let Some(connection) = previous {
            tracing::debug!("Closing connection from {}", connection.peer);
            connection.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
