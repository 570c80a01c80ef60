//! Transport module - loopback TCP listener and the connection slot.
//!
//! Provides:
//! - [`ConnectionListener`] - accepts one remote debugger at a time
//! - [`MessageSender`] - sends to whichever connection is active
//! - [`ConnectionDelegate`] - receives parsed messages and disconnects

mod listener;
mod sender;

pub use listener::{bind_loopback, ConnectionListener, ListenerOptions};
pub use sender::MessageSender;

#[cfg(test)]
pub(crate) use sender::ActiveConnection;

use crate::protocol::WireMessage;

/// Receiver of connection events, called from the connection's read task.
///
/// Implementations must not block: hand work off to another task.
pub trait ConnectionDelegate: Send + Sync + 'static {
    /// A complete message was parsed.
    fn on_message(&self, message: WireMessage);

    /// The active connection closed or failed.
    fn on_connection_lost(&self);
}
