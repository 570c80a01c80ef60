//! Handler module - tool handlers and their registry.
//!
//! Provides:
//! - [`ToolHandler`] - a protocol endpoint addressed by the `Tool` header
//! - [`ToolRegistry`] - maps tool names to handlers, each running on its own task
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use devtools_remote::handler::{BoxFuture, HandlerResult, ToolHandler, ToolRegistry};
//! use devtools_remote::protocol::WireMessage;
//!
//! struct Echo(MessageSender);
//!
//! impl ToolHandler for Echo {
//!     fn handle_message(&self, message: WireMessage) -> BoxFuture<'_, HandlerResult> {
//!         Box::pin(async move { self.0.send(message).await })
//!     }
//!
//!     fn on_connection_lost(&self) -> BoxFuture<'_, HandlerResult> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register("Echo", Arc::new(Echo(sender)))?;
//! ```

mod registry;

pub use registry::{ToolEvent, ToolRegistry};

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::protocol::WireMessage;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A protocol endpoint multiplexed over the connection by tool name.
///
/// Calls for one tool never overlap: each registration processes its
/// events one at a time, in arrival order, on a dedicated task.
pub trait ToolHandler: Send + Sync + 'static {
    /// Handle a message whose `Tool` header names this handler.
    fn handle_message(&self, message: WireMessage) -> BoxFuture<'_, HandlerResult>;

    /// The remote debugger disconnected.
    fn on_connection_lost(&self) -> BoxFuture<'_, HandlerResult>;
}
