//! # devtools-remote
//!
//! Server side of the DevTools remote debugging protocol.
//!
//! A remote debugger connects over loopback TCP, sends the
//! `ChromeDevToolsHandshake` line and then exchanges header/payload
//! messages. Each message names a tool in its `Tool` header; the router
//! hands it to that tool's handler.
//!
//! ## Architecture
//!
//! - **Framer**: incremental parser turning arbitrary read chunks into messages
//! - **Transport**: one connection at a time, with a dedicated writer task
//! - **Router**: dispatch by tool name, one ordered task per tool
//! - **Services**: `DevToolsService` and `V8Debugger`
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use devtools_remote::{DebuggerRemoteService, DevToolsRemoteService, InMemoryBrowser, ProtocolRouter};
//!
//! #[tokio::main]
//! async fn main() -> devtools_remote::Result<()> {
//!     let browser = Arc::new(InMemoryBrowser::new());
//!     browser.add_tab(1, "https://example.com/");
//!
//!     let builder = ProtocolRouter::builder().port(9222);
//!     let devtools = DevToolsRemoteService::new(builder.sender(), browser.clone());
//!     let debugger = DebuggerRemoteService::new(builder.sender(), browser.clone(), browser);
//!
//!     let router = builder
//!         .tool(Arc::new(devtools))
//!         .tool(Arc::new(debugger))
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     router.stop();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod router;
pub mod services;
pub mod transport;
pub mod writer;

pub use config::{ConnectionPolicy, ServerConfig};
pub use error::{DevToolsError, Result};
pub use handler::ToolHandler;
pub use protocol::{MessageFramer, WireMessage};
pub use router::{NamedTool, ProtocolRouter, ProtocolRouterBuilder};
pub use services::{DebuggerRemoteService, DevToolsRemoteService, InMemoryBrowser};
