//! `DevToolsService`: stateless queries about the browser.
//!
//! | command     | reply `data`                 |
//! |-------------|------------------------------|
//! | `ping`      | `"ok"`                       |
//! | `version`   | `"0.1"`                      |
//! | `list_tabs` | `[[id, url], ...]`           |
//!
//! Every request gets exactly one reply, sent before the next request for
//! this tool is handled.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{Reply, Request, TabRegistry};
use crate::handler::{BoxFuture, HandlerResult, ToolHandler};
use crate::protocol::WireMessage;
use crate::router::NamedTool;
use crate::transport::MessageSender;

/// Tool name served by [`DevToolsRemoteService`].
pub const TOOL_NAME: &str = "DevToolsService";

/// Protocol version reported by `version`.
pub const PROTOCOL_VERSION: &str = "0.1";

pub mod result {
    pub const OK: i32 = 0;
    pub const UNKNOWN_COMMAND: i32 = 1;
}

pub mod command {
    pub const PING: &str = "ping";
    pub const VERSION: &str = "version";
    pub const LIST_TABS: &str = "list_tabs";
}

/// Answers `ping`, `version` and `list_tabs`.
pub struct DevToolsRemoteService {
    sender: MessageSender,
    tabs: Arc<dyn TabRegistry>,
}

impl DevToolsRemoteService {
    pub fn new(sender: MessageSender, tabs: Arc<dyn TabRegistry>) -> Self {
        Self { sender, tabs }
    }

    fn reply_for(&self, request: &Request) -> Reply {
        match request.command.as_str() {
            command::PING => Reply::new(command::PING, result::OK).with_data("ok"),
            command::VERSION => Reply::new(command::VERSION, result::OK).with_data(PROTOCOL_VERSION),
            command::LIST_TABS => {
                let tabs: Vec<Value> = self
                    .tabs
                    .inspectable_tabs()
                    .into_iter()
                    .map(|tab| json!([tab.id, tab.url]))
                    .collect();
                Reply::new(command::LIST_TABS, result::OK).with_data(tabs)
            }
            other => {
                tracing::debug!("{}: unknown command {:?}", TOOL_NAME, other);
                Reply::new(other, result::UNKNOWN_COMMAND)
            }
        }
    }
}

impl ToolHandler for DevToolsRemoteService {
    fn handle_message(&self, message: WireMessage) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            let Some(request) = Request::parse(TOOL_NAME, &message) else {
                return Ok(());
            };
            let reply = self
                .reply_for(&request)
                .into_message(TOOL_NAME, message.destination())?;
            self.sender.send(reply).await
        })
    }

    fn on_connection_lost(&self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async { Ok(()) })
    }
}

impl NamedTool for DevToolsRemoteService {
    fn tool_name(&self) -> &str {
        TOOL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::connected_sender;
    use crate::services::InMemoryBrowser;

    fn request(body: &str) -> WireMessage {
        WireMessage::from_payload(body.to_string()).with_header("Tool", TOOL_NAME)
    }

    fn service(browser: InMemoryBrowser) -> (DevToolsRemoteService, crate::services::test_support::Wire) {
        let (sender, wire) = connected_sender();
        (DevToolsRemoteService::new(sender, Arc::new(browser)), wire)
    }

    #[tokio::test]
    async fn test_ping() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        service.handle_message(request(r#"{"command":"ping"}"#)).await.unwrap();

        let reply = wire.next().await;
        assert_eq!(reply.tool(), TOOL_NAME);
        assert_eq!(reply.payload(), br#"{"command":"ping","result":0,"data":"ok"}"#);
    }

    #[tokio::test]
    async fn test_version() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        service.handle_message(request(r#"{"command":"version"}"#)).await.unwrap();

        let (_, body) = wire.next_json().await;
        assert_eq!(body, json!({"command": "version", "result": 0, "data": "0.1"}));
    }

    #[tokio::test]
    async fn test_list_tabs() {
        let browser = InMemoryBrowser::new();
        browser.add_tab(5, "http://b/");
        browser.add_tab(2, "http://a/");
        browser.add_loading_tab(3);
        let (service, mut wire) = service(browser);

        service.handle_message(request(r#"{"command":"list_tabs"}"#)).await.unwrap();

        let reply = wire.next().await;
        assert_eq!(
            reply.payload(),
            br#"{"command":"list_tabs","result":0,"data":[[2,"http://a/"],[5,"http://b/"]]}"#
        );
    }

    #[tokio::test]
    async fn test_list_tabs_empty() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        service.handle_message(request(r#"{"command":"list_tabs"}"#)).await.unwrap();

        let (_, body) = wire.next_json().await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        service.handle_message(request(r#"{"command":"reboot"}"#)).await.unwrap();

        let reply = wire.next().await;
        assert_eq!(reply.payload(), br#"{"command":"reboot","result":1}"#);
    }

    #[tokio::test]
    async fn test_destination_is_echoed() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        let message = request(r#"{"command":"ping"}"#).with_header("Destination", "abc");
        service.handle_message(message).await.unwrap();

        assert_eq!(wire.next().await.destination(), "abc");
    }

    #[tokio::test]
    async fn test_non_object_payload_is_dropped() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        service.handle_message(request("[1,2,3]")).await.unwrap();
        service.handle_message(request("garbage")).await.unwrap();

        wire.assert_silent().await;
    }

    #[tokio::test]
    async fn test_replies_keep_request_order() {
        let (service, mut wire) = service(InMemoryBrowser::new());

        service.handle_message(request(r#"{"command":"version"}"#)).await.unwrap();
        service.handle_message(request(r#"{"command":"ping"}"#)).await.unwrap();

        assert_eq!(wire.next_json().await.1["command"], "version");
        assert_eq!(wire.next_json().await.1["command"], "ping");
    }
}
