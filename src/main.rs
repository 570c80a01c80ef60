//! devtools-remote - serve the remote debugging protocol on loopback
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use devtools_remote::services::TabId;
use devtools_remote::{
    logging, ConnectionPolicy, DebuggerRemoteService, DevToolsRemoteService, InMemoryBrowser,
    ProtocolRouter, Result, ServerConfig,
};

/// Serve the DevTools remote debugging protocol over loopback TCP
#[derive(Parser, Debug)]
#[command(name = "devtools-remote")]
#[command(about = "Serve the DevTools remote debugging protocol over loopback TCP", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Let a new client replace the connected one instead of refusing it
    #[arg(long)]
    replace_connections: bool,

    /// Inspectable tab, as ID=URL (repeatable)
    #[arg(long = "tab", value_name = "ID=URL", value_parser = parse_tab)]
    tabs: Vec<(TabId, String)>,

    /// Log filter, e.g. `devtools_remote=debug` (defaults to DEVTOOLS_REMOTE_LOG)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn parse_tab(value: &str) -> std::result::Result<(TabId, String), String> {
    let (id, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=URL, got {:?}", value))?;
    let id = id
        .trim()
        .parse::<TabId>()
        .map_err(|e| format!("invalid tab id {:?}: {}", id, e))?;
    Ok((id, url.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log.as_deref())?;

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.replace_connections {
        config.connection_policy = ConnectionPolicy::ReplaceExisting;
    }

    let browser = Arc::new(InMemoryBrowser::new());
    for (id, url) in &args.tabs {
        browser.add_tab(*id, url.as_str());
    }

    let builder = ProtocolRouter::builder().config(config);
    let devtools = DevToolsRemoteService::new(builder.sender(), browser.clone());
    let debugger = DebuggerRemoteService::new(builder.sender(), browser.clone(), browser);

    let router = builder
        .tool(Arc::new(devtools))
        .tool(Arc::new(debugger))
        .start()
        .await?;

    if let Some(addr) = router.local_addr() {
        tracing::info!("Serving {} on {}", router.tools().join(", "), addr);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    router.stop();
    Ok(())
}
