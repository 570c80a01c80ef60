//! Logging configuration using tracing

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{DevToolsError, Result};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "DEVTOOLS_REMOTE_LOG";

/// Filter used when neither an explicit filter nor [`LOG_ENV`] is set.
pub const DEFAULT_FILTER: &str = "devtools_remote=info,warn";

/// Initialize the logging subsystem
///
/// Logs go to stderr. An explicit `filter` wins over `DEVTOOLS_REMOTE_LOG`.
///
/// # Examples
/// ```bash
/// DEVTOOLS_REMOTE_LOG=debug devtools-remote
/// DEVTOOLS_REMOTE_LOG=devtools_remote=trace devtools-remote --port 9333
/// ```
pub fn init(filter: Option<&str>) -> Result<()> {
    let env_filter = build_filter(filter)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init()
        .map_err(|e| DevToolsError::Config(format!("logging already initialized: {}", e)))?;

    tracing::debug!("Logging initialized");
    Ok(())
}

fn build_filter(filter: Option<&str>) -> Result<EnvFilter> {
    match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| DevToolsError::Config(format!("invalid log filter {:?}: {}", directives, e))),
        None => Ok(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter() {
        let filter = build_filter(Some("devtools_remote=trace")).unwrap();
        assert_eq!(filter.to_string(), "devtools_remote=trace");
    }

    #[test]
    fn test_invalid_filter() {
        assert!(matches!(
            build_filter(Some("devtools_remote=loud")),
            Err(DevToolsError::Config(_))
        ));
    }
}
