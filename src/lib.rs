//! Library root for `jira-bot`.
//!
//! Jira-bot watches Slack conversations for issue references such as `FOO-123` and
//! answers with a link to the issue and its summary:
//! - Project prefixes to watch for are configured up front
//! - Issues are fetched from the JIRA REST API, using either a negotiated
//!   single-sign-on session or basic credentials
//! - At most one reply is sent per message
//!
//! The architecture is built around small traits for the chat platform, the
//! tracker, and storage, so each can be swapped out or mocked.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the jira-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with database, tracker, and chat clients
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting jira-bot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install the default crypto provider."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
