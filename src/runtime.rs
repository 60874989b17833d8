//! Runtime services and shared state for the jira-bot.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::{
    base::{
        config::{Config, TrackerConfig},
        types::{Res, Void},
    },
    interaction::issue_reference::IssueResponder,
    service::{
        chat::ChatClient,
        db::DbClient,
        tracker::{
            TrackerClient,
            negotiate::{CommandNegotiator, GenericNegotiator, StaticNegotiator},
        },
    },
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the database client, tracker client, responder, chat client,
/// and configuration. It is designed to be trivially cloneable.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The tracker client instance.
    pub tracker: TrackerClient,
    /// The issue reference responder.
    pub responder: IssueResponder,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Build the tracker configuration once; it is immutable from here on.
        let tracker_config = config.tracker_config()?;

        if tracker_config.is_none() {
            warn!("No tracker configuration supplied; messages will not be answered.");
        }

        // Initialize the database.
        let db = DbClient::surreal_memory().await?;

        // Initialize the tracker client.
        let negotiator: Arc<dyn GenericNegotiator> = match config.negotiate_command.as_deref().and_then(CommandNegotiator::parse) {
            Some(command) => Arc::new(command),
            None => Arc::new(StaticNegotiator::new(config.negotiate_token.clone())),
        };
        let tracker = TrackerClient::jira(tracker_config.as_ref().unwrap_or(&TrackerConfig::default()), negotiator)?;

        // Initialize the responder.
        let responder = IssueResponder::new(tracker_config, tracker.clone(), db.clone())?;

        // Initialize the slack client.
        let chat = ChatClient::slack(&config, responder.clone()).await?;

        Ok(Self { config, db, tracker, responder, chat })
    }

    pub async fn start(&self) -> Void {
        self.chat.start().await
    }
}
