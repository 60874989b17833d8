//! Chat service integration for jira-bot.
//!
//! This module binds the responder to Slack over socket mode:
//! - Receiving message events and mapping them onto [`InboundMessage`]
//! - Sending replies to users and channels

use crate::{
    base::{
        config::Config,
        types::{InboundMessage, Res, Void},
    },
    interaction::{self, issue_reference::IssueResponder},
};
use async_trait::async_trait;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, info, instrument, warn};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, responder: IssueResponder) -> Res<Self> {
        let client = SlackChatClient::new(config, responder).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    responder: IssueResponder,
    chat: ChatClient,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    pub app_token: SlackApiToken,
    pub bot_token: SlackApiToken,
    pub bot_user_id: String,
    pub client: Arc<FullClient>,
    pub responder: IssueResponder,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, responder: IssueResponder) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            client,
            responder,
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
            .with_command_events(handle_command_event)
            .with_interaction_events(handle_interaction_event)
            .with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            responder: self.responder.clone(),
            chat: ChatClient::from(self.clone()),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events.
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Serve until Ctrl-C.
        socket_mode_listener.serve().await;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, target: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        // A user id as the channel posts into the bot's DM with that user.
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(target.to_string()), message).with_as_user(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

// Event mapping.

/// Map a Slack message event onto the responder's message shape.
///
/// Returns `None` for events that must not be answered: edits and other subtypes,
/// messages without text, and anything authored by a bot (including this one).
fn to_inbound_message(event: &SlackMessageEvent, bot_user_id: &str) -> Option<InboundMessage> {
    if event.subtype.is_some() || event.sender.bot_id.is_some() {
        return None;
    }

    let sender = event.sender.user.as_ref()?.0.clone();
    if sender == bot_user_id {
        return None;
    }

    let body = event.content.as_ref()?.text.clone()?;
    let room = event.origin.channel.as_ref().map(|c| c.0.clone());
    let channel_type = event.origin.channel_type.as_ref().map(|t| t.0.as_str()).unwrap_or_default();

    Some(InboundMessage {
        body,
        is_direct: channel_type == "im",
        is_group: matches!(channel_type, "channel" | "group" | "mpim"),
        sender,
        room,
    })
}

// Socket mode listener callbacks for Slack.

/// Handles command events from Slack.
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    warn!("[COMMAND] {:#?}", event);
    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text("No app commands are currently supported.".into())))
}

/// Handles interaction events from Slack.
async fn handle_interaction_event(event: SlackInteractionEvent, _client: Arc<SlackHyperClient>, _states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    warn!("[INTERACTION] {:#?}", event);
    Ok(())
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            let Some(message) = to_inbound_message(&slack_message_event, user_state.chat.bot_user_id()) else {
                debug!("Skipping message event that needs no reply.");
                return Ok(());
            };

            interaction::issue_reference::handle_message(message, user_state.responder.clone(), user_state.chat.clone());
        }
        _ => {
            debug!("Received unhandled push event.")
        }
    }

    Ok(())
}

// Tests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(value: serde_json::Value) -> SlackMessageEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn maps_direct_messages() {
        let event = event(json!({
            "type": "message",
            "channel": "D123",
            "channel_type": "im",
            "user": "U1",
            "text": "what is FOO-1?",
            "ts": "1.1",
        }));

        let message = to_inbound_message(&event, "UBOT").unwrap();

        assert!(message.is_direct);
        assert!(!message.is_group);
        assert_eq!(message.sender, "U1");
        assert_eq!(message.body, "what is FOO-1?");
    }

    #[test]
    fn maps_channel_messages() {
        let event = event(json!({
            "type": "message",
            "channel": "C123",
            "channel_type": "channel",
            "user": "U1",
            "text": "FOO-1",
            "ts": "1.1",
        }));

        let message = to_inbound_message(&event, "UBOT").unwrap();

        assert!(!message.is_direct);
        assert!(message.is_group);
        assert_eq!(message.room.as_deref(), Some("C123"));
    }

    #[test]
    fn skips_own_and_bot_messages() {
        let own = event(json!({
            "type": "message",
            "channel": "C123",
            "channel_type": "channel",
            "user": "UBOT",
            "text": "http://jira/browse/FOO-1 - Summary",
            "ts": "1.1",
        }));
        let bot = event(json!({
            "type": "message",
            "channel": "C123",
            "channel_type": "channel",
            "bot_id": "B1",
            "text": "FOO-1",
            "ts": "1.1",
        }));

        assert!(to_inbound_message(&own, "UBOT").is_none());
        assert!(to_inbound_message(&bot, "UBOT").is_none());
    }

    struct FixedBot;

    #[async_trait]
    impl GenericChatClient for FixedBot {
        fn bot_user_id(&self) -> &str {
            "UBOT"
        }

        async fn start(&self) -> Void {
            Ok(())
        }

        async fn send_message(&self, _target: &str, _text: &str) -> Void {
            Ok(())
        }
    }

    #[test]
    fn skips_messages_from_the_chat_clients_own_user() {
        let chat = ChatClient::new(Arc::new(FixedBot));
        let own = event(json!({
            "type": "message",
            "channel": "D123",
            "channel_type": "im",
            "user": "UBOT",
            "text": "FOO-1",
            "ts": "1.1",
        }));
        let other = event(json!({
            "type": "message",
            "channel": "D123",
            "channel_type": "im",
            "user": "U1",
            "text": "FOO-1",
            "ts": "1.1",
        }));

        assert!(to_inbound_message(&own, chat.bot_user_id()).is_none());
        assert!(to_inbound_message(&other, chat.bot_user_id()).is_some());
    }

    #[test]
    fn skips_subtypes() {
        let edited = event(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel": "C123",
            "channel_type": "channel",
            "user": "U1",
            "text": "FOO-1",
            "ts": "1.1",
        }));

        assert!(to_inbound_message(&edited, "UBOT").is_none());
    }
}
