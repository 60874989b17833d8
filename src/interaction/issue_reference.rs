//! Replies to messages that mention tracker issues.
//!
//! Each inbound message runs through a short pipeline: find candidate ticket ids for
//! the configured project prefixes, look them up one after another, and reply with
//! the first conclusive result. A successful lookup yields `"{URL}/browse/{ID} - {summary}"`,
//! a missing issue yields `"Issue not found"`; anything else is logged and skipped.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::TrackerConfig,
        types::{Credential, InboundMessage, IssueLookup, Res},
    },
    service::{chat::ChatClient, db::DbClient, session::SessionCache, tracker::TrackerClient},
};

/// Reply sent when the tracker does not know a referenced issue.
pub const NOT_FOUND_REPLY: &str = "Issue not found";

/// Spawns the responder for a single message.
///
/// Errors never escape the spawned task; they are logged.
#[instrument(skip_all)]
pub fn handle_message(message: InboundMessage, responder: IssueResponder, chat: ChatClient) {
    tokio::spawn(async move { responder.on_message(&chat, &message).in_current_span().await });
}

/// Build one case-insensitive `PREFIX-<digits>` pattern per project prefix.
///
/// Prefixes are matched literally; blank prefixes are skipped.
pub fn project_patterns(prefixes: &[String]) -> Res<Vec<Regex>> {
    prefixes
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| -> Res<Regex> { Ok(RegexBuilder::new(&format!("{}-[0-9]+", regex::escape(p))).case_insensitive(true).build()?) })
        .collect()
}

/// Collect the distinct ticket ids `patterns` find in `body`.
///
/// Ids come back in order of first appearance; repeated mentions collapse to one.
pub fn extract_candidate_ids(body: &str, patterns: &[Regex]) -> Vec<String> {
    let mut found: Vec<(usize, &str)> = patterns.iter().flat_map(|r| r.find_iter(body)).map(|m| (m.start(), m.as_str())).collect();
    found.sort_by_key(|(start, _)| *start);

    let mut ids: Vec<String> = Vec::with_capacity(found.len());
    for (_, id) in found {
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }

    ids
}

/// Deliver `text` to wherever `message` came from.
///
/// Direct messages are answered to the sender, group messages to the room; any
/// other addressing mode gets no reply.
#[instrument(skip_all)]
pub async fn dispatch_reply(chat: &ChatClient, message: &InboundMessage, text: Option<&str>) {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return;
    };

    let target = if message.is_direct {
        Some(message.sender.as_str())
    } else if message.is_group {
        message.room.as_deref()
    } else {
        None
    };

    let Some(target) = target else {
        warn!("Not replying to a message that is neither direct nor from a room.");
        return;
    };

    if let Err(e) = chat.send_message(target, text).await {
        error!("Failed to send reply to `{}`: {}", target, e);
    }
}

/// Issue reference responder.
///
/// It is designed to be trivially cloneable, allowing it to be shared across
/// message handlers.
#[derive(Clone)]
pub struct IssueResponder {
    inner: Arc<IssueResponderInner>,
}

struct IssueResponderInner {
    config: Option<TrackerConfig>,
    patterns: Vec<Regex>,
    tracker: TrackerClient,
    session: SessionCache,
}

impl IssueResponder {
    /// Create a responder; `None` leaves it unconfigured, in which case it never replies.
    pub fn new(config: Option<TrackerConfig>, tracker: TrackerClient, db: DbClient) -> Res<Self> {
        let patterns = match &config {
            Some(config) => project_patterns(&config.projects)?,
            None => Vec::new(),
        };

        let session = SessionCache::new(db, tracker.clone());

        Ok(Self {
            inner: Arc::new(IssueResponderInner {
                config,
                patterns,
                tracker,
                session,
            }),
        })
    }

    /// Build the reply and deliver it.
    #[instrument(skip_all)]
    pub async fn on_message(&self, chat: &ChatClient, message: &InboundMessage) {
        let text = self.build_response(message).await;
        dispatch_reply(chat, message, text.as_deref()).await;
    }

    /// Work out the reply for `message`, if any.
    ///
    /// Candidates are looked up in order and the first 200 or 404 ends the search.
    #[instrument(skip_all)]
    pub async fn build_response(&self, message: &InboundMessage) -> Option<String> {
        let config = self.inner.config.as_ref()?;

        for issue_id in extract_candidate_ids(&message.body, &self.inner.patterns) {
            info!("Matched issue id `{}`.", issue_id);

            let lookup = match self.lookup(config, &issue_id).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    error!("Lookup of `{}` failed: {}", issue_id, e);
                    continue;
                }
            };

            match (lookup.status, lookup.summary) {
                (200, Some(summary)) => return Some(format!("{}/browse/{} - {}", config.base_url(), issue_id, summary)),
                (401, _) => error!("Access denied for `{}`.", issue_id),
                (404, _) => return Some(NOT_FOUND_REPLY.to_string()),
                (status, _) => {
                    error!("Encountered unknown response status code: {}", status);
                    error!("Response body: {}", lookup.raw_body);
                }
            }
        }

        None
    }

    /// Fetch one issue with the configured credential.
    ///
    /// A cached session token that the tracker rejects is dropped and the lookup is
    /// repeated once with a fresh handshake.
    async fn lookup(&self, config: &TrackerConfig, issue_id: &str) -> Res<IssueLookup> {
        if !config.kerberos {
            let credential = Credential::Basic {
                username: config.username.clone(),
                password: config.password.clone(),
            };

            return self.inner.tracker.fetch_issue(issue_id, &credential).await;
        }

        let session = self.inner.session.resolve().await;
        let lookup = self.inner.tracker.fetch_issue(issue_id, &Credential::Session(session.token.clone())).await?;

        if lookup.status != 401 || !session.cached {
            return Ok(lookup);
        }

        warn!("Cached session token was rejected; authenticating again.");
        self.inner.session.invalidate(&session.token).await;

        let fresh = self.inner.session.resolve().await;
        self.inner.tracker.fetch_issue(issue_id, &Credential::Session(fresh.token)).await
    }
}
