pub mod jira;
pub mod negotiate;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Credential, IssueLookup, Res};

// Traits.

/// Generic issue-tracker client trait that clients must implement.
///
/// This covers the two calls the bot makes against the tracker: the negotiated
/// single-sign-on handshake and the per-issue lookup.
#[async_trait]
pub trait GenericTrackerClient: Send + Sync + 'static {
    /// Perform the negotiated authentication handshake.
    ///
    /// Returns the session id handed out by the tracker, or an error if the
    /// handshake failed or yielded no session cookie.
    async fn negotiate_session(&self) -> Res<String>;

    /// Fetch a single issue by id.
    ///
    /// Any HTTP status is a successful lookup; only transport and decoding
    /// failures are errors.
    async fn fetch_issue(&self, issue_id: &str, credential: &Credential) -> Res<IssueLookup>;
}

// Structs.

/// Tracker client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct TrackerClient {
    inner: Arc<dyn GenericTrackerClient>,
}

impl Deref for TrackerClient {
    type Target = dyn GenericTrackerClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl TrackerClient {
    pub fn new(inner: Arc<dyn GenericTrackerClient>) -> Self {
        Self { inner }
    }
}
