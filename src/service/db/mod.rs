use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, Void};

pub mod surreal;

// Traits.

/// Generic key-value slot that storage clients must implement.
///
/// The bot only needs a handful of string values (currently just the cached
/// session token), so the surface is deliberately tiny.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the value stored under `key`, if any.
    async fn get_value(&self, key: &str) -> Res<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_value(&self, key: &str, value: &str) -> Void;

    /// Removes the value stored under `key`, if any.
    async fn remove_value(&self, key: &str) -> Void;
}

/// Database client for jira-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
