//! SurrealDB implementation of the key-value slot.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::{Surreal, engine::any::Any};
use tracing::{debug, instrument};

use crate::base::types::{Res, Void};

use super::{DbClient, GenericDbClient};

// Constants.

const NAMESPACE: &str = "jira_bot";
const DATABASE: &str = "jira_bot";
const TABLE: &str = "kv";

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Creates a process-local, in-memory database client.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::connect("mem://").await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Types.

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurrealValue {
    pub value: String,
}

// Specific implementations.

/// SurrealDB client implementation.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connect to `endpoint` and select the bot's namespace and database.
    #[instrument(name = "SurrealDbClient::connect", skip_all)]
    pub async fn connect(endpoint: &str) -> Res<Self> {
        let db = surrealdb::engine::any::connect(endpoint).await?;
        db.use_ns(NAMESPACE).use_db(DATABASE).await?;

        debug!("Connected to SurrealDB at `{}`.", endpoint);

        Ok(Self { db })
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn get_value(&self, key: &str) -> Res<Option<String>> {
        let record: Option<SurrealValue> = self.db.select((TABLE, key.to_string())).await?;
        Ok(record.map(|r| r.value))
    }

    #[instrument(skip(self, value))]
    async fn set_value(&self, key: &str, value: &str) -> Void {
        let _: Option<SurrealValue> = self.db.upsert((TABLE, key.to_string())).content(SurrealValue { value: value.to_string() }).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_value(&self, key: &str) -> Void {
        let _: Option<SurrealValue> = self.db.delete((TABLE, key.to_string())).await?;
        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_replaces_values() {
        let db = DbClient::surreal_memory().await.unwrap();

        assert_eq!(db.get_value("COOKIE").await.unwrap(), None);

        db.set_value("COOKIE", "abc").await.unwrap();
        assert_eq!(db.get_value("COOKIE").await.unwrap().as_deref(), Some("abc"));

        db.set_value("COOKIE", "def").await.unwrap();
        assert_eq!(db.get_value("COOKIE").await.unwrap().as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn removes_values() {
        let db = DbClient::surreal_memory().await.unwrap();

        db.set_value("COOKIE", "abc").await.unwrap();
        db.remove_value("COOKIE").await.unwrap();

        assert_eq!(db.get_value("COOKIE").await.unwrap(), None);

        // Removing a missing key is not an error.
        db.remove_value("COOKIE").await.unwrap();
    }
}
