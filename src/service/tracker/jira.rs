//! JIRA REST implementation of the tracker client.
//!
//! Talks to two endpoints:
//! - `GET {URL}/step-auth-gss` for the negotiated handshake, which answers with a
//!   `JSESSIONID` cookie.
//! - `GET {URL}/rest/api/latest/issue/{id}.json` for the issue itself.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    Url,
    header::{AUTHORIZATION, COOKIE},
};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::base::{
    config::TrackerConfig,
    types::{Credential, IssueLookup, Res},
};

use super::{GenericTrackerClient, TrackerClient, negotiate::GenericNegotiator};

// Constants.

const SESSION_COOKIE: &str = "JSESSIONID";

// Extra methods on `TrackerClient` applied by the jira implementation.

impl TrackerClient {
    /// Creates a new JIRA tracker client.
    pub fn jira(config: &TrackerConfig, negotiator: Arc<dyn GenericNegotiator>) -> Res<Self> {
        let client = JiraTrackerClient::new(config, negotiator)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Types.

/// The subset of the issue payload the bot reads.
#[derive(Debug, Deserialize)]
struct IssueBody {
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    summary: String,
}

// Specific implementations.

/// JIRA tracker client implementation.
#[derive(Clone)]
pub struct JiraTrackerClient {
    client: reqwest::Client,
    base_url: Url,
    host: String,
    negotiator: Arc<dyn GenericNegotiator>,
}

impl JiraTrackerClient {
    /// Create a new JIRA tracker client.
    #[instrument(name = "JiraTrackerClient::new", skip_all)]
    pub fn new(config: &TrackerConfig, negotiator: Arc<dyn GenericNegotiator>) -> Res<Self> {
        let client = reqwest::Client::builder().danger_accept_invalid_certs(!config.ssl_verify).build()?;

        let base_url = Url::parse(config.base_url())?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("Tracker URL `{}` cannot hold a path.", base_url));
        }

        let host = base_url.host_str().unwrap_or_default().to_string();

        Ok(Self {
            client,
            base_url,
            host,
            negotiator,
        })
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();

        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        url
    }

    fn issue_url(&self, issue_id: &str) -> Url {
        self.endpoint(&["rest", "api", "latest", "issue", &format!("{issue_id}.json")])
    }
}

#[async_trait]
impl GenericTrackerClient for JiraTrackerClient {
    #[instrument(skip(self))]
    async fn negotiate_session(&self) -> Res<String> {
        let mut request = self.client.get(self.endpoint(&["step-auth-gss"]));

        if let Some(token) = self.negotiator.initial_token(&self.host).await? {
            request = request.header(AUTHORIZATION, format!("Negotiate {token}"));
        }

        let response = request.send().await?;
        let status = response.status();

        let session = response.cookies().find(|c| c.name() == SESSION_COOKIE).map(|c| c.value().to_string());

        match session {
            Some(session) if !session.is_empty() => {
                info!("Got session cookie from handshake.");
                Ok(session)
            }
            _ => Err(anyhow::anyhow!("Handshake answered {} without a `{}` cookie.", status, SESSION_COOKIE)),
        }
    }

    #[instrument(skip(self, credential))]
    async fn fetch_issue(&self, issue_id: &str, credential: &Credential) -> Res<IssueLookup> {
        let request = self.client.get(self.issue_url(issue_id));

        let request = match credential {
            Credential::Basic { username, password } => request.basic_auth(username, Some(password)),
            Credential::Session(session) => request.header(COOKIE, format!("{SESSION_COOKIE}={session}")),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let raw_body = response.text().await?;

        info!("Got response {} for `{}`.", status, issue_id);

        let summary = if status == 200 {
            let body: IssueBody = serde_json::from_str(&raw_body).map_err(|e| anyhow::anyhow!("Malformed issue body for `{}`: {}", issue_id, e))?;
            debug!("Retrieved issue data: {}", raw_body);
            Some(body.fields.summary)
        } else {
            None
        };

        Ok(IssueLookup { status, summary, raw_body })
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::service::tracker::negotiate::StaticNegotiator;

    fn client_for(server: &MockServer, token: Option<&str>) -> JiraTrackerClient {
        let config = TrackerConfig {
            url: server.base_url(),
            ..Default::default()
        };

        JiraTrackerClient::new(&config, Arc::new(StaticNegotiator::new(token.map(str::to_string)))).unwrap()
    }

    #[test]
    fn issue_urls_escape_reserved_characters() {
        let config = TrackerConfig {
            url: "https://jira.corp/jira/".to_string(),
            ..Default::default()
        };
        let client = JiraTrackerClient::new(&config, Arc::new(StaticNegotiator::default())).unwrap();

        assert_eq!(client.issue_url("FOO-1").as_str(), "https://jira.corp/jira/rest/api/latest/issue/FOO-1.json");
        assert_eq!(client.issue_url("A#B-1").as_str(), "https://jira.corp/jira/rest/api/latest/issue/A%23B-1.json");
        assert_eq!(client.issue_url("A?B-1").as_str(), "https://jira.corp/jira/rest/api/latest/issue/A%3FB-1.json");
        assert_eq!(client.issue_url("A/B-1").as_str(), "https://jira.corp/jira/rest/api/latest/issue/A%2FB-1.json");
        assert_eq!(client.endpoint(&["step-auth-gss"]).as_str(), "https://jira.corp/jira/step-auth-gss");
    }

    #[tokio::test]
    async fn reserved_characters_reach_the_issue_path() {
        let server = MockServer::start_async().await;
        let issue = server
            .mock_async(|when, then| {
                // Unescaped, `#B-1.json` would become a fragment and never reach the server.
                when.method(GET).path_includes("B-1.json");
                then.status(404);
            })
            .await;

        let client = client_for(&server, None);
        let lookup = client.fetch_issue("A#B-1", &Credential::Session(String::new())).await.unwrap();

        assert_eq!(lookup.status, 404);
        issue.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn handshake_extracts_session_cookie() {
        let server = MockServer::start_async().await;
        let handshake = server
            .mock_async(|when, then| {
                when.method(GET).path("/step-auth-gss").header("authorization", "Negotiate YIIG");
                then.status(200).header("set-cookie", "JSESSIONID=abc123; Path=/; HttpOnly");
            })
            .await;

        let client = client_for(&server, Some("YIIG"));

        assert_eq!(client.negotiate_session().await.unwrap(), "abc123");
        handshake.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn handshake_without_cookie_fails() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/step-auth-gss");
                then.status(401).header("www-authenticate", "Negotiate");
            })
            .await;

        let client = client_for(&server, None);

        assert!(client.negotiate_session().await.is_err());
    }

    #[tokio::test]
    async fn fetch_with_basic_auth_sends_no_cookie() {
        let server = MockServer::start_async().await;
        let issue = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/api/latest/issue/FOO-1.json")
                    .header("authorization", "Basic Zm9vOmJhcg==")
                    .header_missing("cookie");
                then.status(200).json_body(json!({ "key": "FOO-1", "fields": { "summary": "Fix the thing" } }));
            })
            .await;

        let client = client_for(&server, None);
        let credential = Credential::Basic {
            username: "foo".to_string(),
            password: "bar".to_string(),
        };

        let lookup = client.fetch_issue("FOO-1", &credential).await.unwrap();

        assert_eq!(lookup.status, 200);
        assert_eq!(lookup.summary.as_deref(), Some("Fix the thing"));
        issue.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn fetch_with_session_sends_cookie_only() {
        let server = MockServer::start_async().await;
        let issue = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/api/latest/issue/FOO-2.json")
                    .header("cookie", "JSESSIONID=abc123")
                    .header_missing("authorization");
                then.status(404).json_body(json!({ "errorMessages": ["Issue Does Not Exist"] }));
            })
            .await;

        let client = client_for(&server, None);
        let lookup = client.fetch_issue("FOO-2", &Credential::Session("abc123".to_string())).await.unwrap();

        assert_eq!(lookup.status, 404);
        assert_eq!(lookup.summary, None);
        assert!(lookup.raw_body.contains("Issue Does Not Exist"));
        issue.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn malformed_success_body_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/api/latest/issue/FOO-3.json");
                then.status(200).body("<html>login</html>");
            })
            .await;

        let client = client_for(&server, None);

        assert!(client.fetch_issue("FOO-3", &Credential::Session(String::new())).await.is_err());
    }
}
