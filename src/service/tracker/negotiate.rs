//! Credentials for the negotiated (SPNEGO) handshake.
//!
//! Producing a GSSAPI token is the job of the platform's Kerberos stack; the bot
//! only forwards it as an `Authorization: Negotiate` header.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::base::types::Res;

/// Source of the initial SPNEGO token for the handshake.
#[async_trait]
pub trait GenericNegotiator: Send + Sync + 'static {
    /// The base64 token to present to `host`, or `None` to send the handshake without one.
    async fn initial_token(&self, host: &str) -> Res<Option<String>>;
}

/// Negotiator that presents a token obtained out of band.
///
/// The same token is sent on every handshake, so servers that reject replayed
/// authenticators will only accept it once; prefer [`CommandNegotiator`] there.
#[derive(Debug, Clone, Default)]
pub struct StaticNegotiator {
    token: Option<String>,
}

impl StaticNegotiator {
    pub fn new(token: Option<String>) -> Self {
        let token = token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        Self { token }
    }
}

#[async_trait]
impl GenericNegotiator for StaticNegotiator {
    async fn initial_token(&self, _host: &str) -> Res<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Negotiator that mints a fresh token per handshake by running a helper command.
///
/// The command gets the tracker host as its last argument and must print the
/// base64 token on stdout.
#[derive(Debug, Clone)]
pub struct CommandNegotiator {
    program: String,
    args: Vec<String>,
}

impl CommandNegotiator {
    /// Parse a whitespace-separated command line; `None` if it is blank.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;

        Some(Self { program, args: parts.collect() })
    }
}

#[async_trait]
impl GenericNegotiator for CommandNegotiator {
    #[instrument(skip(self))]
    async fn initial_token(&self, host: &str) -> Res<Option<String>> {
        let output = Command::new(&self.program).args(&self.args).arg(host).output().await?;

        if !output.status.success() {
            return Err(anyhow::anyhow!("Negotiate command `{}` exited with {}.", self.program, output.status));
        }

        let token = String::from_utf8(output.stdout)?.trim().to_string();
        debug!("Negotiate command produced a {} byte token.", token.len());

        if token.is_empty() {
            return Err(anyhow::anyhow!("Negotiate command `{}` printed no token.", self.program));
        }

        Ok(Some(token))
    }
}
