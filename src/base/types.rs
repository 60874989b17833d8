use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// A chat message as delivered by the host runtime.
///
/// The responder only ever reads this; the host owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The raw message body.
    pub body: String,
    /// Whether the message was sent directly to the bot.
    pub is_direct: bool,
    /// Whether the message was posted in a group conversation (channel, room, etc.).
    pub is_group: bool,
    /// The identity of the sender.
    pub sender: String,
    /// The identity of the room the message was posted in, if any.
    pub room: Option<String>,
}

/// The credential attached to an issue request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// HTTP basic authentication.
    Basic { username: String, password: String },
    /// A `JSESSIONID` cookie obtained from the negotiated handshake.
    Session(String),
}

/// The outcome of a single issue lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueLookup {
    /// The HTTP status returned by the tracker.
    pub status: u16,
    /// The issue summary (`fields.summary`); only present on success.
    pub summary: Option<String>,
    /// The raw response body.
    pub raw_body: String,
}

