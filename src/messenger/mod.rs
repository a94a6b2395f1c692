//! The messaging endpoint: outbound operations the core needs, and the
//! transport-neutral shape of inbound events.

mod telegram;
mod update;

use async_trait::async_trait;
use tracing::warn;

use crate::db::NewUser;

pub use telegram::TelegramMessenger;
pub use update::Update;

/// A messaging identity. In private chats it is also the chat to reply to.
pub type Identity = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self { text: text.into(), data: data.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    Inline(Vec<Vec<InlineButton>>),
    Keyboard(Vec<Vec<String>>),
    RemoveKeyboard,
}

impl Markup {
    pub fn keyboard(rows: &[&[&str]]) -> Self {
        Self::Keyboard(
            rows.iter()
                .map(|row| row.iter().map(|label| (*label).to_owned()).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Photo { url: String, caption: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub body: Body,
    pub markup: Option<Markup>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self { body: Body::Text(text.into()), markup: None }
    }

    pub fn photo(url: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            body: Body::Photo { url: url.into(), caption: caption.into() },
            markup: None,
        }
    }

    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = Some(markup);
        self
    }

    /// Text of the message, or the caption of a photo.
    #[cfg(test)]
    pub fn text_content(&self) -> &str {
        match &self.body {
            Body::Text(text) => text,
            Body::Photo { caption, .. } => caption,
        }
    }
}

/// Opaque handle to a file held by the messaging endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Photo(FileRef),
    Video(FileRef),
    Document(FileRef),
    Other,
}

#[derive(Debug, Clone)]
pub struct Inbound {
    pub from: NewUser,
    pub chat: Identity,
    pub message_id: i64,
    pub payload: Payload,
}

impl Inbound {
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text.trim()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub id: String,
    pub from: NewUser,
    pub chat: Identity,
    pub message_id: Option<i64>,
    pub data: String,
}

#[derive(Debug, Clone)]
pub enum Event {
    Message(Inbound),
    Callback(CallbackEvent),
}

impl Event {
    pub fn from_user(&self) -> &NewUser {
        match self {
            Self::Message(msg) => &msg.from,
            Self::Callback(cb) => &cb.from,
        }
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a message and returns its id.
    async fn send(&self, to: Identity, msg: Outgoing) -> anyhow::Result<i64>;
    async fn edit_text(&self, chat: Identity, message_id: i64, text: &str) -> anyhow::Result<()>;
    /// Copies a message without any reference to its author.
    async fn copy_to(&self, from_chat: Identity, message_id: i64, to: Identity) -> anyhow::Result<()>;
    async fn download(&self, file: &FileRef) -> anyhow::Result<Vec<u8>>;
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()>;
}

/// Best-effort send: failures are logged and swallowed.
pub async fn notify(messenger: &dyn Messenger, to: Identity, msg: Outgoing) -> bool {
    match messenger.send(to, msg).await {
        Ok(_) => true,
        Err(err) => {
            warn!(to, "notification failed: {err:#}");
            false
        }
    }
}

pub async fn ack(messenger: &dyn Messenger, callback_id: &str, text: Option<&str>) {
    if let Err(err) = messenger.answer_callback(callback_id, text).await {
        warn!(callback_id, "callback answer failed: {err:#}");
    }
}
