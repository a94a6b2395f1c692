use serde::Deserialize;

use crate::db::NewUser;

use super::{CallbackEvent, Event, FileRef, Inbound, Payload};

/// A bot update as delivered to the webhook. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<Sender>,
    pub chat: Chat,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub video: Option<File>,
    pub document: Option<File>,
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct File {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Sender,
    pub message: Option<Message>,
    pub data: Option<String>,
}

impl Sender {
    fn into_user(self) -> NewUser {
        NewUser {
            external_id: self.id,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

impl Message {
    fn payload(&mut self) -> Payload {
        // sizes are listed smallest first
        if let Some(largest) = self.photo.take().and_then(|mut sizes| sizes.pop()) {
            Payload::Photo(FileRef(largest.file_id))
        } else if let Some(video) = self.video.take() {
            Payload::Video(FileRef(video.file_id))
        } else if let Some(doc) = self.document.take() {
            Payload::Document(FileRef(doc.file_id))
        } else if let Some(text) = self.text.take() {
            Payload::Text(text)
        } else {
            Payload::Other
        }
    }
}

impl Update {
    /// Converts into a core event; updates without a sender are dropped.
    pub fn into_event(self) -> Option<Event> {
        if let Some(mut msg) = self.message {
            let from = msg.from.take()?.into_user();
            let payload = msg.payload();
            return Some(Event::Message(Inbound {
                from,
                chat: msg.chat.id,
                message_id: msg.message_id,
                payload,
            }));
        }

        let cb = self.callback_query?;
        let chat = cb.message.as_ref().map_or(cb.from.id, |m| m.chat.id);
        Some(Event::Callback(CallbackEvent {
            id: cb.id,
            chat,
            message_id: cb.message.as_ref().map(|m| m.message_id),
            data: cb.data.unwrap_or_default(),
            from: cb.from.into_user(),
        }))
    }
}
