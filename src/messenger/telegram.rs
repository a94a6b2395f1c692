use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::GetField;

use super::{Body, FileRef, Identity, Markup, Messenger, Outgoing};

/// Bot HTTP API client.
pub struct TelegramMessenger {
    http: reqwest::Client,
    api_url: String,
    file_url: String,
}

impl TelegramMessenger {
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            api_url: format!("{base_url}/bot{token}"),
            file_url: format!("{base_url}/file/bot{token}"),
        })
    }

    async fn call(&self, method: &str, payload: Value) -> anyhow::Result<Value> {
        debug!(method, "bot api call");
        let body: Value = self.http
            .post(format!("{}/{method}", self.api_url))
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = body.get_str_field("description").unwrap_or_else(|_| body.to_string());
            bail!("{method} failed: {description}");
        }
        Ok(body.get_obj_field("result")?.clone())
    }
}

pub(crate) fn markup_json(markup: &Markup) -> Value {
    match markup {
        Markup::Inline(rows) => json!({
            "inline_keyboard": rows.iter().map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.text, "callback_data": b.data }))
                    .collect::<Vec<_>>()
            }).collect::<Vec<_>>()
        }),
        Markup::Keyboard(rows) => json!({
            "keyboard": rows.iter().map(|row| {
                row.iter().map(|label| json!({ "text": label })).collect::<Vec<_>>()
            }).collect::<Vec<_>>(),
            "resize_keyboard": true,
        }),
        Markup::RemoveKeyboard => json!({ "remove_keyboard": true }),
    }
}

pub(crate) fn send_request(to: Identity, msg: &Outgoing) -> (&'static str, Value) {
    let (method, mut payload) = match &msg.body {
        Body::Text(text) => ("sendMessage", json!({ "chat_id": to, "text": text })),
        Body::Photo { url, caption } => (
            "sendPhoto",
            json!({ "chat_id": to, "photo": url, "caption": caption }),
        ),
    };
    if let Some(markup) = &msg.markup {
        payload["reply_markup"] = markup_json(markup);
    }
    (method, payload)
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, to: Identity, msg: Outgoing) -> anyhow::Result<i64> {
        let (method, payload) = send_request(to, &msg);
        self.call(method, payload).await?.get_i64_field("message_id")
    }

    async fn edit_text(&self, chat: Identity, message_id: i64, text: &str) -> anyhow::Result<()> {
        self.call(
            "editMessageText",
            json!({ "chat_id": chat, "message_id": message_id, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn copy_to(&self, from_chat: Identity, message_id: i64, to: Identity) -> anyhow::Result<()> {
        self.call(
            "copyMessage",
            json!({ "chat_id": to, "from_chat_id": from_chat, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn download(&self, file: &FileRef) -> anyhow::Result<Vec<u8>> {
        let info = self.call("getFile", json!({ "file_id": file.0 })).await?;
        let path = info.get_str_field("file_path")?;

        let resp = self.http
            .get(format!("{}/{path}", self.file_url))
            .send()
            .await?
            .error_for_status()?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(anyhow!("empty file {}", file.0));
        }
        Ok(bytes.to_vec())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.call("answerCallbackQuery", payload).await?;
        Ok(())
    }
}
