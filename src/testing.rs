//! Fakes for the external collaborators and a harness driving the dispatcher.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Mutex,
    },
};

use anyhow::bail;
use async_trait::async_trait;
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};

use crate::{
    config::Config,
    db::{self, Gender, NewUser, Profile, ProfileFields, User},
    dispatch,
    media::{MediaKind, MediaStore, StoredMedia},
    messenger::{CallbackEvent, Event, FileRef, Identity, Inbound, Messenger, Outgoing, Payload},
    now,
    res,
    session::{Session, SessionStore},
    store::Repos,
    AppState,
};

pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    // every connection would get its own empty database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    db::migrate(&db_pool).await.unwrap();
    db_pool
}

#[derive(Default)]
pub(crate) struct RecordingMessenger {
    pub sent: Mutex<Vec<(Identity, Outgoing)>>,
    pub edits: Mutex<Vec<(Identity, i64, String)>>,
    pub copies: Mutex<Vec<(Identity, i64, Identity)>>,
    pub acks: Mutex<Vec<(String, Option<String>)>>,
    pub unreachable: Mutex<HashSet<Identity>>,
    pub fail_downloads: AtomicBool,
    next_id: AtomicI64,
}

impl RecordingMessenger {
    pub fn texts_to(&self, to: Identity) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == to)
            .map(|(_, msg)| msg.text_content().to_owned())
            .collect()
    }

    pub fn last_to(&self, to: Identity) -> Option<Outgoing> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| *id == to)
            .map(|(_, msg)| msg.clone())
    }

    pub fn last_text_to(&self, to: Identity) -> String {
        self.last_to(to).map(|m| m.text_content().to_owned()).unwrap_or_default()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.edits.lock().unwrap().clear();
        self.copies.lock().unwrap().clear();
        self.acks.lock().unwrap().clear();
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, to: Identity, msg: Outgoing) -> anyhow::Result<i64> {
        if self.unreachable.lock().unwrap().contains(&to) {
            bail!("bot was blocked by {to}");
        }
        self.sent.lock().unwrap().push((to, msg));
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn edit_text(&self, chat: Identity, message_id: i64, text: &str) -> anyhow::Result<()> {
        self.edits.lock().unwrap().push((chat, message_id, text.to_owned()));
        Ok(())
    }

    async fn copy_to(&self, from_chat: Identity, message_id: i64, to: Identity) -> anyhow::Result<()> {
        if self.unreachable.lock().unwrap().contains(&to) {
            bail!("bot was blocked by {to}");
        }
        self.copies.lock().unwrap().push((from_chat, message_id, to));
        Ok(())
    }

    async fn download(&self, file: &FileRef) -> anyhow::Result<Vec<u8>> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            bail!("download of {} failed", file.0);
        }
        Ok(format!("bytes of {}", file.0).into_bytes())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        self.acks.lock().unwrap().push((callback_id.to_owned(), text.map(str::to_owned)));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryMedia {
    pub fail: AtomicBool,
    pub items: Mutex<HashMap<String, (Vec<u8>, MediaKind)>>,
    counter: AtomicI64,
}

#[async_trait]
impl MediaStore for MemoryMedia {
    async fn upload(&self, bytes: Vec<u8>, kind: MediaKind) -> anyhow::Result<StoredMedia> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("media store unavailable");
        }
        let id = format!("m{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.items.lock().unwrap().insert(id.clone(), (bytes, kind));
        Ok(StoredMedia { url: format!("mem://{id}"), id })
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.items.lock().unwrap().remove(id);
        Ok(())
    }

    fn id_of(&self, url: &str) -> Option<String> {
        url.strip_prefix("mem://").map(str::to_owned)
    }
}

pub(crate) fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_owned(),
        db_max_connections: 1,
        bot_token: "test-token".to_owned(),
        bot_api_url: "http://bot.invalid".to_owned(),
        bind_addr: "127.0.0.1:0".to_owned(),
        media_dir: "./media".into(),
        media_base_url: "mem:/".to_owned(),
        webhook_secret: None,
        privacy_text: res::PRIVACY.to_owned(),
    }
}

pub(crate) fn new_user(external_id: i64) -> NewUser {
    NewUser {
        external_id,
        username: Some(format!("user{external_id}")),
        first_name: Some(format!("First{external_id}")),
        last_name: None,
    }
}

pub(crate) struct Harness {
    pub state: AppState,
    pub messenger: Arc<RecordingMessenger>,
    pub media: Arc<MemoryMedia>,
    /// Same single connection the repositories use.
    pub pool: SqlitePool,
    message_ids: AtomicI64,
}

pub(crate) async fn harness() -> Harness {
    let messenger = Arc::new(RecordingMessenger::default());
    let media = Arc::new(MemoryMedia::default());
    let pool = memory_pool().await;
    let state = AppState {
        repos: Repos::sqlite(pool.clone()),
        messenger: messenger.clone(),
        media: media.clone(),
        sessions: SessionStore::default(),
        config: Arc::new(test_config()),
    };
    Harness { state, messenger, media, pool, message_ids: AtomicI64::new(1000) }
}

impl Harness {
    pub async fn user(&self, external_id: i64) -> User {
        self.state.repos.users.upsert(&new_user(external_id), now()).await.unwrap()
    }

    /// A registered user with a complete, active profile.
    pub async fn member(&self, external_id: i64, name: &str, gender: Gender, city: &str) -> (User, Profile) {
        let user = self.user(external_id).await;
        let fields = ProfileFields {
            name: name.to_owned(),
            gender,
            age: 25,
            city: city.to_owned(),
            media: vec![format!("mem://photo-{external_id}")],
            bio: format!("{name} bio"),
        };
        let profile = self.state.repos.profiles.upsert(user.id, &fields, now(), 0).await.unwrap();
        (user, profile)
    }

    pub async fn send(&self, external_id: i64, payload: Payload) -> i64 {
        let message_id = self.message_ids.fetch_add(1, Ordering::SeqCst);
        let event = Event::Message(Inbound {
            from: new_user(external_id),
            chat: external_id,
            message_id,
            payload,
        });
        dispatch::dispatch(&self.state, event).await;
        message_id
    }

    pub async fn text(&self, external_id: i64, text: &str) -> i64 {
        self.send(external_id, Payload::Text(text.to_owned())).await
    }

    pub async fn photo(&self, external_id: i64) -> i64 {
        self.send(external_id, Payload::Photo(FileRef(format!("photo-of-{external_id}")))).await
    }

    pub async fn click(&self, external_id: i64, data: &str) {
        let message_id = self.message_ids.fetch_add(1, Ordering::SeqCst);
        let event = Event::Callback(CallbackEvent {
            id: format!("cb{message_id}"),
            from: new_user(external_id),
            chat: external_id,
            message_id: Some(message_id),
            data: data.to_owned(),
        });
        dispatch::dispatch(&self.state, event).await;
    }

    pub async fn session(&self, external_id: i64) -> Session {
        self.state.sessions.snapshot(external_id).await.unwrap_or_default()
    }
}
