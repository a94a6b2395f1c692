//! Typed access to the record store, one narrow repository per entity.

mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{Chat, Complaint, Gender, Like, Match, NewUser, Profile, ProfileFields, User};

pub use sqlite::SqliteStore;

type Result<T> = std::result::Result<T, sqlx::Error>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Creates the user on first contact, refreshes the names afterwards.
    async fn upsert(&self, user: &NewUser, now: i64) -> Result<User>;
    async fn by_id(&self, id: i64) -> Result<Option<User>>;
    async fn by_external_id(&self, external_id: i64) -> Result<Option<User>>;
    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<()>;
}

/// Which pool of candidates the feed draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPool {
    /// Boost not yet expired, latest expiry first.
    Boosted { now: i64 },
    /// Newest profiles first.
    Recent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    pub viewer_user_id: i64,
    pub gender: Option<Gender>,
    pub city: Option<String>,
    pub exclude_profile_ids: Vec<i64>,
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn by_user(&self, user_id: i64) -> Result<Option<Profile>>;
    /// Inserts with `boost_until`, or updates in place keeping the stored
    /// boost and creation time.
    async fn upsert(&self, user_id: i64, fields: &ProfileFields, now: i64, boost_until: i64) -> Result<Profile>;
    async fn set_media(&self, profile_id: i64, media: &[String], now: i64) -> Result<()>;
    async fn set_bio(&self, profile_id: i64, bio: &str, now: i64) -> Result<()>;
    async fn set_active(&self, profile_id: i64, active: bool, now: i64) -> Result<()>;
    #[cfg(test)]
    async fn set_boosted_until(&self, profile_id: i64, boosted_until: Option<i64>) -> Result<()>;
    async fn delete(&self, profile_id: i64) -> Result<()>;
    async fn next_candidate(&self, filter: &CandidateFilter, pool: FeedPool) -> Result<Option<Profile>>;
}

#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// One row per ordered pair; a repeat overwrites the payload.
    async fn upsert(&self, from: i64, to: i64, message: Option<&str>, video_url: Option<&str>, now: i64) -> Result<Like>;
    async fn exists(&self, from: i64, to: i64) -> Result<bool>;
    #[cfg(test)]
    async fn get(&self, from: i64, to: i64) -> Result<Option<Like>>;
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Returns the match for the pair and whether this call created it.
    async fn insert_or_fetch(&self, a: i64, b: i64, now: i64) -> Result<(Match, bool)>;
    #[cfg(test)]
    async fn between(&self, a: i64, b: i64) -> Result<Option<Match>>;
    async fn by_id(&self, id: i64) -> Result<Option<Match>>;
    async fn active_for_user(&self, user_id: i64) -> Result<Vec<Match>>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn insert(&self, match_id: i64, now: i64) -> Result<Chat>;
    /// Active chats of the given matches, most recently updated first.
    async fn active_for_matches(&self, match_ids: &[i64]) -> Result<Vec<Chat>>;
    async fn has_active(&self, match_id: i64) -> Result<bool>;
    async fn deactivate(&self, chat_id: i64, now: i64) -> Result<()>;
    async fn deactivate_for_matches(&self, match_ids: &[i64], now: i64) -> Result<u64>;
}

#[async_trait]
pub trait ComplaintRepository: Send + Sync {
    async fn insert(&self, from: Option<i64>, against: Option<i64>, reason: &str, now: i64) -> Result<Complaint>;
    #[cfg(test)]
    async fn by_reporter(&self, from: i64) -> Result<Vec<Complaint>>;
}

#[async_trait]
pub trait ViewRepository: Send + Sync {
    async fn record(&self, user_id: i64, profile_id: i64, now: i64) -> Result<()>;
    async fn recent_profile_ids(&self, user_id: i64, since: i64) -> Result<Vec<i64>>;
}

#[derive(Clone)]
pub struct Repos {
    pub users: Arc<dyn UserRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub matches: Arc<dyn MatchRepository>,
    pub chats: Arc<dyn ChatRepository>,
    pub complaints: Arc<dyn ComplaintRepository>,
    pub views: Arc<dyn ViewRepository>,
}

impl Repos {
    pub fn sqlite(db_pool: SqlitePool) -> Self {
        let store = Arc::new(SqliteStore::new(db_pool));
        Self {
            users: store.clone(),
            profiles: store.clone(),
            likes: store.clone(),
            matches: store.clone(),
            chats: store.clone(),
            complaints: store.clone(),
            views: store,
        }
    }
}
