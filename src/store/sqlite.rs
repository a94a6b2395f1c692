use async_trait::async_trait;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqlitePool};

use crate::db::{Chat, Complaint, Like, Match, NewUser, Profile, ProfileFields, User};

use super::{
    CandidateFilter, ChatRepository, ComplaintRepository, FeedPool, LikeRepository,
    MatchRepository, ProfileRepository, Result, UserRepository, ViewRepository,
};

#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut list = qb.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    list.push_unseparated(")");
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn upsert(&self, user: &NewUser, now: i64) -> Result<User> {
        sqlx::query_as(
            "INSERT INTO users (external_id,username,first_name,last_name,created_at,updated_at) VALUES (?,?,?,?,?,?)
             ON CONFLICT(external_id) DO UPDATE SET
                username=excluded.username,
                first_name=excluded.first_name,
                last_name=excluded.last_name,
                updated_at=excluded.updated_at
             RETURNING *",
        )
        .bind(user.external_id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
    }

    async fn by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
    }

    async fn by_external_id(&self, external_id: i64) -> Result<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE external_id=?")
            .bind(external_id)
            .fetch_optional(&self.db_pool)
            .await
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<()> {
        sqlx::query("UPDATE users SET blocked=? WHERE id=?")
            .bind(blocked)
            .bind(id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for SqliteStore {
    async fn by_user(&self, user_id: i64) -> Result<Option<Profile>> {
        sqlx::query_as("SELECT * FROM profiles WHERE user_id=?")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await
    }

    async fn upsert(&self, user_id: i64, fields: &ProfileFields, now: i64, boost_until: i64) -> Result<Profile> {
        sqlx::query_as(
            "INSERT INTO profiles (user_id,name,gender,age,city,media,bio,active,boosted_until,created_at,updated_at)
             VALUES (?,?,?,?,?,?,?,1,?,?,?)
             ON CONFLICT(user_id) DO UPDATE SET
                name=excluded.name,
                gender=excluded.gender,
                age=excluded.age,
                city=excluded.city,
                media=excluded.media,
                bio=excluded.bio,
                active=1,
                updated_at=excluded.updated_at
             RETURNING *",
        )
        .bind(user_id)
        .bind(&fields.name)
        .bind(fields.gender.as_str())
        .bind(i64::from(fields.age))
        .bind(&fields.city)
        .bind(Json(&fields.media))
        .bind(&fields.bio)
        .bind(boost_until)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
    }

    async fn set_media(&self, profile_id: i64, media: &[String], now: i64) -> Result<()> {
        sqlx::query("UPDATE profiles SET media=?, updated_at=? WHERE id=?")
            .bind(Json(media))
            .bind(now)
            .bind(profile_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn set_bio(&self, profile_id: i64, bio: &str, now: i64) -> Result<()> {
        sqlx::query("UPDATE profiles SET bio=?, updated_at=? WHERE id=?")
            .bind(bio)
            .bind(now)
            .bind(profile_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, profile_id: i64, active: bool, now: i64) -> Result<()> {
        sqlx::query("UPDATE profiles SET active=?, updated_at=? WHERE id=?")
            .bind(active)
            .bind(now)
            .bind(profile_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    #[cfg(test)]
    async fn set_boosted_until(&self, profile_id: i64, boosted_until: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE profiles SET boosted_until=? WHERE id=?")
            .bind(boosted_until)
            .bind(profile_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, profile_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM profiles WHERE id=?")
            .bind(profile_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn next_candidate(&self, filter: &CandidateFilter, pool: FeedPool) -> Result<Option<Profile>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM profiles WHERE active=1 AND user_id != ");
        qb.push_bind(filter.viewer_user_id);
        if let Some(gender) = filter.gender {
            qb.push(" AND gender=").push_bind(gender.as_str());
        }
        if let Some(city) = &filter.city {
            qb.push(" AND city=").push_bind(city.clone());
        }
        if !filter.exclude_profile_ids.is_empty() {
            qb.push(" AND id NOT IN ");
            push_id_list(&mut qb, &filter.exclude_profile_ids);
        }
        match pool {
            FeedPool::Boosted { now } => {
                qb.push(" AND boosted_until >= ").push_bind(now);
                qb.push(" ORDER BY boosted_until DESC, id DESC");
            }
            FeedPool::Recent => {
                qb.push(" ORDER BY created_at DESC, id DESC");
            }
        }
        qb.push(" LIMIT 1");

        qb.build_query_as::<Profile>()
            .fetch_optional(&self.db_pool)
            .await
    }
}

#[async_trait]
impl LikeRepository for SqliteStore {
    async fn upsert(&self, from: i64, to: i64, message: Option<&str>, video_url: Option<&str>, now: i64) -> Result<Like> {
        sqlx::query_as(
            "INSERT INTO likes (from_user_id,to_user_id,message,video_url,created_at) VALUES (?,?,?,?,?)
             ON CONFLICT(from_user_id,to_user_id) DO UPDATE SET
                message=excluded.message,
                video_url=excluded.video_url,
                created_at=excluded.created_at
             RETURNING *",
        )
        .bind(from)
        .bind(to)
        .bind(message)
        .bind(video_url)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
    }

    async fn exists(&self, from: i64, to: i64) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM likes WHERE from_user_id=? AND to_user_id=? LIMIT 1")
            .bind(from)
            .bind(to)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(found.is_some())
    }

    #[cfg(test)]
    async fn get(&self, from: i64, to: i64) -> Result<Option<Like>> {
        sqlx::query_as("SELECT * FROM likes WHERE from_user_id=? AND to_user_id=?")
            .bind(from)
            .bind(to)
            .fetch_optional(&self.db_pool)
            .await
    }
}

#[async_trait]
impl MatchRepository for SqliteStore {
    async fn insert_or_fetch(&self, a: i64, b: i64, now: i64) -> Result<(Match, bool)> {
        let (user1_id, user2_id) = Match::canonical_pair(a, b);

        // the unique pair constraint turns a concurrent duplicate into a no-op
        let inserted = sqlx::query(
            "INSERT INTO matches (user1_id,user2_id,created_at) VALUES (?,?,?)
             ON CONFLICT(user1_id,user2_id) DO NOTHING",
        )
        .bind(user1_id)
        .bind(user2_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        let found = sqlx::query_as("SELECT * FROM matches WHERE user1_id=? AND user2_id=?")
            .bind(user1_id)
            .bind(user2_id)
            .fetch_one(&self.db_pool)
            .await?;

        Ok((found, inserted == 1))
    }

    #[cfg(test)]
    async fn between(&self, a: i64, b: i64) -> Result<Option<Match>> {
        let (user1_id, user2_id) = Match::canonical_pair(a, b);
        sqlx::query_as("SELECT * FROM matches WHERE user1_id=? AND user2_id=?")
            .bind(user1_id)
            .bind(user2_id)
            .fetch_optional(&self.db_pool)
            .await
    }

    async fn by_id(&self, id: i64) -> Result<Option<Match>> {
        sqlx::query_as("SELECT * FROM matches WHERE id=?")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
    }

    async fn active_for_user(&self, user_id: i64) -> Result<Vec<Match>> {
        sqlx::query_as("SELECT * FROM matches WHERE active=1 AND (user1_id=? OR user2_id=?) ORDER BY id")
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.db_pool)
            .await
    }
}

#[async_trait]
impl ChatRepository for SqliteStore {
    async fn insert(&self, match_id: i64, now: i64) -> Result<Chat> {
        sqlx::query_as("INSERT INTO chats (match_id,active,created_at,updated_at) VALUES (?,1,?,?) RETURNING *")
            .bind(match_id)
            .bind(now)
            .bind(now)
            .fetch_one(&self.db_pool)
            .await
    }

    async fn active_for_matches(&self, match_ids: &[i64]) -> Result<Vec<Chat>> {
        if match_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM chats WHERE active=1 AND match_id IN ");
        push_id_list(&mut qb, match_ids);
        qb.push(" ORDER BY updated_at DESC, id DESC");

        qb.build_query_as::<Chat>()
            .fetch_all(&self.db_pool)
            .await
    }

    async fn has_active(&self, match_id: i64) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT id FROM chats WHERE match_id=? AND active=1 LIMIT 1")
            .bind(match_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(found.is_some())
    }

    async fn deactivate(&self, chat_id: i64, now: i64) -> Result<()> {
        sqlx::query("UPDATE chats SET active=0, updated_at=? WHERE id=?")
            .bind(now)
            .bind(chat_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn deactivate_for_matches(&self, match_ids: &[i64], now: i64) -> Result<u64> {
        if match_ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE chats SET active=0, updated_at=");
        qb.push_bind(now);
        qb.push(" WHERE active=1 AND match_id IN ");
        push_id_list(&mut qb, match_ids);

        Ok(qb.build().execute(&self.db_pool).await?.rows_affected())
    }
}

#[async_trait]
impl ComplaintRepository for SqliteStore {
    async fn insert(&self, from: Option<i64>, against: Option<i64>, reason: &str, now: i64) -> Result<Complaint> {
        sqlx::query_as(
            "INSERT INTO complaints (from_user_id,against_user_id,reason,resolved,created_at) VALUES (?,?,?,0,?) RETURNING *",
        )
        .bind(from)
        .bind(against)
        .bind(reason)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
    }

    #[cfg(test)]
    async fn by_reporter(&self, from: i64) -> Result<Vec<Complaint>> {
        sqlx::query_as("SELECT * FROM complaints WHERE from_user_id=? ORDER BY id")
            .bind(from)
            .fetch_all(&self.db_pool)
            .await
    }
}

#[async_trait]
impl ViewRepository for SqliteStore {
    async fn record(&self, user_id: i64, profile_id: i64, now: i64) -> Result<()> {
        sqlx::query("INSERT INTO viewed_profiles (user_id,profile_id,viewed_at) VALUES (?,?,?)")
            .bind(user_id)
            .bind(profile_id)
            .bind(now)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn recent_profile_ids(&self, user_id: i64, since: i64) -> Result<Vec<i64>> {
        sqlx::query_scalar("SELECT DISTINCT profile_id FROM viewed_profiles WHERE user_id=? AND viewed_at >= ?")
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.db_pool)
            .await
    }
}
