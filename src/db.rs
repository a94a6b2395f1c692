use std::{fmt, str::FromStr};

use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, FromRow, SqlitePool};
use thiserror::Error;
use tracing::info;

use crate::res;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Error)]
#[error("unknown gender {0:?}")]
pub struct UnknownGender(pub String);

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    /// The gender shown in this gender's feed; `Other` browses everyone.
    pub fn opposite(self) -> Option<Self> {
        match self {
            Self::Male => Some(Self::Female),
            Self::Female => Some(Self::Male),
            Self::Other => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = UnknownGender;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => Err(UnknownGender(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Gender {
    type Error = UnknownGender;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub blocked: bool,
    pub created_at: i64,
    pub updated_at: i64,

    // unique: external_id
}

/// Identity details carried by every inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub gender: Gender,
    pub age: i64,
    pub city: Option<String>,
    #[sqlx(json)]
    pub media: Vec<String>,
    pub bio: Option<String>,
    pub active: bool,
    pub boosted_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,

    // unique: user_id
}

/// Everything the registration dialogue collects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    pub name: String,
    pub gender: Gender,
    pub age: u8,
    pub city: String,
    pub media: Vec<String>,
    pub bio: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Like {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub message: Option<String>,
    pub video_url: Option<String>,
    pub created_at: i64,

    // unique: from_user_id, to_user_id
}

#[derive(Debug, Clone, FromRow)]
pub struct Match {
    pub id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub active: bool,
    pub created_at: i64,

    // user1_id < user2_id
    // unique: user1_id, user2_id
}

impl Match {
    /// Orders an unordered pair the way `matches` stores it.
    pub fn canonical_pair(a: i64, b: i64) -> (i64, i64) {
        (a.min(b), a.max(b))
    }

    pub fn other(&self, user_id: i64) -> Option<i64> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub fn involves(&self, user_id: i64) -> bool {
        self.other(user_id).is_some()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Chat {
    pub id: i64,
    pub match_id: i64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Complaint {
    pub id: i64,
    pub from_user_id: Option<i64>,
    pub against_user_id: Option<i64>,
    pub reason: String,
    pub resolved: bool,
    pub created_at: i64,
}

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    info!("database ready at {url}");

    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(res::SCHEMA).execute(db_pool).await?;
    Ok(())
}
