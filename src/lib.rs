pub mod appresult;
pub mod chat;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod media;
pub mod messenger;
pub mod profiles;
pub mod res;
pub mod session;
pub mod store;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;
use time::OffsetDateTime;

pub use appresult::{AppError, AppResult};
pub use error::BotError;

use crate::{config::Config, media::MediaStore, messenger::Messenger, session::SessionStore, store::Repos};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub repos: Repos,
    pub messenger: Arc<dyn Messenger>,
    pub media: Arc<dyn MediaStore>,
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

/// Current time as UTC unix seconds, the unit every stored timestamp uses.
pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> anyhow::Result<String>;
    fn get_i64_field(&self, field: &str) -> anyhow::Result<i64>;
    fn get_obj_field(&self, field: &str) -> anyhow::Result<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> anyhow::Result<String> {
        Ok(
            self.get_obj_field(field)?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_i64_field(&self, field: &str) -> anyhow::Result<i64> {
        self.get_obj_field(field)?
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self} to be integer"))
    }

    fn get_obj_field(&self, field: &str) -> anyhow::Result<&Value> {
        self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))
    }
}
