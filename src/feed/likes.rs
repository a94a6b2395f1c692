use futures_util::future::join;
use tracing::{info, warn};

use crate::{
    db::{Like, Match, User},
    error::BotError,
    messenger::{notify, Outgoing},
    now,
    AppState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikePayload {
    Plain,
    Message(String),
    /// URL of the clip in the media store.
    Video(String),
}

impl LikePayload {
    fn columns(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Plain => (None, None),
            Self::Message(text) => (Some(text.as_str()), None),
            Self::Video(url) => (None, Some(url.as_str())),
        }
    }

    /// What the liked user is told was attached.
    fn preview(&self) -> Option<&str> {
        match self {
            Self::Plain => None,
            Self::Message(text) => Some(text.as_str()),
            Self::Video(_) => Some("[video]"),
        }
    }
}

#[derive(Debug)]
pub struct LikeOutcome {
    pub like: Like,
    /// Set once the like is reciprocated.
    pub matched: Option<Match>,
    /// Whether this call created the match.
    pub new_match: bool,
}

pub(crate) const MATCH_TEXT: &str =
    "🔥 It's mutual! Use /start_chat to open an anonymous chat.";

/// Records `viewer`'s interest in `target_user_id` and matches the pair on a
/// reciprocal like. Notifications go out after the writes and may be lost.
pub async fn like(state: &AppState, viewer: &User, target_user_id: i64, payload: LikePayload) -> Result<LikeOutcome, BotError> {
    if viewer.id == target_user_id {
        return Err(BotError::Validation("You can't like your own profile.".to_owned()));
    }
    let target = state
        .repos
        .users
        .by_id(target_user_id)
        .await?
        .ok_or(BotError::NotFound("This profile is no longer available."))?;

    let now = now();
    let (message, video_url) = payload.columns();
    let like = state.repos.likes.upsert(viewer.id, target.id, message, video_url, now).await?;

    let mut matched = None;
    let mut new_match = false;
    if state.repos.likes.exists(target.id, viewer.id).await? {
        let (found, created) = state.repos.matches.insert_or_fetch(viewer.id, target.id, now).await?;
        if created {
            info!(match_id = found.id, user1 = found.user1_id, user2 = found.user2_id, "match created");
        }
        matched = Some(found);
        new_match = created;
    }

    let liker_name = match state.repos.profiles.by_user(viewer.id).await {
        Ok(Some(profile)) => profile.name,
        Ok(None) => "Someone".to_owned(),
        Err(err) => {
            warn!(user = viewer.id, "profile lookup failed: {err}");
            "Someone".to_owned()
        }
    };
    let mut text = format!("{liker_name} liked you!");
    if let Some(preview) = payload.preview() {
        text.push_str("\nMessage: ");
        text.push_str(preview);
    }
    notify(&*state.messenger, target.external_id, Outgoing::text(text)).await;

    if new_match {
        join(
            notify(&*state.messenger, viewer.external_id, Outgoing::text(MATCH_TEXT)),
            notify(&*state.messenger, target.external_id, Outgoing::text(MATCH_TEXT)),
        )
        .await;
    }

    Ok(LikeOutcome { like, matched, new_match })
}
