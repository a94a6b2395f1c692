use std::fmt;

use tracing::{debug, warn};

use crate::{
    db::User,
    error::BotError,
    media::MediaKind,
    messenger::{notify, CallbackEvent, Identity, Inbound, Markup, Outgoing, Payload},
    now,
    profiles::{store_media, validate},
    session::{Session, Step},
    AppState,
};

use super::{likes, selector, LikePayload, EXHAUSTED};

pub const PREFIX: &str = "feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    Like,
    LikeMessage,
    LikeVideo,
    Skip,
}

impl FeedAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::LikeMessage => "like_msg",
            Self::LikeVideo => "like_vid",
            Self::Skip => "skip",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "like" => Self::Like,
            "like_msg" => Self::LikeMessage,
            "like_vid" => Self::LikeVideo,
            "skip" => Self::Skip,
            _ => return None,
        })
    }
}

/// Button payload `feed:<action>:<profile_id>:<user_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCallback {
    pub action: FeedAction,
    pub profile_id: i64,
    pub user_id: i64,
}

impl FeedCallback {
    pub fn new(action: FeedAction, profile_id: i64, user_id: i64) -> Self {
        Self { action, profile_id, user_id }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(4, ':');
        if parts.next()? != PREFIX {
            return None;
        }
        let action = FeedAction::parse(parts.next()?)?;
        let profile_id = parts.next()?.parse().ok()?;
        let user_id = parts.next()?.parse().ok()?;
        Some(Self { action, profile_id, user_id })
    }
}

impl fmt::Display for FeedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}:{}:{}:{}", self.action.as_str(), self.profile_id, self.user_id)
    }
}

/// Shows the next candidate, or turns the pressed card into an end notice.
async fn show_next(state: &AppState, viewer: &User, chat: Identity, message_id: Option<i64>) -> Result<(), BotError> {
    let now = now();
    if let Some(profile) = selector::next_candidate(&state.repos, viewer, now).await? {
        selector::show_candidate(state, viewer, chat, &profile, now).await;
        return Ok(());
    }

    let edited = match message_id {
        Some(id) => match state.messenger.edit_text(chat, id, EXHAUSTED).await {
            Ok(()) => true,
            Err(err) => {
                warn!(chat, "failed to edit feed message: {err:#}");
                false
            }
        },
        None => false,
    };
    if !edited {
        notify(&*state.messenger, chat, Outgoing::text(EXHAUSTED)).await;
    }
    Ok(())
}

/// Handles a feed button. Returns the text to acknowledge the press with.
pub(crate) async fn handle_callback(
    state: &AppState,
    session: &mut Session,
    viewer: &User,
    cb: &CallbackEvent,
) -> Result<Option<&'static str>, BotError> {
    let Some(data) = FeedCallback::parse(&cb.data) else {
        return Ok(Some("Invalid data"));
    };
    debug!(viewer = viewer.id, ?data, "feed action");

    match data.action {
        FeedAction::Skip => {
            show_next(state, viewer, cb.chat, cb.message_id).await?;
            Ok(Some("Skipped"))
        }
        FeedAction::Like => {
            likes::like(state, viewer, data.user_id, LikePayload::Plain).await?;
            show_next(state, viewer, cb.chat, cb.message_id).await?;
            Ok(Some("Like sent"))
        }
        FeedAction::LikeMessage => {
            session.step = Step::LikeMessage { target_user_id: data.user_id };
            let ask = Outgoing::text("Write a message to send with your like.").with_markup(Markup::RemoveKeyboard);
            notify(&*state.messenger, cb.chat, ask).await;
            Ok(None)
        }
        FeedAction::LikeVideo => {
            session.step = Step::LikeVideo { target_user_id: data.user_id };
            let ask = Outgoing::text("Send a video (as a video, not a file).").with_markup(Markup::RemoveKeyboard);
            notify(&*state.messenger, cb.chat, ask).await;
            Ok(None)
        }
    }
}

/// Completes a like that waits for its attached text or video.
pub(crate) async fn handle_pending(state: &AppState, session: &mut Session, viewer: &User, msg: &Inbound) -> Result<(), BotError> {
    let chat = msg.chat;
    match session.step {
        Step::LikeMessage { target_user_id } => {
            let Some(text) = msg.text().and_then(validate::non_empty) else {
                notify(&*state.messenger, chat, Outgoing::text("The message must not be empty.")).await;
                return Ok(());
            };
            session.clear();
            likes::like(state, viewer, target_user_id, LikePayload::Message(text)).await?;
            notify(&*state.messenger, chat, Outgoing::text("Like with message sent.")).await;
        }
        Step::LikeVideo { target_user_id } => {
            let Payload::Video(file) = &msg.payload else {
                let retry = "Please send the video as a video (not a file).";
                notify(&*state.messenger, chat, Outgoing::text(retry)).await;
                return Ok(());
            };
            let url = match store_media(state, file, MediaKind::Video).await {
                Ok(url) => url,
                Err(BotError::Transport(_)) => {
                    let retry = "Couldn't get the video. Try sending it again.";
                    notify(&*state.messenger, chat, Outgoing::text(retry)).await;
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            session.clear();
            likes::like(state, viewer, target_user_id, LikePayload::Video(url)).await?;
            notify(&*state.messenger, chat, Outgoing::text("Like with video sent.")).await;
        }
        _ => {}
    }
    Ok(())
}
