//! Profile creation and editing through a guided dialogue.

pub mod card;
pub mod menu;
pub mod registration;
pub mod validate;

use tracing::warn;

use crate::{
    error::BotError,
    media::MediaKind,
    messenger::{FileRef, Markup},
    AppState,
};

pub const BACK_LABEL: &str = "⬅️ Back";
pub const CREATE_LABEL: &str = "Create profile";

pub(crate) fn back_keyboard() -> Markup {
    Markup::keyboard(&[&[BACK_LABEL]])
}

pub(crate) fn create_keyboard() -> Markup {
    Markup::keyboard(&[&[CREATE_LABEL]])
}

/// Pulls a file from the messaging endpoint into the media store.
pub(crate) async fn store_media(state: &AppState, file: &FileRef, kind: MediaKind) -> Result<String, BotError> {
    let bytes = state.messenger.download(file).await.map_err(|err| {
        warn!("download of {} failed: {err:#}", file.0);
        BotError::Transport(err)
    })?;
    let stored = state.media.upload(bytes, kind).await.map_err(|err| {
        warn!("media upload failed: {err:#}");
        BotError::Media(err)
    })?;
    Ok(stored.url)
}

/// Best-effort removal of media that no profile points at any more.
pub(crate) async fn forget_media(state: &AppState, urls: &[String]) {
    for url in urls {
        let Some(id) = state.media.id_of(url) else {
            continue;
        };
        if let Err(err) = state.media.delete(&id).await {
            warn!(id, "failed to delete media: {err:#}");
        }
    }
}
