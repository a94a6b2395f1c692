//! Browsing candidate profiles and reacting to them.

pub mod actions;
pub mod likes;
pub mod selector;

use crate::{
    db::User,
    error::BotError,
    messenger::{notify, Identity, Outgoing},
    now,
    AppState,
};

pub use actions::FeedCallback;
pub use likes::{like, LikeOutcome, LikePayload};

pub(crate) const NO_CANDIDATES: &str = "No suitable profiles found. Try again later.";
pub(crate) const EXHAUSTED: &str = "No more profiles. Try again later.";

/// `/feed` and menu choice 1: shows the next candidate, if any.
pub async fn browse(state: &AppState, viewer: &User, chat: Identity) -> Result<(), BotError> {
    let now = now();
    match selector::next_candidate(&state.repos, viewer, now).await? {
        Some(profile) => selector::show_candidate(state, viewer, chat, &profile, now).await,
        None => {
            notify(&*state.messenger, chat, Outgoing::text(NO_CANDIDATES)).await;
        }
    }
    Ok(())
}
