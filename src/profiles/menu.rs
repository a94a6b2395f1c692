//! The "my profile" menu and the short edit flows hanging off it.

use tracing::{debug, info};

use crate::{
    db::{Profile, User},
    error::BotError,
    feed,
    media::MediaKind,
    messenger::{notify, Identity, Inbound, Markup, Outgoing, Payload},
    now,
    session::{Entry, Session, Step},
    AppState,
};

use super::{back_keyboard, card, create_keyboard, forget_media, registration, store_media, validate, BACK_LABEL};

pub const BROWSE_LABEL: &str = "1. Browse profiles";
pub const REFILL_LABEL: &str = "2. Fill in the profile again";
pub const MEDIA_LABEL: &str = "3. Change photo/video";
pub const BIO_LABEL: &str = "4. Change profile text";

const CHOICES: &str = "Choose:\n1. Browse profiles\n2. Fill in the profile again\n\
                       3. Change photo/video\n4. Change profile text\n(answer with a number)";

const NO_PROFILE: &str = "You don't have a profile yet. Use /register to create one.";

fn menu_keyboard() -> Markup {
    Markup::keyboard(&[&[BROWSE_LABEL, REFILL_LABEL], &[MEDIA_LABEL, BIO_LABEL]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Browse,
    Refill,
    Media,
    Bio,
}

impl Choice {
    /// Accepts the bare number, "n." prefixes and the button labels.
    fn parse(raw: &str) -> Option<Self> {
        let choices = [
            ("1", Self::Browse),
            ("2", Self::Refill),
            ("3", Self::Media),
            ("4", Self::Bio),
        ];
        choices
            .into_iter()
            .find(|(n, _)| raw == *n || raw.strip_prefix(n).is_some_and(|rest| rest.starts_with('.')))
            .map(|(_, choice)| choice)
    }
}

pub(crate) async fn show_menu(state: &AppState, session: &mut Session, chat: Identity, profile: &Profile) {
    session.step = Step::Menu;
    let text = format!("{}\n\n{CHOICES}", card::own_profile(profile));
    notify(&*state.messenger, chat, Outgoing::text(text).with_markup(menu_keyboard())).await;
}

async fn require_profile(state: &AppState, user: &User) -> Result<Profile, BotError> {
    state
        .repos
        .profiles
        .by_user(user.id)
        .await?
        .ok_or(BotError::NotFound(NO_PROFILE))
}

/// `/start`: the menu for members, a welcome with the create button otherwise.
pub async fn start(state: &AppState, session: &mut Session, user: &User, chat: Identity) -> Result<(), BotError> {
    session.clear();
    match state.repos.profiles.by_user(user.id).await? {
        Some(profile) => show_menu(state, session, chat, &profile).await,
        None => {
            let welcome = "Welcome! Here you can meet people anonymously.\n\
                           Create a profile to start browsing. See /privacy for how your data is used.";
            notify(&*state.messenger, chat, Outgoing::text(welcome).with_markup(create_keyboard())).await;
        }
    }
    Ok(())
}

pub async fn my_profile(state: &AppState, session: &mut Session, user: &User, chat: Identity) -> Result<(), BotError> {
    let profile = require_profile(state, user).await?;
    session.clear();
    show_menu(state, session, chat, &profile).await;
    Ok(())
}

pub(crate) async fn choose(state: &AppState, session: &mut Session, user: &User, msg: &Inbound) -> Result<(), BotError> {
    let chat = msg.chat;
    let choice = msg.text().and_then(Choice::parse);
    debug!(user = user.external_id, ?choice, "menu choice");

    match choice {
        // the menu stays open while browsing
        Some(Choice::Browse) => feed::browse(state, user, chat).await?,
        Some(Choice::Refill) => registration::begin(state, session, user, chat, Entry::Menu).await?,
        Some(Choice::Media) => {
            session.step = Step::ChangePhoto;
            let ask = Outgoing::text("Send a new photo or video for your profile.").with_markup(back_keyboard());
            notify(&*state.messenger, chat, ask).await;
        }
        Some(Choice::Bio) => {
            session.step = Step::ChangeBio;
            let ask = Outgoing::text("Send the new profile text.").with_markup(back_keyboard());
            notify(&*state.messenger, chat, ask).await;
        }
        None => {
            let hint = "Choose a menu item with the buttons or send a number: 1, 2, 3 or 4.";
            notify(&*state.messenger, chat, Outgoing::text(hint)).await;
        }
    }
    Ok(())
}

/// Back from an edit flow: the menu if a profile exists, the create prompt otherwise.
async fn back_to_menu(state: &AppState, session: &mut Session, user: &User, chat: Identity) -> Result<(), BotError> {
    session.clear();
    match state.repos.profiles.by_user(user.id).await? {
        Some(profile) => show_menu(state, session, chat, &profile).await,
        None => {
            notify(&*state.messenger, chat, registration::prompt(Step::Idle)).await;
        }
    }
    Ok(())
}

async fn edited_profile(state: &AppState, session: &mut Session, user: &User) -> Result<Profile, BotError> {
    match state.repos.profiles.by_user(user.id).await? {
        Some(profile) => Ok(profile),
        None => {
            session.clear();
            Err(BotError::NotFound(NO_PROFILE))
        }
    }
}

pub(crate) async fn change_media(state: &AppState, session: &mut Session, user: &User, msg: &Inbound) -> Result<(), BotError> {
    let chat = msg.chat;
    let (file, kind) = match &msg.payload {
        Payload::Photo(file) => (file, MediaKind::Image),
        Payload::Video(file) => (file, MediaKind::Video),
        Payload::Text(text) if text.trim() == BACK_LABEL => return back_to_menu(state, session, user, chat).await,
        _ => {
            notify(&*state.messenger, chat, Outgoing::text("Please send a photo or a video (as media).")).await;
            return Ok(());
        }
    };

    let url = match store_media(state, file, kind).await {
        Ok(url) => url,
        Err(BotError::Transport(_)) => {
            notify(&*state.messenger, chat, Outgoing::text("Couldn't get the media. Send it again.")).await;
            return Ok(());
        }
        Err(_) => {
            notify(&*state.messenger, chat, Outgoing::text("Media upload failed. Try again.")).await;
            return Ok(());
        }
    };

    let profile = edited_profile(state, session, user).await?;
    let media = vec![url];
    state.repos.profiles.set_media(profile.id, &media, now()).await?;
    forget_media(state, &profile.media).await;
    info!(profile_id = profile.id, ?kind, "profile media replaced");

    notify(&*state.messenger, chat, Outgoing::text("Media updated.")).await;
    let profile = Profile { media, ..profile };
    show_menu(state, session, chat, &profile).await;
    Ok(())
}

pub(crate) async fn change_bio(state: &AppState, session: &mut Session, user: &User, msg: &Inbound) -> Result<(), BotError> {
    let chat = msg.chat;
    let raw = msg.text().unwrap_or_default();
    if raw == BACK_LABEL {
        return back_to_menu(state, session, user, chat).await;
    }
    let Some(bio) = validate::non_empty(raw) else {
        let retry = "The text must not be empty. Send the new profile text.";
        notify(&*state.messenger, chat, Outgoing::text(retry)).await;
        return Ok(());
    };

    let profile = edited_profile(state, session, user).await?;
    state.repos.profiles.set_bio(profile.id, &bio, now()).await?;
    info!(profile_id = profile.id, "profile text replaced");

    notify(&*state.messenger, chat, Outgoing::text("Profile text updated.")).await;
    let profile = Profile { bio: Some(bio), ..profile };
    show_menu(state, session, chat, &profile).await;
    Ok(())
}

/// `/pause_profile` and `/resume_profile`.
pub async fn set_active(state: &AppState, user: &User, chat: Identity, active: bool) -> Result<(), BotError> {
    let profile = require_profile(state, user).await?;
    state.repos.profiles.set_active(profile.id, active, now()).await?;
    info!(profile_id = profile.id, active, "profile visibility changed");

    let text = if active {
        "Your profile is active again."
    } else {
        "Your profile is paused and won't be shown in the feed."
    };
    notify(&*state.messenger, chat, Outgoing::text(text)).await;
    Ok(())
}

pub async fn delete(state: &AppState, session: &mut Session, user: &User, chat: Identity) -> Result<(), BotError> {
    let profile = require_profile(state, user).await?;
    state.repos.profiles.delete(profile.id).await?;
    forget_media(state, &profile.media).await;
    session.clear();
    info!(profile_id = profile.id, user_id = user.id, "profile deleted");

    notify(&*state.messenger, chat, Outgoing::text("Profile deleted.").with_markup(create_keyboard())).await;
    Ok(())
}
