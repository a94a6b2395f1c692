//! Name → Gender → Age → City → Photo → Bio, then the profile is saved.

use time::Duration;
use tracing::{debug, info};

use crate::{
    db::{Profile, ProfileFields, User},
    error::BotError,
    media::MediaKind,
    messenger::{notify, Identity, Inbound, Markup, Outgoing, Payload},
    now,
    session::{Draft, Entry, Session, Step},
    AppState,
};

use super::{back_keyboard, create_keyboard, forget_media, menu, store_media, validate, BACK_LABEL};

/// Priority window granted to a newly created profile.
pub const BOOST_WINDOW: Duration = Duration::hours(24);

fn gender_keyboard() -> Markup {
    Markup::keyboard(&[&["Male", "Female"], &["Other"], &[BACK_LABEL]])
}

pub(crate) fn prompt(step: Step) -> Outgoing {
    match step {
        Step::Name => Outgoing::text("Send your name as you want it shown.").with_markup(back_keyboard()),
        Step::Gender => Outgoing::text("Choose your gender:").with_markup(gender_keyboard()),
        Step::Age => Outgoing::text("Enter your age (a number from 18 to 100).").with_markup(back_keyboard()),
        Step::City => Outgoing::text("Enter your city.").with_markup(back_keyboard()),
        Step::Photo => Outgoing::text("Send a photo for your profile (as a photo, not a file).").with_markup(back_keyboard()),
        Step::Bio => Outgoing::text("Tell us about yourself (a short bio).").with_markup(back_keyboard()),
        _ => Outgoing::text("Press the button to create your profile.").with_markup(create_keyboard()),
    }
}

pub(crate) async fn begin(state: &AppState, session: &mut Session, user: &User, chat: Identity, entry: Entry) -> Result<(), BotError> {
    let existing = state.repos.profiles.by_user(user.id).await?;
    let intro = if existing.is_some() {
        "Let's update your profile. Send your name as you want it shown.\nPress '⬅️ Back' to cancel."
    } else {
        "Let's create your profile. Send your name as you want it shown.\nPress '⬅️ Back' to cancel."
    };

    session.entry = entry;
    session.step = Step::Name;
    debug!(user = user.external_id, ?entry, existing = existing.is_some(), "registration started");

    notify(&*state.messenger, chat, Outgoing::text(intro).with_markup(back_keyboard())).await;
    Ok(())
}

async fn advance(state: &AppState, session: &mut Session, chat: Identity, next: Step) {
    debug!(chat, from = ?session.step, to = ?next, "registration step");
    session.step = next;
    notify(&*state.messenger, chat, prompt(next)).await;
}

async fn reprompt(state: &AppState, chat: Identity, text: &str) {
    notify(&*state.messenger, chat, Outgoing::text(text)).await;
}

pub(crate) async fn handle(state: &AppState, session: &mut Session, user: &User, msg: &Inbound) -> Result<(), BotError> {
    let chat = msg.chat;
    if msg.text() == Some(BACK_LABEL) {
        return back(state, session, user, chat).await;
    }
    let text = msg.text().and_then(validate::non_empty);

    match session.step {
        Step::Name => match text {
            Some(name) => {
                session.draft.name = Some(name);
                advance(state, session, chat, Step::Gender).await;
            }
            None => reprompt(state, chat, "Enter a valid name.").await,
        },
        Step::Gender => match text.as_deref().and_then(validate::parse_gender) {
            Some(gender) => {
                session.draft.gender = Some(gender);
                advance(state, session, chat, Step::Age).await;
            }
            None => {
                let retry = Outgoing::text("Please choose your gender on the keyboard: Male, Female or Other.")
                    .with_markup(gender_keyboard());
                notify(&*state.messenger, chat, retry).await;
            }
        },
        Step::Age => match text.as_deref().and_then(validate::parse_age) {
            Some(age) => {
                session.draft.age = Some(age);
                advance(state, session, chat, Step::City).await;
            }
            None => reprompt(state, chat, "Age must be a number from 18 to 100. Enter your age again.").await,
        },
        Step::City => match text {
            Some(city) => {
                session.draft.city = Some(city);
                advance(state, session, chat, Step::Photo).await;
            }
            None => reprompt(state, chat, "Enter a valid city name.").await,
        },
        Step::Photo => match &msg.payload {
            Payload::Photo(file) => match store_media(state, file, MediaKind::Image).await {
                Ok(url) => {
                    session.draft.media = vec![url];
                    advance(state, session, chat, Step::Bio).await;
                }
                Err(BotError::Transport(_)) => reprompt(state, chat, "Couldn't get the photo. Send it again.").await,
                Err(_) => reprompt(state, chat, "Photo upload failed. Try another image.").await,
            },
            _ => {
                let retry = Outgoing::text("Please send a photo (as a photo, not a file).").with_markup(back_keyboard());
                notify(&*state.messenger, chat, retry).await;
            }
        },
        Step::Bio => match text {
            Some(bio) => finish(state, session, user, chat, bio).await?,
            None => reprompt(state, chat, "The bio must not be empty. Enter your bio.").await,
        },
        _ => {}
    }
    Ok(())
}

/// Rewinds one step; the staged answers stay in the draft.
async fn back(state: &AppState, session: &mut Session, user: &User, chat: Identity) -> Result<(), BotError> {
    let previous = match session.step {
        Step::Name => return exit(state, session, user, chat).await,
        Step::Gender => Step::Name,
        Step::Age => Step::Gender,
        Step::City => Step::Age,
        Step::Photo => Step::City,
        Step::Bio => Step::Photo,
        _ => return Ok(()),
    };
    advance(state, session, chat, previous).await;
    Ok(())
}

/// Leaves the flow to wherever it was entered from.
async fn exit(state: &AppState, session: &mut Session, user: &User, chat: Identity) -> Result<(), BotError> {
    let entry = session.entry;
    session.clear();
    debug!(user = user.external_id, ?entry, "registration abandoned");

    if entry == Entry::Menu {
        if let Some(profile) = state.repos.profiles.by_user(user.id).await? {
            menu::show_menu(state, session, chat, &profile).await;
            return Ok(());
        }
    }
    notify(&*state.messenger, chat, prompt(Step::Idle)).await;
    Ok(())
}

fn complete(draft: &Draft, bio: String) -> Option<ProfileFields> {
    if draft.media.is_empty() {
        return None;
    }
    Some(ProfileFields {
        name: draft.name.clone()?,
        gender: draft.gender?,
        age: draft.age?,
        city: draft.city.clone()?,
        media: draft.media.clone(),
        bio,
    })
}

/// First step whose answer is missing from the draft.
fn first_gap(draft: &Draft) -> Step {
    if draft.name.is_none() {
        Step::Name
    } else if draft.gender.is_none() {
        Step::Gender
    } else if draft.age.is_none() {
        Step::Age
    } else if draft.city.is_none() {
        Step::City
    } else {
        Step::Photo
    }
}

async fn finish(state: &AppState, session: &mut Session, user: &User, chat: Identity, bio: String) -> Result<(), BotError> {
    let Some(fields) = complete(&session.draft, bio) else {
        let gap = first_gap(&session.draft);
        advance(state, session, chat, gap).await;
        return Ok(());
    };

    // a failed write leaves the user on this step
    save_profile(state, user, &fields).await?;
    session.clear();

    let done = "Profile saved.\nUse /start to manage it:\n\
                1. Browse profiles\n2. Fill in the profile again\n3. Change photo/video\n4. Change profile text";
    notify(&*state.messenger, chat, Outgoing::text(done).with_markup(Markup::RemoveKeyboard)).await;
    Ok(())
}

/// Inserts with a fresh boost window or updates the user's profile in place.
/// Media the previous version pointed at is removed once replaced.
pub async fn save_profile(state: &AppState, user: &User, fields: &ProfileFields) -> Result<Profile, BotError> {
    let previous = state.repos.profiles.by_user(user.id).await?;
    let now = now();
    let boost_until = now + BOOST_WINDOW.whole_seconds();
    let profile = state.repos.profiles.upsert(user.id, fields, now, boost_until).await?;
    info!(user_id = user.id, profile_id = profile.id, "profile saved");

    if let Some(previous) = previous {
        let stale: Vec<String> = previous.media.into_iter().filter(|url| !profile.media.contains(url)).collect();
        forget_media(state, &stale).await;
    }
    Ok(profile)
}
