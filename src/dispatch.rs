//! Routes every inbound event to the component that owns it.

use tracing::{debug, error};

use crate::{
    chat,
    db::User,
    error::{BotError, GENERIC_FAILURE},
    feed::{self, actions},
    messenger::{ack, notify, CallbackEvent, Event, Identity, Inbound, Markup, Outgoing},
    now,
    profiles::{menu, registration, CREATE_LABEL},
    session::{Entry, Session, Step},
    AppState,
};

const IDLE_HINT: &str = "Use /start to open your profile menu or /feed to browse profiles.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command<'a> {
    Start,
    Privacy,
    Cancel,
    Register,
    MyProfile,
    Feed,
    PauseProfile,
    ResumeProfile,
    DeleteProfile,
    MyMatches,
    StartChat,
    EndChat,
    BlockUser,
    Report(&'a str),
    ShareContact,
}

impl<'a> Command<'a> {
    /// `/name[@bot] [args]`; unknown names are not commands.
    fn parse(text: &'a str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = head.split('@').next().unwrap_or(head);
        Some(match name {
            "start" => Self::Start,
            "privacy" => Self::Privacy,
            "cancel" => Self::Cancel,
            "register" => Self::Register,
            "myprofile" => Self::MyProfile,
            "feed" => Self::Feed,
            "pause_profile" => Self::PauseProfile,
            "resume_profile" => Self::ResumeProfile,
            "delete_profile" => Self::DeleteProfile,
            "my_matches" => Self::MyMatches,
            "start_chat" => Self::StartChat,
            "end_chat" => Self::EndChat,
            "block_user" => Self::BlockUser,
            "report" => Self::Report(args.trim()),
            "share_contact" => Self::ShareContact,
            _ => return None,
        })
    }
}

/// Handles one event to completion. The sender's session stays locked
/// throughout, so a user's events never interleave.
pub async fn dispatch(state: &AppState, event: Event) {
    let from = event.from_user().clone();
    let mut session = state.sessions.lock(from.external_id).await;
    handle(state, &mut session, event).await;
    state.sessions.release(from.external_id, session).await;
}

async fn handle(state: &AppState, session: &mut Session, event: Event) {
    let from = event.from_user();
    let user = match state.repos.users.upsert(from, now()).await {
        Ok(user) => user,
        Err(err) => {
            error!(external_id = from.external_id, "user upsert failed: {err}");
            match &event {
                Event::Message(msg) => {
                    notify(&*state.messenger, msg.chat, Outgoing::text(GENERIC_FAILURE)).await;
                }
                Event::Callback(cb) => ack(&*state.messenger, &cb.id, Some(GENERIC_FAILURE)).await,
            }
            return;
        }
    };

    match event {
        Event::Message(msg) => {
            if let Err(err) = on_message(state, session, &user, &msg).await {
                report_failure(state, msg.chat, &err).await;
            }
        }
        Event::Callback(cb) => {
            let answer = match on_callback(state, session, &user, &cb).await {
                Ok(answer) => answer,
                Err(err) => {
                    report_failure(state, cb.chat, &err).await;
                    None
                }
            };
            ack(&*state.messenger, &cb.id, answer).await;
        }
    }
}

async fn report_failure(state: &AppState, chat: Identity, err: &BotError) {
    if err.is_upstream() {
        error!(chat, "{err}");
    } else {
        debug!(chat, "{err}");
    }
    notify(&*state.messenger, chat, Outgoing::text(err.user_message())).await;
}

async fn on_command(state: &AppState, session: &mut Session, user: &User, chat: Identity, command: Command<'_>) -> Result<(), BotError> {
    debug!(user = user.external_id, ?command, "command");
    match command {
        Command::Start => menu::start(state, session, user, chat).await,
        Command::Privacy => {
            notify(&*state.messenger, chat, Outgoing::text(state.config.privacy_text.clone())).await;
            Ok(())
        }
        Command::Cancel => {
            session.clear();
            let done = Outgoing::text("Cancelled.").with_markup(Markup::RemoveKeyboard);
            notify(&*state.messenger, chat, done).await;
            Ok(())
        }
        Command::Register => {
            session.clear();
            registration::begin(state, session, user, chat, Entry::Start).await
        }
        Command::MyProfile => menu::my_profile(state, session, user, chat).await,
        Command::Feed => feed::browse(state, user, chat).await,
        Command::PauseProfile => menu::set_active(state, user, chat, false).await,
        Command::ResumeProfile => menu::set_active(state, user, chat, true).await,
        Command::DeleteProfile => menu::delete(state, session, user, chat).await,
        Command::MyMatches => chat::my_matches(state, user, chat).await,
        Command::StartChat => chat::start_chat(state, user, chat).await,
        Command::EndChat => chat::end_chat(state, user, chat).await,
        Command::BlockUser => chat::block_user(state, user, chat).await,
        Command::Report(reason) => chat::report(state, user, chat, reason).await,
        Command::ShareContact => chat::request_contact(state, user, chat).await,
    }
}

async fn on_message(state: &AppState, session: &mut Session, user: &User, msg: &Inbound) -> Result<(), BotError> {
    if let Some(command) = msg.text().and_then(Command::parse) {
        return on_command(state, session, user, msg.chat, command).await;
    }

    let step = session.step;
    if step.in_flow() {
        return match step {
            Step::ChangePhoto => menu::change_media(state, session, user, msg).await,
            Step::ChangeBio => menu::change_bio(state, session, user, msg).await,
            Step::LikeMessage { .. } | Step::LikeVideo { .. } => {
                actions::handle_pending(state, session, user, msg).await
            }
            _ => registration::handle(state, session, user, msg).await,
        };
    }

    // an open chat takes every plain message, keyboard labels included
    if chat::relay_message(state, user, msg).await? {
        return Ok(());
    }
    if msg.text() == Some(CREATE_LABEL) {
        return registration::begin(state, session, user, msg.chat, Entry::Start).await;
    }
    if step == Step::Menu {
        return menu::choose(state, session, user, msg).await;
    }

    notify(&*state.messenger, msg.chat, Outgoing::text(IDLE_HINT)).await;
    Ok(())
}

async fn on_callback(state: &AppState, session: &mut Session, user: &User, cb: &CallbackEvent) -> Result<Option<&'static str>, BotError> {
    match cb.data.split(':').next() {
        Some(actions::PREFIX) => actions::handle_callback(state, session, user, cb).await,
        Some(chat::contact::PREFIX) => chat::resolve_contact(state, user, cb).await,
        _ => Ok(Some("Invalid data")),
    }
}
