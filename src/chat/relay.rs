use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::{
    db::{Chat, Match, User},
    error::BotError,
    messenger::{notify, Identity, Outgoing},
    now,
    profiles::validate,
    store::Repos,
    AppState,
};

pub(crate) const PEER_ENDED: &str = "The other party ended the chat.";
const MAX_LISTED_MATCHES: usize = 20;

/// The one open chat of a user, with the match and the other party.
#[derive(Debug, Clone)]
pub struct ActiveChat {
    pub chat: Chat,
    pub matched: Match,
    pub peer: User,
}

/// The user's open chat. Should several be open, the most recently touched wins.
pub async fn active_chat(repos: &Repos, user: &User) -> Result<Option<ActiveChat>, BotError> {
    let matches = repos.matches.active_for_user(user.id).await?;
    let match_ids: Vec<i64> = matches.iter().map(|m| m.id).collect();
    let Some(chat) = repos.chats.active_for_matches(&match_ids).await?.into_iter().next() else {
        return Ok(None);
    };
    let Some(matched) = matches.into_iter().find(|m| m.id == chat.match_id) else {
        return Ok(None);
    };
    let Some(peer_id) = matched.other(user.id) else {
        return Ok(None);
    };
    let Some(peer) = repos.users.by_id(peer_id).await? else {
        return Ok(None);
    };
    Ok(Some(ActiveChat { chat, matched, peer }))
}

/// Profile name, falling back to the messenger names.
pub async fn display_name(repos: &Repos, user: &User) -> Result<String, BotError> {
    if let Some(profile) = repos.profiles.by_user(user.id).await? {
        return Ok(profile.name);
    }
    Ok(messenger_name(user))
}

fn messenger_name(user: &User) -> String {
    user.first_name
        .clone()
        .or_else(|| user.username.clone())
        .unwrap_or_else(|| "User".to_owned())
}

/// Name for a notice sent after the writes; a failed lookup falls back to the
/// messenger names.
async fn notice_name(repos: &Repos, user: &User) -> String {
    match display_name(repos, user).await {
        Ok(name) => name,
        Err(err) => {
            warn!(user = user.id, "profile lookup failed: {err}");
            messenger_name(user)
        }
    }
}

async fn require_active(repos: &Repos, user: &User, missing: &'static str) -> Result<ActiveChat, BotError> {
    active_chat(repos, user).await?.ok_or(BotError::NotFound(missing))
}

/// Opens a chat on the first match without one. Every other chat of either
/// party is closed first, so each of them keeps at most one.
pub async fn start_chat(state: &AppState, user: &User, chat: Identity) -> Result<(), BotError> {
    let repos = &state.repos;
    let matches = repos.matches.active_for_user(user.id).await?;
    if matches.is_empty() {
        return Err(BotError::NotFound("You have no active matches to start a chat with."));
    }

    let mut candidate = None;
    for m in &matches {
        if !repos.chats.has_active(m.id).await? {
            candidate = Some(m.clone());
            break;
        }
    }
    let Some(candidate) = candidate else {
        return Err(BotError::NotFound(
            "All your matches already have active chats. Use /end_chat to finish the current one, then /start_chat.",
        ));
    };
    let peer = match candidate.other(user.id) {
        Some(peer_id) => repos.users.by_id(peer_id).await?,
        None => None,
    };
    let Some(peer) = peer else {
        return Err(BotError::NotFound("This match is no longer available."));
    };

    let peer_matches = repos.matches.active_for_user(peer.id).await?;
    let affected: BTreeSet<i64> = matches.iter().chain(&peer_matches).map(|m| m.id).collect();
    let affected: Vec<i64> = affected.into_iter().collect();

    // whoever loses a chat to this one is told it ended
    let closing = repos.chats.active_for_matches(&affected).await?;
    let mut bystanders = Vec::new();
    for open in &closing {
        let Some(m) = matches.iter().chain(&peer_matches).find(|m| m.id == open.match_id) else {
            continue;
        };
        for party in [m.user1_id, m.user2_id] {
            if party != user.id && party != peer.id && !bystanders.contains(&party) {
                bystanders.push(party);
            }
        }
    }

    let now = now();
    let closed = repos.chats.deactivate_for_matches(&affected, now).await?;
    let opened = repos.chats.insert(candidate.id, now).await?;
    info!(chat_id = opened.id, match_id = candidate.id, closed, "chat started");

    for party in bystanders {
        match repos.users.by_id(party).await {
            Ok(Some(bystander)) => {
                notify(&*state.messenger, bystander.external_id, Outgoing::text(PEER_ENDED)).await;
            }
            Ok(None) => {}
            Err(err) => warn!(user = party, "bystander lookup failed: {err}"),
        }
    }

    let my_name = notice_name(repos, user).await;
    let peer_name = notice_name(repos, &peer).await;
    let to_me = format!(
        "Anonymous chat with '{peer_name}' started. Messages are relayed anonymously. Use /end_chat to finish."
    );
    let to_peer = format!(
        "'{my_name}' started an anonymous chat with you. Messages are relayed anonymously. Use /end_chat to finish."
    );
    notify(&*state.messenger, chat, Outgoing::text(to_me)).await;
    notify(&*state.messenger, peer.external_id, Outgoing::text(to_peer)).await;
    Ok(())
}

pub async fn end_chat(state: &AppState, user: &User, chat: Identity) -> Result<(), BotError> {
    let active = require_active(&state.repos, user, "You have no active chat.").await?;
    state.repos.chats.deactivate(active.chat.id, now()).await?;
    info!(chat_id = active.chat.id, by = user.id, "chat ended");

    notify(&*state.messenger, chat, Outgoing::text("Chat ended.")).await;
    notify(&*state.messenger, active.peer.external_id, Outgoing::text(PEER_ENDED)).await;
    Ok(())
}

/// Blocks the other party of the open chat and closes it. Future likes and
/// matches from the blocked user are not prevented.
pub async fn block_user(state: &AppState, user: &User, chat: Identity) -> Result<(), BotError> {
    let active = require_active(&state.repos, user, "No active chat to block.").await?;
    state.repos.users.set_blocked(active.peer.id, true).await?;
    state.repos.chats.deactivate(active.chat.id, now()).await?;
    info!(chat_id = active.chat.id, blocked = active.peer.id, by = user.id, "user blocked");

    notify(&*state.messenger, chat, Outgoing::text("User blocked, chat ended.")).await;
    Ok(())
}

/// Files a complaint against the other party of the open chat, if any.
pub async fn report(state: &AppState, user: &User, chat: Identity, reason: &str) -> Result<(), BotError> {
    let Some(reason) = validate::non_empty(reason) else {
        return Err(BotError::Validation("Usage: /report <reason>".to_owned()));
    };
    let against = active_chat(&state.repos, user).await?.map(|active| active.peer.id);
    let complaint = state.repos.complaints.insert(Some(user.id), against, &reason, now()).await?;
    info!(complaint_id = complaint.id, from = user.id, ?against, "complaint filed");

    notify(&*state.messenger, chat, Outgoing::text("Complaint sent.")).await;
    Ok(())
}

pub async fn my_matches(state: &AppState, user: &User, chat: Identity) -> Result<(), BotError> {
    let repos = &state.repos;
    let matches = repos.matches.active_for_user(user.id).await?;
    if matches.is_empty() {
        return Err(BotError::NotFound("You have no matches yet."));
    }

    let mut lines = vec!["Your matches:".to_owned()];
    for m in matches.iter().take(MAX_LISTED_MATCHES) {
        let name = match m.other(user.id) {
            Some(peer_id) => match repos.users.by_id(peer_id).await? {
                Some(peer) => display_name(repos, &peer).await?,
                None => "User".to_owned(),
            },
            None => continue,
        };
        let open = if repos.chats.has_active(m.id).await? { "yes" } else { "no" };
        lines.push(format!("• {name} (active chat: {open})"));
    }
    debug!(user = user.id, count = matches.len(), "matches listed");

    notify(&*state.messenger, chat, Outgoing::text(lines.join("\n"))).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Gender, testing};

    const ANA: i64 = 1001;
    const BEN: i64 = 1002;
    const CAL: i64 = 1003;

    async fn matched(h: &testing::Harness, a: &User, b: &User) -> Match {
        h.state.repos.likes.upsert(a.id, b.id, None, None, 1).await.unwrap();
        h.state.repos.likes.upsert(b.id, a.id, None, None, 1).await.unwrap();
        h.state.repos.matches.insert_or_fetch(a.id, b.id, 1).await.unwrap().0
    }

    async fn open_chats(h: &testing::Harness, user: &User) -> usize {
        let ids: Vec<i64> = h
            .state
            .repos
            .matches
            .active_for_user(user.id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        h.state.repos.chats.active_for_matches(&ids).await.unwrap().len()
    }

    #[tokio::test]
    async fn start_chat_keeps_one_open_chat_per_user() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;
        let (cal, _) = h.member(CAL, "Cal", Gender::Male, "Riga").await;
        matched(&h, &ana, &ben).await;
        matched(&h, &ana, &cal).await;

        start_chat(&h.state, &ana, ANA).await.unwrap();
        assert_eq!(open_chats(&h, &ana).await, 1);
        let first = active_chat(&h.state.repos, &ana).await.unwrap().unwrap();
        assert!(h.messenger.last_text_to(ANA).starts_with("Anonymous chat with '"));

        start_chat(&h.state, &ana, ANA).await.unwrap();
        assert_eq!(open_chats(&h, &ana).await, 1);
        let second = active_chat(&h.state.repos, &ana).await.unwrap().unwrap();
        assert_ne!(second.chat.id, first.chat.id);
        assert_ne!(second.peer.id, first.peer.id);

        // the displaced party learns the chat is over
        assert_eq!(h.messenger.last_text_to(first.peer.external_id), PEER_ENDED);
        assert_eq!(open_chats(&h, &first.peer).await, 0);
    }

    #[tokio::test]
    async fn peer_chats_are_closed_too() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;
        let (cal, _) = h.member(CAL, "Cal", Gender::Male, "Riga").await;
        matched(&h, &cal, &ben).await;
        start_chat(&h.state, &cal, CAL).await.unwrap();
        matched(&h, &ana, &ben).await;

        start_chat(&h.state, &ana, ANA).await.unwrap();
        assert_eq!(open_chats(&h, &ben).await, 1);
        assert_eq!(active_chat(&h.state.repos, &ben).await.unwrap().unwrap().peer.id, ana.id);
        assert_eq!(h.messenger.last_text_to(CAL), PEER_ENDED);
        assert_eq!(h.messenger.last_text_to(BEN), "'Ana' started an anonymous chat with you. Messages are relayed anonymously. Use /end_chat to finish.");
    }

    #[tokio::test]
    async fn failed_name_lookup_still_opens_and_announces_the_chat() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;
        matched(&h, &ana, &ben).await;
        sqlx::query("ALTER TABLE profiles RENAME TO profiles_offline").execute(&h.pool).await.unwrap();

        start_chat(&h.state, &ana, ANA).await.unwrap();
        assert_eq!(active_chat(&h.state.repos, &ana).await.unwrap().unwrap().peer.id, ben.id);
        assert_eq!(
            h.messenger.last_text_to(ANA),
            "Anonymous chat with 'First1002' started. Messages are relayed anonymously. Use /end_chat to finish."
        );
        assert_eq!(
            h.messenger.last_text_to(BEN),
            "'First1001' started an anonymous chat with you. Messages are relayed anonymously. Use /end_chat to finish."
        );
    }

    #[tokio::test]
    async fn end_chat_without_chat_changes_nothing() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;

        let err = end_chat(&h.state, &ana, ANA).await.unwrap_err();
        assert_eq!(err.user_message(), "You have no active chat.");
        let err = start_chat(&h.state, &ana, ANA).await.unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
        assert!(h.messenger.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_chat_notifies_both_with_distinct_wording() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;
        matched(&h, &ana, &ben).await;
        start_chat(&h.state, &ben, BEN).await.unwrap();

        let err = start_chat(&h.state, &ana, ANA).await.unwrap_err();
        assert!(err.user_message().starts_with("All your matches already have active chats."));

        end_chat(&h.state, &ana, ANA).await.unwrap();
        assert_eq!(h.messenger.last_text_to(ANA), "Chat ended.");
        assert_eq!(h.messenger.last_text_to(BEN), PEER_ENDED);
        assert!(active_chat(&h.state.repos, &ben).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn block_marks_peer_and_closes_chat() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;
        matched(&h, &ana, &ben).await;
        start_chat(&h.state, &ana, ANA).await.unwrap();

        block_user(&h.state, &ana, ANA).await.unwrap();
        assert!(h.state.repos.users.by_id(ben.id).await.unwrap().unwrap().blocked);
        assert!(active_chat(&h.state.repos, &ana).await.unwrap().is_none());
        assert!(block_user(&h.state, &ana, ANA).await.is_err());
    }

    #[tokio::test]
    async fn report_needs_a_reason_and_targets_the_peer() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;

        let err = report(&h.state, &ana, ANA, "   ").await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
        assert!(h.state.repos.complaints.by_reporter(ana.id).await.unwrap().is_empty());

        report(&h.state, &ana, ANA, "spam").await.unwrap();
        matched(&h, &ana, &ben).await;
        start_chat(&h.state, &ana, ANA).await.unwrap();
        report(&h.state, &ana, ANA, " rude ").await.unwrap();

        let filed = h.state.repos.complaints.by_reporter(ana.id).await.unwrap();
        assert_eq!(filed.len(), 2);
        let spam = filed.iter().find(|c| c.reason == "spam").unwrap();
        assert_eq!(spam.against_user_id, None);
        let rude = filed.iter().find(|c| c.reason == "rude").unwrap();
        assert_eq!(rude.against_user_id, Some(ben.id));
        assert!(!rude.resolved);
    }

    #[tokio::test]
    async fn my_matches_lists_names_and_chat_state() {
        let h = testing::harness().await;
        let (ana, _) = h.member(ANA, "Ana", Gender::Female, "Riga").await;
        let (ben, _) = h.member(BEN, "Ben", Gender::Male, "Riga").await;
        let cal = h.user(CAL).await;
        matched(&h, &ana, &ben).await;
        matched(&h, &ana, &cal).await;

        assert!(my_matches(&h.state, &h.user(4040).await, 4040).await.is_err());

        my_matches(&h.state, &ana, ANA).await.unwrap();
        let text = h.messenger.last_text_to(ANA);
        assert!(text.starts_with("Your matches:"));
        assert!(text.contains("• Ben (active chat: no)"));
        assert!(text.contains("• First1003 (active chat: no)"));
    }
}
