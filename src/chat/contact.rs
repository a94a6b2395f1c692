use std::fmt;

use futures_util::future::join;
use tracing::{debug, info};

use crate::{
    db::User,
    error::BotError,
    messenger::{notify, CallbackEvent, Identity, InlineButton, Markup, Outgoing},
    AppState,
};

use super::relay;

pub const PREFIX: &str = "chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Button payload `chat:<approve|reject>:<match_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactCallback {
    pub decision: Decision,
    pub match_id: i64,
}

impl ContactCallback {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        if parts.next()? != PREFIX {
            return None;
        }
        let decision = match parts.next()? {
            "approve" => Decision::Approve,
            "reject" => Decision::Reject,
            _ => return None,
        };
        let match_id = parts.next()?.parse().ok()?;
        Some(Self { decision, match_id })
    }
}

impl fmt::Display for ContactCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decision = match self.decision {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        };
        write!(f, "{PREFIX}:{decision}:{}", self.match_id)
    }
}

/// A way to reach `user` outside the bot.
fn contact_of(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{username}"),
        None => format!("tg://user?id={}", user.external_id),
    }
}

/// `/share_contact`: asks the other party of the open chat for consent.
pub async fn request_contact(state: &AppState, user: &User, chat: Identity) -> Result<(), BotError> {
    let active = relay::active_chat(&state.repos, user)
        .await?
        .ok_or(BotError::NotFound("No active chat to exchange contacts in."))?;

    let button = |label: &str, decision| {
        let data = ContactCallback { decision, match_id: active.matched.id };
        InlineButton::new(label, data.to_string())
    };
    let ask = Outgoing::text("The other party asked to exchange contacts. Allow?").with_markup(Markup::Inline(vec![vec![
        button("Allow contact exchange", Decision::Approve),
        button("Decline", Decision::Reject),
    ]]));

    if notify(&*state.messenger, active.peer.external_id, ask).await {
        debug!(match_id = active.matched.id, from = user.id, "contact exchange requested");
        let sent = "Request sent. Waiting for the other party to confirm.";
        notify(&*state.messenger, chat, Outgoing::text(sent)).await;
    } else {
        notify(&*state.messenger, chat, Outgoing::text("Couldn't reach the other party.")).await;
    }
    Ok(())
}

/// Handles the consent buttons. Returns the text to acknowledge the press with.
pub async fn resolve_contact(state: &AppState, user: &User, cb: &CallbackEvent) -> Result<Option<&'static str>, BotError> {
    let Some(data) = ContactCallback::parse(&cb.data) else {
        return Ok(Some("Invalid data"));
    };
    let Some(matched) = state.repos.matches.by_id(data.match_id).await? else {
        return Ok(Some("Match not found"));
    };
    // only a party to the match may answer
    let Some(requester_id) = matched.other(user.id) else {
        return Ok(Some("Match not found"));
    };
    let Some(requester) = state.repos.users.by_id(requester_id).await? else {
        return Ok(Some("Match not found"));
    };

    match data.decision {
        Decision::Approve => {
            let to_requester = format!("Contact exchange approved. The other party's contact: {}", contact_of(user));
            let to_user = format!("Contact exchange approved. The other party's contact: {}", contact_of(&requester));
            join(
                notify(&*state.messenger, requester.external_id, Outgoing::text(to_requester)),
                notify(&*state.messenger, cb.chat, Outgoing::text(to_user)),
            )
            .await;
            info!(match_id = matched.id, "contacts exchanged");
            Ok(Some("Contacts exchanged"))
        }
        Decision::Reject => {
            let declined = Outgoing::text("The other party declined the contact exchange.");
            notify(&*state.messenger, requester.external_id, declined).await;
            notify(&*state.messenger, cb.chat, Outgoing::text("You declined the contact exchange.")).await;
            Ok(Some("Declined"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Gender, testing};

    const IDA: i64 = 1101;
    const JON: i64 = 1102;

    async fn chatting(h: &testing::Harness) -> (User, User, i64) {
        let (ida, _) = h.member(IDA, "Ida", Gender::Female, "Bern").await;
        let (jon, _) = h.member(JON, "Jon", Gender::Male, "Bern").await;
        let (m, _) = h.state.repos.matches.insert_or_fetch(ida.id, jon.id, 1).await.unwrap();
        h.state.repos.chats.insert(m.id, 1).await.unwrap();
        (ida, jon, m.id)
    }

    #[test]
    fn callback_data_format() {
        let data = ContactCallback { decision: Decision::Reject, match_id: 9 };
        assert_eq!(data.to_string(), "chat:reject:9");
        assert_eq!(ContactCallback::parse("chat:reject:9"), Some(data));
        assert_eq!(ContactCallback::parse("chat:maybe:9"), None);
        assert_eq!(ContactCallback::parse("chat:approve"), None);
    }

    #[tokio::test]
    async fn request_prompts_only_the_peer() {
        let h = testing::harness().await;
        let (ida, _, match_id) = chatting(&h).await;

        request_contact(&h.state, &ida, IDA).await.unwrap();
        let ask = h.messenger.last_to(JON).unwrap();
        let Some(Markup::Inline(rows)) = ask.markup else {
            panic!("expected consent buttons");
        };
        assert_eq!(rows[0][0].data, format!("chat:approve:{match_id}"));
        assert_eq!(h.messenger.last_text_to(IDA), "Request sent. Waiting for the other party to confirm.");
    }

    #[tokio::test]
    async fn approval_shares_both_contacts() {
        let h = testing::harness().await;
        let (_, _, match_id) = chatting(&h).await;

        h.click(JON, &format!("chat:approve:{match_id}")).await;
        assert_eq!(h.messenger.last_text_to(IDA), "Contact exchange approved. The other party's contact: @user1102");
        assert_eq!(h.messenger.last_text_to(JON), "Contact exchange approved. The other party's contact: @user1101");
    }

    #[tokio::test]
    async fn rejection_wording_differs_per_side() {
        let h = testing::harness().await;
        let (_, _, match_id) = chatting(&h).await;

        h.click(JON, &format!("chat:reject:{match_id}")).await;
        assert_eq!(h.messenger.last_text_to(JON), "You declined the contact exchange.");
        assert_eq!(h.messenger.last_text_to(IDA), "The other party declined the contact exchange.");
    }

    #[tokio::test]
    async fn outsiders_cannot_answer() {
        let h = testing::harness().await;
        let (_, _, match_id) = chatting(&h).await;

        h.click(1199, &format!("chat:approve:{match_id}")).await;
        assert!(h.messenger.texts_to(IDA).is_empty());
        assert!(h.messenger.texts_to(JON).is_empty());
        let acks = h.messenger.acks.lock().unwrap().clone();
        assert_eq!(acks.last().unwrap().1.as_deref(), Some("Match not found"));
    }
}
