use time::Duration;
use tracing::{debug, warn};

use crate::{
    db::{Profile, User},
    error::BotError,
    messenger::{notify, Identity, InlineButton, Markup, Outgoing},
    profiles::card,
    store::{CandidateFilter, FeedPool, Repos},
    AppState,
};

use super::actions::{FeedAction, FeedCallback};

/// Profiles shown to a viewer within this window are not shown again.
pub const VIEW_LOOKBACK: Duration = Duration::days(2);

/// Picks the next profile for `viewer`: a live boost wins over recency.
pub async fn next_candidate(repos: &Repos, viewer: &User, now: i64) -> Result<Option<Profile>, BotError> {
    let own = repos.profiles.by_user(viewer.id).await?;
    let since = now - VIEW_LOOKBACK.whole_seconds();
    let exclude_profile_ids = repos.views.recent_profile_ids(viewer.id, since).await?;

    let filter = CandidateFilter {
        viewer_user_id: viewer.id,
        gender: own.as_ref().and_then(|p| p.gender.opposite()),
        city: own.and_then(|p| p.city).filter(|city| !city.is_empty()),
        exclude_profile_ids,
    };

    for pool in [FeedPool::Boosted { now }, FeedPool::Recent] {
        if let Some(profile) = repos.profiles.next_candidate(&filter, pool).await? {
            debug!(viewer = viewer.id, profile_id = profile.id, ?pool, "candidate selected");
            return Ok(Some(profile));
        }
    }
    Ok(None)
}

fn candidate_keyboard(profile: &Profile) -> Markup {
    let button = |label: &str, action| {
        InlineButton::new(label, FeedCallback::new(action, profile.id, profile.user_id).to_string())
    };
    Markup::Inline(vec![
        vec![button("❤️ Like", FeedAction::Like), button("💬 Like + message", FeedAction::LikeMessage)],
        vec![button("🎬 Like + video", FeedAction::LikeVideo), button("⏭️ Skip", FeedAction::Skip)],
    ])
}

/// Sends the profile card and logs it as viewed.
pub async fn show_candidate(state: &AppState, viewer: &User, chat: Identity, profile: &Profile, now: i64) {
    let caption = card::profile_card(profile, now);
    let keyboard = candidate_keyboard(profile);

    let shown = match profile.media.first() {
        Some(url) => {
            let photo = Outgoing::photo(url.clone(), caption.clone()).with_markup(keyboard.clone());
            notify(&*state.messenger, chat, photo).await
        }
        None => false,
    };
    if !shown {
        notify(&*state.messenger, chat, Outgoing::text(caption).with_markup(keyboard)).await;
    }

    if let Err(err) = state.repos.views.record(viewer.id, profile.id, now).await {
        warn!(viewer = viewer.id, profile_id = profile.id, "failed to record view: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::Gender, messenger::Body, now, testing};

    const TOM: i64 = 701;

    #[tokio::test]
    async fn boosted_candidate_first_then_recent() {
        let h = testing::harness().await;
        let (viewer, _) = h.member(TOM, "Tom", Gender::Male, "Paris").await;
        let (_, plain) = h.member(702, "Eva", Gender::Female, "Paris").await;
        let (_, boosted) = h.member(703, "Mia", Gender::Female, "Paris").await;
        let now = now();
        h.state.repos.profiles.set_boosted_until(boosted.id, Some(now + 3600)).await.unwrap();

        let first = next_candidate(&h.state.repos, &viewer, now).await.unwrap().unwrap();
        assert_eq!(first.id, boosted.id);

        h.state.repos.views.record(viewer.id, first.id, now).await.unwrap();
        let second = next_candidate(&h.state.repos, &viewer, now).await.unwrap().unwrap();
        assert_eq!(second.id, plain.id);

        h.state.repos.views.record(viewer.id, second.id, now).await.unwrap();
        assert!(next_candidate(&h.state.repos, &viewer, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn views_expire_after_the_lookback() {
        let h = testing::harness().await;
        let (viewer, _) = h.member(TOM, "Tom", Gender::Male, "Paris").await;
        let (_, eva) = h.member(702, "Eva", Gender::Female, "Paris").await;
        let now = now();

        let stale = now - VIEW_LOOKBACK.whole_seconds() - 1;
        h.state.repos.views.record(viewer.id, eva.id, stale).await.unwrap();
        let again = next_candidate(&h.state.repos, &viewer, now).await.unwrap();
        assert_eq!(again.map(|p| p.id), Some(eva.id));
    }

    #[tokio::test]
    async fn filters_follow_the_viewer_profile() {
        let h = testing::harness().await;
        let (viewer, _) = h.member(TOM, "Tom", Gender::Male, "Paris").await;
        h.member(702, "Max", Gender::Male, "Paris").await;
        h.member(703, "Lea", Gender::Female, "Lyon").await;
        let now = now();
        assert!(next_candidate(&h.state.repos, &viewer, now).await.unwrap().is_none());

        // an "other" viewer is shown every gender
        let (other, _) = h.member(704, "Sam", Gender::Other, "Lyon").await;
        let found = next_candidate(&h.state.repos, &other, now).await.unwrap().unwrap();
        assert_eq!(found.name, "Lea");

        // without a profile nothing is filtered but the viewer themself
        let newcomer = h.user(705).await;
        assert!(next_candidate(&h.state.repos, &newcomer, now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shown_candidate_carries_actions_and_is_recorded() {
        let h = testing::harness().await;
        let (viewer, _) = h.member(TOM, "Tom", Gender::Male, "Paris").await;
        let (_, eva) = h.member(702, "Eva", Gender::Female, "Paris").await;

        let now = now();
        show_candidate(&h.state, &viewer, TOM, &eva, now).await;

        let last = h.messenger.last_to(TOM).unwrap();
        assert!(matches!(last.body, Body::Photo { ref url, .. } if url == "mem://photo-702"));
        let Some(Markup::Inline(rows)) = last.markup else {
            panic!("expected inline buttons");
        };
        assert_eq!(rows[1][1].data, format!("feed:skip:{}:{}", eva.id, eva.user_id));

        let seen = h.state.repos.views.recent_profile_ids(viewer.id, now - 1).await.unwrap();
        assert_eq!(seen, vec![eva.id]);
    }

    #[tokio::test]
    async fn unrecorded_view_does_not_break_the_feed() {
        let h = testing::harness().await;
        h.member(TOM, "Tom", Gender::Male, "Paris").await;
        h.member(702, "Eva", Gender::Female, "Paris").await;
        sqlx::query(
            "CREATE TRIGGER views_readonly BEFORE INSERT ON viewed_profiles \
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END",
        )
        .execute(&h.pool)
        .await
        .unwrap();

        h.text(TOM, "/feed").await;
        let last = h.messenger.last_to(TOM).unwrap();
        assert!(matches!(last.body, Body::Photo { ref url, .. } if url == "mem://photo-702"));

        // nothing was recorded, so the same card comes again
        h.messenger.clear();
        h.text(TOM, "/feed").await;
        let texts = h.messenger.texts_to(TOM);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Name: Eva"));
        assert!(!texts.iter().any(|t| t == crate::error::GENERIC_FAILURE));
    }
}
