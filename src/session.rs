//! Per-user dialogue state, owned by the user's own events.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{db::Gender, messenger::Identity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Step {
    #[default]
    Idle,
    Name,
    Gender,
    Age,
    City,
    Photo,
    Bio,
    Menu,
    ChangePhoto,
    ChangeBio,
    LikeMessage { target_user_id: i64 },
    LikeVideo { target_user_id: i64 },
}

impl Step {
    /// Steps that own the user's next message, ahead of the chat relay.
    pub fn in_flow(self) -> bool {
        !matches!(self, Self::Idle | Self::Menu)
    }
}

/// Where registration was started from; decides where "back" leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Entry {
    #[default]
    Start,
    Menu,
}

/// Registration answers staged until the profile is saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u8>,
    pub city: Option<String>,
    pub media: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub step: Step,
    pub entry: Entry,
    pub draft: Draft,
}

impl Session {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Identity, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    /// Locks the user's session, creating it on first contact. Held for the
    /// whole event so one user's events run one at a time.
    pub async fn lock(&self, id: Identity) -> OwnedMutexGuard<Session> {
        let slot = {
            let mut sessions = self.inner.lock().await;
            sessions.entry(id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Unlocks the session and drops its slot once it is back to the
    /// default. Slots another event is waiting on are kept.
    pub async fn release(&self, id: Identity, guard: OwnedMutexGuard<Session>) {
        let idle = *guard == Session::default();
        drop(guard);
        if !idle {
            return;
        }
        let mut sessions = self.inner.lock().await;
        let Some(slot) = sessions.get(&id) else {
            return;
        };
        // new holders clone the slot under the outer lock
        if Arc::strong_count(slot) > 1 {
            return;
        }
        let reset = slot.try_lock().is_ok_and(|session| *session == Session::default());
        if reset {
            sessions.remove(&id);
        }
    }

    #[cfg(test)]
    pub async fn snapshot(&self, id: Identity) -> Option<Session> {
        let slot = self.inner.lock().await.get(&id).cloned()?;
        let session = slot.lock().await.clone();
        Some(session)
    }

    #[cfg(test)]
    pub async fn live(&self) -> usize {
        self.inner.lock().await.len()
    }
}
