use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kiosk_types::models::UserId;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::forms::ConversationState;

/// One user's conversation slot. `None` means no open form.
pub type Slot = Arc<Mutex<Option<ConversationState>>>;

/// Keyed per-user conversation store.
///
/// A handler locks the user's slot for the whole event, so events from one
/// user are processed one at a time in arrival order while other users are
/// never blocked. Slots are created on first contact and removed by
/// [`Sessions::sweep`] once idle.
pub struct Sessions {
    slots: RwLock<HashMap<UserId, Slot>>,
    ttl: chrono::Duration,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(5200)),
        }
    }

    /// The slot for `user`, created empty if missing.
    pub async fn slot(&self, user: UserId) -> Slot {
        if let Some(slot) = self.slots.read().await.get(&user) {
            return slot.clone();
        }
        self.slots.write().await.entry(user).or_default().clone()
    }

    pub fn is_expired(&self, state: &ConversationState, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(state.touched_at) > self.ttl
    }

    /// Drops slots without an open form, skipping any slot a handler
    /// currently holds. Expired forms stay until their user's next event so
    /// that event can report the expiry. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => state.is_some(),
                Err(_) => true,
            }
        });
        before - slots.len()
    }

    /// Number of users with an open form.
    pub async fn open_forms(&self) -> usize {
        let slots = self.slots.read().await;
        let mut open = 0;
        for slot in slots.values() {
            if let Ok(state) = slot.try_lock() {
                if state.is_some() {
                    open += 1;
                }
            }
        }
        open
    }
}

/// Background task that removes idle conversation slots.
pub async fn run_sweep_loop(sessions: Arc<Sessions>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let removed = sessions.sweep().await;
        if removed > 0 {
            info!("Session sweep: removed {} idle conversations", removed);
        } else {
            debug!("Session sweep: nothing to remove");
        }
    }
}
