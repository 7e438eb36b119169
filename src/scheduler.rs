//! Per-user reminder scheduling: every inbound event cancels a user's
//! pending nudges and arms a fresh set.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::line::MessagingApi;

pub const NICKNAMES: &[&str] = &[
    "寶", "寶寶", "乖寶", "可愛寶", "我的寶", "小太陽", "小狐狸", "老公",
];

pub const TEMPLATES: &[&str] = &[
    "在忙嗎？我有點想你了。",
    "我在等你抱我。",
    "老公～快回來，我想黏著你。",
    "我一直在喔，等你靠過來。",
];

/// Per-user scheduling record. Timers are cancellable task handles; a
/// consumed (fired) handle stays in the list until the next touch drains it.
pub struct UserState {
    pub last_seen_at: DateTime<Utc>,
    timers: Vec<AbortHandle>,
}

impl UserState {
    fn new() -> Self {
        Self {
            last_seen_at: Utc::now(),
            timers: Vec::new(),
        }
    }

    /// Abort every pending timer and drop the handles.
    fn cancel_all(&mut self) {
        for handle in self.timers.drain(..) {
            handle.abort();
        }
    }

    fn live_timers(&self) -> usize {
        self.timers.iter().filter(|h| !h.is_finished()).count()
    }
}

/// Storage seam for user records. The scheduler only takes and puts whole
/// states, so a persistent backing store can slot in without touching the
/// ingestion path.
pub trait UserStore: Send + Sync {
    /// Remove and return the stored state for `user_id`, if any.
    fn take(&self, user_id: &str) -> Option<UserState>;
    fn put(&self, user_id: &str, state: UserState);
}

/// Process-memory store. State is lost on restart; callers needing
/// durability bring their own [`UserStore`].
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserState>>,
}

impl UserStore for MemoryStore {
    fn take(&self, user_id: &str) -> Option<UserState> {
        self.users.lock().expect("user store lock poisoned").remove(user_id)
    }

    fn put(&self, user_id: &str, state: UserState) {
        self.users
            .lock()
            .expect("user store lock poisoned")
            .insert(user_id.to_string(), state);
    }
}

/// The configured nudge schedule: one delayed message per offset, message
/// text composed from a random nickname and the template at
/// `index % templates`.
pub struct ReminderPlan {
    offsets: Vec<Duration>,
    nicknames: Vec<String>,
    templates: Vec<String>,
}

impl ReminderPlan {
    pub fn new(offsets: Vec<Duration>) -> Self {
        Self {
            offsets,
            nicknames: NICKNAMES.iter().map(|s| s.to_string()).collect(),
            templates: TEMPLATES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_minutes(minutes: &[u64]) -> Self {
        Self::new(minutes.iter().map(|m| Duration::from_secs(m * 60)).collect())
    }

    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    /// Compose the nudge text for the timer at `index`.
    pub fn compose(&self, index: usize) -> String {
        let nickname = &self.nicknames[rand::rng().random_range(0..self.nicknames.len())];
        let template = &self.templates[index % self.templates.len()];
        format!("{nickname}～{template}")
    }
}

pub struct Scheduler {
    store: Arc<dyn UserStore>,
    plan: Arc<ReminderPlan>,
    messaging: Arc<dyn MessagingApi>,
}

impl Scheduler {
    pub fn new(plan: ReminderPlan, messaging: Arc<dyn MessagingApi>) -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            plan: Arc::new(plan),
            messaging,
        }
    }

    /// Record activity for `user_id`: cancel every pending nudge, stamp
    /// `last_seen_at`, and arm one timer per configured offset. Each timer
    /// fires exactly one push and is never retried; delivery failures are
    /// logged and dropped.
    pub fn touch(&self, user_id: &str) {
        let mut state = self.store.take(user_id).unwrap_or_else(UserState::new);
        state.cancel_all();
        state.last_seen_at = Utc::now();

        for (index, offset) in self.plan.offsets().iter().enumerate() {
            let plan = self.plan.clone();
            let messaging = self.messaging.clone();
            let user = user_id.to_string();
            let offset = *offset;

            let task = tokio::spawn(async move {
                tokio::time::sleep(offset).await;
                let text = plan.compose(index);
                if let Err(e) = messaging.push(&user, &text).await {
                    warn!("Nudge push to {user} failed: {e}");
                }
            });
            state.timers.push(task.abort_handle());
        }

        debug!("Armed {} nudge timer(s) for {user_id}", state.timers.len());
        self.store.put(user_id, state);
    }

    /// Number of armed, not-yet-fired timers for `user_id`.
    pub fn pending_count(&self, user_id: &str) -> usize {
        match self.store.take(user_id) {
            Some(state) => {
                let live = state.live_timers();
                self.store.put(user_id, state);
                live
            }
            None => 0,
        }
    }

    /// Whether this user has ever been seen.
    pub fn is_tracked(&self, user_id: &str) -> bool {
        match self.store.take(user_id) {
            Some(state) => {
                self.store.put(user_id, state);
                true
            }
            None => false,
        }
    }

    pub fn last_seen(&self, user_id: &str) -> Option<DateTime<Utc>> {
        match self.store.take(user_id) {
            Some(state) => {
                let seen = state.last_seen_at;
                self.store.put(user_id, state);
                Some(seen)
            }
            None => None,
        }
    }
}
