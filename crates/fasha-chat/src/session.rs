//! Session state and the keyed session store.
//!
//! Each session sits behind its own async mutex so one turn at a time
//! mutates it, while different sessions proceed in parallel. The outer map
//! lock is only held to look up or insert a handle, never across an await.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::extractor::OrderRecord;

// =============================================================================
// DialogueState
// =============================================================================

/// Order workflow state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    #[default]
    Idle,
    AwaitingConfirmation,
    CollectingData,
    WaitingPayment,
}

impl DialogueState {
    pub fn as_str(self) -> &'static str {
        match self {
            DialogueState::Idle => "IDLE",
            DialogueState::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            DialogueState::CollectingData => "COLLECTING_DATA",
            DialogueState::WaitingPayment => "WAITING_PAYMENT",
        }
    }

    /// States in which every turn is treated as ORDER without classification.
    pub fn is_order_locked(self) -> bool {
        !matches!(self, DialogueState::Idle)
    }
}

impl fmt::Display for DialogueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Turns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

/// One conversation. Mutated only by the dialogue engine.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub state: DialogueState,
    /// Most recent turns, oldest first.
    pub history: VecDeque<Turn>,
    /// Absent in `Idle`.
    pub pending_order: Option<OrderRecord>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turn_count: u64,
    max_history: usize,
}

impl Session {
    pub fn new(id: impl Into<String>, max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: DialogueState::Idle,
            history: VecDeque::new(),
            pending_order: None,
            created_at: now,
            last_active: now,
            turn_count: 0,
            max_history: max_history.max(1),
        }
    }

    /// Append a turn, evicting the oldest beyond the history bound.
    pub fn push_turn(&mut self, role: Role, text: impl Into<String>) {
        self.history.push_back(Turn {
            role,
            text: text.into(),
            at: Utc::now(),
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// History rendered for prompts, one "Role: text" line per turn.
    pub fn history_text(&self) -> String {
        self.history
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Back to `Idle` with no history and no pending order.
    pub fn reset(&mut self) {
        self.state = DialogueState::Idle;
        self.history.clear();
        self.pending_order = None;
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
        self.turn_count += 1;
    }

    /// True when idle for longer than `timeout`. A zero timeout never expires.
    pub fn is_idle_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        timeout > Duration::zero() && now - self.last_active > timeout
    }

    /// Reset the session if it has been idle too long. Returns true if reset.
    pub fn expire_if_idle(&mut self, now: DateTime<Utc>, timeout: Duration) -> bool {
        if !self.is_idle_expired(now, timeout) {
            return false;
        }
        let from = self.state;
        self.reset();
        self.last_active = now;
        info!(session = %self.id, from = %from, "Idle session reset");
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            state: self.state,
            history: self.history.iter().cloned().collect(),
            pending_order: self.pending_order.clone(),
            created_at: self.created_at,
            last_active: self.last_active,
            turn_count: self.turn_count,
        }
    }
}

/// Read-only copy of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub state: DialogueState,
    pub history: Vec<Turn>,
    pub pending_order: Option<OrderRecord>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turn_count: u64,
}

// =============================================================================
// SessionStore
// =============================================================================

pub type SessionHandle = Arc<AsyncMutex<Session>>;

/// Sessions keyed by caller identity, one async lock per session.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    history_turns: usize,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(history_turns: usize, session_timeout_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_turns,
            idle_timeout: Duration::minutes(i64::from(session_timeout_minutes)),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Handle for `id`, creating an `Idle` session on first contact.
    pub fn handle(&self, id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session = %id, "Session created");
                Arc::new(AsyncMutex::new(Session::new(id, self.history_turns)))
            })
            .clone()
    }

    /// Handle for `id` if the session exists.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Snapshot of `id`, applying the idle reset first.
    pub async fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let handle = self.get(id)?;
        let mut session = handle.lock().await;
        session.expire_if_idle(Utc::now(), self.idle_timeout);
        Some(session.snapshot())
    }

    /// Reset `id` to a fresh conversation. Returns false if unknown.
    pub async fn reset(&self, id: &str) -> bool {
        let Some(handle) = self.get(id) else {
            return false;
        };
        handle.lock().await.reset();
        info!(session = %id, "Session reset");
        true
    }

    /// Drop sessions idle longer than the timeout. A session whose handle is
    /// still held outside the store (a turn waiting on or holding its lock)
    /// is kept. Returns the number removed.
    pub fn evict_idle(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(session) => !session.is_idle_expired(now, self.idle_timeout),
                Err(_) => true,
            }
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Evicted idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bounded_oldest_evicted() {
        let mut session = Session::new("s", 15);
        for i in 0..20 {
            session.push_turn(Role::User, format!("m{}", i));
        }
        assert_eq!(session.history.len(), 15);
        assert_eq!(session.history.front().unwrap().text, "m5");
        assert_eq!(session.history.back().unwrap().text, "m19");
    }

    #[test]
    fn test_history_text_keeps_order() {
        let mut session = Session::new("s", 15);
        session.push_turn(Role::User, "hi");
        session.push_turn(Role::Assistant, "hello");
        assert_eq!(session.history_text(), "User: hi\nAssistant: hello");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = Session::new("s", 15);
        session.state = DialogueState::CollectingData;
        session.pending_order = Some(OrderRecord::default());
        session.push_turn(Role::User, "x");
        session.reset();
        assert_eq!(session.state, DialogueState::Idle);
        assert!(session.pending_order.is_none());
        assert!(session.history.is_empty());
    }

    #[test]
    fn test_expire_if_idle() {
        let mut session = Session::new("s", 15);
        session.state = DialogueState::CollectingData;
        session.pending_order = Some(OrderRecord::default());
        let timeout = Duration::minutes(60);

        assert!(!session.expire_if_idle(Utc::now(), timeout));
        assert_eq!(session.state, DialogueState::CollectingData);

        session.last_active = Utc::now() - Duration::minutes(61);
        assert!(session.expire_if_idle(Utc::now(), timeout));
        assert_eq!(session.state, DialogueState::Idle);
        assert!(session.pending_order.is_none());
    }

    #[test]
    fn test_zero_timeout_never_expires() {
        let mut session = Session::new("s", 15);
        session.last_active = Utc::now() - Duration::days(30);
        assert!(!session.is_idle_expired(Utc::now(), Duration::zero()));
    }

    #[test]
    fn test_state_locks() {
        assert!(!DialogueState::Idle.is_order_locked());
        assert!(DialogueState::AwaitingConfirmation.is_order_locked());
        assert!(DialogueState::CollectingData.is_order_locked());
        assert!(DialogueState::WaitingPayment.is_order_locked());
        assert_eq!(
            serde_json::to_string(&DialogueState::WaitingPayment).unwrap(),
            "\"WAITING_PAYMENT\""
        );
    }

    #[tokio::test]
    async fn test_store_creates_once_per_id() {
        let store = SessionStore::new(15, 60);
        let a = store.handle("a");
        let a2 = store.handle("a");
        let b = store.handle("b");
        assert!(Arc::ptr_eq(&a, &a2));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
        assert!(store.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_store_reset_and_snapshot() {
        let store = SessionStore::new(15, 60);
        {
            let handle = store.handle("a");
            let mut session = handle.lock().await;
            session.state = DialogueState::WaitingPayment;
            session.push_turn(Role::User, "x");
        }
        let snap = store.snapshot("a").await.unwrap();
        assert_eq!(snap.state, DialogueState::WaitingPayment);
        assert_eq!(snap.history.len(), 1);

        assert!(store.reset("a").await);
        assert_eq!(store.snapshot("a").await.unwrap().state, DialogueState::Idle);
        assert!(!store.reset("missing").await);
        assert!(store.snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_idle_skips_active_and_locked() {
        let store = SessionStore::new(15, 60);
        store.handle("fresh");
        let stale = store.handle("stale");
        stale.lock().await.last_active = Utc::now() - Duration::hours(2);
        drop(stale);
        let busy = store.handle("busy");
        let mut busy_guard = busy.lock().await;
        busy_guard.last_active = Utc::now() - Duration::hours(2);

        assert_eq!(store.evict_idle(), 1);
        assert!(store.get("stale").is_none());
        assert!(store.get("fresh").is_some());
        assert!(store.get("busy").is_some());
        drop(busy_guard);
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_session_with_outstanding_handle() {
        let store = SessionStore::new(15, 1);
        let handle = store.handle("s1");
        handle.lock().await.last_active = Utc::now() - Duration::minutes(2);

        // Unlocked but still referenced, as between handle() and lock().
        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.len(), 1);
        assert!(Arc::ptr_eq(&handle, &store.handle("s1")));

        drop(handle);
        assert_eq!(store.evict_idle(), 1);
        assert!(store.is_empty());
    }
}
