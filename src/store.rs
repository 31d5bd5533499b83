use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::models::ChatMessage;
use crate::session::{IdentityState, MessageRecord, Turn};

/// The turn-serialized part of a session. Guarded by the slot's mutex: a
/// worker holds it for the whole turn, so two turns on one thread never
/// interleave.
#[derive(Debug)]
pub struct SessionState {
    pub identity: IdentityState,
    pub turns: Vec<Turn>,
}

impl SessionState {
    /// Conversation history as model messages. Prior turns contribute the
    /// user text and the final reply; intermediate tool exchanges are kept
    /// for the messages endpoint but not replayed.
    pub fn history(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.turns.len() * 2);
        for turn in &self.turns {
            out.push(ChatMessage::user(&turn.user_text));
            out.push(ChatMessage::assistant(&turn.reply));
        }
        out
    }

    pub fn records(&self) -> Vec<MessageRecord> {
        self.turns.iter().flat_map(|t| t.records()).collect()
    }
}

#[derive(Debug, Clone)]
struct SlotMeta {
    last_activity: DateTime<Utc>,
    message_count: usize,
}

/// One registered session. Identity and turns live behind the turn lock;
/// listing metadata lives in a separate cell so thread listings never wait
/// on an in-flight turn.
pub struct SessionSlot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    meta: RwLock<SlotMeta>,
    state: Mutex<SessionState>,
}

/// Listing view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadSummary {
    pub thread_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

impl SessionSlot {
    fn new(id: Uuid, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            title,
            meta: RwLock::new(SlotMeta { last_activity: now, message_count: 0 }),
            state: Mutex::new(SessionState { identity: IdentityState::Unverified, turns: Vec::new() }),
        }
    }

    /// Acquire the turn lock. Held for the full duration of a turn.
    pub async fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Append a completed turn and apply its final identity state. The only
    /// place session state mutates; callers reach it after the model/tool
    /// work has fully finished.
    pub async fn push_turn(&self, state: &mut SessionState, turn: Turn, identity: IdentityState) {
        let added = 2 + turn.exchanges.len();
        state.turns.push(turn);
        state.identity = identity;
        let mut meta = self.meta.write().await;
        meta.last_activity = Utc::now();
        meta.message_count += added;
    }

    pub async fn summary(&self) -> ThreadSummary {
        let meta = self.meta.read().await;
        ThreadSummary {
            thread_id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
            last_activity: meta.last_activity,
            message_count: meta.message_count,
        }
    }
}

/// In-memory session registry. Safe for concurrent insert/lookup/delete;
/// state is gone on process exit by design.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<Uuid, Arc<SessionSlot>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. With an explicit id that already exists, the
    /// existing slot is returned (`created = false`); the registry never
    /// holds two sessions under one identifier.
    pub async fn create(&self, id: Option<Uuid>, title: Option<String>) -> (Arc<SessionSlot>, bool) {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.get(&id) {
            return (existing.clone(), false);
        }
        let slot = Arc::new(SessionSlot::new(id, title.unwrap_or_else(|| "New Conversation".into())));
        inner.insert(id, slot.clone());
        (slot, true)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionSlot>> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Page of sessions ordered by last activity, most recent first.
    pub async fn list(&self, limit: usize, offset: usize) -> (Vec<ThreadSummary>, usize) {
        let slots: Vec<Arc<SessionSlot>> = self.inner.read().await.values().cloned().collect();
        let total = slots.len();
        let mut summaries = Vec::with_capacity(total);
        for slot in slots {
            summaries.push(slot.summary().await);
        }
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        (summaries.into_iter().skip(offset).take(limit).collect(), total)
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.inner.write().await.remove(&id).is_some()
    }

    /// Drop sessions idle longer than `max_idle`. Slots with a turn in
    /// flight are skipped; they refresh their activity on completion.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut stale = Vec::new();
        for slot in self.inner.read().await.values() {
            if slot.state.try_lock().is_err() {
                continue;
            }
            if slot.meta.read().await.last_activity < cutoff {
                stale.push(slot.id);
            }
        }
        let mut inner = self.inner.write().await;
        let before = inner.len();
        for id in stale {
            inner.remove(&id);
        }
        before - inner.len()
    }
}
