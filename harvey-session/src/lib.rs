#![deny(missing_docs)]
//! # harvey-session — per-conversation session state (C10)
//!
//! Holds the [`Conversation`], cancellation token, working context
//! (`PricingContextItem`s) and a record of in-flight transformations
//! for a single chat session. Sessions live in a [`SessionStore`] keyed
//! by [`SessionId`] and are garbage-collected after an idle TTL
//! (default 30 min); on process restart all state is discarded, since
//! nothing here is persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use harvey_types::{ItemId, Message, PricingContextItem, Role, SessionId, TransformState};

/// Default idle TTL before a session is eligible for garbage collection.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Default cap on retained messages per conversation. The
/// conversation is bounded by message count or token budget; this
/// crate enforces the count bound, leaving token-budget enforcement
/// to the loop's own step budget.
pub const DEFAULT_MAX_MESSAGES: usize = 200;

/// Ordered message history for one session, bounded by message count.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    max_messages: usize,
}

impl Conversation {
    /// A conversation bounded to `max_messages`, oldest dropped first.
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
        }
    }

    /// Append a message, evicting the oldest if over the bound.
    pub fn append(&mut self, role: Role, content: impl Into<String>, now: DateTime<Utc>) {
        self.messages.push(Message::new(role, content, now));
        if self.max_messages > 0 && self.messages.len() > self.max_messages {
            let overflow = self.messages.len() - self.max_messages;
            self.messages.drain(0..overflow);
        }
    }

    /// Snapshot of the current history, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

/// A single chat session: conversation, working context, cancellation,
/// and bookkeeping for transformations started on its behalf.
pub struct Session {
    /// This session's identifier.
    pub id: SessionId,
    conversation: Mutex<Conversation>,
    context: Mutex<Vec<PricingContextItem>>,
    cancellation: CancellationToken,
    last_active: Mutex<DateTime<Utc>>,
}

impl Session {
    /// Create a fresh session with an empty conversation and context.
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            conversation: Mutex::new(Conversation::new(DEFAULT_MAX_MESSAGES)),
            context: Mutex::new(Vec::new()),
            cancellation: CancellationToken::new(),
            last_active: Mutex::new(now),
        }
    }

    /// This session's cancellation token; cloned into the agent loop
    /// and every adapter call it makes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancel this session. Idempotent.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether this session has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Record activity at `now`, resetting the idle clock the GC sweep
    /// measures against.
    pub fn touch(&self, now: DateTime<Utc>) {
        *self.last_active.lock().expect("session lock poisoned") = now;
    }

    /// How long this session has been idle as of `now`.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let last = *self.last_active.lock().expect("session lock poisoned");
        (now - last).to_std().unwrap_or(Duration::ZERO)
    }

    /// Append a message to this session's conversation.
    pub fn append_message(&self, role: Role, content: impl Into<String>, now: DateTime<Utc>) {
        self.conversation
            .lock()
            .expect("session lock poisoned")
            .append(role, content, now);
        self.touch(now);
    }

    /// Snapshot of the conversation history.
    pub fn messages(&self) -> Vec<Message> {
        self.conversation
            .lock()
            .expect("session lock poisoned")
            .messages()
            .to_vec()
    }

    /// Add a pricing-context item to the working set.
    pub fn add_context_item(&self, item: PricingContextItem) {
        self.context.lock().expect("session lock poisoned").push(item);
    }

    /// Snapshot of the working context set.
    pub fn context_items(&self) -> Vec<PricingContextItem> {
        self.context.lock().expect("session lock poisoned").clone()
    }

    /// Items whose URL transformation hasn't completed yet — the
    /// "fan-in of running transformations" this session is waiting on —
    /// the eventual YAML is injected into session context on the
    /// subsequent turn.
    pub fn pending_items(&self) -> Vec<PricingContextItem> {
        self.context
            .lock()
            .expect("session lock poisoned")
            .iter()
            .filter(|item| {
                matches!(
                    item.transform,
                    TransformState::NotStarted | TransformState::Pending
                )
            })
            .cloned()
            .collect()
    }

    /// Update the transform state (and artifact reference, if any) of
    /// the context item with the given id, once a transformation this
    /// session started resolves. No-op if the item no longer exists.
    pub fn resolve_item(&self, item_id: &ItemId, transform: TransformState, artifact_ref: Option<harvey_types::BlobId>) {
        let mut context = self.context.lock().expect("session lock poisoned");
        if let Some(item) = context.iter_mut().find(|i| &i.id == item_id) {
            item.transform = transform;
            if artifact_ref.is_some() {
                item.artifact_ref = artifact_ref;
            }
        }
    }
}

/// Registry of live sessions, keyed by [`SessionId`], with idle-TTL
/// garbage collection.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    idle_ttl: Duration,
}

impl SessionStore {
    /// A session store using the default idle TTL.
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }

    /// A session store with a custom idle TTL.
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Fetch the session for `id`, creating it (stamped with `now`) if
    /// it doesn't yet exist.
    pub fn get_or_create(&self, id: &SessionId, now: DateTime<Utc>) -> Arc<Session> {
        if let Some(session) = self.get(id) {
            return session;
        }
        let mut sessions = self.sessions.write().expect("session store lock poisoned");
        sessions
            .entry(id.as_str().to_string())
            .or_insert_with(|| Arc::new(Session::new(id.clone(), now)))
            .clone()
    }

    /// Fetch an existing session, if any.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .expect("session store lock poisoned")
            .get(id.as_str())
            .cloned()
    }

    /// Remove a session outright (used by explicit teardown, not GC).
    pub fn remove(&self, id: &SessionId) {
        self.sessions
            .write()
            .expect("session store lock poisoned")
            .remove(id.as_str());
    }

    /// Number of currently tracked sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().expect("session store lock poisoned").len()
    }

    /// Remove and return the ids of every session idle beyond the
    /// configured TTL as of `now`. Cancels each removed session's token
    /// so any in-flight work for it winds down.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().expect("session store lock poisoned");
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.idle_for(now) >= self.idle_ttl)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(session) = sessions.remove(&key) {
                session.cancel();
                tracing::debug!(session_id = %session.id, "session garbage collected");
                removed.push(session.id.clone());
            }
        }
        removed
    }

    /// Run the idle sweep on a fixed interval until the returned handle
    /// is aborted or dropped. Callers typically spawn this once at
    /// startup against an `Arc<SessionStore>`.
    pub async fn run_gc_loop(self: Arc<Self>, check_interval: Duration) {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;
            let removed = self.sweep_idle(Utc::now());
            if !removed.is_empty() {
                tracing::info!(count = removed.len(), "idle session sweep removed sessions");
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvey_types::{ItemOrigin};

    fn id(s: &str) -> SessionId {
        SessionId::new(s)
    }

    #[test]
    fn conversation_evicts_oldest_past_bound() {
        let mut conv = Conversation::new(2);
        let t0 = Utc::now();
        conv.append(Role::User, "one", t0);
        conv.append(Role::Assistant, "two", t0);
        conv.append(Role::User, "three", t0);
        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.messages()[0].content, "two");
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let now = Utc::now();
        let a = store.get_or_create(&id("s1"), now);
        let b = store.get_or_create(&id("s1"), now);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn sweep_idle_removes_only_expired_sessions() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        let t0 = Utc::now();
        let fresh = store.get_or_create(&id("fresh"), t0);
        let stale = store.get_or_create(&id("stale"), t0);
        fresh.touch(t0);
        stale.touch(t0 - chrono::Duration::seconds(120));

        let removed = store.sweep_idle(t0);
        assert_eq!(removed, vec![id("stale")]);
        assert!(store.get(&id("fresh")).is_some());
        assert!(store.get(&id("stale")).is_none());
        assert!(stale.is_cancelled());
    }

    #[test]
    fn cancellation_is_visible_through_the_shared_token() {
        let session = Session::new(id("s1"), Utc::now());
        let token = session.cancellation_token();
        assert!(!token.is_cancelled());
        session.cancel();
        assert!(token.is_cancelled());
        assert!(session.is_cancelled());
    }

    #[test]
    fn pending_items_resolve_when_transformation_completes() {
        let session = Session::new(id("s1"), Utc::now());
        let item_id = ItemId::new("item-1");
        session.add_context_item(PricingContextItem::from_url(
            item_id.clone(),
            ItemOrigin::User,
            "https://example.com/pricing",
        ));
        assert_eq!(session.pending_items().len(), 1);

        session.resolve_item(
            &item_id,
            TransformState::Done,
            Some(harvey_types::BlobId::new("blob-1")),
        );
        assert!(session.pending_items().is_empty());
        let items = session.context_items();
        assert!(matches!(items[0].transform, TransformState::Done));
        assert_eq!(items[0].artifact_ref.as_ref().unwrap().as_str(), "blob-1");
    }
}
