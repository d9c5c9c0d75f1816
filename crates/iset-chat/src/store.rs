//! Session arena: the single owner of every session and its turns.
//!
//! Sessions are addressed by a local `SessionKey` handed out on insertion.
//! The server id is attached later for drafts, so in-flight submissions keep
//! pointing at the right session across the commit. At most one draft (a
//! session without a server id) exists at any time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use url::Url;

use iset_core::config::ChatConfig;
use iset_core::events::{ConversationEvent, EventBus};
use iset_core::remote::ChatBackend;
use iset_core::types::{BotReply, InputSource, SessionId, SessionKey, Timestamp, Turn};
use iset_core::wire::WireSession;

use crate::error::ChatError;
use crate::timeline::TurnTimeline;

const EMPTY_PREVIEW: &str = "New conversation";

// =============================================================================
// Session
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub key: SessionKey,
    /// `None` until the server has accepted the first message.
    pub id: Option<SessionId>,
    pub created_at: Timestamp,
    pub timeline: TurnTimeline,
}

impl Session {
    fn draft() -> Self {
        Self {
            key: SessionKey::new(),
            id: None,
            created_at: Timestamp::now(),
            timeline: TurnTimeline::new(),
        }
    }

    fn committed(id: SessionId, created_at: Timestamp, timeline: TurnTimeline) -> Self {
        Self {
            key: SessionKey::new(),
            id: Some(id),
            created_at,
            timeline,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.id.is_none()
    }

    /// First user message cut to `max_chars`, for the sidebar.
    pub fn preview(&self, max_chars: usize) -> String {
        match self.timeline.first_user_text() {
            Some(text) if !text.is_empty() => {
                if text.chars().count() > max_chars {
                    let cut: String = text.chars().take(max_chars).collect();
                    format!("{cut}...")
                } else {
                    text.to_string()
                }
            }
            _ => EMPTY_PREVIEW.to_string(),
        }
    }
}

/// Sidebar row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub id: Option<SessionId>,
    pub created_at: Timestamp,
    pub preview: String,
    pub turn_count: usize,
    pub has_pending: bool,
    /// Submission time of the latest turn.
    pub last_activity: Option<Timestamp>,
}

// =============================================================================
// Draft id allocation
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Allocation {
    Unclaimed,
    InFlight,
    Committed(SessionId),
}

/// What a submission should send as `session_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Claim {
    Known(SessionId),
    /// This caller sends `null` and commits whatever id comes back.
    Allocate,
}

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    sessions: HashMap<SessionKey, Session>,
    selected: Option<SessionKey>,
    gates: HashMap<SessionKey, watch::Sender<Allocation>>,
}

impl StoreState {
    fn draft_key(&self) -> Option<SessionKey> {
        self.sessions.values().find(|s| s.is_draft()).map(|s| s.key)
    }

    fn key_for(&self, id: SessionId) -> Option<SessionKey> {
        self.sessions
            .values()
            .find(|s| s.id == Some(id))
            .map(|s| s.key)
    }

    fn insert_draft(&mut self) -> Result<SessionKey, ChatError> {
        match self.draft_key() {
            Some(existing) => Err(ChatError::DraftExists(existing)),
            None => Ok(self.draft_or_insert()),
        }
    }

    fn draft_or_insert(&mut self) -> SessionKey {
        if let Some(existing) = self.draft_key() {
            return existing;
        }
        let session = Session::draft();
        let key = session.key;
        self.sessions.insert(key, session);
        key
    }

    /// Returns whether the selection changed.
    fn select(&mut self, key: Option<SessionKey>) -> bool {
        let changed = self.selected != key;
        self.selected = key;
        changed
    }

    fn timeline_mut(&mut self, key: SessionKey) -> Option<&mut TurnTimeline> {
        self.sessions.get_mut(&key).map(|s| &mut s.timeline)
    }
}

struct Inner {
    backend: Arc<dyn ChatBackend>,
    events: EventBus,
    config: ChatConfig,
    state: Mutex<StoreState>,
}

/// Shared handle to the session arena. Clones address the same sessions.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn ChatBackend>, events: EventBus, config: ChatConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                events,
                config,
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.inner.backend
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn len(&self) -> usize {
        self.state().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().sessions.is_empty()
    }

    pub fn session(&self, key: SessionKey) -> Option<Session> {
        self.state().sessions.get(&key).cloned()
    }

    pub fn session_by_id(&self, id: SessionId) -> Option<Session> {
        let state = self.state();
        state.key_for(id).and_then(|k| state.sessions.get(&k).cloned())
    }

    /// Turns of a session in rendering order.
    pub fn turns(&self, key: SessionKey) -> Vec<Turn> {
        self.state()
            .sessions
            .get(&key)
            .map(|s| s.timeline.turns().to_vec())
            .unwrap_or_default()
    }

    pub fn draft(&self) -> Option<SessionKey> {
        self.state().draft_key()
    }

    pub fn active(&self) -> Option<SessionKey> {
        self.state().selected
    }

    pub fn active_session(&self) -> Option<Session> {
        let state = self.state();
        state.selected.and_then(|k| state.sessions.get(&k).cloned())
    }

    /// Cached sessions, newest first. No remote call.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let preview_chars = self.inner.config.preview_chars;
        let state = self.state();
        let mut rows: Vec<SessionSummary> = state
            .sessions
            .values()
            .map(|s| SessionSummary {
                key: s.key,
                id: s.id,
                created_at: s.created_at,
                preview: s.preview(preview_chars),
                turn_count: s.timeline.len(),
                has_pending: s.timeline.has_pending(),
                last_activity: s.timeline.last_activity(),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows
    }

    // =========================================================================
    // Listing and resolution
    // =========================================================================

    /// Sessions newest first, fetched from the backend when nothing is cached.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        if self.is_empty() {
            self.refresh().await?;
        }
        Ok(self.summaries())
    }

    /// Merge the backend's listing into the cache.
    ///
    /// Sessions already cached are left alone. Unknown ones are inserted with
    /// their history confirmed. Returns how many were inserted.
    pub async fn refresh(&self) -> Result<usize, ChatError> {
        let listed = match self.inner.backend.list_sessions().await {
            Ok(listed) => listed,
            Err(err) => {
                self.inner.events.error(err.user_message());
                return Err(err.into());
            }
        };
        let inserted = self.merge(listed);
        tracing::info!(inserted, total = self.len(), "Session list refreshed");
        Ok(inserted)
    }

    fn merge(&self, listed: Vec<WireSession>) -> usize {
        let mut state = self.state();
        let mut inserted = 0;
        for wire in listed {
            if state.key_for(wire.id).is_some() {
                continue;
            }
            let session = Session::committed(
                wire.id,
                wire.date,
                TurnTimeline::from_history(wire.messages),
            );
            state.sessions.insert(session.key, session);
            inserted += 1;
        }
        inserted
    }

    /// Find a committed session, falling back to a full backend listing.
    pub async fn resolve_session(&self, id: SessionId) -> Result<Session, ChatError> {
        if let Some(session) = self.session_by_id(id) {
            return Ok(session);
        }
        tracing::debug!(%id, "Session not cached, refreshing");
        self.refresh().await?;
        match self.session_by_id(id) {
            Some(session) => Ok(session),
            None => {
                let err = ChatError::SessionNotFound(id);
                self.inner.events.error(err.user_message());
                Err(err)
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Insert an empty draft and select it.
    ///
    /// Fails with `DraftExists` carrying the existing draft's key.
    pub fn create_session(&self) -> Result<SessionKey, ChatError> {
        let result = {
            let mut state = self.state();
            state.insert_draft().map(|key| {
                state.select(Some(key));
                key
            })
        };
        match result {
            Ok(key) => {
                tracing::debug!(session = %key, "Draft session created");
                self.publish_selected(Some(key));
                Ok(key)
            }
            Err(err) => {
                self.inner.events.warning(err.user_message());
                Err(err)
            }
        }
    }

    /// Session a new submission lands in: the active one, else the draft,
    /// else a freshly created draft. The result is selected.
    pub(crate) fn target_session(&self) -> SessionKey {
        let (key, changed) = {
            let mut state = self.state();
            let key = match state.selected.filter(|k| state.sessions.contains_key(k)) {
                Some(key) => key,
                None => state.draft_or_insert(),
            };
            let changed = state.select(Some(key));
            (key, changed)
        };
        if changed {
            self.publish_selected(Some(key));
        }
        key
    }

    /// Ask the backend for an empty session and open it.
    pub async fn open_new_chat(&self) -> Result<SessionKey, ChatError> {
        let id = match self.inner.backend.new_chat().await {
            Ok(id) => id,
            Err(err) => {
                self.inner.events.error(err.user_message());
                return Err(err.into());
            }
        };
        let key = {
            let mut state = self.state();
            let key = match state.key_for(id) {
                Some(key) => key,
                None => {
                    let session = Session::committed(id, Timestamp::now(), TurnTimeline::new());
                    let key = session.key;
                    state.sessions.insert(key, session);
                    key
                }
            };
            state.select(Some(key));
            key
        };
        tracing::info!(%id, session = %key, "New chat opened");
        self.publish_selected(Some(key));
        Ok(key)
    }

    /// Delete a session once the backend has confirmed it.
    ///
    /// On failure the session is left untouched.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), ChatError> {
        if let Err(err) = self.inner.backend.delete_chat(id).await {
            tracing::warn!(%id, %err, "Backend refused delete");
            self.inner.events.error(err.user_message());
            return Err(err.into());
        }

        let (removed, cleared) = {
            let mut state = self.state();
            let removed = state.key_for(id);
            let mut cleared = false;
            if let Some(key) = removed {
                state.sessions.remove(&key);
                state.gates.remove(&key);
                if state.selected == Some(key) {
                    state.select(None);
                    cleared = true;
                }
            }
            (removed, cleared)
        };

        if let Some(key) = removed {
            tracing::info!(%id, session = %key, "Session deleted");
            self.inner
                .events
                .publish(ConversationEvent::SessionDeleted { session: key, id });
        }
        if cleared {
            self.publish_selected(None);
        }
        self.inner.events.success("Conversation deleted");
        Ok(())
    }

    /// Attach the server id to a draft.
    ///
    /// A session that already has the same id is left as is. A different id
    /// is logged and ignored. Any other cached copy of `id` (inserted by a
    /// refresh while the draft was in flight) is dropped in favour of the
    /// draft.
    pub fn commit_session_id(&self, key: SessionKey, id: SessionId) -> Result<(), ChatError> {
        self.assign_session_id(key, id, false)
    }

    /// The server filed a reply for a committed session under a new id,
    /// which it does when it no longer knows the old one. Later messages
    /// must carry the new id.
    pub(crate) fn rebind_session_id(
        &self,
        key: SessionKey,
        id: SessionId,
    ) -> Result<(), ChatError> {
        self.assign_session_id(key, id, true)
    }

    fn assign_session_id(
        &self,
        key: SessionKey,
        id: SessionId,
        rebind: bool,
    ) -> Result<(), ChatError> {
        let reselected = {
            let mut state = self.state();
            let current = state
                .sessions
                .get(&key)
                .ok_or(ChatError::UnknownSession(key))?
                .id;
            match current {
                Some(existing) if existing == id => return Ok(()),
                Some(existing) if !rebind => {
                    tracing::warn!(session = %key, %existing, returned = %id, "Server returned a different session id");
                    return Ok(());
                }
                Some(existing) => {
                    tracing::warn!(session = %key, %existing, new = %id, "Server moved the conversation to a new id");
                }
                None => {}
            }

            let mut reselected = false;
            if let Some(duplicate) = state.key_for(id) {
                state.sessions.remove(&duplicate);
                if state.selected == Some(duplicate) {
                    state.select(Some(key));
                    reselected = true;
                }
            }
            if let Some(session) = state.sessions.get_mut(&key) {
                session.id = Some(id);
            }
            if let Some(gate) = state.gates.remove(&key) {
                gate.send_replace(Allocation::Committed(id));
            }
            reselected
        };

        tracing::info!(session = %key, %id, "Session id committed");
        self.inner
            .events
            .publish(ConversationEvent::SessionCommitted { session: key, id });
        if reselected {
            self.publish_selected(Some(key));
        }
        Ok(())
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn select(&self, key: SessionKey) -> Result<(), ChatError> {
        let changed = {
            let mut state = self.state();
            if !state.sessions.contains_key(&key) {
                drop(state);
                let err = ChatError::UnknownSession(key);
                self.inner.events.error(err.user_message());
                return Err(err);
            }
            state.select(Some(key))
        };
        if changed {
            self.publish_selected(Some(key));
        }
        Ok(())
    }

    /// Resolve a server id (fetching if needed) and select it.
    pub async fn select_by_id(&self, id: SessionId) -> Result<SessionKey, ChatError> {
        let session = self.resolve_session(id).await?;
        self.select(session.key)?;
        Ok(session.key)
    }

    pub fn clear_selection(&self) {
        if self.state().select(None) {
            self.publish_selected(None);
        }
    }

    fn publish_selected(&self, session: Option<SessionKey>) {
        self.inner
            .events
            .publish(ConversationEvent::SessionSelected { session });
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Append a pending turn to a session.
    pub fn append_optimistic(
        &self,
        key: SessionKey,
        user_text: String,
        source: InputSource,
    ) -> Result<Turn, ChatError> {
        let turn = {
            let mut state = self.state();
            let timeline = state
                .timeline_mut(key)
                .ok_or(ChatError::UnknownSession(key))?;
            timeline.append_optimistic(user_text, source).clone()
        };
        tracing::debug!(session = %key, sequence = turn.sequence, %source, "Turn appended");
        self.inner.events.publish(ConversationEvent::TurnAppended {
            session: key,
            sequence: turn.sequence,
        });
        Ok(turn)
    }

    /// Confirm a pending turn. Missing sessions or turns are a logged no-op.
    pub fn reconcile(&self, key: SessionKey, sequence: u64, reply: BotReply) -> Option<Turn> {
        let result = {
            let mut state = self.state();
            let Some(timeline) = state.timeline_mut(key) else {
                tracing::debug!(session = %key, sequence, "Reconcile for a session that is gone");
                return None;
            };
            timeline.reconcile(sequence, reply).map(Turn::clone)
        };
        match result {
            Ok(turn) => {
                self.inner.events.publish(ConversationEvent::TurnConfirmed {
                    session: key,
                    sequence,
                });
                Some(turn)
            }
            Err(err) => {
                tracing::warn!(session = %key, sequence, %err, "Stale reconcile ignored");
                None
            }
        }
    }

    /// Fail a pending turn. Same no-op rules as `reconcile`.
    pub fn mark_failed(
        &self,
        key: SessionKey,
        sequence: u64,
        reason: impl Into<String>,
    ) -> Option<Turn> {
        let reason = reason.into();
        let result = {
            let mut state = self.state();
            let Some(timeline) = state.timeline_mut(key) else {
                tracing::debug!(session = %key, sequence, "Failure for a session that is gone");
                return None;
            };
            timeline.mark_failed(sequence, reason.clone()).map(Turn::clone)
        };
        match result {
            Ok(turn) => {
                self.inner.events.publish(ConversationEvent::TurnFailed {
                    session: key,
                    sequence,
                    reason,
                });
                Some(turn)
            }
            Err(err) => {
                tracing::warn!(session = %key, sequence, %err, "Stale failure ignored");
                None
            }
        }
    }

    // =========================================================================
    // Draft allocation gate
    // =========================================================================

    /// Decide what `session_id` a submission for `key` sends.
    ///
    /// Committed sessions answer immediately. For a draft, the first caller
    /// gets `Allocate`; later callers wait until the draft is committed or
    /// the allocating request gives up, in which case one of them takes over.
    pub(crate) async fn claim_session_id(&self, key: SessionKey) -> Claim {
        loop {
            let mut rx = {
                let mut state = self.state();
                match state.sessions.get(&key) {
                    Some(session) => {
                        if let Some(id) = session.id {
                            return Claim::Known(id);
                        }
                    }
                    None => return Claim::Allocate,
                }
                let gate = state
                    .gates
                    .entry(key)
                    .or_insert_with(|| watch::channel(Allocation::Unclaimed).0);
                let unclaimed = *gate.borrow() == Allocation::Unclaimed;
                if unclaimed {
                    gate.send_replace(Allocation::InFlight);
                    return Claim::Allocate;
                }
                gate.subscribe()
            };
            tracing::debug!(session = %key, "Waiting for draft id allocation");
            // A dropped gate means the draft was committed or removed; both
            // are re-checked above.
            let outcome = rx.wait_for(|a| *a != Allocation::InFlight).await.map(|a| *a);
            if let Ok(Allocation::Committed(id)) = outcome {
                return Claim::Known(id);
            }
        }
    }

    /// The allocating request failed; let the next waiter try.
    pub(crate) fn release_allocation(&self, key: SessionKey) {
        if let Some(gate) = self.state().gates.get(&key) {
            gate.send_replace(Allocation::Unclaimed);
        }
    }

    // =========================================================================
    // Share links
    // =========================================================================

    /// Link to the active committed session under the configured origin.
    pub fn share_link(&self) -> String {
        self.share_link_for(&self.inner.config.share_origin)
    }

    /// `{origin}/?session_id={id}` for the active committed session, or the
    /// bare origin when there is nothing to share.
    pub fn share_link_for(&self, origin: &str) -> String {
        let origin = origin.trim_end_matches('/');
        match self.active_session().and_then(|s| s.id) {
            Some(id) => format!("{origin}/?session_id={id}"),
            None => origin.to_string(),
        }
    }
}

/// Extract the session id from a share link (absolute URL or bare query).
pub fn parse_share_link(link: &str) -> Option<SessionId> {
    let link = link.trim();
    let url = Url::parse(link).or_else(|_| {
        Url::parse("http://localhost/").and_then(|base| base.join(link))
    });
    let url = url.ok()?;
    let (_, value) = url.query_pairs().find(|(k, _)| k == "session_id")?;
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_first_message() {
        let mut session = Session::draft();
        session.timeline.append_optimistic(
            "Quels sont les horaires de la bibliothèque le samedi ?".into(),
            InputSource::Typed,
        );
        assert_eq!(session.preview(30), "Quels sont les horaires de la ...");
    }

    #[test]
    fn test_preview_short_and_empty() {
        let mut session = Session::draft();
        assert_eq!(session.preview(30), "New conversation");
        session
            .timeline
            .append_optimistic("Bonjour".into(), InputSource::Typed);
        assert_eq!(session.preview(30), "Bonjour");
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let mut session = Session::draft();
        session
            .timeline
            .append_optimistic("éééé".into(), InputSource::Typed);
        assert_eq!(session.preview(4), "éééé");
        assert_eq!(session.preview(3), "ééé...");
    }

    #[test]
    fn test_parse_share_link_absolute() {
        assert_eq!(
            parse_share_link("http://localhost:3000/?session_id=42"),
            Some(SessionId(42))
        );
        assert_eq!(
            parse_share_link("https://iset.example/chat?lang=fr&session_id=7"),
            Some(SessionId(7))
        );
    }

    #[test]
    fn test_parse_share_link_relative_and_invalid() {
        assert_eq!(parse_share_link("/?session_id=5"), Some(SessionId(5)));
        assert_eq!(parse_share_link("?session_id=5"), Some(SessionId(5)));
        assert_eq!(parse_share_link("http://localhost:3000/"), None);
        assert_eq!(parse_share_link("/?session_id=abc"), None);
    }
}
