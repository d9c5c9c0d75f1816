//! In-memory `ChatBackend` with scripted failures.
//!
//! Behaves like a small, well-mannered version of the real backend: sessions
//! get sequential ids, chat appends to the addressed session (allocating one
//! when `session_id` is null) and every call is recorded for assertions.
//! Chat replies can be held back and released in any order to exercise
//! out-of-order completion.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use iset_core::error::RemoteError;
use iset_core::remote::ChatBackend;
use iset_core::types::{SessionId, Timestamp};
use iset_core::wire::{
    ChatReply, ChatRequest, IntegrateReply, IntegrateRequest, LearningStatus, RateRequest,
    WireBot, WireCandidate, WireMessage, WireSession,
};

/// Backend operation, used to target scripted failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOp {
    List,
    NewChat,
    Delete,
    Chat,
    Rate,
    Status,
    Candidates,
    Integrate,
}

#[derive(Default)]
struct MockState {
    sessions: Vec<WireSession>,
    next_session_id: u64,
    failures: HashMap<MockOp, VecDeque<RemoteError>>,
    answers: HashMap<String, WireBot>,
    status: LearningStatus,
    candidates: Vec<WireCandidate>,
    integrate_reply: Option<IntegrateReply>,

    hold_chat: bool,
    held: Vec<Option<oneshot::Sender<()>>>,

    list_calls: usize,
    new_chat_calls: usize,
    chat_requests: Vec<ChatRequest>,
    rate_requests: Vec<RateRequest>,
    integrate_requests: Vec<IntegrateRequest>,
    deleted: Vec<SessionId>,
}

impl MockState {
    fn take_failure(&mut self, op: MockOp) -> Result<(), RemoteError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                tracing::debug!(?op, %err, "Mock backend failing call");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn allocate_id(&mut self) -> SessionId {
        let floor = self.sessions.iter().map(|s| s.id.0 + 1).max().unwrap_or(1);
        let id = self.next_session_id.max(floor);
        self.next_session_id = id + 1;
        SessionId(id)
    }

    fn answer_for(&self, message: &str) -> WireBot {
        if let Some(bot) = self.answers.get(message) {
            return bot.clone();
        }
        let shortcut = message.starts_with('/');
        WireBot {
            answer: format!("Réponse: {message}"),
            url: None,
            method: Some(if shortcut { "shortcut" } else { "tfidf" }.to_string()),
            similarity: Some(if shortcut { 1.0 } else { 0.9 }),
            suggestions: None,
            category: None,
            is_shortcut: Some(shortcut),
        }
    }
}

/// Scripted stand-in for the assistant backend.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_sessions(self, sessions: Vec<WireSession>) -> Self {
        self.state().sessions = sessions;
        self
    }

    /// Id handed to the next allocated session (if above every existing id).
    pub fn with_next_session_id(self, id: u64) -> Self {
        self.state().next_session_id = id;
        self
    }

    pub fn with_answer(self, message: impl Into<String>, bot: WireBot) -> Self {
        self.state().answers.insert(message.into(), bot);
        self
    }

    pub fn with_status(self, status: LearningStatus) -> Self {
        self.state().status = status;
        self
    }

    pub fn with_candidates(self, candidates: Vec<WireCandidate>) -> Self {
        self.state().candidates = candidates;
        self
    }

    pub fn with_integrate_reply(self, reply: IntegrateReply) -> Self {
        self.state().integrate_reply = Some(reply);
        self
    }

    /// Make the next call of `op` fail with `err`. Queues up per operation.
    pub fn fail_next(&self, op: MockOp, err: RemoteError) {
        self.state().failures.entry(op).or_default().push_back(err);
    }

    // =========================================================================
    // Gated chat replies
    // =========================================================================

    /// Hold every subsequent chat reply until released.
    pub fn hold_chat_replies(&self) {
        self.state().hold_chat = true;
    }

    /// Number of chat calls that have reached the backend and are held.
    pub fn held_chat_count(&self) -> usize {
        self.state().held.len()
    }

    /// Release the `index`-th held chat call (in arrival order).
    ///
    /// Returns false if there is no such call or it was already released.
    pub fn release_chat(&self, index: usize) -> bool {
        let sender = self.state().held.get_mut(index).and_then(Option::take);
        match sender {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Stop holding and release everything still waiting.
    pub fn release_all_chats(&self) {
        let pending: Vec<_> = {
            let mut state = self.state();
            state.hold_chat = false;
            state.held.iter_mut().filter_map(Option::take).collect()
        };
        for tx in pending {
            let _ = tx.send(());
        }
    }

    // =========================================================================
    // Recorded calls
    // =========================================================================

    pub fn sessions(&self) -> Vec<WireSession> {
        self.state().sessions.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn new_chat_calls(&self) -> usize {
        self.state().new_chat_calls
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.state().chat_requests.clone()
    }

    pub fn rate_requests(&self) -> Vec<RateRequest> {
        self.state().rate_requests.clone()
    }

    pub fn integrate_requests(&self) -> Vec<IntegrateRequest> {
        self.state().integrate_requests.clone()
    }

    pub fn deleted(&self) -> Vec<SessionId> {
        self.state().deleted.clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn list_sessions(&self) -> Result<Vec<WireSession>, RemoteError> {
        let mut state = self.state();
        state.list_calls += 1;
        state.take_failure(MockOp::List)?;
        Ok(state.sessions.clone())
    }

    async fn new_chat(&self) -> Result<SessionId, RemoteError> {
        let mut state = self.state();
        state.new_chat_calls += 1;
        state.take_failure(MockOp::NewChat)?;
        let id = state.allocate_id();
        state.sessions.push(WireSession {
            id,
            date: Timestamp::now(),
            messages: Vec::new(),
        });
        Ok(id)
    }

    async fn delete_chat(&self, id: SessionId) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.take_failure(MockOp::Delete)?;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != id);
        if state.sessions.len() == before {
            return Err(RemoteError::Status {
                code: 404,
                message: "Session introuvable".into(),
            });
        }
        state.deleted.push(id);
        Ok(())
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, RemoteError> {
        let gate = {
            let mut state = self.state();
            state.chat_requests.push(request.clone());
            if state.hold_chat {
                let (tx, rx) = oneshot::channel();
                state.held.push(Some(tx));
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = gate {
            // A dropped sender releases the call as well.
            let _ = rx.await;
        }

        let mut state = self.state();
        state.take_failure(MockOp::Chat)?;

        // An id the server does not know gets a fresh session.
        let id = match request.session_id {
            Some(id) if state.sessions.iter().any(|s| s.id == id) => id,
            _ => state.allocate_id(),
        };
        let bot = state.answer_for(&request.message);
        let entry = WireMessage {
            user: request.message.clone(),
            timestamp: Timestamp::now(),
            bot: Some(bot),
        };
        match state.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => session.messages.push(entry.clone()),
            None => state.sessions.push(WireSession {
                id,
                date: Timestamp::now(),
                messages: vec![entry.clone()],
            }),
        }
        Ok(ChatReply {
            chat_entry: entry,
            session_id: id,
        })
    }

    async fn rate(&self, request: &RateRequest) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.rate_requests.push(request.clone());
        state.take_failure(MockOp::Rate)
    }

    async fn learning_status(&self) -> Result<LearningStatus, RemoteError> {
        let mut state = self.state();
        state.take_failure(MockOp::Status)?;
        Ok(state.status.clone())
    }

    async fn candidates(&self) -> Result<Vec<WireCandidate>, RemoteError> {
        let mut state = self.state();
        state.take_failure(MockOp::Candidates)?;
        Ok(state.candidates.clone())
    }

    async fn integrate(&self, request: &IntegrateRequest) -> Result<IntegrateReply, RemoteError> {
        let mut state = self.state();
        state.integrate_requests.push(request.clone());
        state.take_failure(MockOp::Integrate)?;
        Ok(state.integrate_reply.clone().unwrap_or(IntegrateReply {
            count: request.questions.len() as u64,
            per_item_status: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iset_core::types::InputSource;

    fn chat(message: &str, session_id: Option<SessionId>) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            session_id,
            source: InputSource::Typed,
        }
    }

    #[tokio::test]
    async fn test_chat_without_session_allocates_id() {
        let backend = MockBackend::new().with_next_session_id(42);
        let reply = backend.send_chat(&chat("/horaires", None)).await.unwrap();
        assert_eq!(reply.session_id, SessionId(42));
        assert!(reply.chat_entry.bot.unwrap().is_shortcut.unwrap());

        let second = backend
            .send_chat(&chat("merci", Some(SessionId(42))))
            .await
            .unwrap();
        assert_eq!(second.session_id, SessionId(42));
        assert_eq!(backend.sessions()[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_with_unknown_session_opens_a_new_one() {
        let backend = MockBackend::new().with_next_session_id(5);
        let reply = backend
            .send_chat(&chat("toujours là ?", Some(SessionId(3))))
            .await
            .unwrap();
        assert_eq!(reply.session_id, SessionId(5));
        assert_eq!(backend.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_allocation_skips_existing_ids() {
        let backend = MockBackend::new().with_sessions(vec![WireSession {
            id: SessionId(7),
            date: Timestamp::now(),
            messages: vec![],
        }]);
        assert_eq!(backend.new_chat().await.unwrap(), SessionId(8));
        assert_eq!(backend.new_chat_calls(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed_once() {
        let backend = MockBackend::new();
        backend.fail_next(MockOp::List, RemoteError::Timeout);
        assert_eq!(backend.list_sessions().await, Err(RemoteError::Timeout));
        assert!(backend.list_sessions().await.is_ok());
        assert_eq!(backend.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_unknown_session_is_404() {
        let backend = MockBackend::new();
        let err = backend.delete_chat(SessionId(3)).await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { code: 404, .. }));
        assert!(backend.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_integrate_defaults_to_full_count() {
        let backend = MockBackend::new();
        let reply = backend
            .integrate(&IntegrateRequest { questions: vec![] })
            .await
            .unwrap();
        assert_eq!(reply.count, 0);
        assert_eq!(backend.integrate_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_held_chat_waits_for_release() {
        let backend = MockBackend::new();
        backend.hold_chat_replies();

        let b = backend.clone();
        let handle = tokio::spawn(async move { b.send_chat(&chat("a", None)).await });
        while backend.held_chat_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!handle.is_finished());
        assert!(backend.release_chat(0));
        assert!(!backend.release_chat(0));
        assert!(handle.await.unwrap().is_ok());
    }
}
