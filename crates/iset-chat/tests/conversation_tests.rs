//! Integration tests for the session store and submission pipeline.
//!
//! Every test runs against its own `MockBackend`. Out-of-order completion is
//! driven by holding chat replies and releasing them in a chosen order.

use std::sync::Arc;

use tokio::sync::broadcast;

use iset_chat::{parse_share_link, ChatError, SessionStore, SubmissionPipeline, CANCELLED};
use iset_client::{MockBackend, MockOp};
use iset_core::config::ChatConfig;
use iset_core::error::RemoteError;
use iset_core::events::{ConversationEvent, EventBus, NotificationLevel};
use iset_core::remote::ChatBackend;
use iset_core::types::{InputSource, SessionId, Suggestion, Timestamp, TurnStatus};
use iset_core::wire::{RateRequest, WireBot, WireMessage, WireSession};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    pipeline: SubmissionPipeline,
    store: SessionStore,
    backend: MockBackend,
    rx: broadcast::Receiver<ConversationEvent>,
}

fn harness(backend: MockBackend) -> Harness {
    let events = EventBus::default();
    let rx = events.subscribe();
    let store = SessionStore::new(Arc::new(backend.clone()), events, ChatConfig::default());
    Harness {
        pipeline: SubmissionPipeline::new(store.clone()),
        store,
        backend,
        rx,
    }
}

fn wire_session(id: u64, date: &str, questions: &[&str]) -> WireSession {
    let date = Timestamp::parse_lenient(date).unwrap();
    WireSession {
        id: SessionId(id),
        date,
        messages: questions
            .iter()
            .map(|q| WireMessage {
                user: q.to_string(),
                timestamp: date,
                bot: Some(WireBot {
                    answer: format!("A: {q}"),
                    ..WireBot::default()
                }),
            })
            .collect(),
    }
}

fn server_error() -> RemoteError {
    RemoteError::Status {
        code: 500,
        message: "Internal server error".into(),
    }
}

fn drain(rx: &mut broadcast::Receiver<ConversationEvent>) -> Vec<ConversationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn notices(events: &[ConversationEvent], level: NotificationLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ConversationEvent::Notice(n) if n.level == level => Some(n.message.clone()),
            _ => None,
        })
        .collect()
}

fn all_notices(events: &[ConversationEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ConversationEvent::Notice(_)))
        .count()
}

async fn wait_for_held(backend: &MockBackend, count: usize) {
    for _ in 0..1000 {
        if backend.held_chat_count() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {count} held chat calls, saw {}",
        backend.held_chat_count()
    );
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_shortcut_on_empty_store_creates_committed_session() {
    let mut h = harness(MockBackend::new().with_next_session_id(42));

    assert!(h.store.list_sessions().await.unwrap().is_empty());
    let turn = h.pipeline.submit_shortcut("Horaires").await.unwrap();

    assert_eq!(turn.status, TurnStatus::Confirmed);
    assert_eq!(turn.sequence, 1);
    assert_eq!(turn.source, InputSource::Shortcut);
    assert_eq!(turn.user_text, "/horaires");

    assert_eq!(h.store.len(), 1);
    let session = h.store.active_session().unwrap();
    assert_eq!(session.id, Some(SessionId(42)));
    assert_eq!(session.timeline.len(), 1);
    assert!(h.store.draft().is_none());

    let requests = h.backend.chat_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id, None);
    assert_eq!(requests[0].source, InputSource::Shortcut);

    let events = drain(&mut h.rx);
    let committed = events
        .iter()
        .position(|e| matches!(e, ConversationEvent::SessionCommitted { id, .. } if *id == SessionId(42)))
        .unwrap();
    let confirmed = events
        .iter()
        .position(|e| matches!(e, ConversationEvent::TurnConfirmed { sequence: 1, .. }))
        .unwrap();
    assert!(committed < confirmed);
    assert_eq!(all_notices(&events), 0);
}

#[tokio::test]
async fn test_rapid_submits_keep_call_order_when_replies_arrive_reversed() {
    let h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &[],
    )]));
    let key = h.store.select_by_id(SessionId(5)).await.unwrap();
    h.backend.hold_chat_replies();

    let pending: Vec<_> = (0..4)
        .map(|i| h.pipeline.submit(format!("m{i}"), InputSource::Typed))
        .collect();

    // Appended before any future has been polled.
    let turns = h.store.turns(key);
    assert_eq!(turns.len(), 4);
    assert!(turns.iter().all(|t| t.status == TurnStatus::Pending));

    let handles: Vec<_> = pending.into_iter().map(tokio::spawn).collect();
    wait_for_held(&h.backend, 4).await;
    for i in (0..4).rev() {
        assert!(h.backend.release_chat(i));
    }
    for handle in handles {
        let turn = handle.await.unwrap().unwrap();
        assert_eq!(turn.status, TurnStatus::Confirmed);
    }

    let turns = h.store.turns(key);
    let order: Vec<_> = turns
        .iter()
        .map(|t| (t.sequence, t.user_text.as_str()))
        .collect();
    assert_eq!(order, [(1, "m0"), (2, "m1"), (3, "m2"), (4, "m3")]);
    for turn in &turns {
        let answer = &turn.bot_reply.as_ref().unwrap().answer_text;
        assert_eq!(answer, &format!("Réponse: {}", turn.user_text));
    }
    assert!(h
        .backend
        .chat_requests()
        .iter()
        .all(|r| r.session_id == Some(SessionId(5))));
}

#[tokio::test]
async fn test_second_submit_on_draft_waits_for_allocated_id() {
    let h = harness(MockBackend::new());
    h.backend.hold_chat_replies();

    let first = tokio::spawn(h.pipeline.submit("a", InputSource::Typed));
    let second = tokio::spawn(h.pipeline.submit("b", InputSource::Voice));
    assert_eq!(h.store.len(), 1);

    wait_for_held(&h.backend, 1).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.backend.chat_requests().len(), 1);

    assert!(h.backend.release_chat(0));
    wait_for_held(&h.backend, 2).await;
    assert!(h.backend.release_chat(1));

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!((a.sequence, b.sequence), (1, 2));
    assert_eq!(a.status, TurnStatus::Confirmed);
    assert_eq!(b.status, TurnStatus::Confirmed);

    let requests = h.backend.chat_requests();
    assert_eq!(requests[0].session_id, None);
    assert_eq!(requests[1].session_id, Some(SessionId(1)));
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.backend.sessions().len(), 1);
}

#[tokio::test]
async fn test_server_error_fails_turn_and_leaves_sessions_alone() {
    let mut h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &["Bonjour"],
    )]));
    let key = h.store.select_by_id(SessionId(5)).await.unwrap();
    drain(&mut h.rx);
    h.backend.fail_next(MockOp::Chat, server_error());

    let failed = h
        .pipeline
        .submit("Quand ouvre la bibliothèque ?", InputSource::Typed)
        .await
        .unwrap();
    assert_eq!(failed.status, TurnStatus::Failed);
    assert_eq!(failed.sequence, 2);
    assert!(failed.failure.is_some());
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.session(key).unwrap().id, Some(SessionId(5)));

    let events = drain(&mut h.rx);
    assert_eq!(
        notices(&events, NotificationLevel::Error),
        ["The server encountered an error"]
    );
    assert_eq!(all_notices(&events), 1);

    let retry = h
        .pipeline
        .submit("Quand ouvre la bibliothèque ?", InputSource::Typed)
        .await
        .unwrap();
    assert_eq!(retry.status, TurnStatus::Confirmed);
    assert_eq!(retry.sequence, 3);

    let statuses: Vec<_> = h.store.turns(key).iter().map(|t| t.status).collect();
    assert_eq!(
        statuses,
        [TurnStatus::Confirmed, TurnStatus::Failed, TurnStatus::Confirmed]
    );
}

#[tokio::test]
async fn test_failed_draft_submission_can_be_retried() {
    let h = harness(MockBackend::new().with_next_session_id(3));
    h.backend.fail_next(MockOp::Chat, RemoteError::Timeout);

    let failed = h.pipeline.submit("Bonjour", InputSource::Typed).await.unwrap();
    assert_eq!(failed.status, TurnStatus::Failed);
    let draft = h.store.draft().unwrap();

    let retry = h.pipeline.submit("Bonjour", InputSource::Typed).await.unwrap();
    assert_eq!(retry.status, TurnStatus::Confirmed);
    assert_eq!(retry.sequence, 2);
    assert_eq!(h.store.session(draft).unwrap().id, Some(SessionId(3)));
    assert!(h.store.draft().is_none());
}

#[tokio::test]
async fn test_cancelled_allocation_releases_the_draft() {
    let h = harness(MockBackend::new().with_next_session_id(42));
    h.backend.hold_chat_replies();

    let first = tokio::spawn(h.pipeline.submit("Bonjour", InputSource::Typed));
    wait_for_held(&h.backend, 1).await;
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let draft = h.store.draft().unwrap();
    let turns = h.store.turns(draft);
    assert_eq!(turns[0].status, TurnStatus::Failed);
    assert_eq!(turns[0].failure.as_deref(), Some(CANCELLED));

    h.backend.release_all_chats();
    let next = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        h.pipeline.submit("Toujours là ?", InputSource::Typed),
    )
    .await
    .expect("draft gate was released")
    .unwrap();
    assert_eq!(next.status, TurnStatus::Confirmed);
    assert_eq!(next.sequence, 2);
    assert_eq!(h.store.session(draft).unwrap().id, Some(SessionId(42)));
}

#[tokio::test]
async fn test_reply_for_session_deleted_mid_flight_is_dropped() {
    let mut h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &["Bonjour"],
    )]));
    h.store.select_by_id(SessionId(5)).await.unwrap();
    h.backend.hold_chat_replies();

    let pending = tokio::spawn(h.pipeline.submit("Encore là ?", InputSource::Typed));
    wait_for_held(&h.backend, 1).await;
    h.store.delete_session(SessionId(5)).await.unwrap();
    let remaining = h.store.len();
    drain(&mut h.rx);

    h.backend.release_all_chats();
    let turn = pending.await.unwrap().unwrap();
    assert_eq!(turn.sequence, 2);
    assert_eq!(turn.status, TurnStatus::Pending);

    let events = drain(&mut h.rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, ConversationEvent::TurnConfirmed { .. })));
    assert_eq!(all_notices(&events), 0);
    assert_eq!(h.store.len(), remaining);
}

#[tokio::test]
async fn test_failure_for_session_deleted_mid_flight_notifies_once() {
    let mut h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &["Bonjour"],
    )]));
    h.store.select_by_id(SessionId(5)).await.unwrap();
    h.backend.hold_chat_replies();

    let pending = tokio::spawn(h.pipeline.submit("Encore là ?", InputSource::Typed));
    wait_for_held(&h.backend, 1).await;
    h.store.delete_session(SessionId(5)).await.unwrap();
    let remaining = h.store.len();
    drain(&mut h.rx);

    h.backend.fail_next(MockOp::Chat, server_error());
    h.backend.release_all_chats();
    let turn = pending.await.unwrap().unwrap();
    assert_eq!(turn.status, TurnStatus::Pending);

    let events = drain(&mut h.rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, ConversationEvent::TurnFailed { .. })));
    assert_eq!(
        notices(&events, NotificationLevel::Error),
        ["The server encountered an error"]
    );
    assert_eq!(all_notices(&events), 1);
    assert_eq!(h.store.len(), remaining);
}

#[tokio::test]
async fn test_session_forgotten_by_server_moves_to_new_id() {
    let mut h = harness(
        MockBackend::new()
            .with_sessions(vec![wire_session(5, "2025-02-01T08:00:00", &["Bonjour"])])
            .with_next_session_id(40),
    );
    let key = h.store.select_by_id(SessionId(5)).await.unwrap();
    h.backend.delete_chat(SessionId(5)).await.unwrap();
    drain(&mut h.rx);

    let turn = h.pipeline.submit("Merci", InputSource::Typed).await.unwrap();
    assert_eq!(turn.status, TurnStatus::Confirmed);
    assert_eq!(h.store.session(key).unwrap().id, Some(SessionId(40)));
    assert!(drain(&mut h.rx).iter().any(|e| matches!(
        e,
        ConversationEvent::SessionCommitted { id, .. } if *id == SessionId(40)
    )));

    h.pipeline.submit("Au revoir", InputSource::Typed).await.unwrap();
    let requests = h.backend.chat_requests();
    assert_eq!(requests[1].session_id, Some(SessionId(40)));
    assert_eq!(h.backend.sessions().len(), 1);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_validation_rejects_without_side_effects() {
    let mut h = harness(MockBackend::new());

    let err = h.pipeline.submit("   ", InputSource::Typed).await.unwrap_err();
    assert_eq!(err, ChatError::EmptyMessage);

    let err = h
        .pipeline
        .submit("a".repeat(2001), InputSource::Voice)
        .await
        .unwrap_err();
    assert_eq!(err, ChatError::MessageTooLong(2000));

    let err = h.pipeline.submit_shortcut("Météo").await.unwrap_err();
    assert!(matches!(err, ChatError::UnknownShortcut(_)));

    assert!(h.store.is_empty());
    assert!(h.backend.chat_requests().is_empty());
    let events = drain(&mut h.rx);
    assert_eq!(notices(&events, NotificationLevel::Warning).len(), 3);
    assert_eq!(all_notices(&events), 3);
}

#[tokio::test]
async fn test_every_source_takes_the_same_path() {
    let h = harness(MockBackend::new());
    for source in [InputSource::Typed, InputSource::Shortcut, InputSource::Voice] {
        let turn = h.pipeline.submit(" Horaires ", source).await.unwrap();
        assert_eq!(turn.status, TurnStatus::Confirmed);
        assert_eq!(turn.user_text, "Horaires");
        assert_eq!(turn.source, source);
    }
    let sources: Vec<_> = h.backend.chat_requests().iter().map(|r| r.source).collect();
    assert_eq!(
        sources,
        [InputSource::Typed, InputSource::Shortcut, InputSource::Voice]
    );
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_suggestion_chip_submits_its_text() {
    let bot = WireBot {
        answer: "Les examens ont lieu en juin.".into(),
        suggestions: Some(vec![Suggestion {
            label: "Calendrier".into(),
            text: "Calendrier des examens".into(),
        }]),
        ..WireBot::default()
    };
    let h = harness(MockBackend::new().with_answer("Examens", bot));

    let turn = h.pipeline.submit("Examens", InputSource::Typed).await.unwrap();
    let key = h.store.active().unwrap();
    let session = h.store.session(key).unwrap();
    let chips = session.timeline.latest_suggestions().to_vec();
    assert_eq!(chips.len(), 1);
    assert_eq!(turn.bot_reply.unwrap().suggestions, chips);

    let follow_up = h.pipeline.submit_suggestion(&chips[0]).await.unwrap();
    assert_eq!(follow_up.user_text, "Calendrier des examens");
    assert_eq!(follow_up.source, InputSource::Shortcut);
    assert_eq!(follow_up.sequence, 2);
}

// =============================================================================
// Store
// =============================================================================

#[tokio::test]
async fn test_create_session_twice_conflicts() {
    let mut h = harness(MockBackend::new());
    let draft = h.store.create_session().unwrap();
    let err = h.store.create_session().unwrap_err();
    assert_eq!(err, ChatError::DraftExists(draft));
    assert_eq!(h.store.len(), 1);

    let events = drain(&mut h.rx);
    assert_eq!(notices(&events, NotificationLevel::Warning).len(), 1);

    // The pipeline reuses the draft instead of failing.
    h.store.clear_selection();
    let turn = h.pipeline.submit("Bonjour", InputSource::Typed).await.unwrap();
    assert_eq!(turn.status, TurnStatus::Confirmed);
    assert_eq!(h.store.active(), Some(draft));
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_reconcile_with_other_sequence_is_silent_noop() {
    let mut h = harness(MockBackend::new());
    let key = h.store.create_session().unwrap();
    h.store
        .append_optimistic(key, "Bonjour".into(), InputSource::Typed)
        .unwrap();
    drain(&mut h.rx);

    let reply = WireBot {
        answer: "late".into(),
        ..WireBot::default()
    };
    assert!(h.store.reconcile(key, 2, reply.clone().into()).is_none());
    assert!(h
        .store
        .reconcile(iset_core::types::SessionKey::new(), 1, reply.into())
        .is_none());

    let turns = h.store.turns(key);
    assert_eq!(turns[0].status, TurnStatus::Pending);
    assert!(turns[0].bot_reply.is_none());
    assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test]
async fn test_list_sessions_newest_first_and_cached() {
    let h = harness(MockBackend::new().with_sessions(vec![
        wire_session(1, "2025-01-10T09:00:00", &["Inscription"]),
        wire_session(2, "2025-03-01T09:00:00", &[]),
        wire_session(3, "2025-02-01T09:00:00", &["Quels sont les horaires de la scolarité ?"]),
    ]));

    let rows = h.store.list_sessions().await.unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.id.unwrap().0).collect();
    assert_eq!(ids, [2, 3, 1]);
    assert_eq!(rows[0].preview, "New conversation");
    assert_eq!(rows[1].preview, "Quels sont les horaires de la ...");
    assert_eq!(rows[2].turn_count, 1);
    assert_eq!(rows[0].last_activity, None);
    assert_eq!(
        rows[1].last_activity,
        Some(Timestamp::parse_lenient("2025-02-01T09:00:00").unwrap())
    );

    h.store.list_sessions().await.unwrap();
    assert_eq!(h.backend.list_calls(), 1);
}

#[tokio::test]
async fn test_listing_failure_is_reported_once() {
    let mut h = harness(MockBackend::new());
    h.backend.fail_next(MockOp::List, RemoteError::Timeout);
    let err = h.store.list_sessions().await.unwrap_err();
    assert_eq!(err, ChatError::Remote(RemoteError::Timeout));
    assert_eq!(all_notices(&drain(&mut h.rx)), 1);
}

#[tokio::test]
async fn test_resolve_falls_back_to_remote_listing() {
    let h = harness(MockBackend::new().with_sessions(vec![wire_session(
        9,
        "2025-02-01T08:00:00",
        &["q1", "q2"],
    )]));

    let session = h.store.resolve_session(SessionId(9)).await.unwrap();
    assert_eq!(session.timeline.len(), 2);
    assert!(session
        .timeline
        .turns()
        .iter()
        .all(|t| t.status == TurnStatus::Confirmed));

    h.store.resolve_session(SessionId(9)).await.unwrap();
    assert_eq!(h.backend.list_calls(), 1);
}

#[tokio::test]
async fn test_resolve_unknown_id_is_not_found() {
    let mut h = harness(MockBackend::new());
    let err = h.store.resolve_session(SessionId(77)).await.unwrap_err();
    assert_eq!(err, ChatError::SessionNotFound(SessionId(77)));
    let events = drain(&mut h.rx);
    assert_eq!(notices(&events, NotificationLevel::Error).len(), 1);
}

#[tokio::test]
async fn test_refresh_keeps_local_state() {
    let h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &[],
    )]));
    let key = h.store.select_by_id(SessionId(5)).await.unwrap();
    h.backend.fail_next(MockOp::Chat, server_error());
    h.pipeline.submit("perdu", InputSource::Typed).await.unwrap();

    assert_eq!(h.store.refresh().await.unwrap(), 0);
    let turns = h.store.turns(key);
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].status, TurnStatus::Failed);
}

#[tokio::test]
async fn test_delete_failure_keeps_session() {
    let mut h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &["Bonjour"],
    )]));
    let key = h.store.select_by_id(SessionId(5)).await.unwrap();
    drain(&mut h.rx);
    h.backend.fail_next(MockOp::Delete, server_error());

    let err = h.store.delete_session(SessionId(5)).await.unwrap_err();
    assert!(matches!(err, ChatError::Remote(RemoteError::Status { code: 500, .. })));
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.active(), Some(key));
    assert_eq!(h.store.turns(key).len(), 1);

    let events = drain(&mut h.rx);
    assert_eq!(notices(&events, NotificationLevel::Error).len(), 1);
    assert_eq!(all_notices(&events), 1);
}

#[tokio::test]
async fn test_delete_selected_session_clears_selection() {
    let mut h = harness(MockBackend::new().with_sessions(vec![wire_session(
        5,
        "2025-02-01T08:00:00",
        &["Bonjour"],
    )]));
    let key = h.store.select_by_id(SessionId(5)).await.unwrap();
    drain(&mut h.rx);

    h.store.delete_session(SessionId(5)).await.unwrap();
    assert!(h.store.is_empty());
    assert_eq!(h.store.active(), None);
    assert_eq!(h.backend.deleted(), [SessionId(5)]);

    let events = drain(&mut h.rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ConversationEvent::SessionDeleted { session, .. } if *session == key
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, ConversationEvent::SessionSelected { session: None })));
}

#[tokio::test]
async fn test_open_new_chat_then_submit_uses_its_id() {
    let h = harness(MockBackend::new().with_next_session_id(42));
    let key = h.store.open_new_chat().await.unwrap();
    assert_eq!(h.store.active(), Some(key));
    assert_eq!(h.store.session(key).unwrap().id, Some(SessionId(42)));

    h.pipeline.submit("Contact", InputSource::Typed).await.unwrap();
    assert_eq!(
        h.backend.chat_requests()[0].session_id,
        Some(SessionId(42))
    );
    assert_eq!(h.backend.new_chat_calls(), 1);
}

#[tokio::test]
async fn test_open_new_chat_failure_inserts_nothing() {
    let mut h = harness(MockBackend::new());
    h.backend.fail_next(MockOp::NewChat, RemoteError::Transport("refused".into()));
    assert!(h.store.open_new_chat().await.is_err());
    assert!(h.store.is_empty());
    let events = drain(&mut h.rx);
    assert_eq!(
        notices(&events, NotificationLevel::Error),
        ["The server could not be reached"]
    );
}

#[tokio::test]
async fn test_share_link_round_trip() {
    let h = harness(MockBackend::new().with_next_session_id(42));
    assert_eq!(
        h.store.share_link_for("http://localhost:3000/"),
        "http://localhost:3000"
    );

    h.store.open_new_chat().await.unwrap();
    let link = h.store.share_link();
    assert_eq!(link, "http://localhost:3000/?session_id=42");
    assert_eq!(parse_share_link(&link), Some(SessionId(42)));
}

// =============================================================================
// Feedback
// =============================================================================

#[tokio::test]
async fn test_rate_confirmed_turn() {
    let mut h = harness(MockBackend::new());
    let turn = h.pipeline.submit("Horaires", InputSource::Typed).await.unwrap();
    let key = h.store.active().unwrap();
    drain(&mut h.rx);

    h.store.rate(key, turn.sequence, true).await.unwrap();
    assert_eq!(
        h.backend.rate_requests(),
        [RateRequest {
            question: "Horaires".into(),
            rating: true
        }]
    );
    let events = drain(&mut h.rx);
    assert_eq!(
        notices(&events, NotificationLevel::Success),
        ["Thanks for your feedback"]
    );
}

#[tokio::test]
async fn test_rate_requires_confirmed_turn() {
    let h = harness(MockBackend::new());
    h.backend.fail_next(MockOp::Chat, server_error());
    let failed = h.pipeline.submit("Horaires", InputSource::Typed).await.unwrap();
    let key = h.store.active().unwrap();

    let err = h.store.rate(key, failed.sequence, false).await.unwrap_err();
    assert_eq!(err, ChatError::TurnNotConfirmed(failed.sequence));
    assert!(h.backend.rate_requests().is_empty());
}

#[tokio::test]
async fn test_rate_remote_failure_notifies_once() {
    let mut h = harness(MockBackend::new());
    let turn = h.pipeline.submit("Horaires", InputSource::Typed).await.unwrap();
    let key = h.store.active().unwrap();
    drain(&mut h.rx);
    h.backend.fail_next(MockOp::Rate, RemoteError::Timeout);

    let err = h.store.rate(key, turn.sequence, true).await.unwrap_err();
    assert_eq!(err, ChatError::Remote(RemoteError::Timeout));
    let events = drain(&mut h.rx);
    assert_eq!(all_notices(&events), 1);
    assert_eq!(notices(&events, NotificationLevel::Error).len(), 1);
}
