//! Session protocol tests driven by a scripted in-memory backend:
//! counterpart matching, pagination/dedup, and the optimistic send
//! protocol including rollback and the in-flight guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use parley_chat::{BackendError, ChatBackend, ChatError, ChatSession, ComposerState, SendOutcome};
use parley_types::api::MessageRecord;
use parley_types::models::{Conversation, Counterpart, DeliveryState, MessagePreview};

// ── Fake backend ────────────────────────────────────────────────────────

struct FakeBackend {
    user_id: Uuid,
    counterparts: Vec<Counterpart>,
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<Uuid, Vec<MessageRecord>>>,
    clock: AtomicI64,
    send_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fail_directories: AtomicBool,
    fail_history: AtomicBool,
    fail_creates: AtomicBool,
    fail_sends: AtomicBool,
    /// When set, send_message blocks until notified.
    send_gate: Option<Arc<Notify>>,
}

impl FakeBackend {
    fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            counterparts: Vec::new(),
            conversations: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            clock: AtomicI64::new(1_700_000_000),
            send_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            fail_directories: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            send_gate: None,
        }
    }

    fn with_counterpart(mut self, counterpart: Counterpart) -> Self {
        self.counterparts.push(counterpart);
        self
    }

    fn tick(&self) -> chrono::DateTime<Utc> {
        let seconds = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn seed_conversation(&self, counterpart_id: Uuid) -> Uuid {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: vec![counterpart_id, self.user_id],
            last_message_at: None,
            last_message: None,
        };
        let id = conversation.id;
        self.conversations.lock().unwrap().push(conversation);
        id
    }

    fn seed_message(&self, conversation_id: Uuid, sender_id: Uuid, content: &str) -> Uuid {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.to_string(),
            created_at: self.tick(),
        };
        let id = record.id;
        self.messages
            .lock()
            .unwrap()
            .entry(conversation_id)
            .or_default()
            .push(record);
        id
    }

    fn transport() -> BackendError {
        BackendError::Transport("connection reset".into())
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn list_counterparts(&self) -> Result<Vec<Counterpart>, BackendError> {
        if self.fail_directories.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        Ok(self.counterparts.clone())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        if self.fail_directories.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn create_conversation(
        &self,
        counterpart_id: Uuid,
    ) -> Result<Conversation, BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: vec![self.user_id, counterpart_id],
            last_message_at: None,
            last_message: None,
        };
        self.conversations.lock().unwrap().push(conversation.clone());
        Ok(conversation)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, BackendError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let messages = self.messages.lock().unwrap();
        let all = messages.get(&conversation_id).cloned().unwrap_or_default();
        let start = ((page.max(1) - 1) * limit) as usize;
        Ok(all.into_iter().skip(start).take(limit as usize).collect())
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, BackendError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.send_gate {
            gate.notified().await;
        } else {
            tokio::task::yield_now().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Self::transport());
        }
        let record = MessageRecord {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: self.user_id,
            content: content.to_string(),
            created_at: self.tick(),
        };
        self.messages
            .lock()
            .unwrap()
            .entry(conversation_id)
            .or_default()
            .push(record.clone());
        let mut conversations = self.conversations.lock().unwrap();
        if let Some(conversation) = conversations.iter_mut().find(|c| c.id == conversation_id) {
            conversation.last_message_at = Some(record.created_at);
            conversation.last_message = Some(MessagePreview {
                sender_id: record.sender_id,
                content: record.content.clone(),
            });
        }
        Ok(record)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn vendor(company: &str) -> Counterpart {
    Counterpart {
        id: Uuid::new_v4(),
        company_name: Some(company.to_string()),
        first_name: None,
        last_name: None,
        role: "vendor".into(),
    }
}

fn session_with(backend: FakeBackend) -> (ChatSession, Arc<FakeBackend>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug".into()),
        )
        .try_init();
    let user_id = backend.user_id;
    let backend = Arc::new(backend);
    (ChatSession::new(backend.clone(), user_id), backend)
}

// ── Matching ────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_returns_existing_conversation_every_time() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let existing = backend.seed_conversation(acme.id);
    let (session, backend) = session_with(backend);
    session.refresh_conversations().await.unwrap();

    let first = session.resolve(&acme).await.unwrap();
    let second = session.resolve(&acme).await.unwrap();

    assert_eq!(first.id, existing);
    assert_eq!(second.id, existing);
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn resolve_creates_exactly_one_conversation_for_new_counterpart() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let (session, backend) = session_with(FakeBackend::new(user));
    session.refresh_conversations().await.unwrap();

    let created = session.resolve(&acme).await.unwrap();
    assert!(created.involves(acme.id));
    assert!(created.involves(user));
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);

    // Subsequent resolves hit the cached set.
    let again = session.resolve(&acme).await.unwrap();
    assert_eq!(again.id, created.id);
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_create_adds_nothing_and_is_retryable() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    backend.fail_creates.store(true, Ordering::SeqCst);
    let (session, backend) = session_with(backend);

    let err = session.resolve(&acme).await.unwrap_err();
    assert!(matches!(err, ChatError::ConversationCreateFailed(_)));
    assert!(session.conversations().await.is_empty());

    // Re-selecting the counterpart retries and succeeds.
    backend.fail_creates.store(false, Ordering::SeqCst);
    let created = session.resolve(&acme).await.unwrap();
    assert!(created.involves(acme.id));
}

// ── History ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn overlapping_pages_merge_without_duplicates() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    let m1 = backend.seed_message(conversation, acme.id, "one");
    let m2 = backend.seed_message(conversation, user, "two");
    let m3 = backend.seed_message(conversation, acme.id, "three");
    let (session, _backend) = session_with(backend);

    session.load_history(conversation, 1, 2).await.unwrap();
    let combined = session.load_history(conversation, 2, 2).await.unwrap();

    assert_eq!(
        combined.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![m1, m2, m3]
    );
    assert!(combined.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn history_failure_leaves_cached_messages_visible() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    backend.seed_message(conversation, acme.id, "hello");
    let (session, backend) = session_with(backend);

    let loaded = session.load_history(conversation, 1, 20).await.unwrap();
    assert_eq!(loaded.len(), 1);

    backend.fail_history.store(true, Ordering::SeqCst);
    let err = session.load_history(conversation, 1, 20).await.unwrap_err();
    assert!(matches!(err, ChatError::HistoryUnavailable(_)));
    assert_eq!(session.messages(conversation).await.len(), 1);
}

#[tokio::test]
async fn directory_failure_is_retryable() {
    let user = Uuid::new_v4();
    let backend = FakeBackend::new(user).with_counterpart(vendor("Acme"));
    backend.fail_directories.store(true, Ordering::SeqCst);
    let (session, backend) = session_with(backend);

    let err = session.load_counterparts().await.unwrap_err();
    assert!(matches!(err, ChatError::DirectoryUnavailable(_)));

    backend.fail_directories.store(false, Ordering::SeqCst);
    let roster = session.load_counterparts().await.unwrap();
    assert_eq!(roster.len(), 1);
}

// ── Sending ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_send_adds_exactly_one_confirmed_message() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    backend.seed_message(conversation, acme.id, "question?");
    let (session, _backend) = session_with(backend);
    session.refresh_conversations().await.unwrap();
    session.load_history(conversation, 1, 50).await.unwrap();

    session.set_draft(conversation, "answer!").await;
    let outcome = session.submit(conversation).await.unwrap();

    let confirmed = match outcome {
        SendOutcome::Sent(message) => message,
        other => panic!("expected Sent, got {other:?}"),
    };
    assert_eq!(confirmed.sender_id, user);
    assert_eq!(confirmed.content, "answer!");

    let messages = session.messages(conversation).await;
    assert_eq!(messages.len(), 2);
    let last = messages.last().unwrap();
    assert_eq!(last.delivery, DeliveryState::Confirmed);
    assert_eq!(last.content, "answer!");
    assert_eq!(last.sender_id, user);
    assert_eq!(session.draft(conversation).await, "");
}

#[tokio::test]
async fn failed_send_rolls_back_the_echo_completely() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    backend.seed_message(conversation, acme.id, "anyone there?");
    backend.fail_sends.store(true, Ordering::SeqCst);
    let (session, _backend) = session_with(backend);
    session.load_history(conversation, 1, 50).await.unwrap();

    session.set_draft(conversation, "yes").await;
    let err = session.submit(conversation).await.unwrap_err();

    match err {
        ChatError::SendFailed { content, .. } => assert_eq!(content, "yes"),
        other => panic!("expected SendFailed, got {other:?}"),
    }

    let messages = session.messages(conversation).await;
    assert_eq!(messages.len(), 1);
    assert!(messages.iter().all(|m| m.delivery == DeliveryState::Confirmed));
    // The cleared draft is not restored; the rejected text only travels
    // in the error.
    assert_eq!(session.draft(conversation).await, "");
}

#[tokio::test]
async fn confirmed_send_survives_failed_post_send_refreshes() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    backend.seed_message(conversation, acme.id, "ping");
    let (session, backend) = session_with(backend);
    session.refresh_conversations().await.unwrap();
    session.load_history(conversation, 1, 50).await.unwrap();

    // The send itself goes through; both follow-up refreshes fail.
    backend.fail_history.store(true, Ordering::SeqCst);
    backend.fail_directories.store(true, Ordering::SeqCst);

    session.set_draft(conversation, "pong").await;
    let outcome = session.submit(conversation).await.unwrap();

    // A confirmed send is not demoted by a failed reload: the outcome is
    // still Sent and the confirmed message replaced the echo.
    let confirmed = match outcome {
        SendOutcome::Sent(message) => message,
        other => panic!("expected Sent, got {other:?}"),
    };
    assert_eq!(confirmed.content, "pong");

    let messages = session.messages(conversation).await;
    assert_eq!(messages.len(), 2);
    let last = messages.last().unwrap();
    assert_eq!(last.id, confirmed.id);
    assert_eq!(last.delivery, DeliveryState::Confirmed);

    // The conversation set kept its pre-failure contents.
    assert_eq!(session.conversations().await.len(), 1);
}

#[tokio::test]
async fn rapid_double_submit_sends_exactly_once() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    let (session, backend) = session_with(backend);
    session.refresh_conversations().await.unwrap();

    session.set_draft(conversation, "double tap").await;
    let (first, second) = tokio::join!(session.submit(conversation), session.submit(conversation));

    assert_eq!(backend.send_calls.load(Ordering::SeqCst), 1);
    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.iter().any(|o| matches!(o, SendOutcome::Sent(_))));
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, SendOutcome::AlreadySending | SendOutcome::NothingToSend))
    );

    let messages = session.messages(conversation).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "double tap");
}

#[tokio::test]
async fn empty_draft_submit_is_a_noop() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user);
    let conversation = backend.seed_conversation(acme.id);
    let (session, backend) = session_with(backend);

    session.set_draft(conversation, "   ").await;
    let outcome = session.submit(conversation).await.unwrap();

    assert_eq!(outcome, SendOutcome::NothingToSend);
    assert_eq!(backend.send_calls.load(Ordering::SeqCst), 0);
    assert!(session.messages(conversation).await.is_empty());
}

#[tokio::test]
async fn composer_walks_idle_composing_sending_idle() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let gate = Arc::new(Notify::new());
    let mut backend = FakeBackend::new(user);
    backend.send_gate = Some(gate.clone());
    let conversation = backend.seed_conversation(acme.id);
    let (session, _backend) = session_with(backend);

    assert_eq!(session.composer_state(conversation).await, ComposerState::Idle);

    session.set_draft(conversation, "drafting").await;
    assert_eq!(
        session.composer_state(conversation).await,
        ComposerState::Composing
    );

    let submitting = tokio::spawn({
        let session = session.clone();
        async move { session.submit(conversation).await }
    });
    while session.composer_state(conversation).await != ComposerState::Sending {
        tokio::task::yield_now().await;
    }

    gate.notify_one();
    submitting.await.unwrap().unwrap();
    assert_eq!(session.composer_state(conversation).await, ComposerState::Idle);
}

// ── End to end ──────────────────────────────────────────────────────────

#[tokio::test]
async fn first_message_to_a_new_vendor() {
    let user = Uuid::new_v4();
    let acme = vendor("Acme");
    let backend = FakeBackend::new(user).with_counterpart(acme.clone());
    let (session, backend) = session_with(backend);

    // Session start: both directories load independently.
    let roster = session.load_counterparts().await.unwrap();
    assert_eq!(roster[0].display_name(), "Acme");
    assert!(session.refresh_conversations().await.unwrap().is_empty());

    // Picking the vendor creates and selects a conversation with an
    // empty first page.
    let conversation = session.open(&acme).await.unwrap();
    assert!(conversation.involves(user) && conversation.involves(acme.id));
    assert_eq!(backend.create_calls.load(Ordering::SeqCst), 1);
    assert!(session.messages(conversation.id).await.is_empty());

    session.set_draft(conversation.id, "Hello").await;
    let outcome = session.submit(conversation.id).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Sent(_)));

    // The authoritative reload yields the confirmed message only.
    let messages = session.messages(conversation.id).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[0].delivery, DeliveryState::Confirmed);

    // The refreshed conversation list carries the preview, and the
    // selection survived the refresh.
    let refreshed = session.selected_conversation().await.unwrap();
    assert_eq!(refreshed.id, conversation.id);
    let preview = refreshed.last_message.unwrap();
    assert_eq!(preview.content, "Hello");
    assert_eq!(preview.sender_id, user);
    assert!(refreshed.last_message_at.is_some());
}
