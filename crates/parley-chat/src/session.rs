use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use parley_types::models::{Conversation, Counterpart, DayGroup, Message};

use crate::backend::ChatBackend;
use crate::directory::{ConversationDirectory, CounterpartDirectory};
use crate::error::ChatError;
use crate::grouper;
use crate::store::MessageStore;

/// Default page size for history loads.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// One signed-in user's chat state: the counterpart roster, the
/// conversation set, a message store per conversation, and the
/// per-conversation composer drafts.
///
/// Clone-shareable; all mutable state sits behind one async mutex. The
/// current user id is passed in explicitly — there is no ambient auth
/// context to reach for, which keeps the core testable.
#[derive(Clone)]
pub struct ChatSession {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) backend: Arc<dyn ChatBackend>,
    pub(crate) user_id: Uuid,
    pub(crate) state: Mutex<SessionState>,
}

#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) counterparts: CounterpartDirectory,
    pub(crate) conversations: ConversationDirectory,
    pub(crate) stores: HashMap<Uuid, MessageStore>,
    pub(crate) drafts: HashMap<Uuid, String>,
    /// Conversations with a send in flight. Guards the one-Pending-per-
    /// conversation invariant.
    pub(crate) sending: HashSet<Uuid>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, user_id: Uuid) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend,
                user_id,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.inner.user_id
    }

    // -- Counterparts --

    /// Fetch the counterpart roster. On failure the cached roster is
    /// untouched and the caller gets a retryable `DirectoryUnavailable`.
    pub async fn load_counterparts(&self) -> Result<Vec<Counterpart>, ChatError> {
        let mut state = self.inner.state.lock().await;
        let roster = state.counterparts.load(self.inner.backend.as_ref()).await?;
        Ok(roster.to_vec())
    }

    pub async fn counterparts(&self) -> Vec<Counterpart> {
        self.inner.state.lock().await.counterparts.list().to_vec()
    }

    // -- Conversations --

    /// Fetch (or re-fetch) the conversation set, preserving the current
    /// selection if that conversation still exists. Called at session
    /// start and after every successful send.
    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let mut state = self.inner.state.lock().await;
        let fresh = state.conversations.refresh(self.inner.backend.as_ref()).await?;
        Ok(fresh.to_vec())
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.inner.state.lock().await.conversations.list().to_vec()
    }

    pub async fn selected_conversation(&self) -> Option<Conversation> {
        let state = self.inner.state.lock().await;
        let id = state.conversations.selected()?;
        state.conversations.get(id).cloned()
    }

    /// Select a conversation already in the set.
    pub async fn select_conversation(&self, id: Uuid) -> bool {
        self.inner.state.lock().await.conversations.select(id)
    }

    // -- History --

    /// Load one history page into the conversation's store, merged with
    /// deduplication by message id. On failure the store is untouched
    /// and the caller gets a retryable `HistoryUnavailable`. Returns the
    /// full cached sequence, ascending.
    pub async fn load_history(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let mut state = self.inner.state.lock().await;
        let records = self
            .inner
            .backend
            .list_messages(conversation_id, page, limit)
            .await
            .map_err(ChatError::HistoryUnavailable)?;
        let store = state.stores.entry(conversation_id).or_default();
        let inserted = store.merge_page(records);
        debug!(%conversation_id, page, inserted, total = store.len(), "history page merged");
        Ok(store.messages())
    }

    /// The cached messages for a conversation, ascending.
    pub async fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.inner
            .state
            .lock()
            .await
            .stores
            .get(&conversation_id)
            .map(MessageStore::messages)
            .unwrap_or_default()
    }

    /// Cached messages bucketed by calendar day in the viewer's local
    /// timezone.
    pub async fn day_groups(&self, conversation_id: Uuid) -> Vec<DayGroup> {
        let messages = self.messages(conversation_id).await;
        let now = Local::now();
        grouper::group_by_day(&messages, &Local, now.date_naive())
    }
}
