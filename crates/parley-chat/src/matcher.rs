//! Counterpart-to-conversation matching.

use tracing::info;
use uuid::Uuid;

use parley_types::models::{Conversation, Counterpart};

use crate::error::ChatError;
use crate::session::{ChatSession, DEFAULT_PAGE_LIMIT};

impl ChatSession {
    /// Resolve a counterpart to its direct conversation.
    ///
    /// Returns the cached conversation involving the counterpart if one
    /// exists (idempotent — the same id every time), otherwise asks the
    /// backend to create one and inserts it at the head of the set. On
    /// failure nothing is added; re-selecting the counterpart retries.
    pub async fn resolve(&self, counterpart: &Counterpart) -> Result<Conversation, ChatError> {
        let mut state = self.inner.state.lock().await;
        if let Some(existing) = state.conversations.find_with(counterpart.id) {
            return Ok(existing.clone());
        }

        // The session lock stays held across the create call, so two
        // near-simultaneous resolves for a brand-new counterpart
        // serialize here instead of both deciding "not found" and
        // creating twice. The backend does not deduplicate creates.
        let created = self
            .inner
            .backend
            .create_conversation(counterpart.id)
            .await
            .map_err(ChatError::ConversationCreateFailed)?;
        info!(
            conversation_id = %created.id,
            counterpart_id = %counterpart.id,
            "conversation created"
        );
        state.conversations.insert_front(created.clone());
        Ok(created)
    }

    /// Resolve a counterpart, select the conversation, and load its
    /// first history page.
    pub async fn open(&self, counterpart: &Counterpart) -> Result<Conversation, ChatError> {
        let conversation = self.resolve(counterpart).await?;
        self.open_conversation(conversation.id).await?;
        Ok(conversation)
    }

    async fn open_conversation(&self, conversation_id: Uuid) -> Result<(), ChatError> {
        {
            let mut state = self.inner.state.lock().await;
            state.conversations.select(conversation_id);
        }
        self.load_history(conversation_id, 1, DEFAULT_PAGE_LIMIT).await?;
        Ok(())
    }
}
