use tracing::debug;
use uuid::Uuid;

use parley_types::models::{Conversation, Counterpart};

use crate::backend::ChatBackend;
use crate::error::ChatError;

/// Roster of people the current user may open a conversation with.
/// Fetch-and-cache only; filtering and pagination belong to the caller.
#[derive(Default)]
pub struct CounterpartDirectory {
    roster: Vec<Counterpart>,
}

impl CounterpartDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[Counterpart] {
        &self.roster
    }

    /// Re-fetch the roster. On failure the cached roster is untouched.
    pub async fn load(&mut self, backend: &dyn ChatBackend) -> Result<&[Counterpart], ChatError> {
        let roster = backend
            .list_counterparts()
            .await
            .map_err(ChatError::DirectoryUnavailable)?;
        debug!(count = roster.len(), "counterpart roster loaded");
        self.roster = roster;
        Ok(&self.roster)
    }
}

/// The signed-in user's conversation set, newest-first, plus the
/// currently selected conversation.
#[derive(Default)]
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    selected: Option<Uuid>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn selected(&self) -> Option<Uuid> {
        self.selected
    }

    /// Select a conversation. Returns false if it is not in the set.
    pub fn select(&mut self, id: Uuid) -> bool {
        if self.get(id).is_some() {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    /// Order-independent participant scan: the match works regardless of
    /// which side initiated the conversation.
    pub fn find_with(&self, counterpart_id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.involves(counterpart_id))
    }

    /// Place a newly created conversation at the head of the set.
    pub fn insert_front(&mut self, conversation: Conversation) {
        self.conversations.insert(0, conversation);
    }

    /// Re-fetch and replace the set, keeping the selection if that
    /// conversation still exists. On failure the set is untouched.
    pub async fn refresh(
        &mut self,
        backend: &dyn ChatBackend,
    ) -> Result<&[Conversation], ChatError> {
        let fresh = backend
            .list_conversations()
            .await
            .map_err(ChatError::DirectoryUnavailable)?;
        debug!(count = fresh.len(), "conversation set refreshed");
        self.replace_with(fresh);
        Ok(&self.conversations)
    }

    fn replace_with(&mut self, fresh: Vec<Conversation>) {
        self.conversations = fresh;
        if let Some(id) = self.selected {
            if self.get(id).is_none() {
                self.selected = None;
            }
        }
    }
}
