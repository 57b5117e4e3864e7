//! The optimistic send protocol.
//!
//! `Idle → Composing → Sending → {confirmed | rolled back} → Idle`,
//! with Sending exclusive per conversation. Exactly one append and
//! exactly one of {replace, remove} happen per attempt.

use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::models::Message;

use crate::error::ChatError;
use crate::session::{ChatSession, DEFAULT_PAGE_LIMIT};

/// Composer state for one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerState {
    /// Empty draft; the send control is disabled.
    Idle,
    /// Non-empty draft, ready to submit.
    Composing,
    /// A send for this conversation is in flight.
    Sending,
}

/// What a submit attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The backend confirmed the message.
    Sent(Message),
    /// The draft was empty or whitespace; nothing happened.
    NothingToSend,
    /// A send for this conversation was already in flight; nothing
    /// happened.
    AlreadySending,
}

impl ChatSession {
    pub async fn set_draft(&self, conversation_id: Uuid, text: impl Into<String>) {
        let mut state = self.inner.state.lock().await;
        state.drafts.insert(conversation_id, text.into());
    }

    pub async fn draft(&self, conversation_id: Uuid) -> String {
        self.inner
            .state
            .lock()
            .await
            .drafts
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn composer_state(&self, conversation_id: Uuid) -> ComposerState {
        let state = self.inner.state.lock().await;
        if state.sending.contains(&conversation_id) {
            ComposerState::Sending
        } else if state
            .drafts
            .get(&conversation_id)
            .is_some_and(|d| !d.trim().is_empty())
        {
            ComposerState::Composing
        } else {
            ComposerState::Idle
        }
    }

    /// Submit the current draft for a conversation.
    ///
    /// The draft is taken and the Pending echo appended before the
    /// network call; the draft is not restored on failure (the rejected
    /// text travels in [`ChatError::SendFailed`] instead). On success
    /// the echo is swapped for the confirmed message, then page 1 is
    /// reloaded so concurrent counterpart messages are picked up, then
    /// the conversation list is refreshed for ordering/preview. On
    /// failure the echo is removed and `SendFailed` surfaces; there is
    /// no automatic retry.
    pub async fn submit(&self, conversation_id: Uuid) -> Result<SendOutcome, ChatError> {
        // Guard, echo, and clear happen under the lock, before any await
        // on the backend.
        let (temp_id, content) = {
            let mut state = self.inner.state.lock().await;
            if state.sending.contains(&conversation_id) {
                debug!(%conversation_id, "send already in flight, submit ignored");
                return Ok(SendOutcome::AlreadySending);
            }
            let draft = state.drafts.remove(&conversation_id).unwrap_or_default();
            let content = draft.trim().to_string();
            if content.is_empty() {
                return Ok(SendOutcome::NothingToSend);
            }

            let echo = Message::pending(conversation_id, self.inner.user_id, content.clone());
            let temp_id = echo.id;
            state.stores.entry(conversation_id).or_default().append(echo);
            state.sending.insert(conversation_id);
            debug!(%conversation_id, %temp_id, "optimistic echo appended");
            (temp_id, content)
        };

        // The lock is released for the send itself so a second submit
        // observes the in-flight guard instead of queueing behind us.
        let result = self
            .inner
            .backend
            .send_message(conversation_id, &content)
            .await;

        match result {
            Ok(record) => {
                let confirmed = Message::from_record(record);
                {
                    let mut state = self.inner.state.lock().await;
                    state.sending.remove(&conversation_id);
                    if let Some(store) = state.stores.get_mut(&conversation_id) {
                        store.replace(temp_id, confirmed.clone());
                    }
                }
                info!(%conversation_id, message_id = %confirmed.id, "message confirmed");

                // Authoritative refresh. The send already succeeded, so a
                // failure here is logged and tolerated rather than turned
                // into a send error.
                if let Err(err) = self
                    .load_history(conversation_id, 1, DEFAULT_PAGE_LIMIT)
                    .await
                {
                    warn!(%conversation_id, error = %err, "post-send history reload failed");
                }
                if let Err(err) = self.refresh_conversations().await {
                    warn!(%conversation_id, error = %err, "post-send conversation refresh failed");
                }

                Ok(SendOutcome::Sent(confirmed))
            }
            Err(source) => {
                {
                    let mut state = self.inner.state.lock().await;
                    state.sending.remove(&conversation_id);
                    if let Some(store) = state.stores.get_mut(&conversation_id) {
                        store.remove(temp_id);
                    }
                }
                warn!(%conversation_id, %temp_id, error = %source, "send failed, echo rolled back");
                Err(ChatError::SendFailed { source, content })
            }
        }
    }
}
