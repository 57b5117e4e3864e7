use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use parley_types::api::MessageRecord;
use parley_types::models::{Conversation, Counterpart};

/// Transport-level failure from the backend collaborator.
///
/// The session maps these onto the user-facing [`ChatError`] kinds per
/// operation; the core never inspects the variants beyond reporting.
///
/// [`ChatError`]: crate::error::ChatError
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connect failure, timeout, or any other transport-layer error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not parse.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// The five operations the chat core consumes.
///
/// All are asynchronous and may fail with a transport error. All are
/// assumed idempotent except `create_conversation` and `send_message`,
/// which the backend does not deduplicate.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_counterparts(&self) -> Result<Vec<Counterpart>, BackendError>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError>;

    /// Create a direct conversation with the given counterpart.
    async fn create_conversation(&self, counterpart_id: Uuid)
    -> Result<Conversation, BackendError>;

    /// Fetch one page of a conversation's history, ascending by
    /// `created_at`. Pages are 1-based.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, BackendError>;

    /// Send a text message. Returns the confirmed record with its
    /// server-assigned id.
    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, BackendError>;
}
