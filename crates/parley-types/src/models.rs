use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageRecord;

/// Someone the signed-in user may open a direct conversation with.
/// Owned by the console's user directory; the chat core never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: Uuid,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub role: String,
}

impl Counterpart {
    /// Company name if set, otherwise "first last", otherwise the raw id.
    pub fn display_name(&self) -> String {
        if let Some(company) = self.company_name.as_deref() {
            if !company.is_empty() {
                return company.to_string();
            }
        }
        let personal = match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.to_string(),
            (None, Some(last)) => last.to_string(),
            (None, None) => String::new(),
        };
        if personal.trim().is_empty() {
            self.id.to_string()
        } else {
            personal
        }
    }
}

/// A two-participant messaging thread and its list metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    /// Exactly two participant ids; order carries no meaning.
    pub participants: Vec<Uuid>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: Option<MessagePreview>,
}

impl Conversation {
    /// Order-independent participant membership test.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}

/// Denormalized preview of the latest message, for conversation-list display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub sender_id: Uuid,
    pub content: String,
}

/// Delivery lifecycle of a message as seen by this client.
///
/// `Pending` messages are local-only echoes keyed by a client-generated
/// temporary id; the backend only ever returns confirmed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Confirmed,
    Failed,
}

/// A single piece of conversation content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub delivery: DeliveryState,
}

impl Message {
    /// Lift a backend record into a confirmed domain message.
    pub fn from_record(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            content: record.content,
            created_at: record.created_at,
            delivery: DeliveryState::Confirmed,
        }
    }

    /// Build the local optimistic echo for a submitted draft.
    ///
    /// The temporary id lives in the same keyspace as server ids so the
    /// store can replace or remove it by id later.
    pub fn pending(conversation_id: Uuid, sender_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            created_at: Utc::now(),
            delivery: DeliveryState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.delivery == DeliveryState::Confirmed
    }
}

/// One calendar day's worth of messages, for display. Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub label: String,
    pub messages: Vec<Message>,
}
