use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use parley_chat::backend::{BackendError, ChatBackend};
use parley_types::api::{
    CreateConversationRequest, MessageRecord, MessagesPage, SendMessageRequest,
};
use parley_types::models::{Conversation, Counterpart};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST adapter for the console backend. Transport details — auth
/// header, base path, timeouts — live here, not in the core. A timeout
/// surfaces as `BackendError::Transport` like any other failure.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BackendError> {
        debug!(path, "GET");
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        debug!(path, "POST");
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn list_counterparts(&self) -> Result<Vec<Counterpart>, BackendError> {
        self.get_json("/chat/contacts", &[]).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, BackendError> {
        self.get_json("/chat/conversations", &[]).await
    }

    async fn create_conversation(
        &self,
        counterpart_id: Uuid,
    ) -> Result<Conversation, BackendError> {
        self.post_json(
            "/chat/conversations",
            &CreateConversationRequest::direct(counterpart_id),
        )
        .await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, BackendError> {
        let body: MessagesPage = self
            .get_json(
                &format!("/chat/conversations/{conversation_id}/messages"),
                &[("page", page.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, BackendError> {
        self.post_json(
            &format!("/chat/conversations/{conversation_id}/messages"),
            &SendMessageRequest::text(content),
        )
        .await
    }
}
