//! One chat as seen by a client: submit a message, follow the stream,
//! persist the reply

use super::render::{ClientRenderState, RenderError, RenderStep};
use crate::api::{
    ChatStreamRequest, ErrorResponse, HistoryMessage, MessageListResponse, MessageResponse,
    StoreMessageRequest,
};
use crate::message::Role;
use crate::protocol::{FrameDecoder, ProtocolParseError, WireFrame};
use crate::store::{MessageStore, StoreError, StoreResult, StoredMessage};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("A reply is still streaming")]
    Busy,
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Render(#[from] RenderError),
    #[error("Failed to save reply: {0}")]
    Store(#[from] StoreError),
    #[error("Stream ended before the reply was complete")]
    Incomplete,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

/// Turn a non-success response into its status and server message
async fn status_error(response: reqwest::Response) -> (StatusCode, String) {
    let status = response.status();
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    (status, message)
}

/// Client state of one chat
pub struct ChatSession<S> {
    http: reqwest::Client,
    base_url: String,
    token: String,
    chat_id: String,
    store: S,
    messages: Vec<HistoryMessage>,
    render: ClientRenderState,
}

impl<S: MessageStore> ChatSession<S> {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
        store: S,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
            chat_id: chat_id.into(),
            store,
            messages: Vec::new(),
            render: ClientRenderState::new(),
        }
    }

    /// Seed the conversation with previously stored messages
    #[must_use]
    pub fn with_history(mut self, stored: &[StoredMessage]) -> Self {
        self.messages = stored
            .iter()
            .map(|m| HistoryMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Conversation shown to the user, the turn in flight included
    pub fn messages(&self) -> &[HistoryMessage] {
        &self.messages
    }

    pub fn render_state(&self) -> &ClientRenderState {
        &self.render
    }

    /// Send a message and follow the reply stream to its end
    ///
    /// On success the reply is stored and appended to the conversation.
    /// On failure the user message is rolled back and the render state
    /// shows the error.
    pub async fn submit(&mut self, new_message: &str) -> Result<String, ClientError> {
        let content = new_message.trim();
        if content.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if self.render.loading {
            return Err(ClientError::Busy);
        }

        let request = ChatStreamRequest {
            messages: self.messages.clone(),
            new_message: content.to_string(),
            chat_id: self.chat_id.clone(),
        };
        self.render.reset();
        self.messages.push(HistoryMessage {
            role: Role::User,
            content: content.to_string(),
        });

        let result = self.follow(&request).await;
        match &result {
            Ok(reply) => self.messages.push(HistoryMessage {
                role: Role::Assistant,
                content: reply.clone(),
            }),
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, error = %e, "Submission failed");
                self.messages.pop();
                self.render.fail(&e.to_string());
            }
        }
        self.render.loading = false;
        result
    }

    async fn follow(&mut self, request: &ChatStreamRequest) -> Result<String, ClientError> {
        let response = self
            .http
            .post(endpoint(&self.base_url, "/api/chat/stream"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            let (status, message) = status_error(response).await;
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let mut decoder = FrameDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for frame in decoder.feed(&chunk?) {
                if let Some(reply) = self.fold(frame).await? {
                    return Ok(reply);
                }
            }
        }
        for frame in decoder.finish() {
            if let Some(reply) = self.fold(frame).await? {
                return Ok(reply);
            }
        }
        Err(ClientError::Incomplete)
    }

    /// Apply one decoded frame; returns the reply once it is stored
    async fn fold(
        &mut self,
        frame: Result<WireFrame, ProtocolParseError>,
    ) -> Result<Option<String>, ClientError> {
        // Parse errors were already logged by the decoder
        let Ok(frame) = frame else {
            return Ok(None);
        };
        match self.render.apply(frame)? {
            RenderStep::Continue => Ok(None),
            RenderStep::Finished(text) => {
                self.store
                    .append_message(&self.chat_id, &text, Role::Assistant)
                    .await?;
                Ok(Some(text))
            }
        }
    }
}

/// `MessageStore` backed by the server's chat message endpoints
#[derive(Clone)]
pub struct HttpMessageStore {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpMessageStore {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn messages_url(&self, chat_id: &str) -> String {
        endpoint(&self.base_url, &format!("/api/chats/{chat_id}/messages"))
    }
}

async fn checked(
    chat_id: &str,
    sent: Result<reqwest::Response, reqwest::Error>,
) -> StoreResult<reqwest::Response> {
    let response = sent.map_err(|e| StoreError::Backend(e.to_string()))?;
    if response.status().is_success() {
        return Ok(response);
    }
    let (status, message) = status_error(response).await;
    Err(match status {
        StatusCode::NOT_FOUND => StoreError::ChatNotFound(chat_id.to_string()),
        StatusCode::FORBIDDEN => StoreError::Forbidden(chat_id.to_string()),
        _ => StoreError::Backend(format!("{status}: {message}")),
    })
}

#[async_trait]
impl MessageStore for HttpMessageStore {
    async fn append_message(
        &self,
        chat_id: &str,
        content: &str,
        role: Role,
    ) -> StoreResult<StoredMessage> {
        let body = StoreMessageRequest {
            content: content.to_string(),
            role,
        };
        let sent = self
            .http
            .post(self.messages_url(chat_id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await;
        let response = checked(chat_id, sent).await?;
        let stored: MessageResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(stored.message)
    }

    async fn list_messages(&self, chat_id: &str) -> StoreResult<Vec<StoredMessage>> {
        let sent = self
            .http
            .get(self.messages_url(chat_id))
            .bearer_auth(&self.token)
            .send()
            .await;
        let response = checked(chat_id, sent).await?;
        let listed: MessageListResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(listed.messages)
    }
}
