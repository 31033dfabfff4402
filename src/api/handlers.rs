//! HTTP request handlers

use super::types::{
    ChatListResponse, ChatResponse, ChatStreamRequest, CreateChatRequest, ErrorResponse,
    MessageListResponse, MessageResponse, StoreMessageRequest, SuccessResponse,
};
use super::AppState;
use crate::auth::UserIdentity;
use crate::message::Role;
use crate::protocol::StreamEncoder;
use crate::store::{owned_chat, StoreError};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Returned for every rejected chat stream body
pub const CHAT_REQUEST_FAILED: &str = "Failed to process chat request";

/// Frame buffer between the run and the response body
const STREAM_BUFFER: usize = 1024;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chats", post(create_chat).get(list_chats))
        .route("/api/chats/:id", delete(delete_chat))
        .route(
            "/api/chats/:id/messages",
            get(list_messages).post(store_message),
        )
        .route("/version", get(get_version))
        .with_state(state)
}

async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<UserIdentity, AppError> {
    state
        .auth
        .authenticate(headers)
        .await
        .ok_or(AppError::Unauthorized)
}

// ============================================================
// Chat stream
// ============================================================

async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let user = require_user(&state, &headers).await?;

    let request: ChatStreamRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejecting malformed chat request");
        AppError::BadRequest(CHAT_REQUEST_FAILED.to_string())
    })?;
    if request.new_message.trim().is_empty() || request.chat_id.trim().is_empty() {
        return Err(AppError::BadRequest(CHAT_REQUEST_FAILED.to_string()));
    }
    owned_chat(state.store.as_ref(), &user.user_id, &request.chat_id).await?;

    let (tx, rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let history = request.history();
    let chat_id = request.chat_id;
    let new_message = request.new_message.trim().to_string();

    tracing::info!(
        chat_id = %chat_id,
        user_id = %user.user_id,
        history = history.len(),
        "Starting chat stream"
    );

    // Frames are produced after the response is returned
    tokio::spawn(async move {
        let encoder = StreamEncoder::connect(tx).await;

        if let Err(e) = state
            .store
            .append_message(&chat_id, &new_message, Role::User)
            .await
        {
            tracing::error!(chat_id = %chat_id, error = %e, "Failed to persist user message");
            encoder.fail("Failed to save message").await;
            return;
        }

        let events = state.graph.stream(chat_id.clone(), history);
        let summary = encoder.drain(events).await;
        tracing::info!(
            chat_id = %chat_id,
            frames = summary.frames_written,
            terminal = ?summary.terminal,
            disconnected = summary.disconnected,
            "Chat stream finished"
        );
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(response)
}

// ============================================================
// Chats
// ============================================================

async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let user = require_user(&state, &headers).await?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title must not be empty".to_string()));
    }
    let chat = state.store.create_chat(&user.user_id, title).await?;
    Ok(Json(ChatResponse { chat }))
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatListResponse>, AppError> {
    let user = require_user(&state, &headers).await?;
    let chats = state.store.list_chats(&user.user_id).await?;
    Ok(Json(ChatListResponse { chats }))
}

async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = require_user(&state, &headers).await?;
    state.store.delete_chat(&user.user_id, &id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Messages
// ============================================================

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessageListResponse>, AppError> {
    let user = require_user(&state, &headers).await?;
    owned_chat(state.store.as_ref(), &user.user_id, &id).await?;
    let messages = state.store.list_messages(&id).await?;
    Ok(Json(MessageListResponse { messages }))
}

async fn store_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StoreMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = require_user(&state, &headers).await?;
    owned_chat(state.store.as_ref(), &user.user_id, &id).await?;
    let message = state
        .store
        .append_message(&id, &req.content, req.role)
        .await?;
    Ok(Json(MessageResponse { message }))
}

async fn get_version() -> &'static str {
    concat!("agent-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Unauthorized,
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ChatNotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::Forbidden(_) => AppError::Forbidden(e.to_string()),
            StoreError::Sqlite(_) | StoreError::Backend(_) => {
                tracing::error!(error = %e, "Storage failure");
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuthenticator;
    use crate::graph::{AgentGraph, GraphConfig, MemoryCheckpointStore, RATE_LIMIT_REPLY};
    use crate::llm::testing::MockLlm;
    use crate::llm::LlmError;
    use crate::protocol::{FrameDecoder, WireFrame};
    use crate::store::{ChatStore, MemoryStore, MessageStore};
    use crate::tools::ToolRegistry;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Fixture {
        llm: Arc<MockLlm>,
        store: Arc<MemoryStore>,
        router: Router,
    }

    fn fixture() -> Fixture {
        let llm = Arc::new(MockLlm::new());
        let store = Arc::new(MemoryStore::new());
        let graph = AgentGraph::new(
            llm.clone(),
            Arc::new(ToolRegistry::standard()),
            Arc::new(MemoryCheckpointStore::new()),
            GraphConfig::default(),
        );
        let auth = TokenAuthenticator::parse("alice-token:alice,bob-token:bob").unwrap();
        let state = AppState::new(graph, store.clone(), Arc::new(auth));
        Fixture {
            llm,
            store,
            router: create_router(state),
        }
    }

    fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn frames(response: Response) -> Vec<WireFrame> {
        let bytes = body_bytes(response).await;
        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes).into_iter().map(Result::unwrap).collect()
    }

    #[tokio::test]
    async fn test_unauthenticated_stream_is_rejected_without_frames() {
        let f = fixture();
        let chat = f.store.create_chat("alice", "Math").await.unwrap();
        let body = json!({"messages": [], "newMessage": "2+2?", "chatId": chat.id});

        let response = f
            .router
            .clone()
            .oneshot(post_json("/api/chat/stream", None, &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = body_bytes(response).await;
        assert!(!String::from_utf8_lossy(&bytes).contains("connected"));
        assert!(f.llm.recorded_requests().is_empty());
        assert!(f.store.list_messages(&chat.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let f = fixture();
        let response = f
            .router
            .oneshot(post_json("/api/chat/stream", Some("alice-token"), &json!({"oops": 1})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body, json!({"error": CHAT_REQUEST_FAILED}));
    }

    #[tokio::test]
    async fn test_stream_emits_connected_tokens_done() {
        let f = fixture();
        let chat = f.store.create_chat("alice", "Math").await.unwrap();
        f.llm.queue_tokens(&["2+2 is ", "4"]);

        let body = json!({"messages": [], "newMessage": "2+2?", "chatId": chat.id});
        let response = f
            .router
            .oneshot(post_json("/api/chat/stream", Some("alice-token"), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()["x-accel-buffering"], "no");

        let frames = frames(response).await;
        assert_eq!(
            frames,
            vec![
                WireFrame::Connected,
                WireFrame::Token {
                    token: "2+2 is ".to_string()
                },
                WireFrame::Token {
                    token: "4".to_string()
                },
                WireFrame::Done,
            ]
        );

        let stored = f.store.list_messages(&chat.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "2+2?");
        assert_eq!(stored[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_rate_limit_stream_ends_with_done() {
        let f = fixture();
        let chat = f.store.create_chat("alice", "Math").await.unwrap();
        f.llm.queue_error(LlmError::rate_limit("quota exhausted"));

        let body = json!({"messages": [], "newMessage": "hi", "chatId": chat.id});
        let response = f
            .router
            .oneshot(post_json("/api/chat/stream", Some("alice-token"), &body))
            .await
            .unwrap();
        let frames = frames(response).await;
        assert_eq!(
            frames,
            vec![
                WireFrame::Connected,
                WireFrame::Token {
                    token: RATE_LIMIT_REPLY.to_string()
                },
                WireFrame::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_model_failure_ends_with_single_error_frame() {
        let f = fixture();
        let chat = f.store.create_chat("alice", "Math").await.unwrap();
        f.llm.queue_error(LlmError::auth("invalid api key"));

        let body = json!({"messages": [], "newMessage": "hi", "chatId": chat.id});
        let response = f
            .router
            .oneshot(post_json("/api/chat/stream", Some("alice-token"), &body))
            .await
            .unwrap();
        let frames = frames(response).await;
        assert_eq!(
            frames,
            vec![WireFrame::Connected, WireFrame::error("invalid api key")]
        );
    }

    #[tokio::test]
    async fn test_stream_to_foreign_chat_is_forbidden() {
        let f = fixture();
        let chat = f.store.create_chat("alice", "Math").await.unwrap();
        let body = json!({"messages": [], "newMessage": "hi", "chatId": chat.id});
        let response = f
            .router
            .oneshot(post_json("/api/chat/stream", Some("bob-token"), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_chat_crud() {
        let f = fixture();
        let response = f
            .router
            .clone()
            .oneshot(post_json("/api/chats", Some("alice-token"), &json!({"title": "Math"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created: ChatResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();

        let response = f
            .router
            .clone()
            .oneshot(post_json(
                &format!("/api/chats/{}/messages", created.chat.id),
                Some("alice-token"),
                &json!({"content": "4"}),
            ))
            .await
            .unwrap();
        let stored: MessageResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(stored.message.role, Role::Assistant);

        let list = Request::get(format!("/api/chats/{}/messages", created.chat.id))
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .body(Body::empty())
            .unwrap();
        let response = f.router.clone().oneshot(list).await.unwrap();
        let listed: MessageListResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(listed.messages.len(), 1);

        let remove = Request::delete(format!("/api/chats/{}", created.chat.id))
            .header(header::AUTHORIZATION, "Bearer bob-token")
            .body(Body::empty())
            .unwrap();
        let response = f.router.clone().oneshot(remove).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let remove = Request::delete(format!("/api/chats/{}", created.chat.id))
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .body(Body::empty())
            .unwrap();
        let response = f.router.clone().oneshot(remove).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chats = Request::get("/api/chats")
            .header(header::AUTHORIZATION, "Bearer alice-token")
            .body(Body::empty())
            .unwrap();
        let response = f.router.oneshot(chats).await.unwrap();
        let listed: ChatListResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(listed.chats.is_empty());
    }

    #[tokio::test]
    async fn test_version_is_public() {
        let f = fixture();
        let response = f
            .router
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(String::from_utf8(body_bytes(response).await)
            .unwrap()
            .starts_with("agent-chat "));
    }
}
