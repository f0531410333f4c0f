use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Json, Path, State},
    http::{request::Parts, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::chat::{Chat, ChatDetail, Role};
use crate::completion::CompletionClient;
use crate::error::{Error, Result};
use crate::service::Conversations;

// -----------------------------------------------------------------------------
// Server State
// -----------------------------------------------------------------------------

pub struct AppState {
    pub conversations: Conversations,
    pub completions: CompletionClient,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chats", get(list_chats).post(create_chat))
        .route("/chats/:id", get(get_chat).delete(delete_chat))
        .route("/chats/:id/messages", post(send_message))
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// -----------------------------------------------------------------------------
// Caller identity
// -----------------------------------------------------------------------------

/// The externally-verified caller, taken from the `x-user-id` /
/// `x-user-name` headers set by the identity proxy. In a real deployment
/// these must come from a signed session, never from client-supplied text.
pub struct Identity {
    pub user_id: String,
    pub display_name: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(Error::Unauthorized)?
            .to_string();

        let display_name = parts
            .headers
            .get("x-user-name")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);

        Ok(Self {
            user_id,
            display_name,
        })
    }
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn list_chats(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<Chat>>> {
    let chats = state.conversations.list_chats(&identity.user_id).await?;
    Ok(Json(chats))
}

async fn create_chat(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Chat>)> {
    let title = match body.get("title") {
        Some(Value::String(s)) => s.as_str(),
        _ => return Err(Error::Validation("title must be a string".to_string())),
    };

    state
        .conversations
        .ensure_user(&identity.user_id, identity.display_name.as_deref())
        .await?;
    let chat = state
        .conversations
        .create_chat(&identity.user_id, title)
        .await?;

    Ok((StatusCode::CREATED, Json(chat)))
}

async fn get_chat(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<ChatDetail>> {
    let detail = state
        .conversations
        .detail_for_owner(id, &identity.user_id)
        .await?;
    Ok(Json(detail))
}

async fn delete_chat(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state
        .conversations
        .delete_chat(id, &identity.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Message flow
// -----------------------------------------------------------------------------

enum Frame {
    Content(String),
    Done,
    Failed,
}

/// Append the caller's message and stream the assistant reply.
///
/// Ownership is checked strictly before any write. The user message is
/// persisted before the completion call is attempted, so a provider failure
/// never loses user input: if the stream cannot be opened this responds 502
/// with the user message kept, and a mid-stream failure emits a terminal
/// `{"error"}` frame without persisting an assistant row.
async fn send_message(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let content = match body.get("content") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.as_str(),
        _ => {
            return Err(Error::Validation(
                "content must be a non-empty string".to_string(),
            ))
        }
    };
    let image_url = match body.get("imageUrl") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return Err(Error::Validation("imageUrl must be a string".to_string())),
    };

    let chat = state
        .conversations
        .chat_for_owner(id, &identity.user_id)
        .await?;

    state
        .conversations
        .ensure_user(&identity.user_id, identity.display_name.as_deref())
        .await?;
    state
        .conversations
        .append_message(chat.id, Role::User, content, image_url)
        .await?;

    let history = state.conversations.messages(chat.id).await?;
    let completion = state
        .completions
        .stream(&history, identity.display_name.as_deref())
        .await?;

    info!(chat_id = chat.id, "streaming assistant reply");

    // The forwarding task owns persistence: if the client goes away, frame
    // sends start failing but the loop keeps accumulating, so the assistant
    // message is still written once the provider finishes.
    let (tx, mut rx) = mpsc::channel::<Frame>(32);
    let conversations = state.conversations.clone();
    let chat_id = chat.id;

    tokio::spawn(async move {
        futures::pin_mut!(completion);

        let mut full = String::new();
        let mut failure: Option<Error> = None;

        while let Some(item) = completion.next().await {
            match item {
                Ok(delta) => {
                    full.push_str(&delta);
                    let _ = tx.send(Frame::Content(delta)).await;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() && full.trim().is_empty() {
            failure = Some(Error::Upstream("provider returned no content".to_string()));
        }

        match failure {
            None => match conversations
                .append_message(chat_id, Role::Assistant, &full, None)
                .await
            {
                Ok(_) => {
                    let _ = tx.send(Frame::Done).await;
                }
                Err(e) => {
                    error!(chat_id, "failed to persist assistant message: {}", e);
                    let _ = tx.send(Frame::Failed).await;
                }
            },
            Some(e) => {
                warn!(chat_id, "completion failed: {}", e);
                let _ = tx.send(Frame::Failed).await;
            }
        }
    });

    let stream = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Content(text) => {
                    yield Ok(Event::default().data(json!({ "content": text }).to_string()));
                }
                Frame::Done => {
                    yield Ok(Event::default().data(json!({ "done": true }).to_string()));
                    break;
                }
                Frame::Failed => {
                    yield Ok(Event::default()
                        .data(json!({ "error": "Failed to generate a response" }).to_string()));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
