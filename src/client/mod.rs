//! Client data layer: typed API wrappers plus a query cache implementing the
//! optimistic insert / reconcile / rollback protocol a chat UI renders from.

mod cache;
mod http;

pub use cache::{CacheKey, Cached, KeyKind, QueryCache};
pub use http::{ApiClient, ClientIdentity};

use crate::chat::{Chat, ChatDetail, Message, Role};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A send for this chat is already in flight; the UI disables submit
    /// while pending, so this is a protocol violation by the caller.
    #[error("a send is already pending for chat {0}")]
    SendPending(i64),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    #[error("completion failed: {0}")]
    Completion(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// Client-side view of one user's chats. Reads come from the cache when the
/// server has confirmed them; mutations go to the server and settle the cache
/// by refetch (success) or snapshot restore (failure).
pub struct ChatClient {
    api: ApiClient,
    cache: QueryCache,
    pending: Mutex<HashSet<i64>>,
    // Placeholder ids count down from -1: disjoint from server-assigned
    // AUTOINCREMENT ids by construction.
    next_placeholder_id: AtomicI64,
}

impl ChatClient {
    pub fn new(base_url: &str, identity: ClientIdentity) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new(base_url, identity)?,
            cache: QueryCache::new(),
            pending: Mutex::new(HashSet::new()),
            next_placeholder_id: AtomicI64::new(-1),
        })
    }

    pub fn owner(&self) -> &str {
        &self.api.identity().user_id
    }

    /// True while a send for this chat is in flight. The UI uses this to
    /// disable submit, keeping at most one optimistic entry per chat.
    pub fn is_pending(&self, chat_id: i64) -> bool {
        self.pending.lock().unwrap().contains(&chat_id)
    }

    /// The owner's chat list, newest first. Cached until a create or delete
    /// invalidates it.
    pub async fn chats(&self) -> Result<Vec<Chat>, ClientError> {
        let key = CacheKey::chat_list(self.owner());
        if let Some(Cached::ChatList(chats)) = self.cache.get(&key) {
            return Ok(chats);
        }

        let chats = self.api.list_chats().await?;
        self.cache.set(key, Cached::ChatList(chats.clone()));
        Ok(chats)
    }

    pub async fn create_chat(&self, title: &str) -> Result<Chat, ClientError> {
        let chat = self.api.create_chat(title).await?;
        self.cache.invalidate(&CacheKey::chat_list(self.owner()));
        Ok(chat)
    }

    pub async fn delete_chat(&self, id: i64) -> Result<(), ClientError> {
        self.api.delete_chat(id).await?;
        self.cache.invalidate(&CacheKey::chat(self.owner(), id));
        self.cache.invalidate(&CacheKey::chat_list(self.owner()));
        Ok(())
    }

    /// A chat with its messages. While a send is pending this includes the
    /// optimistic placeholder; otherwise it is the last confirmed state.
    pub async fn chat(&self, id: i64) -> Result<ChatDetail, ClientError> {
        let key = CacheKey::chat(self.owner(), id);
        if let Some(Cached::Detail(detail)) = self.cache.get(&key) {
            return Ok(detail);
        }

        let detail = self.api.get_chat(id).await?;
        self.cache.set(key, Cached::Detail(detail.clone()));
        Ok(detail)
    }

    /// Send a user message and stream back the assistant reply.
    ///
    /// The submitted content shows up immediately as a placeholder message
    /// with a negative id; once the round-trip settles the cache holds either
    /// the server-confirmed history (placeholder replaced, never rendered
    /// twice) or, on any failure, exactly the pre-submit snapshot.
    pub async fn send_message(
        &self,
        chat_id: i64,
        content: &str,
        image_url: Option<&str>,
        mut on_token: impl FnMut(&str) + Send,
    ) -> Result<ChatDetail, ClientError> {
        {
            let mut pending = self.pending.lock().unwrap();
            if !pending.insert(chat_id) {
                return Err(ClientError::SendPending(chat_id));
            }
        }

        let result = self
            .send_inner(chat_id, content, image_url, &mut on_token)
            .await;

        self.pending.lock().unwrap().remove(&chat_id);
        result
    }

    async fn send_inner(
        &self,
        chat_id: i64,
        content: &str,
        image_url: Option<&str>,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<ChatDetail, ClientError> {
        let key = CacheKey::chat(self.owner(), chat_id);

        // Baseline is the last confirmed state; fetch it if we have none so
        // there is always a snapshot to roll back to.
        let baseline = match self.cache.get(&key) {
            Some(Cached::Detail(detail)) => detail,
            _ => {
                let detail = self.api.get_chat(chat_id).await?;
                self.cache.set(key.clone(), Cached::Detail(detail.clone()));
                detail
            }
        };

        let placeholder = Message {
            id: self.next_placeholder_id.fetch_sub(1, Ordering::Relaxed),
            chat_id,
            role: Role::User,
            content: content.to_string(),
            image_url: image_url.map(String::from),
            created_at: Utc::now(),
        };

        let mut provisional = baseline.clone();
        provisional.messages.push(placeholder);
        self.cache.set(key.clone(), Cached::Detail(provisional));

        match self.api.send_message(chat_id, content, image_url, on_token).await {
            Ok(()) => {}
            Err(e) => {
                // The server never confirmed the message; the UI must not
                // keep showing it.
                self.cache.set(key, Cached::Detail(baseline));
                return Err(e);
            }
        }

        // Reconcile: the authoritative refetch carries both the real user
        // message and the assistant reply, replacing the placeholder.
        match self.api.get_chat(chat_id).await {
            Ok(fresh) => {
                self.cache.set(key, Cached::Detail(fresh.clone()));
                self.cache.invalidate(&CacheKey::chat_list(self.owner()));
                Ok(fresh)
            }
            Err(e) => {
                // Sent but not reconciled; drop the provisional entry so the
                // next read refetches instead of rendering the placeholder.
                self.cache.invalidate(&key);
                Err(e)
            }
        }
    }
}
