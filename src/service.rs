use crate::chat::{Chat, ChatDetail, Message, Role};
use crate::error::{Error, Result};
use crate::store::Store;

/// Substituted when a chat is created with an empty or whitespace-only title.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Conversation operations with mandatory owner scoping. Every read, append
/// and delete on a specific chat goes through `chat_for_owner`; nothing in the
/// HTTP layer re-implements the ownership check.
#[derive(Clone)]
pub struct Conversations {
    store: Store,
}

impl Conversations {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Ok(Vec::new());
        }
        self.store.list_chats(owner_id).await
    }

    pub async fn create_chat(&self, owner_id: &str, title: &str) -> Result<Chat> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(Error::Validation(
                "a signed-in user is required to create a chat".to_string(),
            ));
        }

        let title = title.trim();
        let title = if title.is_empty() {
            DEFAULT_CHAT_TITLE
        } else {
            title
        };

        self.store.create_chat(owner_id, title).await
    }

    /// The one authorization-aware lookup: `NotFound` when the id does not
    /// resolve, `Forbidden` when it belongs to someone else.
    pub async fn chat_for_owner(&self, id: i64, owner_id: &str) -> Result<Chat> {
        let chat = self.store.get_chat(id).await?.ok_or(Error::NotFound)?;
        if chat.owner_id != owner_id {
            return Err(Error::Forbidden);
        }
        Ok(chat)
    }

    pub async fn detail_for_owner(&self, id: i64, owner_id: &str) -> Result<ChatDetail> {
        let chat = self.chat_for_owner(id, owner_id).await?;
        let messages = self.store.messages(chat.id).await?;
        Ok(ChatDetail { chat, messages })
    }

    pub async fn delete_chat(&self, id: i64, owner_id: &str) -> Result<()> {
        let chat = self.chat_for_owner(id, owner_id).await?;
        self.store.delete_chat(chat.id).await
    }

    pub async fn messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        self.store.messages(chat_id).await
    }

    pub async fn append_message(
        &self,
        chat_id: i64,
        role: Role,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Message> {
        self.store
            .append_message(chat_id, role, content, image_url)
            .await
    }

    /// Record the caller so their display name is available for reply
    /// personalization. Falls back to the opaque id when no name was sent.
    pub async fn ensure_user(&self, id: &str, display_name: Option<&str>) -> Result<()> {
        let name = display_name.unwrap_or(id);
        self.store.upsert_user(id, name).await
    }
}
