use crate::chat::{Chat, ChatDetail};
use std::collections::HashMap;
use std::sync::Mutex;

/// Cache key schema: `(owner, entity)`. One key per derived view — the
/// owner's chat list, or one chat with its messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner: String,
    pub kind: KeyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    ChatList,
    Chat(i64),
}

impl CacheKey {
    pub fn chat_list(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            kind: KeyKind::ChatList,
        }
    }

    pub fn chat(owner: &str, id: i64) -> Self {
        Self {
            owner: owner.to_string(),
            kind: KeyKind::Chat(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cached {
    ChatList(Vec<Chat>),
    Detail(ChatDetail),
}

/// The last server-confirmed state per key, plus any provisional optimistic
/// entry pushed by an in-flight send. An explicit handle — callers pass it
/// around, there is no ambient global.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<CacheKey, Cached>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Cached> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: CacheKey, value: Cached) {
        self.entries.lock().unwrap().insert(key, value);
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.lock().unwrap().remove(key);
    }
}
