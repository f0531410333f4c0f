use crate::chat::{Chat, Message, Role, User};
use crate::error::{Error, Result};
use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a new Store instance.
    /// This will automatically create the database file if it doesn't exist.
    pub async fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .log_statements(tracing::log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// In-memory database for tests. A single connection, since every
    /// `:memory:` connection is its own database.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema.
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chats_owner_created ON chats(owner_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                image_url TEXT,
                created_at DATETIME NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat_created ON messages(chat_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Save or update a user from request identity.
    pub async fn upsert_user(&self, id: &str, display_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name)
            VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name
            "#,
        )
        .bind(id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, display_name, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn create_chat(&self, owner_id: &str, title: &str) -> Result<Chat> {
        let chat = sqlx::query_as::<_, Chat>(
            r#"
            INSERT INTO chats (title, owner_id, created_at)
            VALUES (?, ?, ?)
            RETURNING id, title, owner_id, created_at
            "#,
        )
        .bind(title)
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(chat)
    }

    pub async fn get_chat(&self, id: i64) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(
            "SELECT id, title, owner_id, created_at FROM chats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    /// Chats owned by the given user, newest first.
    pub async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            r#"
            SELECT id, title, owner_id, created_at
            FROM chats
            WHERE owner_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    /// Remove a chat and all of its messages in one transaction.
    /// A chat must never survive partially deleted.
    pub async fn delete_chat(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE chat_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Message history for a chat, chronological order, insertion id as
    /// tiebreak for equal timestamps.
    pub async fn messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, chat_id, role, content, image_url, created_at
            FROM messages
            WHERE chat_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Append a message to an existing chat. Fails with `NotFound` when the
    /// chat id does not resolve; the existence check and the insert share a
    /// transaction so a concurrent chat deletion cannot orphan the row.
    pub async fn append_message(
        &self,
        chat_id: i64,
        role: Role,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (chat_id, role, content, image_url, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, chat_id, role, content, image_url, created_at
            "#,
        )
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .bind(image_url)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }
}
