//! Message repository

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::entities::{Author, Message};
use crate::repository::{HistoryLoader, LoadError, MessageStore};
use threadroom_common::{RepositoryError, Result};

/// Rows per INSERT; five binds per row keeps well under the 65535 bind limit.
const INSERT_CHUNK_ROWS: usize = 1000;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    content: String,
    author_name: String,
    created_at: DateTime<Utc>,
    parent_id: Option<String>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            content: row.content,
            author: Author::new(row.author_name),
            created_at: row.created_at,
            parent_id: row.parent_id,
            reply_count: 0,
        }
    }
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List every stored message, ordered by created_at ASC
    ///
    /// The table has no room column, so this is the history of every room.
    pub async fn list_all(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, content, author_name, created_at, parent_id
            FROM messages
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Find a message by id
    pub async fn find(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, content, author_name, created_at, parent_id
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Message::from))
    }

    /// Insert messages, skipping any id that already exists
    pub async fn insert_if_absent(&self, messages: &[Message]) -> Result<u64> {
        let mut inserted = 0;

        for chunk in messages.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO messages (id, content, author_name, created_at, parent_id) ",
            );
            builder.push_values(chunk, |mut row, msg| {
                row.push_bind(msg.id.clone())
                    .push_bind(msg.content.clone())
                    .push_bind(msg.author.name.clone())
                    .push_bind(msg.created_at)
                    .push_bind(msg.parent_id.clone());
            });
            builder.push(" ON CONFLICT (id) DO NOTHING");

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(db_err) if db_err.constraint().is_some() => {
                        RepositoryError::InvalidData(db_err.message().to_string())
                    }
                    _ => RepositoryError::from(e),
                })?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl HistoryLoader for MessageRepository {
    async fn load(&self, room: &str) -> std::result::Result<Vec<Message>, LoadError> {
        tracing::debug!(room = %room, "Loading message history");
        self.list_all().await.map_err(|source| LoadError {
            room: room.to_string(),
            source,
        })
    }
}

#[async_trait::async_trait]
impl MessageStore for MessageRepository {
    async fn insert_if_absent(&self, messages: &[Message]) -> Result<u64> {
        MessageRepository::insert_if_absent(self, messages).await
    }
}
