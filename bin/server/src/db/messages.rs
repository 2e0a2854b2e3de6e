//! PostgreSQL message store.

use alumnet_core::{MessageId, UserId};
use alumnet_messaging::{MessageRecord, MessageStore, RoomKey, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

/// Row type for message queries.
#[derive(FromRow)]
struct MessageRow {
    id: String,
    sender_id: i64,
    recipient_id: i64,
    body: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn try_into_record(self) -> Result<MessageRecord, StoreError> {
        let id = MessageId::from_str(&self.id).map_err(|e| StoreError::CorruptRecord {
            reason: format!("invalid message id '{}': {}", self.id, e),
        })?;
        let sender_id = decode_user(self.sender_id, "sender_id")?;
        let recipient_id = decode_user(self.recipient_id, "recipient_id")?;
        Ok(MessageRecord {
            id,
            sender_id,
            recipient_id,
            body: self.body,
            created_at: self.created_at,
        })
    }
}

fn decode_user(value: i64, column: &str) -> Result<UserId, StoreError> {
    UserId::new(value).map_err(|e| StoreError::CorruptRecord {
        reason: format!("invalid {column} {value}: {e}"),
    })
}

fn is_unreachable(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

fn write_error(e: sqlx::Error) -> StoreError {
    if is_unreachable(&e) {
        StoreError::Unavailable {
            reason: e.to_string(),
        }
    } else {
        StoreError::WriteFailed {
            reason: e.to_string(),
        }
    }
}

fn read_error(e: sqlx::Error) -> StoreError {
    if is_unreachable(&e) {
        StoreError::Unavailable {
            reason: e.to_string(),
        }
    } else {
        StoreError::ReadFailed {
            reason: e.to_string(),
        }
    }
}

fn into_records(rows: Vec<MessageRow>) -> Result<Vec<MessageRecord>, StoreError> {
    rows.into_iter().map(MessageRow::try_into_record).collect()
}

/// Message store backed by the `messages` table.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to PostgreSQL and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached
    /// or the schema cannot be migrated.
    #[instrument(skip(url))]
    pub async fn connect(url: &str, max_connections: u32) -> alumnet_core::Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("failed to connect: {e}"),
            })?;

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("failed to run migrations: {e}"),
            })?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(skip(self, body), fields(sender = %sender_id, recipient = %recipient_id))]
    async fn insert_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        body: &str,
    ) -> Result<MessageRecord, StoreError> {
        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender_id, recipient_id, body, created_at
            "#,
        )
        .bind(MessageId::new().to_string())
        .bind(sender_id.get())
        .bind(recipient_id.get())
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;

        row.try_into_record()
    }

    #[instrument(skip(self), fields(room = %room))]
    async fn list_messages(&self, room: &RoomKey) -> Result<Vec<MessageRecord>, StoreError> {
        let Some(recipient_id) = room.user() else {
            return Ok(Vec::new());
        };

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, recipient_id, body, created_at
            FROM messages
            WHERE recipient_id = $1
            ORDER BY seq
            "#,
        )
        .bind(recipient_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        into_records(rows)
    }

    #[instrument(skip(self))]
    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, recipient_id, body, created_at
            FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY seq
            "#,
        )
        .bind(a.get())
        .bind(b.get())
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        into_records(rows)
    }
}
