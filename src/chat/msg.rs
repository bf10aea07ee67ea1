use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db, identity::Role};

/// One line of a request's transcript. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub request_id: Uuid,
    pub sender_role: Role,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct ChatMessageRow {
    id: String,
    request_id: String,
    sender_role: String,
    sender_name: String,
    text: String,
    timestamp: i64,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = sqlx::Error;

    fn try_from(row: ChatMessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: db::parse_id(&row.id)?,
            request_id: db::parse_id(&row.request_id)?,
            sender_role: db::parse_column(&row.sender_role)?,
            sender_name: row.sender_name,
            text: row.text,
            timestamp: db::from_millis(row.timestamp)?,
        })
    }
}

pub(crate) async fn append(db_pool: &SqlitePool, message: &ChatMessage) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO chat_messages (id,request_id,sender_role,sender_name,text,timestamp) \
         VALUES (?,?,?,?,?,?)",
    )
        .bind(message.id.to_string())
        .bind(message.request_id.to_string())
        .bind(message.sender_role.as_str())
        .bind(&message.sender_name)
        .bind(&message.text)
        .bind(db::to_millis(message.timestamp))
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Oldest first; equal timestamps keep insertion order.
pub(crate) async fn history(
    db_pool: &SqlitePool,
    request_id: Uuid,
) -> Result<Vec<ChatMessage>, sqlx::Error> {
    sqlx::query_as::<_, ChatMessageRow>(
        "SELECT id,request_id,sender_role,sender_name,text,timestamp FROM chat_messages \
         WHERE request_id=? ORDER BY timestamp ASC, rowid ASC",
    )
    .bind(request_id.to_string())
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(ChatMessage::try_from)
    .collect()
}
