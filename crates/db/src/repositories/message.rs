use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};
use uuid::Uuid;

use connecthub_core::domain::message::{
    toggle_tag, Message, MessageFlags, MessageId, MessageReply, MessageReplyId, MessageTag,
};
use connecthub_core::domain::user::UserId;

use super::codec::{encode_timestamp, parse_label, parse_timestamp};
use super::{MessageRepository, RepositoryError};
use crate::DbPool;

const MESSAGE_COLUMNS: &str = "id, owner_id, customer_name, customer_email, subject, message,
    is_read, is_starred, is_archived, created_at, updated_at";

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn insert(&self, message: Message) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO messages (
                id, owner_id, customer_name, customer_email, subject, message,
                is_read, is_starred, is_archived, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.as_str())
        .bind(message.owner_id.as_ref().map(UserId::as_str))
        .bind(&message.customer_name)
        .bind(&message.customer_email)
        .bind(&message.subject)
        .bind(&message.message)
        .bind(message.is_read)
        .bind(message.is_starred)
        .bind(message.is_archived)
        .bind(encode_timestamp(&message.created_at))
        .bind(encode_timestamp(&message.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, format!("message {} already exists", message.id))
        })?;

        for tag in &message.tags {
            insert_tag(&mut tx, &message.id, *tag).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_message(&mut conn, id).await
    }

    async fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE owner_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut messages = rows.into_iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;

        let tag_rows = sqlx::query(
            "SELECT t.message_id AS message_id, t.tag AS tag
             FROM message_tags t
             JOIN messages m ON m.id = t.message_id
             WHERE m.owner_id = ?
             ORDER BY t.created_at ASC, t.rowid ASC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;
        for row in tag_rows {
            let message_id: String = row.try_get("message_id")?;
            let tag = parse_label::<MessageTag>("tag", row.try_get("tag")?)?;
            if let Some(message) = messages.iter_mut().find(|message| message.id.0 == message_id) {
                message.tags.push(tag);
            }
        }

        Ok(messages)
    }

    async fn update_flags(
        &self,
        owner: &UserId,
        id: &MessageId,
        flags: MessageFlags,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut message = load_owned(&mut tx, owner, id).await?;
        if flags.is_empty() {
            return Ok(message);
        }

        flags.apply(&mut message, Utc::now());
        sqlx::query(
            "UPDATE messages
             SET is_read = ?, is_starred = ?, is_archived = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(message.is_read)
        .bind(message.is_starred)
        .bind(message.is_archived)
        .bind(encode_timestamp(&message.updated_at))
        .bind(message.id.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn toggle_tag(
        &self,
        owner: &UserId,
        id: &MessageId,
        tag: MessageTag,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut message = load_owned(&mut tx, owner, id).await?;

        if toggle_tag(&mut message.tags, tag) {
            insert_tag(&mut tx, id, tag).await?;
        } else {
            sqlx::query("DELETE FROM message_tags WHERE message_id = ? AND tag = ?")
                .bind(id.as_str())
                .bind(tag.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(message)
    }

    async fn add_reply(
        &self,
        owner: &UserId,
        id: &MessageId,
        reply_text: &str,
    ) -> Result<(Message, MessageReply), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut message = load_owned(&mut tx, owner, id).await?;
        let now = Utc::now();
        let reply = MessageReply::new(id.clone(), owner.clone(), reply_text, now)?;

        sqlx::query(
            "INSERT INTO message_replies (id, message_id, replied_by, reply_text, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(reply.id.as_str())
        .bind(reply.message_id.as_str())
        .bind(reply.replied_by.as_ref().map(UserId::as_str))
        .bind(&reply.reply_text)
        .bind(encode_timestamp(&reply.created_at))
        .execute(&mut *tx)
        .await?;

        MessageFlags { is_read: Some(true), ..MessageFlags::default() }.apply(&mut message, now);
        sqlx::query("UPDATE messages SET is_read = 1, updated_at = ? WHERE id = ?")
            .bind(encode_timestamp(&message.updated_at))
            .bind(message.id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((message, reply))
    }

    async fn list_replies(&self, id: &MessageId) -> Result<Vec<MessageReply>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, message_id, replied_by, reply_text, created_at
             FROM message_replies
             WHERE message_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(reply_from_row).collect()
    }
}

async fn load_message(
    conn: &mut SqliteConnection,
    id: &MessageId,
) -> Result<Option<Message>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut message = message_from_row(row)?;

    let tag_rows = sqlx::query(
        "SELECT tag FROM message_tags WHERE message_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(id.as_str())
    .fetch_all(&mut *conn)
    .await?;
    message.tags = tag_rows
        .into_iter()
        .map(|row| -> Result<MessageTag, RepositoryError> {
            parse_label("tag", row.try_get("tag")?)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(message))
}

async fn load_owned(
    conn: &mut SqliteConnection,
    owner: &UserId,
    id: &MessageId,
) -> Result<Message, RepositoryError> {
    let message =
        load_message(conn, id).await?.ok_or_else(|| RepositoryError::not_found("message", id))?;
    if !message.is_owned_by(owner) {
        return Err(RepositoryError::Forbidden(format!("message {id} belongs to another inbox")));
    }
    Ok(message)
}

async fn insert_tag(
    conn: &mut SqliteConnection,
    message_id: &MessageId,
    tag: MessageTag,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO message_tags (id, message_id, tag, created_at) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(message_id.as_str())
        .bind(tag.as_str())
        .bind(encode_timestamp(&Utc::now()))
        .execute(&mut *conn)
        .await
        .map_err(|error| {
            RepositoryError::from_write(error, format!("message {message_id} is already tagged {tag}"))
        })?;

    Ok(())
}

fn reply_from_row(row: SqliteRow) -> Result<MessageReply, RepositoryError> {
    Ok(MessageReply {
        id: MessageReplyId(row.try_get("id")?),
        message_id: MessageId(row.try_get("message_id")?),
        replied_by: row.try_get::<Option<String>, _>("replied_by")?.map(UserId),
        reply_text: row.try_get("reply_text")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn message_from_row(row: SqliteRow) -> Result<Message, RepositoryError> {
    Ok(Message {
        id: MessageId(row.try_get("id")?),
        owner_id: row.try_get::<Option<String>, _>("owner_id")?.map(UserId),
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        subject: row.try_get("subject")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        is_starred: row.try_get("is_starred")?,
        is_archived: row.try_get("is_archived")?,
        tags: Vec::new(),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
