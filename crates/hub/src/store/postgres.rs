use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chatline_common::types::{MessageType, UserSummary};
use sqlx::{
    types::chrono::{DateTime, Utc},
    FromRow, PgPool,
};
use uuid::Uuid;

use super::{ChannelRecord, MessageQuery, MessageRecord, MessageScope, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, channel_id, message_type, content, file_url, read_by, created_at";

const CHANNEL_SELECT: &str = r#"
    SELECT
        c.id,
        c.name,
        c.admin_id,
        COALESCE(
            (SELECT array_agg(cm.user_id) FROM channel_members cm WHERE cm.channel_id = c.id),
            '{}'::uuid[]
        ) AS member_ids,
        COALESCE(
            (SELECT array_agg(m.message_id ORDER BY m.position)
               FROM channel_messages m WHERE m.channel_id = c.id),
            '{}'::uuid[]
        ) AS message_ids
    FROM channels c
"#;

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Option<Uuid>,
    channel_id: Option<Uuid>,
    message_type: String,
    content: Option<String>,
    file_url: Option<String>,
    read_by: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let message_type = MessageType::from_db_value(&row.message_type)
            .ok_or_else(|| anyhow!("message {} has unknown type '{}'", row.id, row.message_type))?;

        Ok(Self {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            channel_id: row.channel_id,
            message_type,
            content: row.content,
            file_url: row.file_url,
            read_by: row.read_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChannelRow {
    id: Uuid,
    name: String,
    admin_id: Uuid,
    member_ids: Vec<Uuid>,
    message_ids: Vec<Uuid>,
}

impl From<ChannelRow> for ChannelRecord {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            admin_id: row.admin_id,
            member_ids: row.member_ids,
            message_ids: row.message_ids,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    image: Option<String>,
    color: Option<i32>,
}

pub(super) async fn create_message(pool: &PgPool, message: NewMessage) -> Result<MessageRecord> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        r#"
        INSERT INTO messages (id, sender_id, recipient_id, channel_id, message_type, content, file_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(message.sender_id)
    .bind(message.recipient_id)
    .bind(message.channel_id)
    .bind(message.body.message_type.as_str())
    .bind(message.body.content)
    .bind(message.body.file_url)
    .fetch_one(pool)
    .await
    .context("failed to insert message")?;

    row.try_into()
}

pub(super) async fn find_messages(pool: &PgPool, query: &MessageQuery) -> Result<Vec<MessageRecord>> {
    let rows = match &query.scope {
        MessageScope::Ids(ids) => {
            sqlx::query_as::<_, MessageRow>(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS}
                FROM messages
                WHERE id = ANY($1)
                  AND ($2::uuid IS NULL OR NOT ($2 = ANY(read_by)))
                ORDER BY created_at, id
                "#
            ))
            .bind(ids)
            .bind(query.unread_by)
            .fetch_all(pool)
            .await
        }
        MessageScope::Direct { a, b } => {
            sqlx::query_as::<_, MessageRow>(&format!(
                r#"
                SELECT {MESSAGE_COLUMNS}
                FROM messages
                WHERE ((sender_id = $1 AND recipient_id = $2)
                    OR (sender_id = $2 AND recipient_id = $1))
                  AND ($3::uuid IS NULL OR NOT ($3 = ANY(read_by)))
                ORDER BY created_at, id
                "#
            ))
            .bind(a)
            .bind(b)
            .bind(query.unread_by)
            .fetch_all(pool)
            .await
        }
    }
    .context("failed to query messages")?;

    rows.into_iter().map(MessageRecord::try_from).collect()
}

/// Single conditional update so concurrent readers of the same message
/// never overwrite each other's entry.
pub(super) async fn add_message_reader(
    pool: &PgPool,
    message_ids: &[Uuid],
    reader: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET read_by = array_append(read_by, $2)
        WHERE id = ANY($1)
          AND NOT ($2 = ANY(read_by))
        "#,
    )
    .bind(message_ids)
    .bind(reader)
    .execute(pool)
    .await
    .context("failed to record message readers")?;

    Ok(result.rows_affected())
}

pub(super) async fn find_channel_by_id(
    pool: &PgPool,
    channel_id: Uuid,
) -> Result<Option<ChannelRecord>> {
    let row = sqlx::query_as::<_, ChannelRow>(&format!("{CHANNEL_SELECT} WHERE c.id = $1"))
        .bind(channel_id)
        .fetch_optional(pool)
        .await
        .context("failed to load channel")?;

    Ok(row.map(ChannelRecord::from))
}

pub(super) async fn append_channel_message(
    pool: &PgPool,
    channel_id: Uuid,
    message_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO channel_messages (channel_id, message_id)
        VALUES ($1, $2)
        ON CONFLICT (channel_id, message_id) DO NOTHING
        "#,
    )
    .bind(channel_id)
    .bind(message_id)
    .execute(pool)
    .await
    .context("failed to append message to channel")?;

    Ok(())
}

pub(super) async fn find_channels_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<ChannelRecord>> {
    let rows = sqlx::query_as::<_, ChannelRow>(&format!(
        r#"
        {CHANNEL_SELECT}
        WHERE c.admin_id = $1
           OR EXISTS (
                SELECT 1 FROM channel_members cm
                WHERE cm.channel_id = c.id AND cm.user_id = $1
           )
        ORDER BY c.id
        "#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to load channels for user")?;

    Ok(rows.into_iter().map(ChannelRecord::from).collect())
}

pub(super) async fn user_summaries(
    pool: &PgPool,
    user_ids: &[Uuid],
) -> Result<HashMap<Uuid, UserSummary>> {
    let rows = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, email, first_name, last_name, image, color
        FROM users
        WHERE id = ANY($1)
        "#,
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await
    .context("failed to load user summaries")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.id,
                UserSummary {
                    id: row.id,
                    email: row.email,
                    first_name: row.first_name,
                    last_name: row.last_name,
                    image: row.image,
                    color: row.color,
                },
            )
        })
        .collect())
}
