// Narrow storage interface the realtime core reads and writes through.
//
// The document store itself (schema ownership, CRUD validation, search) lives
// elsewhere; this module only exposes what fan-out and read receipts need.

mod memory;
mod postgres;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chatline_common::protocol::events::MessageBody;
use chatline_common::types::{MessageType, MessageView, UserSummary};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

pub use memory::{MemoryChatStore, SeedChannel, SeedData};

#[derive(Clone)]
pub enum ChatStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<MemoryChatStore>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub read_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.contains(&user_id)
    }

    fn referenced_users(&self) -> impl Iterator<Item = Uuid> + '_ {
        std::iter::once(self.sender_id).chain(self.recipient_id).chain(self.read_by.iter().copied())
    }

    fn into_view(self, users: &HashMap<Uuid, UserSummary>) -> MessageView {
        let summary = |id: Uuid| users.get(&id).cloned().unwrap_or_else(|| UserSummary::unknown(id));

        MessageView {
            id: self.id,
            sender: summary(self.sender_id),
            recipient: self.recipient_id.map(summary),
            channel_id: self.channel_id,
            content: self.content,
            message_type: self.message_type,
            file_url: self.file_url,
            timestamp: self.created_at,
            read_by: self.read_by.into_iter().map(summary).collect(),
        }
    }
}

/// Fields for a message about to be persisted. Exactly one of
/// `recipient_id` / `channel_id` is set.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub channel_id: Option<Uuid>,
    pub body: MessageBody,
}

impl NewMessage {
    pub fn direct(sender_id: Uuid, recipient_id: Uuid, body: MessageBody) -> Self {
        Self { sender_id, recipient_id: Some(recipient_id), channel_id: None, body }
    }

    pub fn channel(sender_id: Uuid, channel_id: Uuid, body: MessageBody) -> Self {
        Self { sender_id, recipient_id: None, channel_id: Some(channel_id), body }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: Uuid,
    pub name: String,
    pub admin_id: Uuid,
    pub member_ids: Vec<Uuid>,
    /// Message identities in append order.
    pub message_ids: Vec<Uuid>,
}

impl ChannelRecord {
    /// Members plus the admin, each listed once.
    pub fn participants(&self) -> BTreeSet<Uuid> {
        self.member_ids.iter().copied().chain(std::iter::once(self.admin_id)).collect()
    }

    pub fn includes(&self, user_id: Uuid) -> bool {
        self.admin_id == user_id || self.member_ids.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    Ids(Vec<Uuid>),
    /// Both directions of a two-party thread.
    Direct { a: Uuid, b: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub scope: MessageScope,
    pub unread_by: Option<Uuid>,
}

impl MessageQuery {
    pub fn ids(ids: Vec<Uuid>) -> Self {
        Self { scope: MessageScope::Ids(ids), unread_by: None }
    }

    pub fn direct_between(a: Uuid, b: Uuid) -> Self {
        Self { scope: MessageScope::Direct { a, b }, unread_by: None }
    }

    pub fn unread_by(mut self, reader: Uuid) -> Self {
        self.unread_by = Some(reader);
        self
    }

    fn matches(&self, record: &MessageRecord) -> bool {
        let in_scope = match &self.scope {
            MessageScope::Ids(ids) => ids.contains(&record.id),
            MessageScope::Direct { a, b } => {
                (record.sender_id == *a && record.recipient_id == Some(*b))
                    || (record.sender_id == *b && record.recipient_id == Some(*a))
            }
        };

        in_scope && self.unread_by.is_none_or(|reader| !record.is_read_by(reader))
    }
}

impl ChatStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryChatStore::default())))
    }

    pub fn memory_with_seed(seed: SeedData) -> Self {
        Self::Memory(Arc::new(RwLock::new(MemoryChatStore::from_seed(seed))))
    }

    pub async fn create_message(&self, message: NewMessage) -> Result<MessageRecord> {
        match self {
            Self::Postgres(pool) => postgres::create_message(pool, message).await,
            Self::Memory(store) => store.write().await.create_message(message),
        }
    }

    pub async fn find_messages_by_ids(&self, ids: &[Uuid]) -> Result<Vec<MessageRecord>> {
        self.find_messages(&MessageQuery::ids(ids.to_vec())).await
    }

    /// Matching messages, oldest first.
    pub async fn find_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>> {
        if matches!(&query.scope, MessageScope::Ids(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        match self {
            Self::Postgres(pool) => postgres::find_messages(pool, query).await,
            Self::Memory(store) => Ok(store.read().await.find_messages(query)),
        }
    }

    /// Adds `reader` to the read set of each message. Messages that already
    /// list the reader are left untouched. Returns the number of messages changed.
    pub async fn add_message_reader(&self, message_ids: &[Uuid], reader: Uuid) -> Result<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        match self {
            Self::Postgres(pool) => postgres::add_message_reader(pool, message_ids, reader).await,
            Self::Memory(store) => Ok(store.write().await.add_message_reader(message_ids, reader)),
        }
    }

    pub async fn find_channel_by_id(&self, channel_id: Uuid) -> Result<Option<ChannelRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_channel_by_id(pool, channel_id).await,
            Self::Memory(store) => Ok(store.read().await.find_channel_by_id(channel_id)),
        }
    }

    pub async fn append_channel_message(&self, channel_id: Uuid, message_id: Uuid) -> Result<()> {
        match self {
            Self::Postgres(pool) => {
                postgres::append_channel_message(pool, channel_id, message_id).await
            }
            Self::Memory(store) => store.write().await.append_channel_message(channel_id, message_id),
        }
    }

    /// Channels where the user is a member or the admin.
    pub async fn find_channels_for_user(&self, user_id: Uuid) -> Result<Vec<ChannelRecord>> {
        match self {
            Self::Postgres(pool) => postgres::find_channels_for_user(pool, user_id).await,
            Self::Memory(store) => Ok(store.read().await.find_channels_for_user(user_id)),
        }
    }

    pub async fn user_summaries(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserSummary>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        match self {
            Self::Postgres(pool) => postgres::user_summaries(pool, user_ids).await,
            Self::Memory(store) => Ok(store.read().await.user_summaries(user_ids)),
        }
    }

    pub async fn user_summary(&self, user_id: Uuid) -> Result<Option<UserSummary>> {
        Ok(self.user_summaries(&[user_id]).await?.remove(&user_id))
    }

    /// Expands sender, recipient and readers to display attributes.
    pub async fn populate(&self, records: Vec<MessageRecord>) -> Result<Vec<MessageView>> {
        let user_ids: Vec<Uuid> = records
            .iter()
            .flat_map(MessageRecord::referenced_users)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users = self.user_summaries(&user_ids).await?;

        Ok(records.into_iter().map(|record| record.into_view(&users)).collect())
    }

    #[cfg(test)]
    pub(crate) async fn reader_update_calls(&self) -> usize {
        match self {
            Self::Postgres(_) => 0,
            Self::Memory(store) => store.read().await.reader_update_calls(),
        }
    }

    #[cfg(test)]
    pub(crate) async fn message_count(&self) -> usize {
        match self {
            Self::Postgres(_) => 0,
            Self::Memory(store) => store.read().await.message_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> MessageBody {
        MessageBody {
            content: Some(content.to_string()),
            message_type: MessageType::Text,
            file_url: None,
        }
    }

    fn user(id: Uuid, first_name: &str) -> UserSummary {
        UserSummary {
            id,
            email: format!("{first_name}@example.test").to_lowercase(),
            first_name: Some(first_name.to_string()),
            last_name: None,
            image: None,
            color: Some(1),
        }
    }

    fn seeded() -> (ChatStore, Uuid, Uuid, Uuid) {
        let ada = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let store = ChatStore::memory_with_seed(SeedData {
            users: vec![user(ada, "Ada"), user(bob, "Bob"), user(carol, "Carol")],
            channels: Vec::new(),
        });
        (store, ada, bob, carol)
    }

    #[tokio::test]
    async fn direct_query_matches_both_directions_only() {
        let (store, ada, bob, carol) = seeded();
        let to_bob = store.create_message(NewMessage::direct(ada, bob, text("hi"))).await.unwrap();
        let to_ada =
            store.create_message(NewMessage::direct(bob, ada, text("hello"))).await.unwrap();
        store.create_message(NewMessage::direct(ada, carol, text("other"))).await.unwrap();

        let thread = store.find_messages(&MessageQuery::direct_between(bob, ada)).await.unwrap();
        let ids: Vec<Uuid> = thread.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![to_bob.id, to_ada.id]);
    }

    #[tokio::test]
    async fn unread_filter_excludes_messages_already_read() {
        let (store, ada, bob, _) = seeded();
        let first = store.create_message(NewMessage::direct(ada, bob, text("1"))).await.unwrap();
        let second = store.create_message(NewMessage::direct(ada, bob, text("2"))).await.unwrap();
        store.add_message_reader(&[first.id], bob).await.unwrap();

        let unread = store
            .find_messages(&MessageQuery::direct_between(ada, bob).unread_by(bob))
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, second.id);
    }

    #[tokio::test]
    async fn add_reader_is_a_set_insert() {
        let (store, ada, bob, carol) = seeded();
        let message = store.create_message(NewMessage::direct(ada, bob, text("x"))).await.unwrap();

        assert_eq!(store.add_message_reader(&[message.id], bob).await.unwrap(), 1);
        assert_eq!(store.add_message_reader(&[message.id], bob).await.unwrap(), 0);
        assert_eq!(store.add_message_reader(&[message.id], carol).await.unwrap(), 1);

        let stored = store.find_messages_by_ids(&[message.id]).await.unwrap();
        assert_eq!(stored[0].read_by, vec![bob, carol]);
    }

    #[tokio::test]
    async fn concurrent_readers_are_both_recorded() {
        let (store, ada, bob, carol) = seeded();
        let message = store.create_message(NewMessage::direct(ada, bob, text("x"))).await.unwrap();

        let ids = [message.id];
        let (left, right) = tokio::join!(
            store.add_message_reader(&ids, bob),
            store.add_message_reader(&ids, carol),
        );
        assert_eq!(left.unwrap() + right.unwrap(), 2);

        let stored = store.find_messages_by_ids(&[message.id]).await.unwrap();
        assert!(stored[0].is_read_by(bob));
        assert!(stored[0].is_read_by(carol));
    }

    #[tokio::test]
    async fn populate_expands_every_user_reference() {
        let (store, ada, bob, _) = seeded();
        let message = store.create_message(NewMessage::direct(ada, bob, text("x"))).await.unwrap();
        store.add_message_reader(&[message.id], bob).await.unwrap();
        let records = store.find_messages_by_ids(&[message.id]).await.unwrap();

        let views = store.populate(records).await.unwrap();
        assert_eq!(views[0].sender.first_name.as_deref(), Some("Ada"));
        assert_eq!(views[0].recipient.as_ref().map(|r| r.id), Some(bob));
        assert_eq!(views[0].read_by.len(), 1);
        assert_eq!(views[0].read_by[0].first_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn empty_id_lists_skip_the_backend() {
        let store = ChatStore::memory();
        assert!(store.find_messages_by_ids(&[]).await.unwrap().is_empty());
        assert_eq!(store.add_message_reader(&[], Uuid::new_v4()).await.unwrap(), 0);
        assert!(store.user_summaries(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn channel_participants_deduplicate_admin() {
        let admin = Uuid::new_v4();
        let member = Uuid::new_v4();
        let channel = ChannelRecord {
            id: Uuid::new_v4(),
            name: "general".into(),
            admin_id: admin,
            member_ids: vec![admin, member],
            message_ids: Vec::new(),
        };

        assert_eq!(channel.participants().len(), 2);
        assert!(channel.includes(admin));
        assert!(channel.includes(member));
        assert!(!channel.includes(Uuid::new_v4()));
    }
}
