use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chatline_common::types::UserSummary;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{ChannelRecord, MessageQuery, MessageRecord, NewMessage};

/// Users and channels loaded into a fresh in-memory store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<UserSummary>,
    #[serde(default)]
    pub channels: Vec<SeedChannel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedChannel {
    pub id: Uuid,
    pub name: String,
    pub admin_id: Uuid,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

impl SeedData {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse seed file {}", path.display()))
    }
}

/// Process-local store used by tests and by local runs without a database.
/// Enforces the same references the Postgres schema does.
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    users: HashMap<Uuid, UserSummary>,
    channels: HashMap<Uuid, ChannelRecord>,
    messages: Vec<MessageRecord>,
    reader_update_calls: usize,
}

impl MemoryChatStore {
    pub fn from_seed(seed: SeedData) -> Self {
        let mut store = Self::default();
        for user in seed.users {
            store.insert_user(user);
        }
        for channel in seed.channels {
            store.insert_channel(channel);
        }
        store
    }

    pub fn insert_user(&mut self, user: UserSummary) {
        self.users.insert(user.id, user);
    }

    pub fn insert_channel(&mut self, channel: SeedChannel) {
        self.channels.insert(
            channel.id,
            ChannelRecord {
                id: channel.id,
                name: channel.name,
                admin_id: channel.admin_id,
                member_ids: channel.member_ids,
                message_ids: Vec::new(),
            },
        );
    }

    pub fn remove_channel(&mut self, channel_id: Uuid) -> bool {
        self.channels.remove(&channel_id).is_some()
    }

    pub fn remove_member(&mut self, channel_id: Uuid, user_id: Uuid) {
        if let Some(channel) = self.channels.get_mut(&channel_id) {
            channel.member_ids.retain(|member| *member != user_id);
        }
    }

    pub fn add_member(&mut self, channel_id: Uuid, user_id: Uuid) {
        if let Some(channel) = self.channels.get_mut(&channel_id) {
            if !channel.member_ids.contains(&user_id) {
                channel.member_ids.push(user_id);
            }
        }
    }

    pub(super) fn create_message(&mut self, message: NewMessage) -> Result<MessageRecord> {
        if !self.users.contains_key(&message.sender_id) {
            bail!("sender {} does not exist", message.sender_id);
        }
        if let Some(recipient) = message.recipient_id {
            if !self.users.contains_key(&recipient) {
                bail!("recipient {recipient} does not exist");
            }
        }
        if let Some(channel_id) = message.channel_id {
            if !self.channels.contains_key(&channel_id) {
                bail!("channel {channel_id} does not exist");
            }
        }

        let record = MessageRecord {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            channel_id: message.channel_id,
            message_type: message.body.message_type,
            content: message.body.content,
            file_url: message.body.file_url,
            read_by: Vec::new(),
            created_at: Utc::now(),
        };
        self.messages.push(record.clone());
        Ok(record)
    }

    pub(super) fn find_messages(&self, query: &MessageQuery) -> Vec<MessageRecord> {
        self.messages.iter().filter(|record| query.matches(record)).cloned().collect()
    }

    pub(super) fn add_message_reader(&mut self, message_ids: &[Uuid], reader: Uuid) -> u64 {
        self.reader_update_calls += 1;

        let mut changed = 0;
        for record in self.messages.iter_mut().filter(|record| message_ids.contains(&record.id)) {
            if !record.is_read_by(reader) {
                record.read_by.push(reader);
                changed += 1;
            }
        }
        changed
    }

    pub(super) fn find_channel_by_id(&self, channel_id: Uuid) -> Option<ChannelRecord> {
        self.channels.get(&channel_id).cloned()
    }

    pub(super) fn append_channel_message(&mut self, channel_id: Uuid, message_id: Uuid) -> Result<()> {
        let channel = self
            .channels
            .get_mut(&channel_id)
            .with_context(|| format!("channel {channel_id} does not exist"))?;
        if !channel.message_ids.contains(&message_id) {
            channel.message_ids.push(message_id);
        }
        Ok(())
    }

    pub(super) fn find_channels_for_user(&self, user_id: Uuid) -> Vec<ChannelRecord> {
        let mut channels: Vec<ChannelRecord> =
            self.channels.values().filter(|channel| channel.includes(user_id)).cloned().collect();
        channels.sort_by_key(|channel| channel.id);
        channels
    }

    pub(super) fn user_summaries(&self, user_ids: &[Uuid]) -> HashMap<Uuid, UserSummary> {
        user_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|user| (*id, user.clone())))
            .collect()
    }

    pub(super) fn reader_update_calls(&self) -> usize {
        self.reader_update_calls
    }

    pub(super) fn message_count(&self) -> usize {
        self.messages.len()
    }
}
