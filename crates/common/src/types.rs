// Core domain types shared across all chatline crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display attributes of a user, embedded wherever a message references one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<i32>,
}

impl UserSummary {
    /// Stand-in for a user whose profile could not be found.
    pub fn unknown(id: Uuid) -> Self {
        Self { id, email: String::new(), first_name: None, last_name: None, image: None, color: None }
    }

    /// Full name when the profile has one, otherwise the email address.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            self.email.clone()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    File,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// A persisted message with every user reference expanded to display attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub sender: UserSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<UserSummary>,
}

/// A conversation as seen from one participant.
///
/// A direct conversation is identified by the *other* participant, so the same
/// thread has a different identity for each side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Conversation {
    Direct(Uuid),
    Channel(Uuid),
}

impl Conversation {
    pub const fn id(self) -> Uuid {
        match self {
            Self::Direct(id) | Self::Channel(id) => id,
        }
    }

    pub const fn is_channel(self) -> bool {
        matches!(self, Self::Channel(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(first: Option<&str>, last: Option<&str>) -> UserSummary {
        UserSummary {
            id: Uuid::nil(),
            email: "ada@example.test".into(),
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
            image: None,
            color: None,
        }
    }

    #[test]
    fn display_name_joins_first_and_last() {
        assert_eq!(summary(Some("Ada"), Some("Lovelace")).display_name(), "Ada Lovelace");
    }

    #[test]
    fn display_name_uses_whichever_part_is_present() {
        assert_eq!(summary(None, Some("Lovelace")).display_name(), "Lovelace");
        assert_eq!(summary(Some("Ada"), Some("  ")).display_name(), "Ada");
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(summary(None, None).display_name(), "ada@example.test");
    }

    #[test]
    fn message_type_db_values() {
        assert_eq!(MessageType::from_db_value("text"), Some(MessageType::Text));
        assert_eq!(MessageType::from_db_value(MessageType::File.as_str()), Some(MessageType::File));
        assert_eq!(MessageType::from_db_value("audio"), None);
    }

    #[test]
    fn message_view_omits_absent_optional_fields() {
        let view = MessageView {
            id: Uuid::nil(),
            sender: summary(Some("Ada"), None),
            recipient: None,
            channel_id: None,
            content: Some("hi".into()),
            message_type: MessageType::Text,
            file_url: None,
            timestamp: Utc::now(),
            read_by: Vec::new(),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("recipient").is_none());
        assert!(json.get("channelId").is_none());
        assert!(json.get("fileUrl").is_none());
        assert_eq!(json["messageType"], "text");
        assert_eq!(json["readBy"], serde_json::json!([]));
        assert!(json["sender"].get("lastName").is_none());
    }

    #[test]
    fn conversation_accessors() {
        let id = Uuid::new_v4();
        assert_eq!(Conversation::Direct(id).id(), id);
        assert!(Conversation::Channel(id).is_channel());
        assert!(!Conversation::Direct(id).is_channel());
    }
}
