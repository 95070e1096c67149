use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::data::account::AccountResponse;
use crate::data::chat::MessageType;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::util::serde_helpers::{lenient_bool, timestamp};

pub mod db;

pub static ROOM_COLLECTION_NAME: &str = "customer_support_rooms";
pub static SUPPORT_MESSAGE_COLLECTION_NAME: &str = "customer_support_chats";

/// Support conversation between one student or tutor and the back office.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SupportRoom {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub user_type: Role,
    #[serde(default)]
    pub admin_id: Option<String>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl SupportRoom {
    pub fn new(user_id: impl ToString, user_type: Role, now: DateTime<Utc>) -> SupportRoom {
        SupportRoom {
            id: String::new(),
            user_id: user_id.to_string(),
            user_type,
            admin_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SupportMessage {
    #[serde(default)]
    pub id: String,
    pub room_id: String,
    #[serde(default)]
    pub sender_id: String,
    pub user_type: Role,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default, with = "lenient_bool")]
    pub seen: bool,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl SupportMessage {
    pub fn new(
        room_id: impl ToString,
        sender_id: impl ToString,
        user_type: Role,
        message: impl ToString,
        message_type: MessageType,
        now: DateTime<Utc>,
    ) -> SupportMessage {
        SupportMessage {
            id: String::new(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            user_type,
            message: message.to_string(),
            message_type,
            seen: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Room with the related data the dashboard renders next to it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: SupportRoom,
    #[serde(rename = "latestMessage")]
    pub latest_message: Option<SupportMessage>,
    #[serde(rename = "unreadCount", skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<AccountResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutor: Option<AccountResponse>,
    /// Oldest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<SupportMessage>>,
}

impl From<SupportRoom> for RoomView {
    fn from(room: SupportRoom) -> Self {
        RoomView {
            room,
            latest_message: None,
            unread_count: None,
            student: None,
            tutor: None,
            messages: None,
        }
    }
}

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn room_not_found(id: impl ToString) -> Problem {
        problems::not_found("Room not found")
            .insert_str("room_id", id)
            .clone()
    }

    #[inline]
    pub fn message_not_found(id: impl ToString) -> Problem {
        problems::not_found("Message not found")
            .insert_str("message_id", id)
            .clone()
    }

    #[inline]
    pub fn invalid_user_type() -> Problem {
        problems::bad_request("User type must be student or tutor")
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|it| !it.is_empty())
}

fn parse_sender(value: &str) -> Result<Role, Problem> {
    value
        .parse()
        .map_err(|_| problems::bad_request("Invalid user type"))
}

fn parse_message_type(value: Option<&str>) -> Result<MessageType, Problem> {
    match value {
        Some(it) => it
            .parse()
            .map_err(|_| problems::bad_request("Invalid message type")),
        None => Ok(MessageType::Text),
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SupportMessageData {
    pub sender_id: Option<String>,
    pub user_type: Option<String>,
    pub room_id: Option<String>,
    pub message: Option<String>,
    /// Defaults to `text`.
    pub message_type: Option<String>,
    /// Stored as the content of non-text messages.
    pub url: Option<String>,
}

/// Validated [`SupportMessageData`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub user_type: Role,
    pub room_id: String,
    pub content: String,
    pub message_type: MessageType,
}

impl SupportMessageData {
    pub fn validate(&self) -> Result<OutgoingMessage, Problem> {
        let (sender_id, user_type, room_id, message) = match (
            present(&self.sender_id),
            present(&self.user_type),
            present(&self.room_id),
            present(&self.message),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Err(problems::missing_fields()),
        };

        let user_type = parse_sender(user_type)?;
        let message_type = parse_message_type(present(&self.message_type))?;
        let content = if message_type.is_text() {
            message
        } else {
            present(&self.url).unwrap_or(message)
        };

        Ok(OutgoingMessage {
            sender_id: sender_id.to_string(),
            user_type,
            room_id: room_id.to_string(),
            content: content.to_string(),
            message_type,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SupportEditData {
    pub message: Option<String>,
    pub room_id: Option<String>,
    pub user_type: Option<String>,
    pub message_type: Option<String>,
}

/// Validated [`SupportEditData`].
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEdit {
    pub message: String,
    pub room_id: String,
    pub user_type: Role,
    pub message_type: MessageType,
}

impl SupportEditData {
    pub fn validate(&self) -> Result<MessageEdit, Problem> {
        let (message, room_id, user_type) = match (
            present(&self.message),
            present(&self.room_id),
            present(&self.user_type),
        ) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return Err(problems::missing_fields()),
        };

        Ok(MessageEdit {
            message: message.to_string(),
            room_id: room_id.to_string(),
            user_type: parse_sender(user_type)?,
            message_type: parse_message_type(present(&self.message_type))?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct JoinRoomData {
    pub room_id: Option<String>,
    pub admin_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ChatbotData {
    pub message: Option<String>,
    pub room_id: Option<String>,
    pub sender_id: Option<String>,
    pub user_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatbotPrompt {
    pub message: String,
    pub room_id: String,
    pub sender_id: String,
}

impl ChatbotData {
    pub fn validate(&self) -> Result<ChatbotPrompt, Problem> {
        match (
            present(&self.message),
            present(&self.room_id),
            present(&self.sender_id),
            present(&self.user_type),
        ) {
            (Some(_), Some(room_id), Some(sender_id), Some(_)) => Ok(ChatbotPrompt {
                // Forwarded verbatim.
                message: self.message.clone().unwrap_or_default(),
                room_id: room_id.to_string(),
                sender_id: sender_id.to_string(),
            }),
            _ => Err(problems::missing_fields()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;

    fn outgoing() -> SupportMessageData {
        SupportMessageData {
            sender_id: Some("s1".to_string()),
            user_type: Some("student".to_string()),
            room_id: Some("room".to_string()),
            message: Some("help".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn non_text_messages_carry_the_url() {
        let message = SupportMessageData {
            message_type: Some("image".to_string()),
            url: Some("https://cdn/x.png".to_string()),
            ..outgoing()
        }
        .validate()
        .unwrap();
        assert_eq!(message.content, "https://cdn/x.png");
        assert_eq!(message.message_type, MessageType::Image);

        let message = outgoing().validate().unwrap();
        assert_eq!(message.content, "help");
        assert_eq!(message.message_type, MessageType::Text);
        assert_eq!(message.user_type, Role::Student);
    }

    #[test]
    fn incomplete_or_invalid_messages_are_rejected() {
        let problem = SupportMessageData {
            room_id: None,
            ..outgoing()
        }
        .validate()
        .unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);

        let problem = SupportMessageData {
            message_type: Some("sticker".to_string()),
            ..outgoing()
        }
        .validate()
        .unwrap_err();
        assert_eq!(problem.title, "Invalid message type");

        let problem = SupportMessageData {
            user_type: Some("parent".to_string()),
            ..outgoing()
        }
        .validate()
        .unwrap_err();
        assert_eq!(problem.title, "Invalid user type");
    }

    #[test]
    fn room_view_flattens_room_fields() {
        let room = SupportRoom::new("s1", Role::Student, Utc::now());
        let json = serde_json::to_value(RoomView::from(room)).unwrap();
        assert_eq!(json["user_id"], "s1");
        assert_eq!(json["user_type"], "student");
        assert!(json["latestMessage"].is_null());
        assert!(json.get("messages").is_none());
    }
}
