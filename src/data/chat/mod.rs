use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::util::serde_helpers::{lenient_bool, timestamp, timestamp_opt};

pub mod db;

pub static CHAT_COLLECTION_NAME: &str = "request_chats";
/// Messages of every request chat, keyed by `chat_id`.
pub static MESSAGE_COLLECTION_NAME: &str = "messages";

pub static ADMIN_SENDER: &str = "admin";

pub static DEFAULT_MESSAGE_LIMIT: i64 = 10;
pub static MAX_MESSAGE_LIMIT: i64 = 50;

/// Kind of chat message. Includes the system events the marketplace posts
/// into request chats. Parsed case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String", rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Voice,
    Image,
    File,
    RequestCreated,
    BidInvite,
    BidInviteRejected,
    TutorBid,
    TutorEditBid,
    StudentReject,
    RequestTaken,
    StudentChangeMind,
    StudentAccept,
    StudentPaid,
    StudentOngoing,
    TutorComplete,
    StudentAcceptComplete,
    StudentRejectComplete,
    StudentCancelRequest,
    TutorDeclineAccepted,
    ZoomCreated,
    ZoomReady,
}

impl MessageType {
    pub const ALL: [MessageType; 22] = [
        MessageType::Text,
        MessageType::Voice,
        MessageType::Image,
        MessageType::File,
        MessageType::RequestCreated,
        MessageType::BidInvite,
        MessageType::BidInviteRejected,
        MessageType::TutorBid,
        MessageType::TutorEditBid,
        MessageType::StudentReject,
        MessageType::RequestTaken,
        MessageType::StudentChangeMind,
        MessageType::StudentAccept,
        MessageType::StudentPaid,
        MessageType::StudentOngoing,
        MessageType::TutorComplete,
        MessageType::StudentAcceptComplete,
        MessageType::StudentRejectComplete,
        MessageType::StudentCancelRequest,
        MessageType::TutorDeclineAccepted,
        MessageType::ZoomCreated,
        MessageType::ZoomReady,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Voice => "voice",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::RequestCreated => "requestcreated",
            MessageType::BidInvite => "bidinvite",
            MessageType::BidInviteRejected => "bidinviterejected",
            MessageType::TutorBid => "tutorbid",
            MessageType::TutorEditBid => "tutoreditbid",
            MessageType::StudentReject => "studentreject",
            MessageType::RequestTaken => "requesttaken",
            MessageType::StudentChangeMind => "studentchangemind",
            MessageType::StudentAccept => "studentaccept",
            MessageType::StudentPaid => "studentpaid",
            MessageType::StudentOngoing => "studentongoing",
            MessageType::TutorComplete => "tutorcomplete",
            MessageType::StudentAcceptComplete => "studentacceptcomplete",
            MessageType::StudentRejectComplete => "studentrejectcomplete",
            MessageType::StudentCancelRequest => "studentcancelrequest",
            MessageType::TutorDeclineAccepted => "tutordeclineaccepted",
            MessageType::ZoomCreated => "zoomcreated",
            MessageType::ZoomReady => "zoomready",
        }
    }

    pub fn is_text(self) -> bool {
        self == MessageType::Text
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        MessageType::ALL
            .into_iter()
            .find(|it| it.as_str() == wanted)
            .ok_or_else(|| format!("invalid message type '{}'", s))
    }
}

impl TryFrom<String> for MessageType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation between the student and one tutor about a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Chat {
    #[serde(default)]
    pub id: String,
    pub request_id: String,
    #[serde(default)]
    pub tutor_id: String,
    #[serde(default)]
    pub student_id: String,
    pub last_message: Option<String>,
    pub last_message_type: Option<String>,
    #[serde(default, with = "timestamp_opt")]
    #[schema(value_type = Option<String>)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(
        request_id: impl ToString,
        student_id: impl ToString,
        tutor_id: impl ToString,
        now: DateTime<Utc>,
    ) -> Chat {
        Chat {
            id: String::new(),
            request_id: request_id.to_string(),
            tutor_id: tutor_id.to_string(),
            student_id: student_id.to_string(),
            last_message: None,
            last_message_type: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub chat_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub sender_type: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default, with = "lenient_bool")]
    pub seen: bool,
    #[serde(default, with = "lenient_bool")]
    pub edited: bool,
    pub edited_by: Option<String>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Unseen message written by the back office.
    pub fn from_admin(
        chat_id: impl ToString,
        message: impl ToString,
        message_type: MessageType,
        now: DateTime<Utc>,
    ) -> ChatMessage {
        ChatMessage {
            id: String::new(),
            chat_id: chat_id.to_string(),
            message: message.to_string(),
            message_type,
            sender_type: ADMIN_SENDER.to_string(),
            sender_id: ADMIN_SENDER.to_string(),
            seen: false,
            edited: false,
            edited_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Chats of a request and, when one was selected, a page of its messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatListing {
    pub chats: Vec<Chat>,
    /// Oldest first.
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub total_messages: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn clamp_limit(limit: Option<i64>) -> usize {
    limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .clamp(1, MAX_MESSAGE_LIMIT) as usize
}
