use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::resp::problem::{problems, Problem};
use crate::util::serde_helpers::{lenient_bool, timestamp};

pub mod db;

pub static NOTIFICATION_COLLECTION_NAME: &str = "admin_notifications";
pub static DEFAULT_NOTIFICATION_LIMIT: usize = 50;

pub static SUPPORT_MESSAGE_KIND: &str = "support_message";

/// Entry of the back office notification feed. Stored with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotification {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub sender_type: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_nickname: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, with = "lenient_bool")]
    pub seen: bool,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

/// `{nickname or name} sent a message: "{message}"`
pub fn default_content(sender_nickname: &str, sender_name: &str, message: &str) -> String {
    let sender = if sender_nickname.is_empty() {
        sender_name
    } else {
        sender_nickname
    };
    format!("{} sent a message: \"{}\"", sender, message)
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreateData {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub request_id: Option<String>,
    pub chat_id: Option<String>,
    pub sender_type: Option<String>,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub sender_nickname: Option<String>,
    pub message: Option<String>,
    pub content: Option<String>,
}

fn required(value: Option<String>) -> Result<String, Problem> {
    value
        .filter(|it| !it.is_empty())
        .ok_or_else(|| problems::bad_request("Missing required fields"))
}

impl NotificationCreateData {
    /// Unseen notification with the defaults filled in. `type`, `requestId`,
    /// `senderType`, `senderId` and `message` are required.
    pub fn into_notification(self, now: DateTime<Utc>) -> Result<AdminNotification, Problem> {
        let kind = required(self.kind)?;
        let request_id = required(self.request_id)?;
        let sender_type = required(self.sender_type)?;
        let sender_id = required(self.sender_id)?;
        let message = required(self.message)?;

        let sender_name = self.sender_name.unwrap_or_default();
        let sender_nickname = self.sender_nickname.unwrap_or_default();
        let content = self
            .content
            .filter(|it| !it.is_empty())
            .unwrap_or_else(|| default_content(&sender_nickname, &sender_name, &message));

        Ok(AdminNotification {
            id: String::new(),
            kind,
            request_id,
            chat_id: self.chat_id.unwrap_or_default(),
            sender_type,
            sender_id,
            sender_name,
            sender_nickname,
            message,
            content,
            seen: false,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. Only present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;

    fn create_data() -> NotificationCreateData {
        NotificationCreateData {
            kind: Some("chat_message".to_string()),
            request_id: Some("r1".to_string()),
            sender_type: Some("student".to_string()),
            sender_id: Some("s1".to_string()),
            sender_name: Some("Sam Student".to_string()),
            message: Some("hello".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn content_defaults_to_sender_and_message() {
        let notification = create_data().into_notification(Utc::now()).unwrap();
        assert_eq!(notification.content, "Sam Student sent a message: \"hello\"");
        assert!(!notification.seen);
        assert_eq!(notification.chat_id, "");

        let notification = NotificationCreateData {
            sender_nickname: Some("sam".to_string()),
            ..create_data()
        }
        .into_notification(Utc::now())
        .unwrap();
        assert_eq!(notification.content, "sam sent a message: \"hello\"");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let problem = NotificationCreateData {
            sender_id: None,
            ..create_data()
        }
        .into_notification(Utc::now())
        .unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);
    }

    #[test]
    fn stored_keys_are_camel_case() {
        let notification = create_data().into_notification(Utc::now()).unwrap();
        let document = bson::to_document(&notification).unwrap();
        assert_eq!(document.get_str("type").unwrap(), "chat_message");
        assert_eq!(document.get_str("requestId").unwrap(), "r1");
        assert!(document.get_str("createdAt").is_ok());
    }
}
