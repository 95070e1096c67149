use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::resp::problem::{problems, Problem};
use crate::util::serde_helpers::timestamp;

pub mod db;

pub static USER_NOTIFICATION_COLLECTION_NAME: &str = "notifications";
pub static DEFAULT_PAGE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    Student,
    Tutor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    All,
    Exam,
    Sos,
    Online,
    Homework,
    Project,
    Thesis,
}

/// Event a user notification template is sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    StudentCreateRequest,
    TutorBidRequest,
    StudentRejectBid,
    TutorUpdateBid,
    StudentAcceptBid,
    StudentPayRequest,
    TutorCompleteRequest,
    StudentRejectComplete,
    StudentAcceptComplete,
    StudentCancelRequest,
}

/// Push notification text sent to students or tutors, per event and request
/// type. Stored with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub user_type: UserType,
    pub request_type: RequestType,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl UserNotification {
    /// Case-insensitive substring of the title or body.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.title.to_lowercase().contains(&term) || self.body.to_lowercase().contains(&term)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserNotificationCreateData {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    pub user_type: Option<UserType>,
    pub request_type: Option<RequestType>,
}

impl UserNotificationCreateData {
    /// Every field is required.
    pub fn into_notification(self, now: DateTime<Utc>) -> Result<UserNotification, Problem> {
        match (self.title, self.body, self.kind, self.user_type, self.request_type) {
            (Some(title), Some(body), Some(kind), Some(user_type), Some(request_type))
                if !title.is_empty() && !body.is_empty() =>
            {
                Ok(UserNotification {
                    id: String::new(),
                    title,
                    body,
                    kind,
                    user_type,
                    request_type,
                    created_at: now,
                    updated_at: now,
                })
            }
            _ => Err(problems::bad_request("Missing required fields")),
        }
    }
}

/// Partial update. Only present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserNotificationUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<RequestType>,
}
