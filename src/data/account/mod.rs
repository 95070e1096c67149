use chrono::{DateTime, Utc};
use regex::Regex;
use utoipa::ToSchema;

use crate::util::serde_helpers::{flag, timestamp, timestamp_opt};

pub mod db;

pub static STUDENT_COLLECTION_NAME: &str = "students";
pub static TUTOR_COLLECTION_NAME: &str = "tutors";

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Student or tutor account as stored. Both collections share the layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    pub full_name: Option<String>,
    pub nickname: Option<String>,
    pub phone_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub country: Option<String>,
    pub platform: Option<String>,
    pub device_token: Option<String>,

    #[serde(default)]
    pub token: String,
    /// bcrypt hash.
    #[serde(default)]
    pub password: String,

    #[serde(default, with = "flag")]
    pub verified: bool,
    #[serde(default, with = "flag")]
    pub is_banned: bool,
    #[serde(default, with = "flag")]
    pub locked: bool,
    #[serde(default, with = "flag")]
    pub cancelled: bool,
    #[serde(default, with = "flag")]
    pub send_notifications: bool,
    #[serde(default, with = "flag")]
    pub test_user: bool,

    #[serde(default = "Utc::now", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "timestamp_opt")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Name shown in notifications: nickname, then full name, then e-mail.
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|it| !it.is_empty())
            .or(self.full_name.as_deref().filter(|it| !it.is_empty()))
            .unwrap_or(&self.email)
    }

    pub fn push_target(&self) -> Option<&str> {
        self.device_token.as_deref().filter(|it| !it.is_empty())
    }
}

/// Account without its credentials.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub nickname: Option<String>,
    pub phone_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub country: Option<String>,
    pub platform: Option<String>,
    pub device_token: Option<String>,
    #[serde(with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub verified: bool,
    #[serde(with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub is_banned: bool,
    #[serde(with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub locked: bool,
    #[serde(with = "flag")]
    #[schema(value_type = String, example = "1")]
    pub send_notifications: bool,
    #[serde(with = "flag")]
    #[schema(value_type = String, example = "0")]
    pub test_user: bool,
    #[serde(with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "timestamp_opt")]
    #[schema(value_type = Option<String>)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Account> for AccountResponse {
    fn from(value: Account) -> Self {
        AccountResponse {
            id: value.id,
            email: value.email,
            full_name: value.full_name,
            nickname: value.nickname,
            phone_number: value.phone_number,
            whatsapp_number: value.whatsapp_number,
            country: value.country,
            platform: value.platform,
            device_token: value.device_token,
            verified: value.verified,
            is_banned: value.is_banned,
            locked: value.locked,
            send_notifications: value.send_notifications,
            test_user: value.test_user,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        }
    }
}
