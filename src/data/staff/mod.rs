use chrono::{DateTime, Utc};

use crate::util::serde_helpers::{lenient_bool, timestamp, timestamp_opt};

pub mod db;

pub static STAFF_COLLECTION_NAME: &str = "users";
pub static USER_ROLE_COLLECTION_NAME: &str = "userRoles";

/// Back office staff member, linked to an identity provider entry by `uid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    /// Identity provider uid.
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// bcrypt hash.
    #[serde(default)]
    pub password: String,

    #[serde(default, with = "lenient_bool")]
    pub email_verified: bool,
    #[serde(default = "enabled", with = "lenient_bool")]
    pub is_active: bool,
    #[serde(default = "enabled", with = "lenient_bool")]
    pub send_notifications: bool,

    #[serde(default = "Utc::now", with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "deleted_at", default, with = "timestamp_opt")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StaffUser {
    /// Identity provider uid. Older documents were keyed by it directly.
    pub fn identity_uid(&self) -> &str {
        if self.uid.is_empty() {
            &self.id
        } else {
            &self.uid
        }
    }
}

fn enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_documents_use_camel_case_with_snake_deleted_at() {
        let user: StaffUser = serde_json::from_str(
            r#"{"email": "ops@example.com", "displayName": "Ops", "emailVerified": 1}"#,
        )
        .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Ops"));
        assert!(user.email_verified);
        assert!(user.is_active);
        assert!(user.send_notifications);
        assert!(user.deleted_at.is_none());

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["isActive"], true);
        assert!(value.get("deleted_at").is_some());
        assert!(value.get("deletedAt").is_none());
    }
}
