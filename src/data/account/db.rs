use bson::Bson;
use chrono::Utc;
use utoipa::ToSchema;

use super::{is_valid_email, Account};
use crate::resp::problem::{problems, Problem};
use crate::store::{Query, Store, StoreError};
use crate::util::{self, serde_helpers::flag_opt};

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found(id: impl ToString) -> Problem {
        problems::not_found("Account not found")
            .insert_str("id", id)
            .clone()
    }

    #[inline]
    pub fn bad_email(email: impl ToString) -> Problem {
        problems::bad_request("Invalid email format")
            .insert_str("email", email)
            .clone()
    }

    #[inline]
    pub fn duplicate(field: &str, value: impl ToString) -> Problem {
        let title = match field {
            "email" => "An account with this email already exists",
            "phone_number" => "An account with this phone number already exists",
            _ => "An account with this WhatsApp number already exists",
        };
        problems::conflict(title).insert_str(field, value).clone()
    }
}

#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct AccountCreateData {
    #[schema(format = "email")]
    pub email: Option<String>,
    #[schema(format = "password")]
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub nickname: Option<String>,
    pub phone_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub country: Option<String>,
    pub platform: Option<String>,
    pub device_token: Option<String>,
}

impl std::fmt::Debug for AccountCreateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountCreateData:{:?}", self.email)
    }
}

/// Partial account update. Only present fields are written.
#[derive(Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AccountUpdateData {
    #[serde(default, alias = "studentId", alias = "tutorId", skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing)]
    #[schema(format = "password")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub is_banned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub send_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "flag_opt")]
    #[schema(value_type = Option<String>)]
    pub test_user: Option<bool>,
}

impl std::fmt::Debug for AccountUpdateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountUpdateData:{:?}", self.id)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|it| !it.is_empty())
}

fn hash_password(password: &str, cost: u32) -> Result<String, Problem> {
    bcrypt::hash(password, cost).map_err(|e| {
        tracing::error!("unable to hash password: {}", e);
        problems::internal("Failed to hash password")
    })
}

// TODO: AccountDbExt fns shouldn't be erroring with Problem
pub trait AccountDbExt {
    async fn create_account(
        &self,
        collection: &str,
        data: AccountCreateData,
        password_cost: u32,
    ) -> Result<String, Problem>;

    async fn update_account(
        &self,
        collection: &str,
        data: AccountUpdateData,
        password_cost: u32,
    ) -> Result<String, Problem>;

    async fn get_account(&self, collection: &str, id: &str) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_token(
        &self,
        collection: &str,
        token: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Non-deleted accounts whose e-mail starts with `prefix`.
    async fn search_accounts_by_email(
        &self,
        collection: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Account>, StoreError>;

    /// Whether a non-deleted account other than `exclude_id` has `value` in `field`.
    async fn account_field_taken(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Whether an account other than `exclude_id` uses `phone`. With a
    /// country code, only accounts stored with the same code count.
    async fn phone_number_taken(
        &self,
        collection: &str,
        phone: &str,
        country_code: Option<&str>,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError>;
}

impl AccountDbExt for Store {
    async fn create_account(
        &self,
        collection: &str,
        data: AccountCreateData,
        password_cost: u32,
    ) -> Result<String, Problem> {
        let password = non_empty(&data.password)
            .ok_or_else(|| problems::bad_request("Password is required"))?;

        let email = non_empty(&data.email)
            .ok_or_else(|| problems::bad_request("Email is required"))?
            .to_string();
        if !is_valid_email(&email) {
            return Err(problem::bad_email(email));
        }

        if self
            .account_field_taken(collection, "email", &email, None)
            .await?
        {
            return Err(problem::duplicate("email", email));
        }
        for field in ["phone_number", "whatsapp_number"] {
            let value = match field {
                "phone_number" => non_empty(&data.phone_number),
                _ => non_empty(&data.whatsapp_number),
            };
            if let Some(value) = value {
                if self.account_field_taken(collection, field, value, None).await? {
                    return Err(problem::duplicate(field, value));
                }
            }
        }

        let now = Utc::now();
        let account = Account {
            id: String::new(),
            email,
            full_name: data.full_name,
            nickname: data.nickname,
            phone_number: data.phone_number.filter(|it| !it.is_empty()),
            whatsapp_number: data.whatsapp_number.filter(|it| !it.is_empty()),
            country: data.country,
            platform: data.platform,
            device_token: data.device_token,
            token: util::random_token(26),
            password: hash_password(password, password_cost)?,
            verified: false,
            is_banned: false,
            locked: false,
            cancelled: false,
            send_notifications: true,
            test_user: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let id = self.insert_as(collection, &account).await?;
        tracing::info!("created account {} in {}", id, collection);
        Ok(id)
    }

    async fn update_account(
        &self,
        collection: &str,
        data: AccountUpdateData,
        password_cost: u32,
    ) -> Result<String, Problem> {
        let id = non_empty(&data.id)
            .ok_or_else(|| problems::bad_request("Account ID is required"))?
            .to_string();

        let current = self
            .get_account(collection, &id)
            .await?
            .ok_or_else(|| problem::not_found(&id))?;

        if let Some(email) = non_empty(&data.email) {
            if !is_valid_email(email) {
                return Err(problem::bad_email(email));
            }
            if email != current.email
                && self
                    .account_field_taken(collection, "email", email, Some(&id))
                    .await?
            {
                return Err(problem::duplicate("email", email));
            }
        }

        let numbers = [
            ("phone_number", non_empty(&data.phone_number), &current.phone_number),
            ("whatsapp_number", non_empty(&data.whatsapp_number), &current.whatsapp_number),
        ];
        for (field, value, existing) in numbers {
            if let Some(value) = value {
                if existing.as_deref() != Some(value)
                    && self
                        .account_field_taken(collection, field, value, Some(&id))
                        .await?
                {
                    return Err(problem::duplicate(field, value));
                }
            }
        }

        let mut patch = bson::to_document(&data).map_err(StoreError::from)?;
        if let Some(password) = non_empty(&data.password) {
            patch.insert("password", hash_password(password, password_cost)?);
        }
        patch.insert("updated_at", util::now_string());

        if !self.update(collection, &id, patch).await? {
            return Err(problem::not_found(&id));
        }

        tracing::info!("updated account {} in {}", id, collection);
        Ok(id)
    }

    async fn get_account(&self, collection: &str, id: &str) -> Result<Option<Account>, StoreError> {
        self.get_as(collection, id).await
    }

    async fn find_account_by_token(
        &self,
        collection: &str,
        token: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.find_one_as(collection, Query::new().eq("token", token))
            .await
    }

    async fn search_accounts_by_email(
        &self,
        collection: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Account>, StoreError> {
        let query = Query::new()
            .gte("email", prefix)
            .lte("email", format!("{}\u{f8ff}", prefix))
            .eq("deleted_at", Bson::Null)
            .limit(limit);
        self.find_as(collection, &query).await
    }

    async fn account_field_taken(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let query = Query::new()
            .eq(field, value)
            .eq("deleted_at", Bson::Null);
        let matches = self.find(collection, &query).await?;

        Ok(matches
            .iter()
            .any(|it| it.get_str("id").ok() != exclude_id))
    }

    async fn phone_number_taken(
        &self,
        collection: &str,
        phone: &str,
        country_code: Option<&str>,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut query = Query::new().eq("phone_number", phone);
        if let Some(code) = country_code {
            query = query.eq("phone_country_code", code);
        }
        let matches = self.find(collection, &query).await?;

        Ok(matches
            .iter()
            .any(|it| it.get_str("id").ok() != exclude_id))
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use super::*;
    use crate::data::account::{STUDENT_COLLECTION_NAME, TUTOR_COLLECTION_NAME};

    fn signup(email: &str, phone: Option<&str>) -> AccountCreateData {
        AccountCreateData {
            email: Some(email.to_string()),
            password: Some("correct horse".to_string()),
            full_name: Some("Test Account".to_string()),
            phone_number: phone.map(str::to_string),
            ..Default::default()
        }
    }

    #[rocket::async_test]
    async fn create_hashes_password_and_issues_token() {
        let store = Store::memory();
        let id = store
            .create_account(STUDENT_COLLECTION_NAME, signup("anna@example.com", None), 4)
            .await
            .expect("unable to create account");

        let account = store
            .get_account(STUDENT_COLLECTION_NAME, &id)
            .await
            .unwrap()
            .expect("account missing");

        assert_ne!(account.password, "correct horse");
        assert!(bcrypt::verify("correct horse", &account.password).unwrap());
        assert_eq!(account.token.len(), 26);
        assert!(account.send_notifications);
        assert!(account.deleted_at.is_none());
    }

    #[rocket::async_test]
    async fn create_rejects_missing_password_and_bad_email() {
        let store = Store::memory();

        let mut data = signup("anna@example.com", None);
        data.password = None;
        let problem = store
            .create_account(STUDENT_COLLECTION_NAME, data, 4)
            .await
            .unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);

        let problem = store
            .create_account(STUDENT_COLLECTION_NAME, signup("not-an-email", None), 4)
            .await
            .unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);
    }

    #[rocket::async_test]
    async fn duplicates_conflict_within_collection_only() {
        let store = Store::memory();
        store
            .create_account(TUTOR_COLLECTION_NAME, signup("t@example.com", Some("+100")), 4)
            .await
            .unwrap();

        let problem = store
            .create_account(TUTOR_COLLECTION_NAME, signup("t@example.com", None), 4)
            .await
            .unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        let problem = store
            .create_account(TUTOR_COLLECTION_NAME, signup("other@example.com", Some("+100")), 4)
            .await
            .unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        store
            .create_account(STUDENT_COLLECTION_NAME, signup("t@example.com", Some("+100")), 4)
            .await
            .expect("students are checked separately");
    }

    #[rocket::async_test]
    async fn update_checks_other_accounts_and_rehashes() {
        let store = Store::memory();
        let first = store
            .create_account(STUDENT_COLLECTION_NAME, signup("a@example.com", None), 4)
            .await
            .unwrap();
        store
            .create_account(STUDENT_COLLECTION_NAME, signup("b@example.com", None), 4)
            .await
            .unwrap();

        let taken = AccountUpdateData {
            id: Some(first.clone()),
            email: Some("b@example.com".to_string()),
            ..Default::default()
        };
        let problem = store
            .update_account(STUDENT_COLLECTION_NAME, taken, 4)
            .await
            .unwrap_err();
        assert_eq!(problem.status, Status::Conflict);

        let same_email = AccountUpdateData {
            id: Some(first.clone()),
            email: Some("a@example.com".to_string()),
            password: Some("new secret".to_string()),
            locked: Some(true),
            ..Default::default()
        };
        store
            .update_account(STUDENT_COLLECTION_NAME, same_email, 4)
            .await
            .expect("own email is not a conflict");

        let account = store
            .get_account(STUDENT_COLLECTION_NAME, &first)
            .await
            .unwrap()
            .unwrap();
        assert!(account.locked);
        assert!(bcrypt::verify("new secret", &account.password).unwrap());

        let missing = AccountUpdateData {
            id: Some("missing".to_string()),
            ..Default::default()
        };
        let problem = store
            .update_account(STUDENT_COLLECTION_NAME, missing, 4)
            .await
            .unwrap_err();
        assert_eq!(problem.status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn search_matches_email_prefix() {
        let store = Store::memory();
        for email in ["anna@x.com", "andy@x.com", "bob@x.com"] {
            store
                .create_account(TUTOR_COLLECTION_NAME, signup(email, None), 4)
                .await
                .unwrap();
        }

        let found = store
            .search_accounts_by_email(TUTOR_COLLECTION_NAME, "an", 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }
}
