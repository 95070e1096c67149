use bson::{doc, Bson};
use chrono::Utc;
use utoipa::ToSchema;

use super::{StaffUser, STAFF_COLLECTION_NAME, USER_ROLE_COLLECTION_NAME};
use crate::data::account::is_valid_email;
use crate::identity::{IdentityProfile, IdentityProvider};
use crate::resp::problem::{problems, Problem};
use crate::store::{Query, Store, StoreError};
use crate::util::{self, serde_helpers::flag_opt};

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found(id: impl ToString) -> Problem {
        problems::not_found("User not found")
            .insert_str("userId", id)
            .clone()
    }

    #[inline]
    pub fn bad_email(email: impl ToString) -> Problem {
        problems::bad_request("Invalid email format")
            .insert_str("email", email)
            .clone()
    }

    #[inline]
    pub fn duplicate(email: impl ToString) -> Problem {
        problems::conflict("A user with this email already exists")
            .insert_str("email", email)
            .clone()
    }

    #[inline]
    pub fn email_in_use(email: impl ToString) -> Problem {
        problems::conflict("Email already exists for another user")
            .insert_str("email", email)
            .clone()
    }
}

#[derive(Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffCreateData {
    #[schema(format = "email")]
    pub email: Option<String>,
    #[schema(format = "password")]
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default, deserialize_with = "flag_opt::deserialize")]
    pub email_verified: Option<bool>,
    #[serde(default, deserialize_with = "flag_opt::deserialize")]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "flag_opt::deserialize")]
    pub send_notifications: Option<bool>,
}

impl std::fmt::Debug for StaffCreateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StaffCreateData:{:?}", self.email)
    }
}

/// Partial staff update. Absent and empty fields are left as they are.
#[derive(Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffUpdateData {
    #[serde(default, skip_serializing)]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing)]
    #[schema(format = "password")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "flag_opt::deserialize"
    )]
    pub email_verified: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "flag_opt::deserialize"
    )]
    pub is_active: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "flag_opt::deserialize"
    )]
    pub send_notifications: Option<bool>,
}

impl std::fmt::Debug for StaffUpdateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StaffUpdateData:{:?}", self.user_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffDeleteData {
    pub user_id: Option<String>,
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

pub trait StaffDbExt {
    /// Registers the identity first, then stores the staff document.
    async fn create_staff_user(
        &self,
        identities: &dyn IdentityProvider,
        data: StaffCreateData,
        password_cost: u32,
    ) -> Result<String, Problem>;

    async fn update_staff_user(
        &self,
        identities: &dyn IdentityProvider,
        data: StaffUpdateData,
        password_cost: u32,
    ) -> Result<String, Problem>;

    /// Soft delete. Removing the identity is best effort, and the user's
    /// active role grants are deactivated.
    async fn delete_staff_user(
        &self,
        identities: &dyn IdentityProvider,
        user_id: Option<String>,
    ) -> Result<String, Problem>;

    async fn get_staff_user(&self, id: &str) -> Result<Option<StaffUser>, StoreError>;

    /// Whether a non-deleted staff user other than `exclude_id` uses `email`.
    async fn staff_email_taken(
        &self,
        email: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError>;
}

impl StaffDbExt for Store {
    async fn create_staff_user(
        &self,
        identities: &dyn IdentityProvider,
        data: StaffCreateData,
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
        if self.staff_email_taken(&email, None).await? {
            return Err(problem::duplicate(email));
        }

        let display_name = data.display_name.filter(|it| !it.is_empty());
        let email_verified = data.email_verified.unwrap_or(false);
        let uid = identities
            .create_identity(&IdentityProfile {
                email: Some(email.clone()),
                password: Some(password.to_string()),
                display_name: display_name.clone(),
                email_verified: Some(email_verified),
            })
            .await?;

        let now = Utc::now();
        let user = StaffUser {
            id: String::new(),
            email,
            uid,
            display_name,
            phone_number: data.phone_number.filter(|it| !it.is_empty()),
            password: hash_password(password, password_cost)?,
            email_verified,
            is_active: data.is_active.unwrap_or(true),
            send_notifications: data.send_notifications.unwrap_or(true),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let id = self.insert_as(STAFF_COLLECTION_NAME, &user).await?;
        tracing::info!("created staff user {} (identity {})", id, user.uid);
        Ok(id)
    }

    async fn update_staff_user(
        &self,
        identities: &dyn IdentityProvider,
        data: StaffUpdateData,
        password_cost: u32,
    ) -> Result<String, Problem> {
        let id = non_empty(&data.user_id)
            .ok_or_else(|| problems::bad_request("User ID is required"))?
            .to_string();

        let current = self
            .get_staff_user(&id)
            .await?
            .ok_or_else(|| problem::not_found(&id))?;

        let email = non_empty(&data.email);
        if let Some(email) = email {
            if !is_valid_email(email) {
                return Err(problem::bad_email(email));
            }
            if email != current.email && self.staff_email_taken(email, Some(&id)).await? {
                return Err(problem::email_in_use(email));
            }
        }

        let password = non_empty(&data.password);
        let profile = IdentityProfile {
            email: email.map(str::to_string),
            password: password.map(str::to_string),
            display_name: non_empty(&data.display_name).map(str::to_string),
            email_verified: data.email_verified,
        };
        if !profile.is_empty() {
            identities.update_identity(current.identity_uid(), &profile).await?;
        }

        let mut patch = bson::to_document(&data).map_err(StoreError::from)?;
        let blank: Vec<String> = patch
            .iter()
            .filter(|(_, value)| matches!(value, Bson::String(it) if it.trim().is_empty()))
            .map(|(key, _)| key.clone())
            .collect();
        for key in blank {
            patch.remove(&key);
        }
        if let Some(password) = password {
            patch.insert("password", hash_password(password, password_cost)?);
        }
        patch.insert("updatedAt", util::now_string());

        if !self.update(STAFF_COLLECTION_NAME, &id, patch).await? {
            return Err(problem::not_found(&id));
        }

        tracing::info!("updated staff user {}", id);
        Ok(id)
    }

    async fn delete_staff_user(
        &self,
        identities: &dyn IdentityProvider,
        user_id: Option<String>,
    ) -> Result<String, Problem> {
        let id = non_empty(&user_id)
            .ok_or_else(|| problems::bad_request("User ID is required"))?
            .to_string();

        let current = self
            .get_staff_user(&id)
            .await?
            .ok_or_else(|| problem::not_found(&id))?;

        if let Err(e) = identities.delete_identity(current.identity_uid()).await {
            tracing::warn!("unable to delete identity of staff user {}: {}", id, e);
        }

        let now = util::now_string();
        let deleted = self
            .update(
                STAFF_COLLECTION_NAME,
                &id,
                doc! { "deleted_at": now.as_str(), "updatedAt": now.as_str() },
            )
            .await?;
        if !deleted {
            return Err(problem::not_found(&id));
        }

        let grants = Query::new()
            .eq("userId", id.as_str())
            .any_of("isActive", util::set_flag_values());
        let grant_ids: Vec<String> = self
            .find(USER_ROLE_COLLECTION_NAME, &grants)
            .await?
            .iter()
            .filter_map(|it| it.get_str("id").ok().map(str::to_string))
            .collect();
        let deactivated = if grant_ids.is_empty() {
            0
        } else {
            self.update_many(
                USER_ROLE_COLLECTION_NAME,
                &grant_ids,
                doc! { "isActive": false, "updatedAt": now.as_str() },
            )
            .await?
        };

        tracing::info!(
            "soft deleted staff user {}, {} role grants deactivated",
            id,
            deactivated
        );
        Ok(id)
    }

    async fn get_staff_user(&self, id: &str) -> Result<Option<StaffUser>, StoreError> {
        self.get_as(STAFF_COLLECTION_NAME, id).await
    }

    async fn staff_email_taken(
        &self,
        email: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let query = Query::new()
            .eq("email", email)
            .eq("deleted_at", Bson::Null);
        let matches = self.find(STAFF_COLLECTION_NAME, &query).await?;

        Ok(matches
            .iter()
            .any(|it| it.get_str("id").ok() != exclude_id))
    }
}
