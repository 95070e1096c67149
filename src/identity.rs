//! Sign-in identities for back office staff.
//!
//! Staff documents in the store keep a bcrypt hash of their password, while
//! the identity provider owns the credentials used to sign in. The provider
//! sits behind [`IdentityProvider`] so deployments can plug in their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rocket::http::Status;
use thiserror::Error;
use uuid::Uuid;

use crate::resp::problem::Problem;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity {0} does not exist")]
    Unknown(String),
    #[error("an identity with email {0} already exists")]
    EmailTaken(String),
    #[error("identity provider failure: {0}")]
    Provider(String),
}

impl From<IdentityError> for Problem {
    fn from(e: IdentityError) -> Self {
        tracing::error!("identity provider failure: {}", e);
        Problem::new_untyped(Status::InternalServerError, e.to_string())
    }
}

/// Fields pushed to the identity provider. `None` leaves a field untouched.
#[derive(Clone, Default, PartialEq)]
pub struct IdentityProfile {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: Option<bool>,
}

impl IdentityProfile {
    pub fn is_empty(&self) -> bool {
        self == &IdentityProfile::default()
    }
}

impl std::fmt::Debug for IdentityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProfile")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("display_name", &self.display_name)
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

#[rocket::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers a new identity and returns its uid.
    async fn create_identity(&self, profile: &IdentityProfile) -> Result<String, IdentityError>;

    async fn update_identity(
        &self,
        uid: &str,
        profile: &IdentityProfile,
    ) -> Result<(), IdentityError>;

    async fn delete_identity(&self, uid: &str) -> Result<(), IdentityError>;
}

/// Identities kept in process memory, keyed by uid. Used when no external
/// provider is wired in.
#[derive(Default)]
pub struct LocalIdentities {
    emails: Mutex<EmailsByUid>,
}

type EmailsByUid = HashMap<String, Option<String>>;

impl LocalIdentities {
    fn lock(&self) -> Result<MutexGuard<'_, EmailsByUid>, IdentityError> {
        self.emails
            .lock()
            .map_err(|_| IdentityError::Provider("identity table poisoned".to_string()))
    }
}

#[rocket::async_trait]
impl IdentityProvider for LocalIdentities {
    async fn create_identity(&self, profile: &IdentityProfile) -> Result<String, IdentityError> {
        let mut emails = self.lock()?;
        if let Some(email) = &profile.email {
            if emails.values().any(|it| it.as_ref() == Some(email)) {
                return Err(IdentityError::EmailTaken(email.clone()));
            }
        }

        let uid = Uuid::new_v4().simple().to_string();
        emails.insert(uid.clone(), profile.email.clone());
        tracing::info!(uid = %uid, "identity created");
        Ok(uid)
    }

    async fn update_identity(
        &self,
        uid: &str,
        profile: &IdentityProfile,
    ) -> Result<(), IdentityError> {
        let mut emails = self.lock()?;
        let entry = emails
            .get_mut(uid)
            .ok_or_else(|| IdentityError::Unknown(uid.to_string()))?;
        if profile.email.is_some() {
            *entry = profile.email.clone();
        }
        tracing::info!(uid = %uid, password = profile.password.is_some(), "identity updated");
        Ok(())
    }

    async fn delete_identity(&self, uid: &str) -> Result<(), IdentityError> {
        self.lock()?
            .remove(uid)
            .map(|_| tracing::info!(uid = %uid, "identity deleted"))
            .ok_or_else(|| IdentityError::Unknown(uid.to_string()))
    }
}

/// Managed handle to the identity provider.
#[derive(Clone)]
pub struct Identities(Arc<dyn IdentityProvider>);

impl Identities {
    pub fn new(provider: impl IdentityProvider + 'static) -> Identities {
        Identities(Arc::new(provider))
    }

    pub fn local() -> Identities {
        Identities::new(LocalIdentities::default())
    }

    pub fn provider(&self) -> &(dyn IdentityProvider + 'static) {
        self.0.as_ref()
    }
}

impl std::ops::Deref for Identities {
    type Target = dyn IdentityProvider;

    fn deref(&self) -> &Self::Target {
        self.provider()
    }
}

impl std::fmt::Debug for Identities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Identities")
    }
}
