use chrono::{DateTime, Utc};
use thiserror::Error;
use utoipa::ToSchema;

use crate::resp::problem::{problems, Problem};
use crate::util::serde_helpers::{flag, flag_opt, timestamp, timestamp_opt};

pub mod db;

pub static PROMO_COLLECTION_NAME: &str = "promo_codes";
pub static PROMO_LIST_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PromoType {
    #[default]
    #[serde(alias = "influencer")]
    Influencer,
    #[serde(alias = "event")]
    Event,
}

impl PromoType {
    pub fn as_str(self) -> &'static str {
        match self {
            PromoType::Influencer => "INFLUENCER",
            PromoType::Event => "EVENT",
        }
    }
}

impl std::str::FromStr for PromoType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFLUENCER" => Ok(PromoType::Influencer),
            "EVENT" => Ok(PromoType::Event),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PromoUsage {
    pub student_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub number_of_usage: u32,
}

/// Discount code handed out to students. `0` usage limits mean unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PromoCode {
    #[serde(default)]
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: PromoType,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub max_usage_times: u32,
    #[serde(default)]
    pub max_usage_per_user: u32,
    #[serde(default)]
    pub current_usage: u32,
    #[serde(default)]
    pub used_by: Vec<PromoUsage>,
    #[serde(default, with = "flag")]
    #[schema(value_type = String, example = "1")]
    pub is_active: bool,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "timestamp_opt")]
    #[schema(value_type = Option<String>)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum RedeemError {
    #[error("promo code is not active")]
    Inactive,
    #[error("promo code usage limit reached")]
    Exhausted,
    #[error("student {0} reached the usage limit of this promo code")]
    ExhaustedForStudent(String),
}

impl From<RedeemError> for Problem {
    fn from(e: RedeemError) -> Self {
        match e {
            RedeemError::Inactive => problems::conflict("Promo code is not active"),
            RedeemError::Exhausted => problems::conflict("Promo code usage limit reached"),
            RedeemError::ExhaustedForStudent(id) => {
                problems::conflict("Promo code usage limit reached for this student")
                    .insert_str("student_id", id)
                    .clone()
            }
        }
    }
}

impl PromoCode {
    pub fn usage_of(&self, student_id: &str) -> u32 {
        self.used_by
            .iter()
            .find(|it| it.student_id == student_id)
            .map(|it| it.number_of_usage)
            .unwrap_or(0)
    }

    /// Records one use by the student, enforcing activity and both limits.
    pub fn redeem(&mut self, student_id: &str, email: &str) -> Result<(), RedeemError> {
        if !self.is_active {
            return Err(RedeemError::Inactive);
        }
        if self.max_usage_times > 0 && self.current_usage >= self.max_usage_times {
            return Err(RedeemError::Exhausted);
        }
        if self.max_usage_per_user > 0 && self.usage_of(student_id) >= self.max_usage_per_user {
            return Err(RedeemError::ExhaustedForStudent(student_id.to_string()));
        }

        match self.used_by.iter_mut().find(|it| it.student_id == student_id) {
            Some(usage) => usage.number_of_usage += 1,
            None => self.used_by.push(PromoUsage {
                student_id: student_id.to_string(),
                email: email.to_string(),
                number_of_usage: 1,
            }),
        }
        self.current_usage += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PromoCreateData {
    pub code: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<PromoType>,
    pub discount: Option<f64>,
    pub max_usage_times: Option<u32>,
    pub max_usage_per_user: Option<u32>,
}

impl PromoCreateData {
    /// Active code with no usage. The code is required.
    pub fn into_promo(self, now: DateTime<Utc>) -> Result<PromoCode, Problem> {
        let code = self
            .code
            .map(|it| it.trim().to_string())
            .filter(|it| !it.is_empty())
            .ok_or_else(|| problems::bad_request("Promo code is required"))?;

        Ok(PromoCode {
            id: String::new(),
            code,
            description: self.description.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
            discount: self.discount.unwrap_or_default(),
            max_usage_times: self.max_usage_times.unwrap_or_default(),
            max_usage_per_user: self.max_usage_per_user.unwrap_or_default(),
            current_usage: 0,
            used_by: vec![],
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

/// Partial update. Only present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PromoUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PromoType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usage_times: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usage_per_user: Option<u32>,
    #[serde(default, with = "flag_opt", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PromoRedeemData {
    pub student_id: Option<String>,
    pub email: Option<String>,
}
