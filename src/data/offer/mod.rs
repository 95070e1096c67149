use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::util::serde_helpers::{text, timestamp};

pub mod db;

/// Offers of every request, keyed by `request_id`.
pub static OFFER_COLLECTION_NAME: &str = "tutor_offers";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferStatus {
    #[default]
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "accepted")]
    Accepted,
    #[serde(alias = "rejected")]
    Rejected,
}

impl OfferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferStatus::Pending => "PENDING",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
        }
    }
}

/// A tutor's bid on a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TutorOffer {
    #[serde(default)]
    pub id: String,
    pub request_id: String,
    pub tutor_id: String,
    #[serde(deserialize_with = "text::deserialize")]
    pub price: String,
    #[serde(default)]
    pub status: OfferStatus,
    pub cancel_reason: Option<String>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", with = "timestamp")]
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl TutorOffer {
    pub fn new(
        request_id: impl ToString,
        tutor_id: impl ToString,
        price: impl ToString,
        now: DateTime<Utc>,
    ) -> TutorOffer {
        TutorOffer {
            id: String::new(),
            request_id: request_id.to_string(),
            tutor_id: tutor_id.to_string(),
            price: price.to_string(),
            status: OfferStatus::Pending,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OfferCreateData {
    #[serde(rename = "tutorId", alias = "tutor_id")]
    pub tutor_id: Option<String>,
    #[serde(default, deserialize_with = "text::opt::deserialize")]
    #[schema(value_type = Option<String>)]
    pub price: Option<String>,
}

/// Operation on a single offer, selected by the `action` tag.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OfferAction {
    Update {
        #[serde(default)]
        status: Option<OfferStatus>,
        #[serde(default, deserialize_with = "text::opt::deserialize")]
        #[schema(value_type = Option<String>)]
        price: Option<String>,
    },
    /// Accepts the offer and assigns its tutor and price to the request.
    Accept {},
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_actions_parse_by_tag() {
        let accept: OfferAction = serde_json::from_value(json!({"action": "accept"})).unwrap();
        assert_eq!(accept, OfferAction::Accept {});

        let update: OfferAction =
            serde_json::from_value(json!({"action": "update", "price": 25, "status": "REJECTED"}))
                .unwrap();
        assert_eq!(
            update,
            OfferAction::Update {
                status: Some(OfferStatus::Rejected),
                price: Some("25".to_string()),
            }
        );

        assert!(serde_json::from_value::<OfferAction>(json!({"action": "withdraw"})).is_err());
    }

    #[test]
    fn statuses_are_uppercase() {
        assert_eq!(serde_json::to_value(OfferStatus::Accepted).unwrap(), "ACCEPTED");
        let parsed: OfferStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, OfferStatus::Pending);
    }
}
