use bson::{doc, Bson};
use rocket::http::Status;
use thiserror::Error;

use super::{OfferAction, OfferStatus, TutorOffer, OFFER_COLLECTION_NAME};
use crate::data::request::{RequestStatus, REQUEST_COLLECTION_NAME};
use crate::resp::problem::{problems, Problem};
use crate::store::{Direction, Query, Store, StoreError};
use crate::util;

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("tutor offer {0} not found")]
    OfferNotFound(String),
    #[error("request {0} not found")]
    RequestNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OfferError> for Problem {
    fn from(e: OfferError) -> Self {
        match e {
            OfferError::OfferNotFound(id) => problems::not_found("Tutor offer not found")
                .insert_str("offerId", id)
                .clone(),
            OfferError::RequestNotFound(id) => {
                Problem::new_untyped(Status::NotFound, "Request not found")
                    .insert_str("requestId", id)
                    .clone()
            }
            OfferError::Store(e) => Problem::from(e),
        }
    }
}

pub trait OfferDbExt {
    /// Offers of a request, newest first.
    async fn list_offers(&self, request_id: &str) -> Result<Vec<TutorOffer>, StoreError>;

    async fn create_offer(&self, offer: &TutorOffer) -> Result<String, StoreError>;

    /// Offer `offer_id` if it belongs to `request_id`.
    async fn get_offer(
        &self,
        request_id: &str,
        offer_id: &str,
    ) -> Result<Option<TutorOffer>, StoreError>;

    /// Runs `action` against the offer.
    ///
    /// Accepting writes the offer and then the request as two separate
    /// writes. When the second one fails the offer stays `ACCEPTED` while the
    /// request keeps its previous tutor. Other offers of the request are left
    /// untouched.
    async fn apply_offer_action(
        &self,
        request_id: &str,
        offer_id: &str,
        action: &OfferAction,
    ) -> Result<(), OfferError>;

    async fn delete_offer(&self, request_id: &str, offer_id: &str) -> Result<bool, StoreError>;
}

impl OfferDbExt for Store {
    async fn list_offers(&self, request_id: &str) -> Result<Vec<TutorOffer>, StoreError> {
        let query = Query::new()
            .eq("request_id", request_id)
            .order_by("created_at", Direction::Descending);
        self.find_as(OFFER_COLLECTION_NAME, &query).await
    }

    async fn create_offer(&self, offer: &TutorOffer) -> Result<String, StoreError> {
        let id = self.insert_as(OFFER_COLLECTION_NAME, offer).await?;
        tracing::info!("created tutor offer {} on request {}", id, offer.request_id);
        Ok(id)
    }

    async fn get_offer(
        &self,
        request_id: &str,
        offer_id: &str,
    ) -> Result<Option<TutorOffer>, StoreError> {
        Ok(self
            .get_as::<TutorOffer>(OFFER_COLLECTION_NAME, offer_id)
            .await?
            .filter(|it| it.request_id == request_id))
    }

    async fn apply_offer_action(
        &self,
        request_id: &str,
        offer_id: &str,
        action: &OfferAction,
    ) -> Result<(), OfferError> {
        if self.get_offer(request_id, offer_id).await?.is_none() {
            return Err(OfferError::OfferNotFound(offer_id.to_string()));
        }

        let now = util::now_string();
        match action {
            OfferAction::Update { status, price } => {
                let mut patch = doc! { "updated_at": now };
                if let Some(status) = status {
                    patch.insert("status", status.as_str());
                }
                if let Some(price) = price.as_deref().filter(|it| !it.is_empty()) {
                    patch.insert("price", price);
                }
                self.update(OFFER_COLLECTION_NAME, offer_id, patch).await?;
            }
            OfferAction::Reject { reason } => {
                let mut patch = doc! {
                    "status": OfferStatus::Rejected.as_str(),
                    "updated_at": now,
                };
                if let Some(reason) = reason.as_deref().filter(|it| !it.is_empty()) {
                    patch.insert("cancel_reason", reason);
                }
                self.update(OFFER_COLLECTION_NAME, offer_id, patch).await?;
            }
            OfferAction::Accept {} => {
                let accepted = doc! {
                    "status": OfferStatus::Accepted.as_str(),
                    "updated_at": now.clone(),
                };
                self.update(OFFER_COLLECTION_NAME, offer_id, accepted).await?;

                let offer = self
                    .get_offer(request_id, offer_id)
                    .await?
                    .ok_or_else(|| OfferError::OfferNotFound(offer_id.to_string()))?;

                let assignment = doc! {
                    "tutor_id": Bson::String(offer.tutor_id),
                    "tutor_price": Bson::String(offer.price),
                    "tutor_accepted": "1",
                    "request_status": RequestStatus::Ongoing.as_str(),
                    "updated_at": now,
                };
                if !self
                    .update(REQUEST_COLLECTION_NAME, request_id, assignment)
                    .await?
                {
                    tracing::warn!(
                        "offer {} accepted but request {} is gone",
                        offer_id,
                        request_id
                    );
                    return Err(OfferError::RequestNotFound(request_id.to_string()));
                }
                tracing::info!("accepted offer {} on request {}", offer_id, request_id);
            }
        }

        Ok(())
    }

    async fn delete_offer(&self, request_id: &str, offer_id: &str) -> Result<bool, StoreError> {
        if self.get_offer(request_id, offer_id).await?.is_none() {
            return Ok(false);
        }
        self.delete(OFFER_COLLECTION_NAME, offer_id).await
    }
}
