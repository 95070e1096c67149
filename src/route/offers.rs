use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::offer::db::{OfferDbExt, OfferError};
use crate::data::offer::{OfferAction, OfferCreateData, TutorOffer};
use crate::data::request::db::RequestDbExt;
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::route::requests::problem as request_problem;
use crate::route::{Created, Message};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OfferList {
    pub offers: Vec<TutorOffer>,
}

#[utoipa::path(responses((status = 200, body = OfferList)))]
#[get("/requests/<id>/tutor-offers")]
#[tracing::instrument(skip(store))]
pub async fn offer_list(id: &str, store: &State<Store>) -> Result<Json<OfferList>, Problem> {
    Ok(Json(OfferList {
        offers: store.list_offers(id).await?,
    }))
}

#[utoipa::path(
    request_body = OfferCreateData,
    responses(
        (status = 200, body = Created),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/requests/<id>/tutor-offers", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn offer_create(
    id: &str,
    data: Payload<OfferCreateData>,
    store: &State<Store>,
) -> Result<Json<Created>, Problem> {
    let given = |it: &Option<String>| {
        it.as_deref()
            .map(str::trim)
            .filter(|it| !it.is_empty())
            .map(str::to_string)
    };
    let (tutor_id, price) = match (given(&data.tutor_id), given(&data.price)) {
        (Some(tutor_id), Some(price)) => (tutor_id, price),
        _ => return Err(problems::bad_request("Tutor ID and price are required")),
    };

    if store.get_request(id).await?.is_none() {
        return Err(request_problem::not_found(id));
    }

    let offer = TutorOffer::new(id, tutor_id, price, Utc::now());
    let offer_id = store.create_offer(&offer).await?;

    Ok(Json(Created::new(offer_id, "Tutor offer created successfully")))
}

#[utoipa::path(
    request_body = OfferAction,
    responses(
        (status = 200, body = Message),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[put("/requests/<id>/tutor-offers/<offer_id>", data = "<action>")]
#[tracing::instrument(skip(store))]
pub async fn offer_action(
    id: &str,
    offer_id: &str,
    action: Payload<OfferAction>,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    store
        .apply_offer_action(id, offer_id, &action)
        .await
        .map_err(Problem::from)?;
    Ok(Json(Message::new("Action completed successfully")))
}

#[utoipa::path(responses((status = 200, body = Message), (status = 404, body = Problem)))]
#[delete("/requests/<id>/tutor-offers/<offer_id>")]
#[tracing::instrument(skip(store))]
pub async fn offer_delete(
    id: &str,
    offer_id: &str,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    if !store.delete_offer(id, offer_id).await? {
        return Err(OfferError::OfferNotFound(offer_id.to_string()).into());
    }
    Ok(Json(Message::new("Tutor offer deleted successfully")))
}
