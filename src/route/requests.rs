use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::request::action::RequestAction;
use crate::data::request::db::{RequestDbExt, RequestFilter, RequestPage};
use crate::data::request::{Request, RequestCreateData, RequestUpdateData};
use crate::middleware::paging::PageState;
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::route::{Created, Message};
use crate::store::Store;

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found(id: impl ToString) -> Problem {
        problems::not_found("Request not found")
            .insert_str("requestId", id)
            .clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RequestResponse {
    pub request: Request,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct TutorPaidData {
    /// `"0"` or `"1"`.
    #[schema(value_type = Option<String>)]
    pub tutor_paid: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TutorPaidResponse {
    pub message: String,
    pub tutor_paid: String,
}

#[utoipa::path(
    params(RequestFilter),
    responses((status = 200, body = RequestPage), (status = 500, body = Problem))
)]
#[get("/requests?<filter..>")]
#[tracing::instrument(skip(store))]
pub async fn request_list(
    filter: RequestFilter,
    page: PageState,
    store: &State<Store>,
) -> Result<Json<RequestPage>, Problem> {
    Ok(Json(store.list_requests(&filter, &page).await?))
}

#[utoipa::path(
    request_body = RequestCreateData,
    responses((status = 200, body = Created), (status = 400, body = Problem))
)]
#[post("/requests", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn request_create(
    data: Payload<RequestCreateData>,
    store: &State<Store>,
) -> Result<Json<Created>, Problem> {
    let request = Request::create(data.into_inner(), Utc::now())
        .map_err(|e| problems::bad_request("Invalid deadline").detail(e).clone())?;

    let id = store.create_request(&request).await?;
    Ok(Json(Created::new(id, "Request created successfully")))
}

#[utoipa::path(responses((status = 200, body = RequestResponse), (status = 404, body = Problem)))]
#[get("/requests/<id>")]
#[tracing::instrument(skip(store))]
pub async fn request_get(id: &str, store: &State<Store>) -> Result<Json<RequestResponse>, Problem> {
    let request = store
        .get_request(id)
        .await?
        .ok_or_else(|| problem::not_found(id))?;
    Ok(Json(RequestResponse { request }))
}

#[utoipa::path(
    request_body = RequestUpdateData,
    responses((status = 200, body = Message), (status = 404, body = Problem))
)]
#[put("/requests/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn request_update(
    id: &str,
    data: Payload<RequestUpdateData>,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    let patch = data
        .to_patch(&Utc::now())
        .map_err(|e| problems::bad_request("Invalid request update").detail(e).clone())?;

    if !store.update_request(id, patch).await? {
        return Err(problem::not_found(id));
    }
    Ok(Json(Message::new("Request updated successfully")))
}

#[utoipa::path(responses((status = 200, body = Message)))]
#[delete("/requests/<id>")]
#[tracing::instrument(skip(store))]
pub async fn request_delete(id: &str, store: &State<Store>) -> Result<Json<Message>, Problem> {
    if !store.delete_request(id).await? {
        tracing::debug!("request {} was already deleted", id);
    }
    Ok(Json(Message::new("Request deleted successfully")))
}

#[utoipa::path(
    request_body = RequestAction,
    responses(
        (status = 200, body = Message),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/requests/<id>/actions", data = "<action>")]
#[tracing::instrument(skip(store))]
pub async fn request_action(
    id: &str,
    action: Payload<RequestAction>,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    if !store.apply_request_action(id, &action).await? {
        return Err(problem::not_found(id));
    }
    tracing::info!("applied {} to request {}", action.name(), id);
    Ok(Json(Message::new("Action completed successfully")))
}

#[utoipa::path(
    request_body = TutorPaidData,
    responses(
        (status = 200, body = TutorPaidResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[put("/requests/<id>/tutor-paid", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn request_tutor_paid(
    id: &str,
    data: Payload<TutorPaidData>,
    store: &State<Store>,
) -> Result<Json<TutorPaidResponse>, Problem> {
    let tutor_paid = match data.tutor_paid.as_ref().and_then(|it| it.as_str()) {
        Some("1") => true,
        Some("0") => false,
        _ => return Err(problems::bad_request("tutor_paid must be \"0\" or \"1\"")),
    };

    if !store.set_tutor_paid(id, tutor_paid).await? {
        return Err(problem::not_found(id));
    }

    let (flag, state) = if tutor_paid { ("1", "paid") } else { ("0", "pending") };
    Ok(Json(TutorPaidResponse {
        message: format!("Tutor payment status updated to {}", state),
        tutor_paid: flag.to_string(),
    }))
}
