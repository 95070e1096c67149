use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::promo::db::{problem, PromoDbExt, PromoFilter};
use crate::data::promo::{PromoCode, PromoCreateData, PromoRedeemData, PromoUpdateData};
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::route::{Created, Message};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PromoList {
    pub promo_codes: Vec<PromoCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PromoResponse {
    pub promo_code: PromoCode,
}

#[utoipa::path(
    params(PromoFilter),
    responses((status = 200, body = PromoList), (status = 400, body = Problem))
)]
#[get("/promo-codes?<filter..>")]
#[tracing::instrument(skip(store))]
pub async fn promo_list(filter: PromoFilter, store: &State<Store>) -> Result<Json<PromoList>, Problem> {
    Ok(Json(PromoList {
        promo_codes: store.list_promos(&filter).await?,
    }))
}

#[utoipa::path(
    request_body = PromoCreateData,
    responses(
        (status = 200, body = Created),
        (status = 400, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/promo-codes", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn promo_create(
    data: Payload<PromoCreateData>,
    store: &State<Store>,
) -> Result<Json<Created>, Problem> {
    let promo = data.into_inner().into_promo(Utc::now())?;
    let id = store.create_promo(&promo).await?;
    tracing::info!("created promo code {} ({})", promo.code, id);

    Ok(Json(Created::new(id, "Promo code created successfully")))
}

#[utoipa::path(
    request_body = PromoUpdateData,
    responses(
        (status = 200, body = Message),
        (status = 404, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[put("/promo-codes/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn promo_update(
    id: &str,
    data: Payload<PromoUpdateData>,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    store.update_promo(id, &data).await?;
    Ok(Json(Message::new("Promo code updated successfully")))
}

#[utoipa::path(responses((status = 200, body = Message), (status = 404, body = Problem)))]
#[delete("/promo-codes/<id>")]
#[tracing::instrument(skip(store))]
pub async fn promo_delete(id: &str, store: &State<Store>) -> Result<Json<Message>, Problem> {
    if !store.delete_promo(id).await? {
        return Err(problem::not_found(id));
    }
    Ok(Json(Message::new("Promo code deleted successfully")))
}

/// Records one use of the code by a student.
#[utoipa::path(
    request_body = PromoRedeemData,
    responses(
        (status = 200, body = PromoResponse),
        (status = 400, body = Problem),
        (status = 404, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/promo-codes/<id>/redeem", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn promo_redeem(
    id: &str,
    data: Payload<PromoRedeemData>,
    store: &State<Store>,
) -> Result<Json<PromoResponse>, Problem> {
    let student_id = data
        .student_id
        .as_deref()
        .filter(|it| !it.is_empty())
        .ok_or_else(|| problems::bad_request("Student ID is required"))?;
    let email = data.email.as_deref().unwrap_or_default();

    let promo_code = store.redeem_promo(id, student_id, email).await?;
    Ok(Json(PromoResponse { promo_code }))
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

    async fn send(client: &Client, put: bool, uri: String, body: Value) -> (Status, Value) {
        let request = if put { client.put(uri) } else { client.post(uri) };
        let response = request
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap_or(Value::Null))
    }

    #[rocket::async_test]
    async fn promo_lifecycle() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");

        let (status, created) = send(
            &client,
            false,
            "/api/promo-codes".to_string(),
            json!({"code": "SUMMER", "type": "event", "discount": 10.5, "max_usage_times": 2, "max_usage_per_user": 1}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &client,
            false,
            "/api/promo-codes".to_string(),
            json!({"code": " SUMMER "}),
        )
        .await;
        assert_eq!(status, Status::Conflict);

        let response = client.get("/api/promo-codes?type=EVENT&is_active=1").dispatch().await;
        let list: Value = response.into_json().await.unwrap();
        assert_eq!(list["promo_codes"][0]["code"], "SUMMER");

        let (status, redeemed) = send(
            &client,
            false,
            format!("/api/promo-codes/{}/redeem", id),
            json!({"student_id": "s1", "email": "s1@example.com"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(redeemed["promo_code"]["current_usage"], 1);

        let (status, _) = send(
            &client,
            false,
            format!("/api/promo-codes/{}/redeem", id),
            json!({"student_id": "s1", "email": "s1@example.com"}),
        )
        .await;
        assert_eq!(status, Status::Conflict);

        let (status, _) = send(
            &client,
            true,
            format!("/api/promo-codes/{}", id),
            json!({"is_active": "0"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        let (status, _) = send(
            &client,
            false,
            format!("/api/promo-codes/{}/redeem", id),
            json!({"student_id": "s2"}),
        )
        .await;
        assert_eq!(status, Status::Conflict);

        let response = client.delete(format!("/api/promo-codes/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.delete(format!("/api/promo-codes/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn invalid_filters_and_missing_codes() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");

        let response = client.get("/api/promo-codes?is_active=maybe").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);

        let (status, _) =
            send(&client, false, "/api/promo-codes".to_string(), json!({"discount": 5})).await;
        assert_eq!(status, Status::BadRequest);

        let (status, _) = send(
            &client,
            true,
            "/api/promo-codes/missing".to_string(),
            json!({"discount": 5}),
        )
        .await;
        assert_eq!(status, Status::NotFound);
    }
}
