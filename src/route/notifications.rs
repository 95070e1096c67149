use chrono::Utc;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::notification::db::NotificationDbExt;
use crate::data::notification::{
    AdminNotification, NotificationCreateData, NotificationUpdateData, DEFAULT_NOTIFICATION_LIMIT,
};
use crate::data::user_notification::db::{
    UserNotificationDbExt, UserNotificationFilter, UserNotificationPage,
};
use crate::data::user_notification::{
    UserNotification, UserNotificationCreateData, UserNotificationUpdateData,
};
use crate::resp::payload::Payload;
use crate::resp::problem::Problem;
use crate::route::Message;
use crate::store::Store;

pub mod problem {
    use crate::resp::problem::{problems, Problem};

    #[inline]
    pub fn not_found(id: impl ToString) -> Problem {
        problems::not_found("Notification not found")
            .insert_str("notificationId", id)
            .clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotificationList {
    pub notifications: Vec<AdminNotification>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotificationResponse {
    pub notification: AdminNotification,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MarkedSeen {
    pub message: String,
    pub count: u64,
}

#[utoipa::path(
    params(
        ("limit" = Option<usize>, Query, description = "Defaults to 50"),
        ("seen" = Option<bool>, Query, description = "Only seen or unseen entries")
    ),
    responses((status = 200, body = NotificationList))
)]
#[get("/admin-notifications?<limit>&<seen>")]
#[tracing::instrument(skip(store))]
pub async fn notification_list(
    limit: Option<usize>,
    seen: Option<bool>,
    store: &State<Store>,
) -> Result<Json<NotificationList>, Problem> {
    let limit = limit
        .filter(|it| *it > 0)
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT);
    Ok(Json(NotificationList {
        notifications: store.list_notifications(limit, seen).await?,
    }))
}

#[utoipa::path(
    request_body = NotificationCreateData,
    responses((status = 201, body = NotificationResponse), (status = 400, body = Problem))
)]
#[post("/admin-notifications", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn notification_create(
    data: Payload<NotificationCreateData>,
    store: &State<Store>,
) -> Result<(Status, Json<NotificationResponse>), Problem> {
    let mut notification = data.into_inner().into_notification(Utc::now())?;
    notification.id = store.create_notification(&notification).await?;
    tracing::debug!("created notification {}", notification.id);

    Ok((Status::Created, Json(NotificationResponse { notification })))
}

#[utoipa::path(
    request_body = NotificationUpdateData,
    responses((status = 200, body = Message), (status = 404, body = Problem))
)]
#[put("/admin-notifications/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn notification_update(
    id: &str,
    data: Payload<NotificationUpdateData>,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    if !store.update_notification(id, &data).await? {
        return Err(problem::not_found(id));
    }
    Ok(Json(Message::new("Notification updated successfully")))
}

#[utoipa::path(responses((status = 200, body = Message), (status = 404, body = Problem)))]
#[delete("/admin-notifications/<id>")]
#[tracing::instrument(skip(store))]
pub async fn notification_delete(id: &str, store: &State<Store>) -> Result<Json<Message>, Problem> {
    if !store.delete_notification(id).await? {
        return Err(problem::not_found(id));
    }
    Ok(Json(Message::new("Notification deleted successfully")))
}

#[utoipa::path(responses((status = 200, body = MarkedSeen)))]
#[post("/admin-notifications/mark-all-seen")]
#[tracing::instrument(skip(store))]
pub async fn notification_mark_all_seen(store: &State<Store>) -> Result<Json<MarkedSeen>, Problem> {
    let count = store.mark_all_notifications_seen().await?;
    tracing::info!("marked {} notifications seen", count);

    Ok(Json(MarkedSeen {
        message: "All notifications marked as seen".to_string(),
        count,
    }))
}

/// Push notification templates for students and tutors.
#[utoipa::path(
    params(UserNotificationFilter),
    responses((status = 200, body = UserNotificationPage), (status = 400, body = Problem))
)]
#[get("/notifications?<filter..>")]
#[tracing::instrument(skip(store))]
pub async fn user_notification_list(
    filter: UserNotificationFilter,
    store: &State<Store>,
) -> Result<Json<UserNotificationPage>, Problem> {
    Ok(Json(store.list_user_notifications(&filter).await?))
}

#[utoipa::path(
    request_body = UserNotificationCreateData,
    responses((status = 201, body = UserNotification), (status = 400, body = Problem))
)]
#[post("/notifications", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn user_notification_create(
    data: Payload<UserNotificationCreateData>,
    store: &State<Store>,
) -> Result<(Status, Json<UserNotification>), Problem> {
    let mut notification = data.into_inner().into_notification(Utc::now())?;
    notification.id = store.create_user_notification(&notification).await?;

    Ok((Status::Created, Json(notification)))
}

#[utoipa::path(responses((status = 200, body = UserNotification), (status = 404, body = Problem)))]
#[get("/notifications/<id>")]
#[tracing::instrument(skip(store))]
pub async fn user_notification_get(
    id: &str,
    store: &State<Store>,
) -> Result<Json<UserNotification>, Problem> {
    store
        .get_user_notification(id)
        .await?
        .map(Json)
        .ok_or_else(|| problem::not_found(id))
}

/// Writes the present fields and returns the updated notification.
#[utoipa::path(
    request_body = UserNotificationUpdateData,
    responses((status = 200, body = UserNotification), (status = 404, body = Problem))
)]
#[put("/notifications/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn user_notification_update(
    id: &str,
    data: Payload<UserNotificationUpdateData>,
    store: &State<Store>,
) -> Result<Json<UserNotification>, Problem> {
    if !store.update_user_notification(id, &data).await? {
        return Err(problem::not_found(id));
    }
    store
        .get_user_notification(id)
        .await?
        .map(Json)
        .ok_or_else(|| problem::not_found(id))
}

#[utoipa::path(responses((status = 200, body = Message), (status = 404, body = Problem)))]
#[delete("/notifications/<id>")]
#[tracing::instrument(skip(store))]
pub async fn user_notification_delete(
    id: &str,
    store: &State<Store>,
) -> Result<Json<Message>, Problem> {
    if !store.delete_user_notification(id).await? {
        return Err(problem::not_found(id));
    }
    Ok(Json(Message::new("Notification deleted successfully")))
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

    async fn create(client: &Client, message: &str) -> String {
        let response = client
            .post("/api/admin-notifications")
            .header(ContentType::JSON)
            .body(
                json!({
                    "type": "chat_message",
                    "requestId": "r1",
                    "senderType": "student",
                    "senderId": "s1",
                    "senderNickname": "sam",
                    "message": message
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(
            body["notification"]["content"],
            format!("sam sent a message: \"{}\"", message)
        );
        body["notification"]["id"].as_str().unwrap().to_string()
    }

    async fn feed(client: &Client, query: &str) -> Vec<Value> {
        let response = client
            .get(format!("/api/admin-notifications{}", query))
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        body["notifications"].as_array().unwrap().clone()
    }

    #[rocket::async_test]
    async fn feed_lifecycle() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        let first = create(&client, "one").await;
        create(&client, "two").await;
        create(&client, "three").await;

        let all = feed(&client, "").await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0]["message"], "three");
        assert_eq!(feed(&client, "?limit=2").await.len(), 2);

        let response = client
            .put(format!("/api/admin-notifications/{}", first))
            .header(ContentType::JSON)
            .body(json!({"seen": true}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(feed(&client, "?seen=false").await.len(), 2);

        let response = client
            .post("/api/admin-notifications/mark-all-seen")
            .dispatch()
            .await;
        let marked: Value = response.into_json().await.unwrap();
        assert_eq!(marked["count"], 2);
        assert!(feed(&client, "?seen=false").await.is_empty());

        let response = client
            .delete(format!("/api/admin-notifications/{}", first))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let response = client
            .put(format!("/api/admin-notifications/{}", first))
            .header(ContentType::JSON)
            .body(json!({"seen": false}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn create_requires_sender_and_message() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");

        let response = client
            .post("/api/admin-notifications")
            .header(ContentType::JSON)
            .body(json!({"type": "chat_message", "requestId": "r1"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "Missing required fields");
    }

    async fn create_template(client: &Client, body: Value) -> (Status, Value) {
        let response = client
            .post("/api/notifications")
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap_or(Value::Null))
    }

    fn template(title: &str, user_type: &str) -> Value {
        json!({
            "title": title,
            "body": format!("{} body", title),
            "type": "STUDENTACCEPTBID",
            "userType": user_type,
            "requestType": "HOMEWORK"
        })
    }

    #[rocket::async_test]
    async fn user_notification_lifecycle() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");

        let (status, created) = create_template(&client, template("Bid accepted", "TUTOR")).await;
        assert_eq!(status, Status::Created);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["createdAt"], created["updatedAt"]);

        let response = client.get(format!("/api/notifications/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let fetched: Value = response.into_json().await.unwrap();
        assert_eq!(fetched["userType"], "TUTOR");

        let response = client
            .put(format!("/api/notifications/{}", id))
            .header(ContentType::JSON)
            .body(json!({"title": "Your bid won", "requestType": "SOS"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: Value = response.into_json().await.unwrap();
        assert_eq!(updated["title"], "Your bid won");
        assert_eq!(updated["requestType"], "SOS");
        assert_eq!(updated["body"], "Bid accepted body");

        let response = client.delete(format!("/api/notifications/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.get(format!("/api/notifications/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        let response = client
            .put(format!("/api/notifications/{}", id))
            .header(ContentType::JSON)
            .body(json!({"title": "gone"}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn user_notifications_filter_and_page() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        for (title, user_type) in [
            ("Bid accepted", "TUTOR"),
            ("Request paid", "TUTOR"),
            ("Request created", "STUDENT"),
        ] {
            let (status, _) = create_template(&client, template(title, user_type)).await;
            assert_eq!(status, Status::Created);
        }

        let response = client
            .get("/api/notifications?userType=TUTOR&limit=1&page=2")
            .dispatch()
            .await;
        let page: Value = response.into_json().await.unwrap();
        assert_eq!(page["total"], 2);
        assert_eq!(page["page"], 2);
        assert_eq!(page["limit"], 1);
        assert_eq!(page["notifications"].as_array().unwrap().len(), 1);

        let response = client.get("/api/notifications?search=PAID").dispatch().await;
        let page: Value = response.into_json().await.unwrap();
        assert_eq!(page["total"], 3);
        assert_eq!(page["notifications"][0]["title"], "Request paid");

        let response = client
            .get("/api/notifications?type=TUTORBIDREQUEST")
            .dispatch()
            .await;
        let page: Value = response.into_json().await.unwrap();
        assert_eq!(page["total"], 0);

        let response = client
            .get("/api/notifications?startDate=2000-01-01&requestType=HOMEWORK")
            .dispatch()
            .await;
        let page: Value = response.into_json().await.unwrap();
        assert_eq!(page["total"], 3);

        let response = client.get("/api/notifications?endDate=soon").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn user_notification_create_checks_fields() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");

        let (status, body) =
            create_template(&client, json!({"title": "Hi", "body": "There"})).await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["error"], "Missing required fields");

        let (status, _) = create_template(&client, template("Hi", "PARENT")).await;
        assert_eq!(status, Status::BadRequest);
    }
}
