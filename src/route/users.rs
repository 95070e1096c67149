use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::staff::db::{StaffCreateData, StaffDbExt, StaffDeleteData, StaffUpdateData};
use crate::identity::Identities;
use crate::resp::payload::Payload;
use crate::resp::problem::Problem;
use crate::store::Store;

/// Reply of the staff user endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserChanged {
    pub user_id: String,
    pub message: String,
}

impl UserChanged {
    fn new(user_id: String, message: &str) -> Json<UserChanged> {
        Json(UserChanged {
            user_id,
            message: message.to_string(),
        })
    }
}

#[utoipa::path(
    request_body = StaffCreateData,
    responses(
        (status = 200, body = UserChanged),
        (status = 400, body = Problem),
        (status = 409, body = Problem),
        (status = 500, body = Problem)
    )
)]
#[post("/users/create", data = "<data>")]
#[tracing::instrument(skip(store, identities, config))]
pub async fn user_create(
    data: Payload<StaffCreateData>,
    store: &State<Store>,
    identities: &State<Identities>,
    config: &State<Config>,
) -> Result<Json<UserChanged>, Problem> {
    let id = store
        .create_staff_user(identities.provider(), data.into_inner(), config.password_cost)
        .await?;
    Ok(UserChanged::new(id, "User created successfully"))
}

#[utoipa::path(
    request_body = StaffUpdateData,
    responses(
        (status = 200, body = UserChanged),
        (status = 400, body = Problem),
        (status = 404, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/users/update", data = "<data>")]
#[tracing::instrument(skip(store, identities, config))]
pub async fn user_update(
    data: Payload<StaffUpdateData>,
    store: &State<Store>,
    identities: &State<Identities>,
    config: &State<Config>,
) -> Result<Json<UserChanged>, Problem> {
    let id = store
        .update_staff_user(identities.provider(), data.into_inner(), config.password_cost)
        .await?;
    Ok(UserChanged::new(id, "User updated successfully"))
}

/// Soft deletes a staff user and deactivates their role grants.
#[utoipa::path(
    request_body = StaffDeleteData,
    responses(
        (status = 200, body = UserChanged),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/users/delete", data = "<data>")]
#[tracing::instrument(skip(store, identities))]
pub async fn user_delete(
    data: Payload<StaffDeleteData>,
    store: &State<Store>,
    identities: &State<Identities>,
) -> Result<Json<UserChanged>, Problem> {
    let id = store
        .delete_staff_user(identities.provider(), data.into_inner().user_id)
        .await?;
    Ok(UserChanged::new(id, "User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

    use crate::data::staff::db::StaffDbExt;
    use crate::store::Store;

    async fn post(client: &Client, uri: &str, body: Value) -> (Status, Value) {
        let response = client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json().await.unwrap_or(Value::Null))
    }

    async fn create_ops(client: &Client) -> String {
        let (status, body) = post(
            client,
            "/api/users/create",
            json!({"email": "ops@example.com", "password": "secret", "displayName": "Ops"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["message"], "User created successfully");
        body["userId"].as_str().unwrap().to_string()
    }

    #[rocket::async_test]
    async fn create_stores_hashed_staff_user() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        let id = create_ops(&client).await;

        let store = client.rocket().state::<Store>().unwrap();
        let user = store.get_staff_user(&id).await.unwrap().unwrap();
        assert_eq!(user.email, "ops@example.com");
        assert!(bcrypt::verify("secret", &user.password).unwrap());
        assert!(user.is_active);

        let (status, body) = post(
            &client,
            "/api/users/create",
            json!({"email": "ops@example.com"}),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["title"], "Password is required");

        let (status, _) = post(
            &client,
            "/api/users/create",
            json!({"email": "ops-at-example", "password": "secret"}),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
    }

    #[rocket::async_test]
    async fn duplicate_staff_email_conflicts() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        let first = create_ops(&client).await;

        let (status, body) = post(
            &client,
            "/api/users/create",
            json!({"email": "ops@example.com", "password": "other"}),
        )
        .await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body["title"], "A user with this email already exists");

        let (status, body) = post(
            &client,
            "/api/users/create",
            json!({"email": "lead@example.com", "password": "secret"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        let second = body["userId"].as_str().unwrap().to_string();

        let (status, body) = post(
            &client,
            "/api/users/update",
            json!({"userId": second, "email": "ops@example.com"}),
        )
        .await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body["title"], "Email already exists for another user");

        let (status, _) = post(
            &client,
            "/api/users/update",
            json!({"userId": first, "email": "ops@example.com"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
    }

    #[rocket::async_test]
    async fn update_changes_profile_and_password() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        let id = create_ops(&client).await;

        let (status, body) = post(
            &client,
            "/api/users/update",
            json!({
                "userId": id,
                "displayName": "Operations",
                "password": "rotated",
                "phoneNumber": "",
                "sendNotifications": false
            }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["message"], "User updated successfully");

        let store = client.rocket().state::<Store>().unwrap();
        let user = store.get_staff_user(&id).await.unwrap().unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Operations"));
        assert!(user.phone_number.is_none());
        assert!(!user.send_notifications);
        assert!(bcrypt::verify("rotated", &user.password).unwrap());

        let (status, body) = post(&client, "/api/users/update", json!({"displayName": "x"})).await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["title"], "User ID is required");
    }

    #[rocket::async_test]
    async fn delete_soft_deletes_and_frees_the_email() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        let id = create_ops(&client).await;

        let (status, body) = post(&client, "/api/users/delete", json!({"userId": id})).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["message"], "User deleted successfully");

        let store = client.rocket().state::<Store>().unwrap();
        let user = store.get_staff_user(&id).await.unwrap().expect("document is kept");
        assert!(user.deleted_at.is_some());

        create_ops(&client).await;

        let (status, _) = post(&client, "/api/users/delete", json!({})).await;
        assert_eq!(status, Status::BadRequest);
        let (status, _) = post(&client, "/api/users/delete", json!({"userId": "missing"})).await;
        assert_eq!(status, Status::NotFound);
    }
}
