use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::account::db::{problem, AccountCreateData, AccountDbExt, AccountUpdateData};
use crate::data::account::{
    is_valid_email, AccountResponse, STUDENT_COLLECTION_NAME, TUTOR_COLLECTION_NAME,
};
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::route::Created;
use crate::store::Store;

pub static TUTOR_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StudentResponse {
    pub student: AccountResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TutorResponse {
    pub tutor: AccountResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TutorSearchResponse {
    pub tutors: Vec<AccountResponse>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct EmailCheckData {
    pub email: Option<String>,
    /// `student` or `tutor`.
    pub user_type: Option<String>,
    /// Account being edited, ignored when looking for duplicates.
    #[serde(alias = "excludeId")]
    pub exclude_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EmailCheck {
    pub valid: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhoneCheckData {
    pub phone: Option<String>,
    pub phone_country_code: Option<String>,
    /// Account being edited, ignored when looking for duplicates.
    pub exclude_id: Option<String>,
    /// `students` or `tutors`. Role names are accepted too.
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PhoneCheck {
    pub success: bool,
    pub exists: bool,
    pub message: String,
}

fn account_collection(name: &str) -> Option<&'static str> {
    [STUDENT_COLLECTION_NAME, TUTOR_COLLECTION_NAME]
        .into_iter()
        .find(|it| *it == name)
        .or_else(|| name.parse::<Role>().ok().and_then(Role::account_collection))
}

async fn create_in(
    store: &Store,
    config: &Config,
    collection: &str,
    data: AccountCreateData,
    message: &str,
) -> Result<Json<Created>, Problem> {
    let id = store
        .create_account(collection, data, config.password_cost)
        .await?;
    Ok(Json(Created::new(id, message)))
}

async fn update_in(
    store: &Store,
    config: &Config,
    collection: &str,
    data: AccountUpdateData,
    message: &str,
) -> Result<Json<Created>, Problem> {
    let id = store
        .update_account(collection, data, config.password_cost)
        .await?;
    Ok(Json(Created::new(id, message)))
}

async fn account_in(store: &Store, collection: &str, id: &str) -> Result<AccountResponse, Problem> {
    store
        .get_account(collection, id)
        .await?
        .map(AccountResponse::from)
        .ok_or_else(|| problem::not_found(id))
}

#[utoipa::path(
    request_body = AccountCreateData,
    responses(
        (status = 200, body = Created),
        (status = 400, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/students/create", data = "<data>")]
#[tracing::instrument(skip(store, config))]
pub async fn student_create(
    data: Payload<AccountCreateData>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<Created>, Problem> {
    create_in(
        store,
        config,
        STUDENT_COLLECTION_NAME,
        data.into_inner(),
        "Student created successfully",
    )
    .await
}

#[utoipa::path(
    request_body = AccountCreateData,
    responses(
        (status = 200, body = Created),
        (status = 400, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/tutors/create", data = "<data>")]
#[tracing::instrument(skip(store, config))]
pub async fn tutor_create(
    data: Payload<AccountCreateData>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<Created>, Problem> {
    create_in(
        store,
        config,
        TUTOR_COLLECTION_NAME,
        data.into_inner(),
        "Tutor created successfully",
    )
    .await
}

#[utoipa::path(
    request_body = AccountUpdateData,
    responses(
        (status = 200, body = Created),
        (status = 400, body = Problem),
        (status = 404, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/students/update", data = "<data>")]
#[tracing::instrument(skip(store, config))]
pub async fn student_update(
    data: Payload<AccountUpdateData>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<Created>, Problem> {
    update_in(
        store,
        config,
        STUDENT_COLLECTION_NAME,
        data.into_inner(),
        "Student updated successfully",
    )
    .await
}

#[utoipa::path(
    request_body = AccountUpdateData,
    responses(
        (status = 200, body = Created),
        (status = 400, body = Problem),
        (status = 404, body = Problem),
        (status = 409, body = Problem)
    )
)]
#[post("/tutors/update", data = "<data>")]
#[tracing::instrument(skip(store, config))]
pub async fn tutor_update(
    data: Payload<AccountUpdateData>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<Created>, Problem> {
    update_in(
        store,
        config,
        TUTOR_COLLECTION_NAME,
        data.into_inner(),
        "Tutor updated successfully",
    )
    .await
}

/// Prefix search over tutor e-mails.
#[utoipa::path(
    params(("email" = String, Query, description = "Start of the e-mail address")),
    responses((status = 200, body = TutorSearchResponse), (status = 400, body = Problem))
)]
#[get("/tutors/search?<email>")]
#[tracing::instrument(skip(store))]
pub async fn tutor_search(
    email: Option<&str>,
    store: &State<Store>,
) -> Result<Json<TutorSearchResponse>, Problem> {
    let email = email
        .map(str::trim)
        .filter(|it| !it.is_empty())
        .ok_or_else(|| problems::bad_request("Email parameter is required"))?;

    let tutors = store
        .search_accounts_by_email(TUTOR_COLLECTION_NAME, email, TUTOR_SEARCH_LIMIT)
        .await?;
    Ok(Json(TutorSearchResponse {
        tutors: tutors.into_iter().map(AccountResponse::from).collect(),
    }))
}

#[utoipa::path(responses((status = 200, body = StudentResponse), (status = 404, body = Problem)))]
#[get("/students/<id>")]
#[tracing::instrument(skip(store))]
pub async fn student_get(id: &str, store: &State<Store>) -> Result<Json<StudentResponse>, Problem> {
    Ok(Json(StudentResponse {
        student: account_in(store, STUDENT_COLLECTION_NAME, id).await?,
    }))
}

#[utoipa::path(responses((status = 200, body = TutorResponse), (status = 404, body = Problem)))]
#[get("/tutors/<id>")]
#[tracing::instrument(skip(store))]
pub async fn tutor_get(id: &str, store: &State<Store>) -> Result<Json<TutorResponse>, Problem> {
    Ok(Json(TutorResponse {
        tutor: account_in(store, TUTOR_COLLECTION_NAME, id).await?,
    }))
}

/// Whether an e-mail is well formed and not used by another account of the
/// same kind.
#[utoipa::path(
    request_body = EmailCheckData,
    responses((status = 200, body = EmailCheck), (status = 400, body = Problem))
)]
#[post("/validate/email", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn validate_email(
    data: Payload<EmailCheckData>,
    store: &State<Store>,
) -> Result<Json<EmailCheck>, Problem> {
    let (email, user_type) = match (data.email.as_deref(), data.user_type.as_deref()) {
        (Some(email), Some(user_type)) if !email.trim().is_empty() => (email.trim(), user_type),
        _ => return Err(problems::bad_request("Email and user type are required")),
    };
    let collection = user_type
        .parse::<Role>()
        .ok()
        .and_then(Role::account_collection)
        .ok_or_else(|| problems::bad_request("User type must be student or tutor"))?;

    if !is_valid_email(email) {
        return Ok(Json(EmailCheck {
            valid: false,
            available: false,
        }));
    }

    let taken = store
        .account_field_taken(collection, "email", email, data.exclude_id.as_deref())
        .await?;
    Ok(Json(EmailCheck {
        valid: true,
        available: !taken,
    }))
}

/// Whether a phone number is already used by another account of the
/// collection.
#[utoipa::path(
    request_body = PhoneCheckData,
    responses((status = 200, body = PhoneCheck), (status = 400, body = Problem))
)]
#[post("/validate/phone", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn validate_phone(
    data: Payload<PhoneCheckData>,
    store: &State<Store>,
) -> Result<Json<PhoneCheck>, Problem> {
    let given = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|it| !it.is_empty())
            .map(str::to_string)
    };
    let (phone, collection) = match (given(&data.phone), given(&data.collection)) {
        (Some(phone), Some(collection)) => (phone, collection),
        _ => return Err(problems::bad_request("Phone and collection are required")),
    };
    let collection = account_collection(&collection)
        .ok_or_else(|| problems::bad_request("Collection must be students or tutors"))?;
    let country_code = given(&data.phone_country_code);

    let exists = store
        .phone_number_taken(
            collection,
            &phone,
            country_code.as_deref(),
            data.exclude_id.as_deref(),
        )
        .await?;
    tracing::debug!(
        "phone {}{} in {}: exists={}",
        country_code.as_deref().unwrap_or(""),
        phone,
        collection,
        exists
    );

    let message = if exists {
        format!("This phone number is already registered in {}", collection)
    } else {
        "Phone number is available".to_string()
    };
    Ok(Json(PhoneCheck {
        success: true,
        exists,
        message,
    }))
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

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

    #[rocket::async_test]
    async fn create_fetch_and_update_student() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");

        let (status, created) = post(
            &client,
            "/api/students/create",
            json!({"email": "sam@example.com", "password": "secret", "phone_number": "+100"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        let id = created["id"].as_str().unwrap().to_string();

        let response = client.get(format!("/api/students/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["student"]["email"], "sam@example.com");
        assert!(body["student"].get("password").is_none());
        assert!(body["student"].get("token").is_none());

        let (status, _) = post(
            &client,
            "/api/students/create",
            json!({"email": "sam@example.com", "password": "other"}),
        )
        .await;
        assert_eq!(status, Status::Conflict);

        let (status, _) = post(
            &client,
            "/api/students/update",
            json!({"id": id, "nickname": "sammy", "verified": "1"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        let response = client.get(format!("/api/students/{}", id)).dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["student"]["nickname"], "sammy");
        assert_eq!(body["student"]["verified"], "1");

        let (status, _) =
            post(&client, "/api/students/update", json!({"id": "missing", "nickname": "x"})).await;
        assert_eq!(status, Status::NotFound);

        let response = client.get(format!("/api/tutors/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn tutor_search_and_email_validation() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        for email in ["anna@example.com", "andy@example.com", "bob@example.com"] {
            let (status, _) = post(
                &client,
                "/api/tutors/create",
                json!({"email": email, "password": "secret"}),
            )
            .await;
            assert_eq!(status, Status::Ok);
        }

        let response = client.get("/api/tutors/search?email=an").dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["tutors"].as_array().unwrap().len(), 2);

        let response = client.get("/api/tutors/search").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);

        let (_, check) = post(
            &client,
            "/api/validate/email",
            json!({"email": "anna@example.com", "user_type": "tutor"}),
        )
        .await;
        assert_eq!(check, json!({"valid": true, "available": false}));

        let (_, check) = post(
            &client,
            "/api/validate/email",
            json!({"email": "anna@example.com", "user_type": "student"}),
        )
        .await;
        assert_eq!(check, json!({"valid": true, "available": true}));

        let (_, check) = post(
            &client,
            "/api/validate/email",
            json!({"email": "not-an-email", "user_type": "student"}),
        )
        .await;
        assert_eq!(check["valid"], false);

        let (status, _) = post(&client, "/api/validate/email", json!({"email": "x@y.co"})).await;
        assert_eq!(status, Status::BadRequest);
    }

    #[rocket::async_test]
    async fn phone_validation_respects_country_code_and_exclusion() {
        let client = Client::tracked(crate::test_app())
            .await
            .expect("invalid backend");
        let (_, created) = post(
            &client,
            "/api/tutors/create",
            json!({"email": "tia@example.com", "password": "secret", "phone_number": "5550100"}),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();

        let (status, check) = post(
            &client,
            "/api/validate/phone",
            json!({"phone": "5550100", "collection": "tutors"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(check["exists"], true);
        assert_eq!(check["message"], "This phone number is already registered in tutors");

        let (_, check) = post(
            &client,
            "/api/validate/phone",
            json!({"phone": "5550100", "collection": "tutors", "excludeId": id}),
        )
        .await;
        assert_eq!(check["exists"], false);

        let (_, check) = post(
            &client,
            "/api/validate/phone",
            json!({"phone": "5550100", "phoneCountryCode": "+44", "collection": "tutor"}),
        )
        .await;
        assert_eq!(check["exists"], false);

        let (_, check) = post(
            &client,
            "/api/validate/phone",
            json!({"phone": "5550100", "collection": "students"}),
        )
        .await;
        assert_eq!(
            check,
            json!({"success": true, "exists": false, "message": "Phone number is available"})
        );

        let (status, _) = post(&client, "/api/validate/phone", json!({"phone": "5550100"})).await;
        assert_eq!(status, Status::BadRequest);
        let (status, _) = post(
            &client,
            "/api/validate/phone",
            json!({"phone": "5550100", "collection": "users"}),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
    }
}
