use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::tokio::io::AsyncReadExt;
use rocket::State;

use crate::data::request::db::RequestDbExt;
use crate::data::request::Request;
use crate::resp::payload::Payload;
use crate::resp::problem::{problems, Problem};
use crate::route::requests::problem as request_problem;
use crate::storage::{Bucket, UploadedFile};
use crate::store::Store;

#[derive(Debug, FromForm)]
pub struct FileUpload<'r> {
    pub file: Option<TempFile<'r>>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoragePathData {
    pub storage_path: Option<String>,
}

impl StoragePathData {
    fn path(&self) -> Result<&str, Problem> {
        self.storage_path
            .as_deref()
            .filter(|it| !it.is_empty())
            .ok_or_else(|| problems::bad_request("Storage path is required"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileDeleted {
    pub message: String,
    pub deleted_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestFileDeleted {
    pub message: String,
    pub deleted_path: String,
    pub request: Request,
}

async fn read_upload(file: &TempFile<'_>) -> Result<Vec<u8>, Problem> {
    let mut data = Vec::with_capacity(file.len() as usize);
    let reader = file.open().await?;
    rocket::tokio::pin!(reader);
    reader.read_to_end(&mut data).await?;
    Ok(data)
}

/// Stores a multipart `file` field in the bucket.
#[utoipa::path(
    request_body(content = String, content_type = "multipart/form-data", description = "Form with a `file` field"),
    responses((status = 200, body = UploadedFile), (status = 400, body = Problem))
)]
#[post("/upload", data = "<upload>")]
#[tracing::instrument(skip(upload, bucket))]
pub async fn upload_file(
    upload: Option<Form<FileUpload<'_>>>,
    bucket: &State<Bucket>,
) -> Result<Json<UploadedFile>, Problem> {
    let file = upload
        .as_ref()
        .and_then(|it| it.file.as_ref())
        .filter(|it| it.len() > 0)
        .ok_or_else(|| problems::bad_request("No file provided"))?;

    let file_name = file
        .raw_name()
        .map(|it| it.dangerous_unsafe_unsanitized_raw().as_str());
    let data = read_upload(file).await?;

    Ok(Json(bucket.upload(file_name, data).await?))
}

#[utoipa::path(
    request_body = StoragePathData,
    responses((status = 200, body = FileDeleted), (status = 400, body = Problem))
)]
#[post("/delete-file", data = "<data>")]
#[tracing::instrument(skip(bucket))]
pub async fn delete_file(
    data: Payload<StoragePathData>,
    bucket: &State<Bucket>,
) -> Result<Json<FileDeleted>, Problem> {
    let storage_path = data.path()?;
    let key = bucket.delete(storage_path).await?;
    tracing::info!("deleted object {}", key);

    Ok(Json(FileDeleted {
        message: "File deleted successfully".to_string(),
        deleted_path: storage_path.to_string(),
    }))
}

/// Deletes an attachment of a request, then drops it from the request's file
/// lists. The two steps are not atomic.
#[utoipa::path(
    request_body = StoragePathData,
    responses(
        (status = 200, body = RequestFileDeleted),
        (status = 400, body = Problem),
        (status = 404, body = Problem)
    )
)]
#[post("/requests/<id>/files/delete", data = "<data>")]
#[tracing::instrument(skip(store, bucket))]
pub async fn request_file_delete(
    id: &str,
    data: Payload<StoragePathData>,
    store: &State<Store>,
    bucket: &State<Bucket>,
) -> Result<Json<RequestFileDeleted>, Problem> {
    let storage_path = data.path()?;
    if store.get_request(id).await?.is_none() {
        return Err(request_problem::not_found(id));
    }

    bucket.delete(storage_path).await?;
    let request = store
        .remove_request_file(id, storage_path)
        .await?
        .ok_or_else(|| request_problem::not_found(id))?;

    Ok(Json(RequestFileDeleted {
        message: "File deleted successfully".to_string(),
        deleted_path: storage_path.to_string(),
        request,
    }))
}
