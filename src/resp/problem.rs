use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::hyper::header::CONTENT_LANGUAGE;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::store::StoreError;

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
///
/// The rendered body also carries an `error` member holding the title, which
/// is what the admin dashboard displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, type_uri: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: type_uri.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: "about:blank".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn instance_uri(&mut self, value: String) -> &mut Problem {
        self.instance_uri = Some(value);
        self
    }

    pub fn insert_json_value(&mut self, key: impl ToString, value: Value) -> &mut Problem {
        self.body.insert(key.to_string(), value);
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Rendered JSON body.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut body = self.body.clone();

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri.clone()));
        body.insert(String::from("title"), Value::from(self.title.clone()));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = &self.detail {
            body.insert(String::from("detail"), Value::from(detail.clone()));
        }
        body.insert(String::from("status"), Value::from(self.status.code));
        if let Some(instance) = &self.instance_uri {
            body.insert(String::from("instance"), Value::from(instance.clone()));
        }

        body.insert(String::from("error"), Value::from(self.title.clone()));
        body
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body_string = Value::Object(self.to_json()).to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header(CONTENT_LANGUAGE.as_str(), "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

/// Problem a request guard failed with. Catchers only receive the status, so
/// guards leave the full problem in the request-local cache.
#[derive(Debug, Clone, Default)]
pub struct GuardProblem(pub Option<Problem>);

impl GuardProblem {
    pub fn remember(req: &Request<'_>, problem: Problem) -> (Status, Problem) {
        req.local_cache(|| GuardProblem(Some(problem.clone())));
        (problem.status, problem)
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn bad_request(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, title)
    }

    #[inline]
    pub fn not_found(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::NotFound, title)
    }

    #[inline]
    pub fn conflict(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::Conflict, title)
    }

    #[inline]
    pub fn internal(title: impl ToString) -> Problem {
        Problem::new_untyped(Status::InternalServerError, title)
    }

    #[inline]
    pub fn invalid_action() -> Problem {
        bad_request("Invalid action")
    }

    #[inline]
    pub fn missing_fields() -> Problem {
        bad_request("Required fields missing")
    }
}

impl From<StoreError> for Problem {
    fn from(e: StoreError) -> Self {
        tracing::error!("document store error: {}", e);

        match &e {
            StoreError::PermissionDenied(_) => {
                Problem::new_untyped(Status::Forbidden, "Permission denied").detail(&e).clone()
            }
            StoreError::NotFound(_) => {
                Problem::new_untyped(Status::NotFound, "Document not found").detail(&e).clone()
            }
            StoreError::Unavailable(_) => Problem::new_untyped(
                Status::ServiceUnavailable,
                "Service temporarily unavailable",
            )
            .detail(&e)
            .clone(),
            StoreError::Decode(_) | StoreError::Encode(_) => Problem::new_untyped(
                Status::InternalServerError,
                "An error occurred while processing stored data.",
            )
            .detail(&e)
            .clone(),
            StoreError::Backend(message) => {
                Problem::new_untyped(Status::InternalServerError, message)
            }
        }
    }
}

impl From<serde_json::Error> for Problem {
    fn from(_: serde_json::Error) -> Self {
        Problem::new_untyped(
            Status::InternalServerError,
            "An error occurred while processing JSON data.",
        )
    }
}

impl From<std::io::Error> for Problem {
    fn from(e: std::io::Error) -> Self {
        Problem::new_untyped(Status::InternalServerError, "Server IO error")
            .detail(e)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::PermissionDenied("x".into()), Status::Forbidden),
            (StoreError::NotFound("x".into()), Status::NotFound),
            (StoreError::Unavailable("x".into()), Status::ServiceUnavailable),
            (StoreError::Backend("boom".into()), Status::InternalServerError),
        ];

        for (error, status) in cases {
            assert_eq!(Problem::from(error).status, status);
        }
    }

    #[test]
    fn backend_message_is_exposed() {
        let problem = Problem::from(StoreError::Backend("disk full".into()));
        let body = problem.to_json();
        assert_eq!(body["error"], "disk full");
        assert_eq!(body["status"], 500);
    }
}
