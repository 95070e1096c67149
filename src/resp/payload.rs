use rocket::data::{self, Data, FromData, Limits};
use rocket::http::Status;
use rocket::outcome::Outcome::{Error, Success};
use rocket::Request;
use serde::de::DeserializeOwned;

use crate::resp::problem::{problems, GuardProblem, Problem};

/// JSON request body.
///
/// Unlike `rocket::serde::json::Json` every parse failure, including an
/// unknown `action` tag, is answered with 400.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned + Send> FromData<'r> for Payload<T> {
    type Error = Problem;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or(Limits::JSON);
        let raw = match data.open(limit).into_string().await {
            Ok(it) if it.is_complete() => it.into_inner(),
            Ok(_) => {
                return Error(GuardProblem::remember(
                    req,
                    Problem::new_untyped(Status::PayloadTooLarge, "Payload too large"),
                ))
            }
            Err(e) => {
                return Error(GuardProblem::remember(
                    req,
                    problems::bad_request("Unable to read request body")
                        .detail(e)
                        .clone(),
                ))
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Success(Payload(value)),
            Err(e) => {
                tracing::debug!("rejected request payload: {}", e);
                Error(GuardProblem::remember(
                    req,
                    problems::bad_request("Invalid request payload")
                        .detail(e)
                        .clone(),
                ))
            }
        }
    }
}

