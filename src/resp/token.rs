use rocket::http::Status;
use rocket::outcome::Outcome::{Error, Success};
use rocket::request::{self, FromRequest, Request};

use crate::resp::problem::{GuardProblem, Problem};

pub static TOKEN_HEADER_NAME: &str = "token";

/// Account token sent by student and tutor clients in the `token` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountToken(pub String);

pub fn missing_token_problem() -> Problem {
    Problem::new_untyped(Status::BadRequest, "User type and token are required")
        .detail("No account token header.")
        .clone()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AccountToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        tracing::trace!("extracting account token from request headers");
        match req
            .headers()
            .get_one(TOKEN_HEADER_NAME)
            .map(str::trim)
            .filter(|it| !it.is_empty())
        {
            Some(token) => Success(AccountToken(token.to_string())),
            None => {
                tracing::debug!("request has no account token header");
                Error(GuardProblem::remember(req, missing_token_problem()))
            }
        }
    }
}
