use moneydesk_rs_core::RouterError;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Request, catch};
use serde_json::json;

/// JSON error body: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(Status::Unauthorized, "missing user identity")
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        let status = if err.is_validation() {
            Status::BadRequest
        } else {
            Status::InternalServerError
        };
        Self::new(status, err.public_message())
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        (self.status, Json(json!({ "error": self.message }))).respond_to(request)
    }
}

#[catch(400)]
pub fn bad_request() -> ApiError {
    ApiError::new(Status::BadRequest, "bad request")
}

#[catch(401)]
pub fn unauthorized() -> ApiError {
    ApiError::unauthorized()
}

#[catch(404)]
pub fn not_found() -> ApiError {
    ApiError::new(Status::NotFound, "not found")
}

#[catch(422)]
pub fn unprocessable() -> ApiError {
    ApiError::new(Status::UnprocessableEntity, "invalid request body")
}

#[catch(500)]
pub fn internal_error() -> ApiError {
    ApiError::new(
        Status::InternalServerError,
        moneydesk_rs_core::error::GENERIC_FAILURE,
    )
}
