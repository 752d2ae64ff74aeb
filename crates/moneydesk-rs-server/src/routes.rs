use crate::auth::{AuthError, AuthenticatedUser};
use crate::error::ApiError;
use log::{debug, warn};
use moneydesk_rs_core::MessageRouter;
use moneydesk_rs_protocol::{ChatReply, ChatRequest};
use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::{State, get, post};
use serde_json::{Value, json};
use std::sync::Arc;

#[post("/v1/chat", data = "<body>")]
pub async fn chat(
    router: &State<Arc<MessageRouter>>,
    user: Result<AuthenticatedUser, AuthError>,
    body: Result<Json<ChatRequest>, json::Error<'_>>,
) -> Result<Json<ChatReply>, ApiError> {
    let AuthenticatedUser(user) = user.map_err(|_| ApiError::unauthorized())?;
    let request = match body {
        Ok(Json(request)) => request,
        Err(err) => {
            debug!("rejected chat body (user_id={}, error={err})", user.id);
            return Err(ApiError::new(Status::BadRequest, "invalid request body"));
        }
    };

    match router.route(&user, request).await {
        Ok(reply) => Ok(Json(reply)),
        Err(err) => {
            if !err.is_validation() {
                warn!("chat failed (user_id={}, error={err})", user.id);
            }
            Err(err.into())
        }
    }
}

#[get("/health")]
pub fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
