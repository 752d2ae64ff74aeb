use moneydesk_rs_protocol::{Tier, UserContext};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the subscription tier; unknown or absent means `free`.
pub const TIER_HEADER: &str = "x-user-tier";

/// Caller identity extracted from proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserContext);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingUser,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = request.headers();
        let Some(user_id) = headers
            .get_one(USER_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            return Outcome::Error((Status::Unauthorized, AuthError::MissingUser));
        };
        let tier = headers
            .get_one(TIER_HEADER)
            .map(Tier::resolve)
            .unwrap_or_default();
        Outcome::Success(AuthenticatedUser(UserContext::new(user_id, tier)))
    }
}
