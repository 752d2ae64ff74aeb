//! HTTP surface for the MoneyDesk message router.
//!
//! Mounts `POST /v1/chat` and `GET /health` on Rocket. The caller identity is
//! taken from headers set by the upstream auth proxy.

mod auth;
mod error;
mod routes;

pub use auth::{AuthError, AuthenticatedUser, TIER_HEADER, USER_HEADER};
pub use error::ApiError;

use log::info;
use moneydesk_rs_config::ServerConfig;
use moneydesk_rs_core::MessageRouter;
use rocket::{Build, Rocket, catchers, routes};
use std::sync::Arc;

/// Assemble the Rocket instance with default Rocket settings.
pub fn build(router: Arc<MessageRouter>) -> Rocket<Build> {
    mount(rocket::build(), router)
}

/// Assemble the Rocket instance bound to the configured address.
pub fn build_with_config(router: Arc<MessageRouter>, config: &ServerConfig) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", config.address.clone()))
        .merge(("port", config.port));
    mount(rocket::custom(figment), router)
}

fn mount(rocket: Rocket<Build>, router: Arc<MessageRouter>) -> Rocket<Build> {
    rocket
        .manage(router)
        .mount("/", routes![routes::chat, routes::health])
        .register(
            "/",
            catchers![
                error::bad_request,
                error::unauthorized,
                error::not_found,
                error::unprocessable,
                error::internal_error
            ],
        )
}

/// Serve until shutdown.
pub async fn serve(router: Arc<MessageRouter>, config: &ServerConfig) -> Result<(), rocket::Error> {
    info!(
        "starting http server (address={}, port={})",
        config.address, config.port
    );
    build_with_config(router, config).launch().await?;
    Ok(())
}
