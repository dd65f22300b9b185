//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;

use crate::storage::Storage;

pub use request::Form;
pub use request::PathParameters;
pub use request::QueryParameters;
pub use request::double_option;
pub use response::Error;
pub use response::Success;

mod items;
mod reminders;
mod request;
mod response;

/// Get the Axum router for all API routes
pub fn router<S: Storage>() -> Router {
    Router::new()
        .route("/items", get(items::list::<S>).post(items::create::<S>))
        .route(
            "/items/{item}",
            get(items::single::<S>)
                .patch(items::update::<S>)
                .delete(items::delete::<S>),
        )
        .route(
            "/items/{item}/reminders",
            get(reminders::list::<S>).post(reminders::create::<S>),
        )
        .route(
            "/items/{item}/reminders/{reminder}",
            get(reminders::single::<S>)
                .patch(reminders::update::<S>)
                .delete(reminders::delete::<S>),
        )
        .route(
            "/reminders/{reminder}/dismiss",
            post(reminders::dismiss::<S>),
        )
        .route("/reconcile", post(reminders::reconcile::<S>))
}

/// Answer for every unknown path
pub async fn not_found() -> Error {
    Error::not_found("Not found")
}
