//! Resource routes. The first path segment is the resource key; handlers look up its controller.

use crate::handlers::resource::{destroy, list, show, store, update, validation_rules};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(list).post(store))
        .route("/:resource/rules", get(validation_rules))
        .route(
            "/:resource/:id",
            get(show).put(update).patch(update).delete(destroy),
        )
        .with_state(state)
}
