use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;

use super::state::AppState;

/// Build the complete axum Router with all API routes.
pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(api::chat::handler))
        .route(
            "/projects",
            get(api::projects::list).post(api::projects::create),
        )
        .route(
            "/projects/:id",
            get(api::projects::get)
                .put(api::projects::update)
                .delete(api::projects::delete),
        )
        .route("/projects/:id/sessions", get(api::projects::sessions))
        .route(
            "/providers",
            get(api::providers::list).post(api::providers::create),
        )
        .route(
            "/providers/:id",
            put(api::providers::update).delete(api::providers::delete),
        )
        .route("/sessions/scan", get(api::sessions::scan))
        .route("/usage/total", get(api::sessions::total))
        .route("/usage/daily", get(api::sessions::daily))
        .route("/tools/node/install", post(api::tools::install_node))
        .route("/tools/:tool/status", get(api::tools::status))
        .route("/tools/:tool/install", post(api::tools::install))
        .route("/jobs/:id", get(api::tools::job_status))
        .route("/fs/list", get(api::fsops::list))
        .route("/fs/read", get(api::fsops::read))
        .route("/fs/search", post(api::fsops::search))
        .route("/git/status", get(api::git::status))
        .route("/git/diff", get(api::git::diff))
        .route("/git/log", get(api::git::log))
        .route("/git/stage", post(api::git::stage))
        .route("/git/unstage", post(api::git::unstage))
        .route("/git/commit", post(api::git::commit))
        .route("/git/push", post(api::git::push))
        .route("/git/pull", post(api::git::pull))
        .route("/terminal/ws", get(api::terminal::handler));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
