pub mod config;
pub mod cors;
pub mod engine;
pub mod error;
pub mod hub;
pub mod routes;
pub mod state;
pub mod store;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::engine::Engine;
use crate::hub::Hub;
use crate::state::AppState;
use crate::store::Store;

/// Build a fully configured Router + shared state around the given store.
/// Spawns the hub's run loop; each call gets an independent hub, so tests
/// can run servers side by side.
pub fn build_app(store: Arc<dyn Store>) -> (Router, Arc<AppState>) {
    let hub = Hub::spawn();
    let engine = Engine::new(store.clone(), hub.clone());
    let state = Arc::new(AppState { store, hub, engine });

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/games", post(routes::create_game))
        .route("/games/join", post(routes::join_game))
        .route(
            "/games/{game_id}/players/{player_id}/pin",
            post(routes::select_pin),
        )
        .route("/games/{game_id}", get(routes::get_game))
        .route("/ws", get(ws::ws_upgrade))
        .layer(cors::cors_layer())
        .with_state(state.clone());

    (app, state)
}
