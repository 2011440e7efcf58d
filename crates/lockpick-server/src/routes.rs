//! HTTP surface: room creation with matchmaking, explicit joins, pin
//! commits, and game state reads.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use lockpick_core::model::{GameConfig, Player, Room, RoomStatus, ROUNDS_PER_MATCH};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    #[serde(default)]
    pub player_name: String,
    pub config: Option<GameConfig>,
}

#[derive(Debug, Serialize)]
pub struct CreateGameResponse {
    pub room_id: String,
    pub player_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<GameConfig>,
}

/// Create a game. Public creates first try the matchmaking pool; a hit
/// joins the creator into the waiting room instead of making a new one.
pub async fn create_game(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<CreateGameResponse>, ApiError> {
    let (name, config) = match (req.player_name, req.config) {
        (name, Some(config)) if !name.is_empty() => (name, config),
        _ => {
            return Err(ApiError::Validation(
                "player name and config are required".into(),
            ))
        }
    };
    if config.pin_length == 0 {
        return Err(ApiError::Validation("pin length must be positive".into()));
    }

    if !config.is_private {
        if let Some(mut room) = state.store.find_matching_room(&config).await? {
            let player = new_player(name, room.id.clone());
            state.store.save_player(&player).await?;
            state.store.add_player_to_room(&room.id, &player.id).await?;

            room.status = RoomStatus::Playing;
            if let Err(err) = state.store.save_room(&room).await {
                tracing::warn!(%err, room = %room.id, "failed to persist matched room status");
            }

            tracing::info!(room = %room.id, player = %player.id, "matched into waiting room");
            return Ok(Json(CreateGameResponse {
                room_id: room.id,
                player_id: player.id,
                status: "matched",
                config: Some(room.config),
            }));
        }
    }

    let room_id = Uuid::new_v4().to_string();
    let player = new_player(name, room_id.clone());
    let room = Room::new(room_id.clone(), player.id.clone(), config.clone());

    state.store.save_room(&room).await?;
    state.store.save_player(&player).await?;
    state.store.add_player_to_room(&room_id, &player.id).await?;

    if !config.is_private {
        state.store.add_waiting_room(&room).await?;
    }

    tracing::info!(room = %room.id, player = %player.id, private = config.is_private, "room created");
    Ok(Json(CreateGameResponse {
        room_id: room.id,
        player_id: player.id,
        status: "waiting",
        config: None,
    }))
}

#[derive(Debug, Deserialize)]
pub struct JoinGameRequest {
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub room_id: String,
}

#[derive(Debug, Serialize)]
pub struct JoinGameResponse {
    pub room_id: String,
    pub player_id: String,
    pub status: &'static str,
    pub config: GameConfig,
}

pub async fn join_game(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinGameRequest>,
) -> Result<Json<JoinGameResponse>, ApiError> {
    if req.player_name.is_empty() || req.room_id.is_empty() {
        return Err(ApiError::Validation(
            "player name and room id are required".into(),
        ));
    }

    let room = state.store.get_room(&req.room_id).await?;

    let players = state.store.get_room_players(&req.room_id).await?;
    if players.len() >= 2 {
        return Err(ApiError::Conflict("room is full"));
    }

    let player = new_player(req.player_name, room.id.clone());
    state.store.save_player(&player).await?;
    state.store.add_player_to_room(&room.id, &player.id).await?;

    // The room is full now; a public room must leave the matchmaking pool.
    if !room.config.is_private {
        if let Err(err) = state.store.remove_waiting_room(&room.id).await {
            tracing::warn!(%err, room = %room.id, "failed to remove joined room from the pool");
        }
    }

    tracing::info!(room = %room.id, player = %player.id, "player joined");
    Ok(Json(JoinGameResponse {
        room_id: room.id,
        player_id: player.id,
        status: "joined",
        config: room.config,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SelectPinRequest {
    #[serde(default)]
    pub pins: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectPinResponse {
    pub status: &'static str,
}

/// Commit a player's PINs for every round. Once both players have
/// committed, the engine flips the room to `playing` and arms round 1.
pub async fn select_pin(
    State(state): State<Arc<AppState>>,
    Path((game_id, player_id)): Path<(String, String)>,
    Json(req): Json<SelectPinRequest>,
) -> Result<Json<SelectPinResponse>, ApiError> {
    if req.pins.len() != ROUNDS_PER_MATCH as usize {
        return Err(ApiError::Validation(format!(
            "exactly {ROUNDS_PER_MATCH} pins are required"
        )));
    }

    let room = state.store.get_room(&game_id).await?;
    for pin in &req.pins {
        if pin.len() != room.config.pin_length {
            return Err(ApiError::Validation(format!(
                "all pins must be of length {}",
                room.config.pin_length
            )));
        }
        if !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ApiError::Validation("pins must contain only digits".into()));
        }
    }

    let mut player = state.store.get_player(&player_id).await?;
    if player.room_id != game_id {
        return Err(ApiError::Forbidden("player does not belong to this room"));
    }

    player.pins = req.pins;
    state.store.save_player(&player).await?;
    tracing::info!(room = %game_id, player = %player_id, "pins committed");

    state.engine.try_begin_match(&game_id).await;

    Ok(Json(SelectPinResponse {
        status: "pins_selected",
    }))
}

pub async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(state.store.get_room(&game_id).await?))
}

fn new_player(name: String, room_id: String) -> Player {
    Player::new(Uuid::new_v4().to_string(), name, room_id)
}
