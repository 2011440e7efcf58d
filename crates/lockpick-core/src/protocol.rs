//! Realtime wire types. Every frame is `{"type": ..., "payload": ...}`;
//! inbound payloads are decoded lazily once the tag is known.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::RoomStatus;

/// Raw inbound frame. The payload stays generic until the dispatcher has
/// matched the tag against a known message type.
#[derive(Debug, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuessPayload {
    pub room_id: String,
    pub player_id: String,
    pub guess: String,
    /// The round the client believes it is guessing in; `0` means unset and
    /// skips the staleness check.
    #[serde(default)]
    pub round: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerReadyPayload {
    pub room_id: String,
    pub player_id: String,
}

/// Events fanned out to every connected client. Clients filter by the
/// `room_id` carried in each payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    GameStart {
        room_id: String,
        status: RoomStatus,
    },
    RoundStart {
        room_id: String,
        round: u32,
    },
    GuessResult {
        room_id: String,
        player_id: String,
        guess: String,
        hints: Vec<u8>,
    },
    RoundEnd {
        room_id: String,
        /// Empty on a timeout draw.
        winner_id: String,
        round: u32,
        scores: HashMap<String, u32>,
    },
    GameEnd {
        room_id: String,
        winner_id: String,
        scores: HashMap<String, u32>,
        is_draw: bool,
    },
}
