//! Room and player value types shared by the HTTP handlers, the realtime
//! dispatcher, and the store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of rounds in a match; players commit one PIN per round up front.
pub const ROUNDS_PER_MATCH: u32 = 3;

/// Immutable per-room settings, frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub pin_length: usize,
    pub hints_enabled: bool,
    /// Round timer in seconds; `0` disables the timer and rounds end only
    /// by a winning guess.
    pub timer_duration: u64,
    /// Private rooms are joinable only by explicit room id and never enter
    /// the matchmaking pool.
    pub is_private: bool,
}

impl GameConfig {
    /// Matchmaking bucket key: two public rooms are mutually compatible iff
    /// they share this triple.
    pub fn matchmaking_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.pin_length, self.hints_enabled, self.timer_duration
        )
    }

    /// Shape check for a committed or guessed PIN.
    pub fn accepts_pin(&self, pin: &str) -> bool {
        pin.len() == self.pin_length && pin.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Room lifecycle: `waiting -> playing -> finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// A participant. Exists for the lifetime of its room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub room_id: String,
    /// Exactly `ROUNDS_PER_MATCH` digit strings once committed; empty before.
    #[serde(default)]
    pub pins: Vec<String>,
}

impl Player {
    pub fn new(id: String, name: String, room_id: String) -> Self {
        Self {
            id,
            name,
            room_id,
            pins: Vec::new(),
        }
    }

    pub fn has_committed_pins(&self) -> bool {
        self.pins.len() == ROUNDS_PER_MATCH as usize
    }
}

/// A game room. Membership is tracked separately by the store and is at
/// most two players.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub host_id: String,
    pub status: RoomStatus,
    pub config: GameConfig,
    /// 1-indexed, in `[1, ROUNDS_PER_MATCH]` while playing.
    pub current_round: u32,
    /// Rounds won per player id; absent entries mean zero.
    #[serde(default)]
    pub scores: HashMap<String, u32>,
    /// Players who have signalled readiness for the next round; cleared on
    /// each round start.
    #[serde(default)]
    pub ready_players: Vec<String>,
    #[serde(default)]
    pub round_start_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: String, host_id: String, config: GameConfig) -> Self {
        Self {
            id,
            host_id,
            status: RoomStatus::Waiting,
            config,
            current_round: 1,
            scores: HashMap::new(),
            ready_players: Vec::new(),
            round_start_time: None,
            created_at: Utc::now(),
        }
    }

    pub fn round_in_range(&self) -> bool {
        (1..=ROUNDS_PER_MATCH).contains(&self.current_round)
    }
}
