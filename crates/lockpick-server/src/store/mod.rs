//! Key/value persistence for rooms, players, room membership, and the
//! matchmaking waiting pool.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

use lockpick_core::model::{GameConfig, Player, Room};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract shared by the HTTP handlers and the realtime
/// engine. Implementations must keep `find_matching_room` an atomic pop:
/// at most one concurrent caller receives any given waiting room.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_room(&self, room: &Room) -> StoreResult<()>;
    async fn get_room(&self, room_id: &str) -> StoreResult<Room>;

    async fn save_player(&self, player: &Player) -> StoreResult<()>;
    async fn get_player(&self, player_id: &str) -> StoreResult<Player>;

    async fn add_player_to_room(&self, room_id: &str, player_id: &str) -> StoreResult<()>;
    async fn get_room_players(&self, room_id: &str) -> StoreResult<Vec<String>>;

    /// Atomically pop a compatible waiting room for this config, or return
    /// `None` when the pool bucket is empty.
    async fn find_matching_room(&self, config: &GameConfig) -> StoreResult<Option<Room>>;
    async fn add_waiting_room(&self, room: &Room) -> StoreResult<()>;
    /// Remove a room from the waiting pool. Idempotent; unknown ids are a
    /// no-op.
    async fn remove_waiting_room(&self, room_id: &str) -> StoreResult<()>;
}
