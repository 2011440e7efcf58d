//! In-memory store. Backs the test suite and local development; mirrors
//! the Redis implementation's semantics, including the atomic-pop
//! matchmaking contract.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use lockpick_core::model::{GameConfig, Player, Room};

use super::{Store, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,
    players: DashMap<String, Player>,
    members: DashMap<String, HashSet<String>>,
    /// Waiting pool: matchmaking key -> FIFO of room ids. A single mutex
    /// makes find-and-remove atomic under concurrent creates.
    waiting: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_room(&self, room: &Room) -> StoreResult<()> {
        self.rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> StoreResult<Room> {
        self.rooms
            .get(room_id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound("room"))
    }

    async fn save_player(&self, player: &Player) -> StoreResult<()> {
        self.players.insert(player.id.clone(), player.clone());
        Ok(())
    }

    async fn get_player(&self, player_id: &str) -> StoreResult<Player> {
        self.players
            .get(player_id)
            .map(|p| p.clone())
            .ok_or(StoreError::NotFound("player"))
    }

    async fn add_player_to_room(&self, room_id: &str, player_id: &str) -> StoreResult<()> {
        self.members
            .entry(room_id.to_string())
            .or_default()
            .insert(player_id.to_string());
        Ok(())
    }

    async fn get_room_players(&self, room_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .members
            .get(room_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_matching_room(&self, config: &GameConfig) -> StoreResult<Option<Room>> {
        let popped = {
            let mut waiting = self.waiting.lock().unwrap();
            waiting
                .get_mut(&config.matchmaking_key())
                .and_then(|bucket| bucket.pop_front())
        };
        match popped {
            Some(room_id) => match self.get_room(&room_id).await {
                Ok(room) => Ok(Some(room)),
                // The room record is gone; the pool entry was stale.
                Err(StoreError::NotFound(_)) => Ok(None),
                Err(err) => Err(err),
            },
            None => Ok(None),
        }
    }

    async fn add_waiting_room(&self, room: &Room) -> StoreResult<()> {
        let mut waiting = self.waiting.lock().unwrap();
        waiting
            .entry(room.config.matchmaking_key())
            .or_default()
            .push_back(room.id.clone());
        Ok(())
    }

    async fn remove_waiting_room(&self, room_id: &str) -> StoreResult<()> {
        let mut waiting = self.waiting.lock().unwrap();
        for bucket in waiting.values_mut() {
            bucket.retain(|id| id != room_id);
        }
        Ok(())
    }
}
