//! Redis-backed store. Layout:
//!
//! - `room:<id>` / `player:<id>` — JSON blobs.
//! - `room:<id>:players` — set of player ids.
//! - `waiting:<pin_length>:<hints_enabled>:<timer_duration>` — set of room
//!   ids per matchmaking bucket; `SPOP` gives the atomic-pop contract.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use lockpick_core::model::{GameConfig, Player, Room};

use super::{Store, StoreError, StoreResult};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server is reachable.
    pub async fn connect(addr: &str, password: &str) -> StoreResult<Self> {
        let url = if password.is_empty() {
            format!("redis://{addr}")
        } else {
            format!("redis://:{password}@{addr}")
        };
        let client = Client::open(url).map_err(StoreError::Redis)?;
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(Self { conn })
    }

    fn room_key(room_id: &str) -> String {
        format!("room:{room_id}")
    }

    fn player_key(player_id: &str) -> String {
        format!("player:{player_id}")
    }

    fn members_key(room_id: &str) -> String {
        format!("room:{room_id}:players")
    }

    fn waiting_key(config: &GameConfig) -> String {
        format!("waiting:{}", config.matchmaking_key())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn save_room(&self, room: &Room) -> StoreResult<()> {
        let data = serde_json::to_string(room)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::room_key(&room.id), data).await?;
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> StoreResult<Room> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(Self::room_key(room_id)).await?;
        let data = data.ok_or(StoreError::NotFound("room"))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn save_player(&self, player: &Player) -> StoreResult<()> {
        let data = serde_json::to_string(player)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::player_key(&player.id), data)
            .await?;
        Ok(())
    }

    async fn get_player(&self, player_id: &str) -> StoreResult<Player> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(Self::player_key(player_id)).await?;
        let data = data.ok_or(StoreError::NotFound("player"))?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn add_player_to_room(&self, room_id: &str, player_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(Self::members_key(room_id), player_id)
            .await?;
        Ok(())
    }

    async fn get_room_players(&self, room_id: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(Self::members_key(room_id)).await?)
    }

    async fn find_matching_room(&self, config: &GameConfig) -> StoreResult<Option<Room>> {
        let mut conn = self.conn.clone();
        let popped: Option<String> = conn.spop(Self::waiting_key(config)).await?;
        match popped {
            Some(room_id) => match self.get_room(&room_id).await {
                Ok(room) => Ok(Some(room)),
                // The room record expired out from under the pool entry.
                Err(StoreError::NotFound(_)) => Ok(None),
                Err(err) => Err(err),
            },
            None => Ok(None),
        }
    }

    async fn add_waiting_room(&self, room: &Room) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(Self::waiting_key(&room.config), &room.id)
            .await?;
        Ok(())
    }

    async fn remove_waiting_room(&self, room_id: &str) -> StoreResult<()> {
        // The bucket key is derived from the room's config.
        let room = match self.get_room(room_id).await {
            Ok(room) => room,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(Self::waiting_key(&room.config), room_id)
            .await?;
        Ok(())
    }
}
