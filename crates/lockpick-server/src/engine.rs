//! Session engine: lifecycle state machine for a match. Orchestrates the
//! store, the broadcast hub, and the hint calculator.
//!
//! Realtime failures follow the silent-drop policy: log and return, never
//! disconnect the client.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use lockpick_core::hints::{generate_hints, is_win};
use lockpick_core::model::{Room, RoomStatus, ROUNDS_PER_MATCH};
use lockpick_core::protocol::{GuessPayload, PlayerReadyPayload, ServerEvent};

use crate::hub::Hub;
use crate::store::Store;

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    hub: Arc<Hub>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// Serialize an event and enqueue it on the hub's broadcast channel.
    pub async fn broadcast(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(frame) => self.hub.broadcast(frame).await,
            Err(err) => tracing::error!(%err, "failed to encode event"),
        }
    }

    /// Called after a pin commit: if both players have committed all their
    /// pins, flip the room to `playing`, announce the game, and arm the
    /// round-1 timer. The `game_start` broadcast is enqueued before the
    /// timer starts so clients see it ahead of any round event.
    pub async fn try_begin_match(&self, room_id: &str) {
        let lock = self.hub.room_lock(room_id);
        let _guard = lock.lock().await;

        let players = match self.store.get_room_players(room_id).await {
            Ok(players) => players,
            Err(err) => {
                tracing::error!(%err, room = room_id, "failed to load room players");
                return;
            }
        };
        if players.len() != 2 {
            return;
        }
        for player_id in &players {
            match self.store.get_player(player_id).await {
                Ok(player) if player.has_committed_pins() => {}
                Ok(_) => return,
                Err(err) => {
                    tracing::error!(%err, player = %player_id, "failed to load player");
                    return;
                }
            }
        }

        let mut room = match self.store.get_room(room_id).await {
            Ok(room) => room,
            Err(err) => {
                tracing::error!(%err, room = room_id, "failed to load room");
                return;
            }
        };
        room.status = RoomStatus::Playing;
        if let Err(err) = self.store.save_room(&room).await {
            tracing::error!(%err, room = room_id, "failed to persist game start");
            return;
        }

        tracing::info!(room = room_id, "both players committed pins; game starting");
        self.broadcast(&ServerEvent::GameStart {
            room_id: room.id.clone(),
            status: RoomStatus::Playing,
        })
        .await;

        self.start_round_timer_locked(room_id).await;
    }

    /// Handle a guess frame from the realtime channel.
    pub async fn handle_guess(&self, payload: GuessPayload) {
        let lock = self.hub.room_lock(&payload.room_id);
        let _guard = lock.lock().await;

        let room = match self.store.get_room(&payload.room_id).await {
            Ok(room) => room,
            Err(err) => {
                tracing::warn!(%err, room = %payload.room_id, "guess for unknown room");
                return;
            }
        };

        // Stale client: guessing in a round that already ended.
        if payload.round != 0 && payload.round != room.current_round {
            tracing::debug!(
                room = %room.id,
                player = %payload.player_id,
                client_round = payload.round,
                server_round = room.current_round,
                "ignoring guess: round mismatch"
            );
            return;
        }

        if !self.round_active(&room) {
            tracing::debug!(room = %room.id, player = %payload.player_id, "ignoring guess: round not active");
            return;
        }

        if !room.round_in_range() {
            tracing::warn!(room = %room.id, round = room.current_round, "round counter out of range");
            return;
        }

        if !room.config.accepts_pin(&payload.guess) {
            tracing::debug!(room = %room.id, player = %payload.player_id, "ignoring malformed guess");
            return;
        }

        let players = match self.store.get_room_players(&room.id).await {
            Ok(players) => players,
            Err(err) => {
                tracing::error!(%err, room = %room.id, "failed to load room players");
                return;
            }
        };
        if players.len() != 2 {
            tracing::warn!(room = %room.id, count = players.len(), "guess in a room without 2 players");
            return;
        }
        let Some(opponent_id) = players.iter().find(|id| **id != payload.player_id) else {
            tracing::warn!(room = %room.id, player = %payload.player_id, "guesser is not a room member");
            return;
        };

        let opponent = match self.store.get_player(opponent_id).await {
            Ok(player) => player,
            Err(err) => {
                tracing::error!(%err, player = %opponent_id, "failed to load opponent");
                return;
            }
        };
        // Pins are committed for all rounds up front; round 1 is index 0.
        let Some(target) = opponent.pins.get(room.current_round as usize - 1) else {
            tracing::warn!(room = %room.id, round = room.current_round, "opponent has no pin for this round");
            return;
        };

        let hints = generate_hints(&payload.guess, target);
        self.broadcast(&ServerEvent::GuessResult {
            room_id: room.id.clone(),
            player_id: payload.player_id.clone(),
            guess: payload.guess.clone(),
            hints,
        })
        .await;

        if is_win(&payload.guess, target) {
            let mut room = room;
            *room.scores.entry(payload.player_id.clone()).or_insert(0) += 1;
            self.round_end_locked(&mut room, Some(&payload.player_id))
                .await;
        }
    }

    /// Handle a ready signal. When every room member has signalled, the
    /// next round starts and its timer is armed.
    pub async fn handle_player_ready(&self, payload: PlayerReadyPayload) {
        let lock = self.hub.room_lock(&payload.room_id);
        let _guard = lock.lock().await;

        if self.hub.timer_active(&payload.room_id) {
            tracing::debug!(
                room = %payload.room_id,
                player = %payload.player_id,
                "ignoring ready: round already running"
            );
            return;
        }

        let mut room = match self.store.get_room(&payload.room_id).await {
            Ok(room) => room,
            Err(err) => {
                tracing::warn!(%err, room = %payload.room_id, "ready for unknown room");
                return;
            }
        };
        if room.status != RoomStatus::Playing {
            tracing::debug!(room = %room.id, status = ?room.status, "ignoring ready: game not in progress");
            return;
        }

        let players = match self.store.get_room_players(&room.id).await {
            Ok(players) => players,
            Err(err) => {
                tracing::error!(%err, room = %room.id, "failed to load room players");
                return;
            }
        };
        if !players.contains(&payload.player_id) {
            tracing::warn!(room = %room.id, player = %payload.player_id, "ready from a non-member");
            return;
        }

        if !room.ready_players.contains(&payload.player_id) {
            room.ready_players.push(payload.player_id.clone());
            if let Err(err) = self.store.save_room(&room).await {
                tracing::error!(%err, room = %room.id, "failed to persist ready state");
                return;
            }
        }

        if room.ready_players.len() >= players.len() {
            self.broadcast(&ServerEvent::RoundStart {
                room_id: room.id.clone(),
                round: room.current_round,
            })
            .await;

            room.ready_players.clear();
            if let Err(err) = self.store.save_room(&room).await {
                tracing::error!(%err, room = %room.id, "failed to clear ready state");
            }

            self.start_round_timer_locked(&room.id).await;
        }
    }

    /// Arm the room's round timer. Takes the room lock; use
    /// [`Engine::start_round_timer_locked`] from paths that already hold it.
    pub async fn start_round_timer(&self, room_id: &str) {
        let lock = self.hub.room_lock(room_id);
        let _guard = lock.lock().await;
        self.start_round_timer_locked(room_id).await;
    }

    pub(crate) async fn start_round_timer_locked(&self, room_id: &str) {
        let mut room = match self.store.get_room(room_id).await {
            Ok(room) => room,
            Err(err) => {
                tracing::error!(%err, room = room_id, "failed to load room for timer");
                return;
            }
        };
        if room.config.timer_duration == 0 {
            // Timer disabled: the round ends only by a winning guess.
            return;
        }

        room.round_start_time = Some(Utc::now());
        if let Err(err) = self.store.save_room(&room).await {
            tracing::error!(%err, room = room_id, "failed to persist round start time");
        }

        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
        let engine = self.clone();
        let room_id_owned = room_id.to_string();
        // Capture the round so a late fire after a transition is a no-op.
        let round = room.current_round;
        let duration = Duration::from_secs(room.config.timer_duration);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    engine.handle_round_timeout(&room_id_owned, round).await;
                }
                // Round ended first; the hub dropped our cancel handle.
                _ = cancel_rx => {}
            }
        });
        self.hub.set_timer(room_id, cancel_tx);
    }

    async fn handle_round_timeout(&self, room_id: &str, round: u32) {
        let lock = self.hub.room_lock(room_id);
        let _guard = lock.lock().await;

        let mut room = match self.store.get_room(room_id).await {
            Ok(room) => room,
            Err(err) => {
                tracing::error!(%err, room = room_id, "failed to load room for timeout");
                return;
            }
        };
        // The round already transitioned under a winning guess; this fire
        // is stale.
        if room.current_round != round {
            return;
        }

        tracing::info!(room = room_id, round, "round timed out");
        self.round_end_locked(&mut room, None).await;
    }

    /// End the current round. `winner_id` is `None` on a timeout draw.
    /// Caller must hold the room lock.
    async fn round_end_locked(&self, room: &mut Room, winner_id: Option<&str>) {
        self.hub.cancel_timer(&room.id);

        self.broadcast(&ServerEvent::RoundEnd {
            room_id: room.id.clone(),
            winner_id: winner_id.unwrap_or_default().to_string(),
            round: room.current_round,
            scores: room.scores.clone(),
        })
        .await;

        if room.current_round >= ROUNDS_PER_MATCH {
            self.game_end_locked(room).await;
            return;
        }

        room.current_round += 1;
        room.ready_players.clear();
        if let Err(err) = self.store.save_room(room).await {
            tracing::error!(%err, room = %room.id, "failed to persist round advance");
        }
        // The next round starts only once both players signal ready.
    }

    /// Finish the match: compute the overall winner, mark the room
    /// finished, and announce the result.
    async fn game_end_locked(&self, room: &mut Room) {
        let top_score = room.scores.values().copied().max().unwrap_or(0);
        let mut leaders = room
            .scores
            .iter()
            .filter(|(_, score)| **score == top_score)
            .map(|(player_id, _)| player_id.clone());
        let winner_id = leaders.next();
        // A draw is a shared top score; an empty score map (all rounds
        // timed out) is a 0-0 draw.
        let is_draw = leaders.next().is_some() || winner_id.is_none();
        drop(leaders);
        let winner_id = if is_draw {
            String::new()
        } else {
            winner_id.unwrap_or_default()
        };

        room.status = RoomStatus::Finished;
        if let Err(err) = self.store.save_room(room).await {
            tracing::error!(%err, room = %room.id, "failed to persist game end");
        }

        tracing::info!(room = %room.id, winner = %winner_id, is_draw, "game over");
        self.broadcast(&ServerEvent::GameEnd {
            room_id: room.id.clone(),
            winner_id,
            scores: room.scores.clone(),
            is_draw,
        })
        .await;
    }

    /// Whether the room is in the play sub-phase of a round. With a timer
    /// configured that is the timer-active check; with the timer disabled
    /// the room's status and round counter stand in for it.
    fn round_active(&self, room: &Room) -> bool {
        if room.config.timer_duration > 0 {
            self.hub.timer_active(&room.id)
        } else {
            room.status == RoomStatus::Playing && room.round_in_range()
        }
    }
}
