//! Broadcast hub: owns the set of live client egress channels, the
//! per-room round-timer registry, and the per-room lock manager that
//! serializes ready/guess/timeout critical sections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Outbound frames a client may have queued before the hub considers it
/// stuck and evicts it.
pub const CLIENT_BACKLOG: usize = 64;

/// Pending broadcasts before senders start to block.
const BROADCAST_BACKLOG: usize = 256;

/// A connected client's identity and bounded egress channel.
pub struct ClientHandle {
    pub id: Uuid,
    pub tx: mpsc::Sender<String>,
}

pub struct Hub {
    register_tx: mpsc::UnboundedSender<ClientHandle>,
    unregister_tx: mpsc::UnboundedSender<Uuid>,
    broadcast_tx: mpsc::Sender<String>,
    /// Cancel handle for each room's active round timer; at most one entry
    /// per room. Dropping the sender cancels the timer task.
    timers: Mutex<HashMap<String, oneshot::Sender<()>>>,
    /// Keyed lock manager: one async lock per room id, so critical sections
    /// for different rooms never contend.
    room_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Tells the run loop to drain and stop.
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Create a hub and spawn its run loop.
    pub fn spawn() -> Arc<Hub> {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_BACKLOG);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let run_task = tokio::spawn(run(register_rx, unregister_rx, broadcast_rx, shutdown_rx));

        Arc::new(Hub {
            register_tx,
            unregister_tx,
            broadcast_tx,
            timers: Mutex::new(HashMap::new()),
            room_locks: DashMap::new(),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            run_task: Mutex::new(Some(run_task)),
        })
    }

    pub fn register(&self, client: ClientHandle) {
        let _ = self.register_tx.send(client);
    }

    pub fn unregister(&self, client_id: Uuid) {
        let _ = self.unregister_tx.send(client_id);
    }

    /// Enqueue a serialized frame for fan-out to every client. Frames from
    /// all callers share one channel, so clients observe a consistent
    /// global order.
    pub async fn broadcast(&self, frame: String) {
        if self.broadcast_tx.send(frame).await.is_err() {
            tracing::warn!("hub run loop is gone; dropping broadcast");
        }
    }

    /// The async lock guarding a room's lifecycle transitions.
    pub fn room_lock(&self, room_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.room_locks
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    pub fn timer_active(&self, room_id: &str) -> bool {
        self.timers.lock().unwrap().contains_key(room_id)
    }

    /// Install a room's round timer, replacing (and cancelling) any
    /// previous one.
    pub fn set_timer(&self, room_id: &str, cancel: oneshot::Sender<()>) {
        self.timers
            .lock()
            .unwrap()
            .insert(room_id.to_string(), cancel);
    }

    /// Cancel and remove a room's round timer. Idempotent, and safe to call
    /// from within the timer task itself: a fired timer is past its cancel
    /// point, and the round-number recheck makes late fires a no-op.
    pub fn cancel_timer(&self, room_id: &str) {
        self.timers.lock().unwrap().remove(room_id);
    }

    /// Graceful shutdown: cancel every live timer, let the run loop drain
    /// the broadcast channel, then close all client egresses. Idempotent.
    pub async fn shutdown(&self) {
        self.timers.lock().unwrap().clear();
        if let Some(stop) = self.shutdown_tx.lock().unwrap().take() {
            let _ = stop.send(());
        }
        let run_task = self.run_task.lock().unwrap().take();
        if let Some(run_task) = run_task {
            let _ = run_task.await;
        }
    }
}

async fn run(
    mut register_rx: mpsc::UnboundedReceiver<ClientHandle>,
    mut unregister_rx: mpsc::UnboundedReceiver<Uuid>,
    mut broadcast_rx: mpsc::Receiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut clients: HashMap<Uuid, mpsc::Sender<String>> = HashMap::new();

    loop {
        tokio::select! {
            Some(client) = register_rx.recv() => {
                tracing::debug!(client = %client.id, "client registered");
                clients.insert(client.id, client.tx);
            }
            Some(client_id) = unregister_rx.recv() => {
                // Dropping the sender closes the client's egress.
                clients.remove(&client_id);
            }
            frame = broadcast_rx.recv() => {
                let Some(frame) = frame else { break };
                tracing::debug!(clients = clients.len(), "broadcasting frame");
                fan_out(&mut clients, &frame);
            }
            _ = &mut shutdown_rx => {
                // Drain what is already enqueued before closing egresses.
                while let Ok(frame) = broadcast_rx.try_recv() {
                    fan_out(&mut clients, &frame);
                }
                break;
            }
            else => break,
        }
    }
    // Returning drops every client sender, closing the egresses.
}

fn fan_out(clients: &mut HashMap<Uuid, mpsc::Sender<String>>, frame: &str) {
    clients.retain(|client_id, tx| match tx.try_send(frame.to_string()) {
        Ok(()) => true,
        Err(_) => {
            // A full backlog means a stuck client; a closed channel means
            // it already went away.
            tracing::warn!(client = %client_id, "egress unavailable; evicting client");
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Let the run loop drain pending registrations.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn broadcast_reaches_all_registered_clients() {
        let hub = Hub::spawn();
        let (tx1, mut rx1) = mpsc::channel(CLIENT_BACKLOG);
        let (tx2, mut rx2) = mpsc::channel(CLIENT_BACKLOG);
        hub.register(ClientHandle { id: Uuid::new_v4(), tx: tx1 });
        hub.register(ClientHandle { id: Uuid::new_v4(), tx: tx2 });
        settle().await;

        hub.broadcast("hello".to_string()).await;

        for rx in [&mut rx1, &mut rx2] {
            let frame = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            assert_eq!(frame, "hello");
        }
    }

    #[tokio::test]
    async fn unregistered_client_stops_receiving() {
        let hub = Hub::spawn();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(CLIENT_BACKLOG);
        hub.register(ClientHandle { id, tx });
        settle().await;
        hub.unregister(id);
        settle().await;

        hub.broadcast("late".to_string()).await;
        // Egress closes once the hub drops the sender.
        let got = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn stuck_client_is_evicted() {
        let hub = Hub::spawn();
        let (stuck_tx, stuck_rx) = mpsc::channel(1);
        let (live_tx, mut live_rx) = mpsc::channel(CLIENT_BACKLOG);
        hub.register(ClientHandle { id: Uuid::new_v4(), tx: stuck_tx });
        hub.register(ClientHandle { id: Uuid::new_v4(), tx: live_tx });
        settle().await;

        // Fill the stuck client's backlog, then overflow it.
        hub.broadcast("one".to_string()).await;
        hub.broadcast("two".to_string()).await;
        hub.broadcast("three".to_string()).await;

        for expected in ["one", "two", "three"] {
            let frame = timeout(Duration::from_secs(1), live_rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            assert_eq!(frame, expected);
        }

        // The stuck client's egress was dropped by the hub.
        drop(stuck_rx);
    }

    #[tokio::test]
    async fn one_timer_per_room() {
        let hub = Hub::spawn();
        let (first_tx, mut first_rx) = tokio::sync::oneshot::channel();
        let (second_tx, _second_rx) = tokio::sync::oneshot::channel();

        hub.set_timer("room-1", first_tx);
        assert!(hub.timer_active("room-1"));
        // Re-arming replaces the previous timer, cancelling it.
        hub.set_timer("room-1", second_tx);
        assert!(hub.timer_active("room-1"));
        assert!(first_rx.try_recv().is_err());

        hub.cancel_timer("room-1");
        assert!(!hub.timer_active("room-1"));
        // Idempotent.
        hub.cancel_timer("room-1");
        assert!(!hub.timer_active("room-1"));
    }

    #[tokio::test]
    async fn shutdown_flushes_broadcasts_and_closes_egresses() {
        let hub = Hub::spawn();
        let (tx, mut rx) = mpsc::channel(CLIENT_BACKLOG);
        hub.register(ClientHandle { id: Uuid::new_v4(), tx });
        settle().await;

        let (timer_tx, _timer_rx) = tokio::sync::oneshot::channel();
        hub.set_timer("room-1", timer_tx);

        hub.broadcast("parting".to_string()).await;
        hub.shutdown().await;

        assert!(!hub.timer_active("room-1"));
        // The queued frame was delivered before the egress closed.
        assert_eq!(rx.recv().await.as_deref(), Some("parting"));
        assert!(rx.recv().await.is_none());
        // Idempotent.
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn room_locks_are_per_room() {
        let hub = Hub::spawn();
        let lock_a = hub.room_lock("a");
        let lock_b = hub.room_lock("b");
        let _guard_a = lock_a.lock().await;
        // A held lock on room `a` must not block room `b`.
        let guard_b = timeout(Duration::from_millis(100), lock_b.lock()).await;
        assert!(guard_b.is_ok());
        // The same room returns the same lock.
        let lock_a2 = hub.room_lock("a");
        assert!(lock_a2.try_lock().is_err());
    }
}
