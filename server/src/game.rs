//! The authoritative tick loop.
//!
//! [`GameServer`] owns the one [`World`] and is its only mutator. Other tasks
//! reach it only through the locked entry points below, which is what lets the
//! same server run embedded next to a local client or behind the TCP listener.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::session::{Session, SessionRegistry};
use log::{debug, info, warn};
use shared::level::{demo_level_for_viewport, TileMap};
use shared::protocol::LevelInfo;
use shared::world::{EnemyKind, Entity};
use shared::{InputFrame, Renderable, World, WorldState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Called with every broadcast state when running embedded.
pub type StateCallback = Box<dyn Fn(Arc<WorldState>) + Send + Sync>;

const STATE_CHANNEL_CAPACITY: usize = 64;

pub struct GameServer {
    config: ServerConfig,
    level: Arc<TileMap>,
    world: RwLock<World>,
    sessions: SessionRegistry,
    tick: AtomicU64,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    exited_tx: watch::Sender<bool>,
    states: broadcast::Sender<Arc<WorldState>>,
    on_state: parking_lot::RwLock<Option<StateCallback>>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let level = Arc::new(demo_level_for_viewport(
            config.level_width,
            config.level_height,
        ));
        let world = World::new(level.clone());
        let (shutdown_tx, _) = watch::channel(false);
        let (exited_tx, _) = watch::channel(true);
        let (states, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);

        Self {
            sessions: SessionRegistry::new(config.max_players),
            config,
            level,
            world: RwLock::new(world),
            tick: AtomicU64::new(0),
            running: AtomicBool::new(false),
            shutdown_tx,
            exited_tx,
            states,
            on_state: parking_lot::RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn level(&self) -> Arc<TileMap> {
        Arc::clone(&self.level)
    }

    pub fn level_info(&self) -> LevelInfo {
        LevelInfo {
            width: self.level.width() as u32,
            height: self.level.height() as u32,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Last completed tick.
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn add_session(&self, session: Arc<Session>) -> Result<(), ServerError> {
        if self.sessions.add(session) {
            Ok(())
        } else {
            Err(ServerError::ServerFull {
                max: self.sessions.max_sessions(),
            })
        }
    }

    pub fn remove_session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.sessions.remove(session_id)
    }

    /// Queues a frame for the session's player. Never waits on the tick loop.
    pub fn queue_input(&self, session_id: u32, frame: InputFrame) -> bool {
        match self.sessions.get(session_id) {
            Some(session) => {
                session.queue_input(frame);
                true
            }
            None => false,
        }
    }

    fn spawn_point(&self, player_id: u32) -> (f32, f32) {
        let lanes = ((self.level.width() - 4) / 8).max(1) as u32;
        let x = 3.0 + ((player_id.saturating_sub(1)) % lanes) as f32 * 8.0;
        (x, 1.0)
    }

    /// Registers a session and spawns its player in one step under the world lock.
    pub async fn join(&self, name: &str) -> Result<Arc<Session>, ServerError> {
        let mut world = self.world.write().await;
        if self.sessions.is_full() {
            warn!("Rejecting {}: server full", name);
            return Err(ServerError::ServerFull {
                max: self.sessions.max_sessions(),
            });
        }

        let player_id = self.sessions.free_player_id();
        let session = Arc::new(Session::new(
            self.sessions.next_session_id(),
            player_id,
            name,
        ));
        self.add_session(Arc::clone(&session))?;

        let (x, y) = self.spawn_point(player_id);
        world.spawn_player(player_id, name, x, y);
        Ok(session)
    }

    /// Removes the session and despawns its player.
    pub async fn leave(&self, session_id: u32) -> bool {
        let Some(session) = self.remove_session(session_id) else {
            return false;
        };
        let mut world = self.world.write().await;
        if let Some(entity) = world.player_entity(session.player_id()) {
            world.despawn(entity);
        }
        info!(
            "{} (session {}) left after {:.1}s",
            session.name(),
            session_id,
            session.connected_for().as_secs_f32()
        );
        true
    }

    pub async fn spawn_enemy(&self, kind: EnemyKind, x: f32, y: f32) -> Entity {
        self.world.write().await.spawn_enemy(kind, x, y)
    }

    /// Runs one tick: apply due inputs, update once, broadcast if this tick is
    /// on the sync interval. Returns the completed tick.
    pub async fn process_tick(&self) -> u64 {
        let (tick, state) = {
            let mut world = self.world.write().await;
            let due = world.tick() + 1;
            for session in self.sessions.snapshot() {
                if let Some(frame) = session.drain_latest(due) {
                    world.set_player_intent(session.player_id(), frame.intents);
                }
            }

            world.update();
            let tick = world.tick();
            self.tick.store(tick, Ordering::Release);

            let state = if tick % self.config.sync_interval() == 0 {
                Some(Arc::new(world.snapshot()))
            } else {
                None
            };
            (tick, state)
        };

        if let Some(state) = state {
            self.broadcast_state(state);
        }
        if tick % 60 == 0 {
            debug!(
                "Tick {}: {} sessions connected",
                tick,
                self.sessions.len()
            );
        }
        tick
    }

    fn broadcast_state(&self, state: Arc<WorldState>) {
        if let Some(callback) = self.on_state.read().as_ref() {
            callback(Arc::clone(&state));
        }
        // No subscribers is fine.
        let _ = self.states.send(state);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<WorldState>> {
        self.states.subscribe()
    }

    pub fn set_state_callback<F>(&self, callback: F)
    where
        F: Fn(Arc<WorldState>) + Send + Sync + 'static,
    {
        *self.on_state.write() = Some(Box::new(callback));
    }

    pub fn clear_state_callback(&self) {
        *self.on_state.write() = None;
    }

    pub async fn snapshot(&self) -> WorldState {
        self.world.read().await.snapshot()
    }

    pub async fn renderables(&self) -> Vec<Renderable> {
        self.world.read().await.renderables()
    }

    /// Fires once `stop` has been requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Starts the tick loop on its own task.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, ServerError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyRunning);
        }
        self.shutdown_tx.send_replace(false);
        self.exited_tx.send_replace(false);

        // Must exist before the task first runs or an early stop is missed.
        let shutdown = self.shutdown_tx.subscribe();
        let server = Arc::clone(self);
        Ok(tokio::spawn(async move { server.run_loop(shutdown).await }))
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server loop started: {} Hz, broadcasting every {} ticks",
            self.config.tick_rate,
            self.config.sync_interval()
        );

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Server loop stopped at tick {}", self.current_tick());
        self.running.store(false, Ordering::Release);
        self.exited_tx.send_replace(true);
    }

    /// Asks the loop to stop and waits until it has fully exited.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);

        let mut exited = self.exited_tx.subscribe();
        while !*exited.borrow_and_update() {
            if exited.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Intent;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig {
            max_players: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_join_spawns_player() {
        let server = GameServer::new(config());
        let session = server.join("ray").await.unwrap();
        assert_eq!(session.player_id(), 1);
        assert_eq!(server.session_count(), 1);

        let state = server.snapshot().await;
        assert!(state.player(1).is_some());
    }

    #[tokio::test]
    async fn test_join_rejects_when_full() {
        let server = GameServer::new(config());
        server.join("a").await.unwrap();
        server.join("b").await.unwrap();
        assert!(matches!(
            server.join("c").await,
            Err(ServerError::ServerFull { max: 2 })
        ));
    }

    #[tokio::test]
    async fn test_leave_despawns_and_frees_slot() {
        let server = GameServer::new(config());
        let a = server.join("a").await.unwrap();
        server.join("b").await.unwrap();

        assert!(server.leave(a.id()).await);
        assert!(!server.leave(a.id()).await);
        assert!(server.snapshot().await.player(1).is_none());

        let c = server.join("c").await.unwrap();
        assert_eq!(c.player_id(), 1);
    }

    #[tokio::test]
    async fn test_queue_input_unknown_session() {
        let server = GameServer::new(config());
        assert!(!server.queue_input(99, InputFrame::new(1, Intent::LEFT)));
    }

    #[tokio::test]
    async fn test_process_tick_applies_due_input() {
        let server = GameServer::new(config());
        let session = server.join("a").await.unwrap();
        for _ in 0..120 {
            server.process_tick().await;
        }
        let before = server.snapshot().await.player(1).unwrap().position;

        let next = server.current_tick() + 1;
        server.queue_input(session.id(), InputFrame::new(next, Intent::RIGHT));
        server.queue_input(session.id(), InputFrame::new(next + 50, Intent::LEFT));
        server.process_tick().await;

        let after = server.snapshot().await.player(1).unwrap().position;
        assert!(after.x > before.x);
        assert_eq!(session.pending_inputs(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_only_on_sync_interval() {
        let server = GameServer::new(config());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        server.set_state_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let mut receiver = server.subscribe();
        for _ in 0..9 {
            server.process_tick().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.tick, 3);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let server = Arc::new(GameServer::new(config()));
        let handle = server.start().unwrap();
        assert!(server.is_running());
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        server.stop().await;
        assert!(!server.is_running());
        handle.await.unwrap();

        let stopped_at = server.current_tick();
        assert!(stopped_at > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.current_tick(), stopped_at);
    }

    #[tokio::test]
    async fn test_stop_right_after_start() {
        let server = Arc::new(GameServer::new(config()));
        let handle = server.start().unwrap();
        tokio::time::timeout(Duration::from_secs(2), server.stop())
            .await
            .unwrap();
        assert!(!server.is_running());
        handle.await.unwrap();
        assert_eq!(server.current_tick(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_start_returns() {
        let server = GameServer::new(config());
        tokio::time::timeout(Duration::from_secs(1), server.stop())
            .await
            .unwrap();
    }
}
