//! In-process link to a [`GameServer`] for single-player.
//!
//! There is no network in between, but the client still only talks to the
//! server through its locked entry points: inputs go through the session
//! queue and states come back through the broadcast callback.

use log::info;
use server::{GameServer, ServerError, Session};
use shared::level::TileMap;
use shared::{InputFrame, WorldState};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct EmbeddedLink {
    server: Arc<GameServer>,
    session: Arc<Session>,
    states: mpsc::UnboundedReceiver<Arc<WorldState>>,
}

impl EmbeddedLink {
    /// Joins `server` as `name` and starts receiving its broadcasts.
    pub async fn connect(server: Arc<GameServer>, name: &str) -> Result<Self, ServerError> {
        let session = server.join(name).await?;
        let (tx, states) = mpsc::unbounded_channel();
        server.set_state_callback(move |state| {
            // Receiver gone means the link was dropped.
            let _ = tx.send(state);
        });
        info!(
            "Embedded session {} playing as player {}",
            session.id(),
            session.player_id()
        );
        Ok(Self {
            server,
            session,
            states,
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session.id()
    }

    pub fn player_id(&self) -> u32 {
        self.session.player_id()
    }

    pub fn level(&self) -> Arc<TileMap> {
        self.server.level()
    }

    pub fn server(&self) -> &Arc<GameServer> {
        &self.server
    }

    pub fn send_input(&self, frame: InputFrame) -> bool {
        self.server.queue_input(self.session.id(), frame)
    }

    pub fn try_recv_state(&mut self) -> Option<Arc<WorldState>> {
        self.states.try_recv().ok()
    }

    pub async fn recv_state(&mut self) -> Option<Arc<WorldState>> {
        self.states.recv().await
    }

    /// Stops receiving states and removes the player from the world.
    pub async fn disconnect(self) {
        self.server.clear_state_callback();
        self.server.leave(self.session.id()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use server::ServerConfig;
    use shared::Intent;

    #[tokio::test]
    async fn test_states_arrive_through_callback() {
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let mut link = EmbeddedLink::connect(Arc::clone(&server), "solo")
            .await
            .unwrap();
        assert_eq!(link.player_id(), 1);

        for _ in 0..6 {
            server.process_tick().await;
        }
        let first = link.try_recv_state().unwrap();
        let second = link.try_recv_state().unwrap();
        assert_eq!((first.tick, second.tick), (3, 6));
        assert!(link.try_recv_state().is_none());
        assert!(second.player(1).is_some());
    }

    #[tokio::test]
    async fn test_inputs_reach_the_session() {
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let link = EmbeddedLink::connect(Arc::clone(&server), "solo")
            .await
            .unwrap();
        assert!(link.send_input(InputFrame::new(1, Intent::RIGHT)));

        server.process_tick().await;
        let state = server.snapshot().await;
        assert!(state.player(1).unwrap().velocity.x > 0.0);
    }

    #[tokio::test]
    async fn test_disconnect_leaves() {
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let link = EmbeddedLink::connect(Arc::clone(&server), "solo")
            .await
            .unwrap();
        link.disconnect().await;
        assert_eq!(server.session_count(), 0);
        assert!(server.snapshot().await.player(1).is_none());
    }
}
