//! # Authoritative Game Server
//!
//! The server owns the one true [`shared::World`], advances it at a fixed tick
//! rate, and publishes world states to whoever is listening.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`GameServer`] holds the world behind a lock and drives the tick loop:
//! - Applies the latest due input frame per session, in session id order
//! - Runs exactly one world update per tick
//! - Broadcasts a [`shared::WorldState`] every `sync_interval` ticks, both to
//!   an in-process callback and to a broadcast channel
//!
//! ### Session Module (`session`)
//! Connected clients, their player ids, and their per-session input queues.
//! Queuing input never waits on the tick loop.
//!
//! ### Network Module (`network`)
//! The TCP listener used when the server runs standalone. Each connection
//! performs the version handshake, then streams delta snapshots encoded
//! against the last state that client acknowledged.
//!
//! ## Embedded Use
//!
//! ```rust,no_run
//! use server::{GameServer, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), server::ServerError> {
//! let game = Arc::new(GameServer::new(ServerConfig::default()));
//! let session = game.join("local").await?;
//! game.set_state_callback(|state| println!("tick {}", state.tick));
//! let handle = game.start()?;
//! // ... queue inputs with game.queue_input(session.id(), frame) ...
//! game.stop().await;
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod session;

pub use config::ServerConfig;
pub use error::ServerError;
pub use game::{GameServer, StateCallback};
pub use network::NetworkServer;
pub use session::{Session, SessionRegistry};
