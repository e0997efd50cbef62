//! # Shared Simulation Core
//!
//! Everything both ends of a connection must agree on lives here: the wire
//! protocol, the deterministic world simulation, the tile level it runs on and
//! the synchronization helpers that move world state between server and client.
//!
//! The client predicts with exactly the same `World::update` the server runs, so
//! any constant below changes behaviour on both sides at once.
//!
//! ## Units
//!
//! Positions and sizes are measured in tiles, velocities in tiles per tick and
//! accelerations in tiles per tick squared. The y axis grows downwards, matching
//! tile rows, so jumping means a negative vertical velocity.

pub mod collision;
pub mod level;
pub mod protocol;
pub mod sync;
pub mod world;

pub use level::{TileMap, TileOracle};
pub use protocol::{
    EntityId, Handshake, InputFrame, Intent, Packet, ProtocolError, StateSnapshot, WireEntity,
};
pub use world::{Entity, EntityState, Renderable, World, WorldState};

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 60;

pub const GRAVITY: f32 = 0.025;
pub const MAX_FALL_SPEED: f32 = 0.6;
pub const MOVE_SPEED: f32 = 0.15;
pub const JUMP_SPEED: f32 = -0.45;
pub const ENEMY_SPEED: f32 = 0.05;

pub const PLAYER_WIDTH: f32 = 1.0;
pub const PLAYER_HEIGHT: f32 = 1.0;
pub const FIST_SIZE: f32 = 0.5;

/// Longest charge that still increases fist range.
pub const MAX_CHARGE_TICKS: u32 = 180;
pub const MIN_FIST_DISTANCE: f32 = 3.0;
pub const MAX_FIST_DISTANCE: f32 = 15.0;
pub const FIST_SPEED: f32 = 0.5;
/// Ticks after a release during which no new charge may start.
pub const ATTACK_COOLDOWN: u32 = 15;

/// Position/velocity tolerance used when comparing predicted and authoritative state.
pub const POSITION_TOLERANCE: f32 = 0.01;

/// Fist travel range for a charge held `charge_ticks` ticks.
///
/// Linear between [`MIN_FIST_DISTANCE`] (quick tap) and [`MAX_FIST_DISTANCE`]
/// (full charge); charges beyond [`MAX_CHARGE_TICKS`] are clamped.
pub fn charge_distance(charge_ticks: u32) -> f32 {
    let ratio = charge_ticks.min(MAX_CHARGE_TICKS) as f32 / MAX_CHARGE_TICKS as f32;
    MIN_FIST_DISTANCE + ratio * (MAX_FIST_DISTANCE - MIN_FIST_DISTANCE)
}
