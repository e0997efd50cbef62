//! # Game Client Library
//!
//! Client-side netcode for the platformer. The client runs the same
//! simulation as the server so it can show the local player's moves before
//! the server confirms them, then quietly corrects itself when it guessed
//! wrong.
//!
//! ## Client-Side Prediction
//! Every tick the local intent is stamped with the tick it affects, sent, and
//! applied to a local [`shared::World`] right away. The input and a light copy
//! of the resulting state go into a [`PredictionBuffer`].
//!
//! ## Reconciliation
//! When an authoritative state for tick T arrives, the [`Reconciler`] compares
//! it with what was predicted for T. On a mismatch it restores T and replays
//! every buffered input after it, so the present is rebuilt on the corrected
//! past.
//!
//! ## Interpolation
//! Other entities are drawn between the two oldest buffered server states
//! instead of snapping from one broadcast to the next.
//!
//! ## Module Organization
//! - `prediction`: input and predicted-state ring buffers
//! - `reconciler`: mismatch detection and rollback/replay
//! - `game`: [`ClientGame`], tying the above together with the netcode toggles
//! - `embedded` / `network`: the in-process and TCP links to a server
//! - `input`: seeded scripted input
//! - `display`: text frames

pub mod display;
pub mod embedded;
pub mod game;
pub mod input;
pub mod network;
pub mod prediction;
pub mod reconciler;

pub use embedded::EmbeddedLink;
pub use game::{ClientGame, ClientOptions, ClientStats};
pub use input::Autopilot;
pub use network::RemoteLink;
pub use prediction::{EntitySnapshot, PredictionBuffer, WorldSnapshot};
pub use reconciler::{Mismatch, ReconcileResult, Reconciler};
