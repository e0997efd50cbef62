//! Rollback-and-replay reconciliation against authoritative server states.

use crate::prediction::{PredictionBuffer, WorldSnapshot};
use log::{debug, trace};
use shared::{EntityId, World, WorldState, POSITION_TOLERANCE};
use std::fmt;

/// Why a predicted state was judged different from the server's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mismatch {
    EntityCount { predicted: usize, authoritative: usize },
    MissingEntity(EntityId),
    Position { id: EntityId, error: f32 },
    Velocity { id: EntityId, error: f32 },
    Grounded(EntityId),
    /// Checksums differ but every field is within tolerance. No correction.
    ChecksumOnly,
}

impl Mismatch {
    pub fn needs_rollback(&self) -> bool {
        !matches!(self, Mismatch::ChecksumOnly)
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::EntityCount {
                predicted,
                authoritative,
            } => write!(
                f,
                "entity count {} predicted, {} authoritative",
                predicted, authoritative
            ),
            Mismatch::MissingEntity(id) => write!(f, "entity {} not predicted", id),
            Mismatch::Position { id, error } => write!(f, "entity {} off by {:.4}", id, error),
            Mismatch::Velocity { id, error } => {
                write!(f, "entity {} velocity off by {:.4}", id, error)
            }
            Mismatch::Grounded(id) => write!(f, "entity {} grounded flag differs", id),
            Mismatch::ChecksumOnly => write!(f, "checksum only"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReconcileResult {
    /// The local world now agrees with the server at `server_tick`.
    pub reconciled: bool,
    pub rolled_back: bool,
    pub replayed_ticks: u32,
    pub server_tick: u64,
    pub mismatch: Option<Mismatch>,
}

/// Compares predictions with authoritative states and rewinds the local
/// world when they disagree.
#[derive(Debug, Clone)]
pub struct Reconciler {
    player_id: u32,
    tolerance: f32,
    rollbacks: u64,
}

impl Reconciler {
    pub fn new(player_id: u32) -> Self {
        Self::with_tolerance(player_id, POSITION_TOLERANCE)
    }

    pub fn with_tolerance(player_id: u32, tolerance: f32) -> Self {
        Self {
            player_id,
            tolerance,
            rollbacks: 0,
        }
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks
    }

    /// `None` when the two agree. Equal checksums skip the detailed pass;
    /// otherwise positions and velocities are compared within tolerance and
    /// the grounded flag exactly.
    pub fn compare(&self, predicted: &WorldSnapshot, authoritative: &WorldSnapshot) -> Option<Mismatch> {
        if predicted.checksum == authoritative.checksum {
            return None;
        }

        if predicted.entities.len() != authoritative.entities.len() {
            return Some(Mismatch::EntityCount {
                predicted: predicted.entities.len(),
                authoritative: authoritative.entities.len(),
            });
        }

        for truth in &authoritative.entities {
            let Some(guess) = predicted.get(truth.id) else {
                return Some(Mismatch::MissingEntity(truth.id));
            };

            let dx = guess.position.x - truth.position.x;
            let dy = guess.position.y - truth.position.y;
            let error = dx.abs().max(dy.abs());
            if error > self.tolerance {
                return Some(Mismatch::Position { id: truth.id, error });
            }

            let dvx = guess.velocity.x - truth.velocity.x;
            let dvy = guess.velocity.y - truth.velocity.y;
            let error = dvx.abs().max(dvy.abs());
            if error > self.tolerance {
                return Some(Mismatch::Velocity { id: truth.id, error });
            }

            if guess.grounded != truth.grounded {
                return Some(Mismatch::Grounded(truth.id));
            }
        }

        Some(Mismatch::ChecksumOnly)
    }

    /// Brings `world` in line with `authoritative`.
    ///
    /// Without a prediction for that tick the state is adopted outright. On a
    /// mismatch the world is restored to the server's tick and every tick up
    /// to where the client had predicted is simulated again, applying the
    /// buffered input for each tick in order. Either way the buffer is pruned
    /// to the server's tick.
    pub fn reconcile(
        &mut self,
        world: &mut World,
        buffer: &mut PredictionBuffer,
        authoritative: &WorldState,
    ) -> ReconcileResult {
        let server_tick = authoritative.tick;
        let mut result = ReconcileResult {
            reconciled: true,
            server_tick,
            ..Default::default()
        };

        let Some(predicted) = buffer.state_at(server_tick) else {
            trace!("No prediction for tick {}, adopting server state", server_tick);
            world.restore(authoritative);
            buffer.prune_before(server_tick);
            buffer.push_state(WorldSnapshot::from(authoritative));
            return result;
        };

        let mismatch = self.compare(predicted, &WorldSnapshot::from(authoritative));
        result.mismatch = mismatch;
        if !mismatch.is_some_and(|m| m.needs_rollback()) {
            buffer.prune_before(server_tick);
            return result;
        }

        let predicted_tick = world.tick();
        let inputs: Vec<_> = buffer.inputs_after(server_tick).copied().collect();

        world.restore(authoritative);
        buffer.push_state(WorldSnapshot::from(authoritative));

        let mut pending = inputs.iter().peekable();
        while world.tick() < predicted_tick {
            let next = world.tick() + 1;
            while let Some(frame) = pending.next_if(|f| f.tick <= next) {
                world.set_player_intent(self.player_id, frame.intents);
            }
            world.update();
            buffer.push_state(WorldSnapshot::from(&world.snapshot()));
            result.replayed_ticks += 1;
        }

        buffer.prune_before(server_tick);
        self.rollbacks += 1;
        result.rolled_back = true;

        if let Some(mismatch) = mismatch {
            debug!(
                "Rollback to tick {} ({}), replayed {} ticks",
                server_tick, mismatch, result.replayed_ticks
            );
        }
        result
    }
}
