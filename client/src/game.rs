use crate::prediction::{PredictionBuffer, WorldSnapshot, DEFAULT_CAPACITY};
use crate::reconciler::{ReconcileResult, Reconciler};
use log::info;
use shared::sync::SnapshotBuffer;
use shared::{InputFrame, Intent, Renderable, TileOracle, World, WorldState, POSITION_TOLERANCE};
use std::collections::HashMap;
use std::sync::Arc;

/// Netcode switches. Each can be flipped at runtime to compare behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub prediction: bool,
    pub reconciliation: bool,
    pub interpolation: bool,
    pub buffer_capacity: usize,
    pub interpolation_capacity: usize,
    pub tolerance: f32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            prediction: true,
            reconciliation: true,
            interpolation: true,
            buffer_capacity: DEFAULT_CAPACITY,
            interpolation_capacity: 4,
            tolerance: POSITION_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub predicted_ticks: u64,
    pub states_received: u64,
    pub rollbacks: u64,
    pub replayed_ticks: u64,
    pub checksum_only: u64,
    pub last_server_tick: u64,
}

/// Client-side view of the game: the locally predicted world, the latest
/// server states for everyone else, and the bookkeeping that keeps the two
/// consistent.
pub struct ClientGame {
    player_id: u32,
    world: World,
    buffer: PredictionBuffer,
    reconciler: Reconciler,
    interpolation: SnapshotBuffer<Arc<WorldState>>,
    /// Progress between the two oldest interpolation snapshots, 0..1.
    alpha: f32,
    confirmed: Option<Arc<WorldState>>,
    options: ClientOptions,
    stats: ClientStats,
}

impl ClientGame {
    pub fn new(player_id: u32, level: Arc<dyn TileOracle>, options: ClientOptions) -> Self {
        Self {
            player_id,
            world: World::new(level),
            buffer: PredictionBuffer::new(options.buffer_capacity),
            reconciler: Reconciler::with_tolerance(player_id, options.tolerance),
            interpolation: SnapshotBuffer::new(options.interpolation_capacity),
            alpha: 0.0,
            confirmed: None,
            options,
            stats: ClientStats::default(),
        }
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    /// Tick of the local (predicted) world.
    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// True once a server state has been applied.
    pub fn is_synced(&self) -> bool {
        self.confirmed.is_some()
    }

    pub fn confirmed(&self) -> Option<&WorldState> {
        self.confirmed.as_deref()
    }

    pub fn set_prediction(&mut self, enabled: bool) {
        self.options.prediction = enabled;
        info!("Client-side prediction: {}", enabled);
    }

    pub fn set_reconciliation(&mut self, enabled: bool) {
        self.options.reconciliation = enabled;
        info!("Server reconciliation: {}", enabled);
    }

    pub fn set_interpolation(&mut self, enabled: bool) {
        self.options.interpolation = enabled;
        if !enabled {
            self.interpolation.clear();
            self.alpha = 0.0;
        }
        info!("Interpolation: {}", enabled);
    }

    /// Stamps `intents` with the tick they are meant to affect, records them,
    /// and advances the local world one tick when predicting. The returned
    /// frame is what goes to the server.
    pub fn predict(&mut self, intents: Intent) -> InputFrame {
        let frame = InputFrame::new(self.world.tick() + 1, intents);
        self.buffer.push_input(frame);

        if self.options.prediction && self.is_synced() {
            self.world.set_player_intent(self.player_id, intents);
            self.world.update();
            self.buffer
                .push_state(WorldSnapshot::from(&self.world.snapshot()));
            self.stats.predicted_ticks += 1;
        }
        frame
    }

    /// Folds an authoritative state into the client.
    pub fn apply_server_state(&mut self, state: Arc<WorldState>) -> ReconcileResult {
        self.stats.states_received += 1;
        self.stats.last_server_tick = state.tick;

        if self.options.interpolation {
            self.interpolation.push(Arc::clone(&state));
        }

        let result = if !self.options.prediction || !self.is_synced() {
            // The local world simply mirrors the server.
            self.world.restore(&state);
            self.buffer.clear();
            self.buffer.push_state(WorldSnapshot::from(state.as_ref()));
            ReconcileResult {
                reconciled: true,
                server_tick: state.tick,
                ..Default::default()
            }
        } else if self.options.reconciliation {
            self.reconciler
                .reconcile(&mut self.world, &mut self.buffer, &state)
        } else {
            self.buffer.prune_before(state.tick);
            ReconcileResult {
                server_tick: state.tick,
                ..Default::default()
            }
        };

        if result.rolled_back {
            self.stats.rollbacks += 1;
            self.stats.replayed_ticks += result.replayed_ticks as u64;
        } else if result.mismatch.is_some() {
            self.stats.checksum_only += 1;
        }

        self.confirmed = Some(state);
        result
    }

    /// Moves the interpolation cursor forward by `ticks` local ticks,
    /// dropping snapshots that have been fully interpolated past.
    pub fn advance_render(&mut self, ticks: f32) {
        if !self.options.interpolation {
            return;
        }
        let mut ticks = ticks;
        while let Some((from, to)) = self.interpolation.get() {
            let span = to.tick.saturating_sub(from.tick).max(1) as f32;
            let remaining = (1.0 - self.alpha) * span;
            // The newest pair is held at its end until another state arrives.
            if ticks < remaining || self.interpolation.len() <= 2 {
                self.alpha = (self.alpha + ticks / span).min(1.0);
                return;
            }
            self.interpolation.advance();
            self.alpha = 0.0;
            ticks -= remaining;
        }
    }

    /// What a display should draw this frame. The local player comes from the
    /// predicted world; everyone else from server states, interpolated when
    /// enabled.
    pub fn renderables(&self) -> Vec<Renderable> {
        let mut result = Vec::new();

        if self.options.prediction {
            result.extend(
                self.world
                    .renderables()
                    .into_iter()
                    .filter(|r| r.player_id == Some(self.player_id)),
            );
        }

        let others = match (self.options.interpolation, self.interpolation.get()) {
            (true, Some((from, to))) => interpolate(from, to, self.alpha),
            _ => match &self.confirmed {
                Some(state) => state.renderables(),
                None => self.world.renderables(),
            },
        };

        let skip_local = self.options.prediction;
        result.extend(
            others
                .into_iter()
                .filter(|r| !(skip_local && r.player_id == Some(self.player_id))),
        );
        result
    }
}

fn interpolate(from: &WorldState, to: &WorldState, alpha: f32) -> Vec<Renderable> {
    let start: HashMap<_, _> = from.entities.iter().map(|e| (e.id(), e.position)).collect();
    to.renderables()
        .into_iter()
        .map(|mut r| {
            if let Some(p) = start.get(&r.id) {
                r.x = p.x + (r.x - p.x) * alpha;
                r.y = p.y + (r.y - p.y) * alpha;
            }
            r
        })
        .collect()
}
