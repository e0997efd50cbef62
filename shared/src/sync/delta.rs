//! Baseline tracking and delta compression of entity sets.
//!
//! An entity's identity is its [`EntityId`] and its state is the opaque
//! component byte string; two states are equal exactly when the bytes are.

use super::SyncError;
use crate::protocol::{EntityId, StateSnapshot, WireEntity};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Receiver-side entity set, keyed by id.
pub type EntityTable = BTreeMap<EntityId, WireEntity>;

/// What a receiver is known to hold as of `tick`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    tick: u64,
    entities: BTreeMap<EntityId, Vec<u8>>,
}

impl Baseline {
    pub fn from_entities(tick: u64, entities: &[WireEntity]) -> Self {
        Self {
            tick,
            entities: entities
                .iter()
                .map(|e| (e.id, e.components.clone()))
                .collect(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn get(&self, id: EntityId) -> Option<&[u8]> {
        self.entities.get(&id).map(Vec::as_slice)
    }
}

/// Change set that takes a receiver holding `baseline` to `current`.
///
/// New or byte-wise changed entities are included in `current`'s order;
/// ids only in the baseline land in `removed`, sorted.
pub fn diff(baseline: &Baseline, tick: u64, current: &[WireEntity]) -> StateSnapshot {
    let entities = current
        .iter()
        .filter(|e| baseline.get(e.id) != Some(e.components.as_slice()))
        .cloned()
        .collect();

    let present: HashSet<EntityId> = current.iter().map(|e| e.id).collect();
    let removed = baseline
        .entities
        .keys()
        .filter(|id| !present.contains(id))
        .copied()
        .collect();

    StateSnapshot {
        tick,
        full: false,
        baseline: baseline.tick,
        entities,
        removed,
    }
}

/// Applies a snapshot to a receiver's entity set. A full snapshot replaces
/// the set; a delta upserts its entities and drops its removals.
pub fn apply(state: &mut EntityTable, snapshot: &StateSnapshot) {
    if snapshot.full {
        state.clear();
    }
    for entity in &snapshot.entities {
        state.insert(entity.id, entity.clone());
    }
    if !snapshot.full {
        for id in &snapshot.removed {
            state.remove(id);
        }
    }
}

const DEFAULT_HISTORY: usize = 64;

/// Per-receiver sender state.
///
/// Remembers what was sent at each tick until the receiver acknowledges one
/// of them, which then becomes the baseline for later deltas. Sends a full
/// snapshot while no baseline exists, every `full_interval` ticks, and after
/// an acknowledgement it cannot match or an explicit request.
#[derive(Debug, Clone)]
pub struct DeltaEncoder {
    baseline: Option<Baseline>,
    sent: VecDeque<(u64, Vec<WireEntity>)>,
    capacity: usize,
    full_interval: u64,
    last_full_tick: Option<u64>,
    force_full: bool,
}

impl DeltaEncoder {
    pub fn new(full_interval: u64) -> Self {
        Self::with_capacity(full_interval, DEFAULT_HISTORY)
    }

    pub fn with_capacity(full_interval: u64, capacity: usize) -> Self {
        Self {
            baseline: None,
            sent: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            full_interval: full_interval.max(1),
            last_full_tick: None,
            force_full: false,
        }
    }

    pub fn baseline_tick(&self) -> Option<u64> {
        self.baseline.as_ref().map(Baseline::tick)
    }

    fn full_due(&self, tick: u64) -> bool {
        self.force_full
            || self.baseline.is_none()
            || self
                .last_full_tick
                .map_or(true, |last| tick.saturating_sub(last) >= self.full_interval)
    }

    pub fn encode(&mut self, tick: u64, current: Vec<WireEntity>) -> StateSnapshot {
        let snapshot = match &self.baseline {
            Some(baseline) if !self.full_due(tick) => diff(baseline, tick, &current),
            _ => {
                self.force_full = false;
                self.last_full_tick = Some(tick);
                StateSnapshot::full(tick, current.clone())
            }
        };

        if self.sent.len() >= self.capacity {
            self.sent.pop_front();
        }
        self.sent.push_back((tick, current));
        snapshot
    }

    /// Adopts the state sent at `tick` as the baseline.
    ///
    /// Acks at or behind the current baseline are ignored. Returns `false`
    /// when `tick` is no longer remembered; the next encode is then full.
    pub fn acknowledge(&mut self, tick: u64) -> bool {
        if self.baseline_tick().map_or(false, |current| tick <= current) {
            return true;
        }

        match self.sent.iter().position(|(sent, _)| *sent == tick) {
            Some(index) => {
                let (_, entities) = &self.sent[index];
                self.baseline = Some(Baseline::from_entities(tick, entities));
                self.sent.drain(..=index);
                true
            }
            None => {
                self.force_full = true;
                false
            }
        }
    }

    pub fn request_full(&mut self) {
        self.force_full = true;
    }
}

/// Receiver-side counterpart of [`DeltaEncoder`]: keeps the entity set
/// reconstructed at each recent tick so deltas can find their baseline.
#[derive(Debug, Clone)]
pub struct DeltaDecoder {
    history: VecDeque<(u64, EntityTable)>,
    capacity: usize,
}

impl Default for DeltaDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl DeltaDecoder {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Reconstructs the full entity set the snapshot describes.
    pub fn apply(&mut self, snapshot: &StateSnapshot) -> Result<EntityTable, SyncError> {
        let mut table = if snapshot.full {
            EntityTable::new()
        } else {
            self.history
                .iter()
                .rev()
                .find(|(tick, _)| *tick == snapshot.baseline)
                .map(|(_, table)| table.clone())
                .ok_or(SyncError::MissingBaseline {
                    tick: snapshot.tick,
                    baseline: snapshot.baseline,
                })?
        };
        apply(&mut table, snapshot);

        self.history.retain(|(tick, _)| *tick < snapshot.tick);
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back((snapshot.tick, table.clone()));
        Ok(table)
    }

    pub fn latest(&self) -> Option<(u64, &EntityTable)> {
        self.history.back().map(|(tick, table)| (*tick, table))
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
