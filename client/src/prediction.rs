//! Sent inputs and locally predicted states, kept for reconciliation.

use serde::{Deserialize, Serialize};
use shared::world::{Position, Velocity};
use shared::{EntityId, InputFrame, WorldState};
use std::collections::VecDeque;

/// Two seconds of history at 60 Hz.
pub const DEFAULT_CAPACITY: usize = 128;

/// The fields reconciliation compares for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub position: Position,
    pub velocity: Velocity,
    pub grounded: bool,
}

/// Lightweight copy of a predicted world: physics fields and the checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub entities: Vec<EntitySnapshot>,
    pub checksum: u32,
}

impl From<&WorldState> for WorldSnapshot {
    fn from(state: &WorldState) -> Self {
        Self {
            tick: state.tick,
            entities: state
                .entities
                .iter()
                .map(|e| EntitySnapshot {
                    id: e.id(),
                    position: e.position,
                    velocity: e.velocity,
                    grounded: e.grounded,
                })
                .collect(),
            checksum: state.checksum,
        }
    }
}

impl WorldSnapshot {
    pub fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }
}

/// Two bounded, tick-ordered ring buffers. Pushing past capacity evicts the
/// oldest entry whether or not the server has confirmed it.
#[derive(Debug, Clone)]
pub struct PredictionBuffer {
    inputs: VecDeque<InputFrame>,
    states: VecDeque<WorldSnapshot>,
    capacity: usize,
}

impl Default for PredictionBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PredictionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inputs: VecDeque::with_capacity(capacity),
            states: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records a sent input. A frame for a tick at or before the newest one
    /// replaces that part of the history.
    pub fn push_input(&mut self, frame: InputFrame) {
        while self.inputs.back().is_some_and(|f| f.tick >= frame.tick) {
            self.inputs.pop_back();
        }
        if self.inputs.len() == self.capacity {
            self.inputs.pop_front();
        }
        self.inputs.push_back(frame);
    }

    /// Records a predicted state, replacing any at the same or later ticks.
    pub fn push_state(&mut self, snapshot: WorldSnapshot) {
        while self.states.back().is_some_and(|s| s.tick >= snapshot.tick) {
            self.states.pop_back();
        }
        if self.states.len() == self.capacity {
            self.states.pop_front();
        }
        self.states.push_back(snapshot);
    }

    pub fn state_at(&self, tick: u64) -> Option<&WorldSnapshot> {
        // Ticks are ordered, so a binary search finds the slot.
        let index = self
            .states
            .binary_search_by_key(&tick, |s| s.tick)
            .ok()?;
        self.states.get(index)
    }

    pub fn input_at(&self, tick: u64) -> Option<&InputFrame> {
        let index = self.inputs.binary_search_by_key(&tick, |f| f.tick).ok()?;
        self.inputs.get(index)
    }

    /// Buffered inputs strictly after `tick`, in tick order.
    pub fn inputs_after(&self, tick: u64) -> impl Iterator<Item = &InputFrame> {
        self.inputs.iter().filter(move |f| f.tick > tick)
    }

    /// Drops every input and state strictly before `tick`.
    pub fn prune_before(&mut self, tick: u64) {
        while self.inputs.front().is_some_and(|f| f.tick < tick) {
            self.inputs.pop_front();
        }
        while self.states.front().is_some_and(|s| s.tick < tick) {
            self.states.pop_front();
        }
    }

    pub fn latest_input_tick(&self) -> Option<u64> {
        self.inputs.back().map(|f| f.tick)
    }

    pub fn input_len(&self) -> usize {
        self.inputs.len()
    }

    pub fn state_len(&self) -> usize {
        self.states.len()
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Intent;

    fn snapshot(tick: u64) -> WorldSnapshot {
        WorldSnapshot {
            tick,
            entities: Vec::new(),
            checksum: tick as u32,
        }
    }

    #[test]
    fn test_lookup_by_tick() {
        let mut buffer = PredictionBuffer::new(8);
        for tick in 1..=5 {
            buffer.push_input(InputFrame::new(tick, Intent::RIGHT));
            buffer.push_state(snapshot(tick));
        }
        assert_eq!(buffer.state_at(3).map(|s| s.tick), Some(3));
        assert!(buffer.state_at(9).is_none());
        assert_eq!(buffer.input_at(5).map(|f| f.tick), Some(5));

        let after: Vec<_> = buffer.inputs_after(2).map(|f| f.tick).collect();
        assert_eq!(after, vec![3, 4, 5]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = PredictionBuffer::new(3);
        for tick in 1..=5 {
            buffer.push_input(InputFrame::new(tick, Intent::NONE));
            buffer.push_state(snapshot(tick));
        }
        assert_eq!(buffer.input_len(), 3);
        assert_eq!(buffer.state_len(), 3);
        assert!(buffer.state_at(2).is_none());
        assert!(buffer.state_at(3).is_some());
    }

    #[test]
    fn test_prune_before_keeps_tick() {
        let mut buffer = PredictionBuffer::new(16);
        for tick in 1..=10 {
            buffer.push_input(InputFrame::new(tick, Intent::NONE));
            buffer.push_state(snapshot(tick));
        }
        buffer.prune_before(7);
        assert_eq!(buffer.input_len(), 4);
        assert_eq!(buffer.state_len(), 4);
        assert!(buffer.state_at(7).is_some());
        assert!(buffer.state_at(6).is_none());
    }

    #[test]
    fn test_rewritten_history_replaces_later_entries() {
        let mut buffer = PredictionBuffer::new(16);
        for tick in 1..=6 {
            buffer.push_input(InputFrame::new(tick, Intent::LEFT));
            buffer.push_state(snapshot(tick));
        }
        buffer.push_input(InputFrame::new(4, Intent::JUMP));
        buffer.push_state(snapshot(4));

        assert_eq!(buffer.latest_input_tick(), Some(4));
        assert_eq!(buffer.input_at(4).map(|f| f.intents), Some(Intent::JUMP));
        assert_eq!(buffer.state_len(), 4);
        assert!(buffer.state_at(5).is_none());
    }

    #[test]
    fn test_world_snapshot_from_state() {
        let mut world = shared::World::default();
        world.spawn_player(1, "a", 5.0, 5.0);
        world.update();
        let state = world.snapshot();

        let light = WorldSnapshot::from(&state);
        assert_eq!(light.tick, state.tick);
        assert_eq!(light.checksum, state.checksum);
        assert_eq!(light.entities.len(), 1);
        let entity = light.get(state.entities[0].id()).unwrap();
        assert_eq!(entity.position, state.entities[0].position);
    }
}
