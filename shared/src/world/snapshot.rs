//! Materialized world state for rollback, checksums and the wire.

use super::components::{AttackState, Behavior, EntityKind, Fist, Player, Position, Velocity};
use super::entity::Entity;
use crate::protocol::{EntityId, Intent, ProtocolError, StateSnapshot, WireEntity};
use serde::{Deserialize, Serialize};

/// Everything the simulation needs to rebuild one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity: Entity,
    pub kind: EntityKind,
    pub position: Position,
    pub velocity: Velocity,
    pub grounded: bool,
    pub intents: Intent,
    pub facing_right: bool,
    pub player: Option<Player>,
    pub attack: Option<AttackState>,
    pub fist: Option<Fist>,
    pub behavior: Option<Behavior>,
}

impl EntityState {
    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    /// Serialized component bytes, the unit delta sync compares.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Point-in-time copy of the whole world, entities in slot order.
///
/// Never edited in place: build a new one with [`WorldState::new`] so the
/// checksum always matches the contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub tick: u64,
    pub entities: Vec<EntityState>,
    /// Arena generation per slot, so a restored world hands out the same handles.
    pub generations: Vec<u32>,
    pub checksum: u32,
}

/// Read-only entity view for display layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub id: EntityId,
    pub sprite: &'static str,
    pub x: f32,
    pub y: f32,
    pub facing_right: bool,
    pub player_id: Option<u32>,
}

impl From<&EntityState> for Renderable {
    fn from(state: &EntityState) -> Self {
        Self {
            id: state.id(),
            sprite: state.kind.sprite_id(),
            x: state.position.x,
            y: state.position.y,
            facing_right: state.facing_right,
            player_id: state.player.as_ref().map(|p| p.id),
        }
    }
}

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(mut hash: u32, bytes: &[u8]) -> u32 {
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn quantize(value: f32) -> i64 {
    (value as f64 * 1000.0) as i64
}

/// FNV-1a over the tick plus each entity's quantized position, velocity and
/// grounded flag, in order.
pub fn compute_checksum(tick: u64, entities: &[EntityState]) -> u32 {
    let mut hash = fnv1a(FNV_OFFSET, &tick.to_le_bytes());
    for entity in entities {
        hash = fnv1a(hash, &quantize(entity.position.x).to_le_bytes());
        hash = fnv1a(hash, &quantize(entity.position.y).to_le_bytes());
        hash = fnv1a(hash, &quantize(entity.velocity.x).to_le_bytes());
        hash = fnv1a(hash, &quantize(entity.velocity.y).to_le_bytes());
        hash = fnv1a(hash, &[entity.grounded as u8]);
    }
    hash
}

impl WorldState {
    pub fn new(tick: u64, entities: Vec<EntityState>, generations: Vec<u32>) -> Self {
        let checksum = compute_checksum(tick, &entities);
        Self {
            tick,
            entities,
            generations,
            checksum,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn player(&self, player_id: u32) -> Option<&EntityState> {
        self.entities
            .iter()
            .find(|e| e.player.as_ref().map(|p| p.id) == Some(player_id))
    }

    pub fn to_wire_entities(&self) -> Result<Vec<WireEntity>, ProtocolError> {
        self.entities
            .iter()
            .map(|e| {
                Ok(WireEntity {
                    id: e.id(),
                    components: e.to_bytes()?,
                })
            })
            .collect()
    }

    pub fn to_full_snapshot(&self) -> Result<StateSnapshot, ProtocolError> {
        Ok(StateSnapshot::full(self.tick, self.to_wire_entities()?))
    }

    /// Rebuilds a state from wire entities. Entities are put back in slot
    /// order; the generation table of free slots is not carried on the wire.
    pub fn from_wire<'a, I>(tick: u64, entities: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = &'a WireEntity>,
    {
        let mut states = entities
            .into_iter()
            .map(|wire| {
                let mut state = EntityState::from_bytes(&wire.components)?;
                state.entity = Entity::from_id(wire.id);
                Ok(state)
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        states.sort_by_key(|s| s.entity.index);
        Ok(Self::new(tick, states, Vec::new()))
    }

    pub fn renderables(&self) -> Vec<Renderable> {
        self.entities.iter().map(Renderable::from).collect()
    }
}
