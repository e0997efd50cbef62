//! Generational entity handles and the slot allocator behind them.

use crate::protocol::EntityId;
use serde::{Deserialize, Serialize};

/// Handle to a slot in the world's arena.
///
/// The generation is bumped every time a slot is freed, so a handle kept past
/// its entity's despawn no longer resolves even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    pub index: u32,
    pub generation: u32,
}

impl Entity {
    pub fn id(self) -> EntityId {
        EntityId(((self.generation as u64) << 32) | self.index as u64)
    }

    pub fn from_id(id: EntityId) -> Self {
        Self {
            index: (id.0 & 0xFFFF_FFFF) as u32,
            generation: (id.0 >> 32) as u32,
        }
    }
}

impl From<Entity> for EntityId {
    fn from(entity: Entity) -> Self {
        entity.id()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuses the lowest free slot, growing the arena only when none is free.
    pub fn allocate(&mut self) -> Entity {
        if let Some(index) = self.alive.iter().position(|alive| !alive) {
            self.alive[index] = true;
            return Entity {
                index: index as u32,
                generation: self.generations[index],
            };
        }

        self.generations.push(0);
        self.alive.push(true);
        Entity {
            index: (self.alive.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Frees the slot. Returns `false` for stale or unknown handles.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let index = entity.index as usize;
        self.alive[index] = false;
        self.generations[index] = self.generations[index].wrapping_add(1);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index as usize;
        index < self.alive.len()
            && self.alive[index]
            && self.generations[index] == entity.generation
    }

    pub fn generations(&self) -> &[u32] {
        &self.generations
    }

    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|alive| **alive).count()
    }

    /// Rebuilds an allocator from a generation table and the handles alive in it.
    ///
    /// Live handles may carry generations beyond the table (wire snapshots
    /// don't ship it); the table grows and adopts them.
    pub fn from_parts(generations: &[u32], live: impl IntoIterator<Item = Entity>) -> Self {
        let mut allocator = Self {
            generations: generations.to_vec(),
            alive: vec![false; generations.len()],
        };
        for entity in live {
            let index = entity.index as usize;
            if index >= allocator.generations.len() {
                allocator.generations.resize(index + 1, 0);
                allocator.alive.resize(index + 1, false);
            }
            allocator.generations[index] = entity.generation;
            allocator.alive[index] = true;
        }
        allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut allocator = EntityAllocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_eq!(allocator.live_count(), 2);
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut allocator = EntityAllocator::new();
        let a = allocator.allocate();
        let _b = allocator.allocate();

        assert!(allocator.free(a));
        assert!(!allocator.is_alive(a));
        assert!(!allocator.free(a), "double free should be rejected");

        let c = allocator.allocate();
        assert_eq!(c.index, a.index);
        assert_eq!(c.generation, a.generation + 1);
        assert!(allocator.is_alive(c));
        assert!(!allocator.is_alive(a));
    }

    #[test]
    fn test_entity_id_roundtrip() {
        let entity = Entity {
            index: 12,
            generation: 3,
        };
        assert_eq!(entity.id(), EntityId((3 << 32) | 12));
        assert_eq!(Entity::from_id(entity.id()), entity);
    }

    #[test]
    fn test_from_parts_restores_liveness() {
        let mut allocator = EntityAllocator::new();
        let a = allocator.allocate();
        let b = allocator.allocate();
        allocator.free(a);

        let rebuilt = EntityAllocator::from_parts(allocator.generations(), [b]);
        assert_eq!(rebuilt, allocator);
    }

    #[test]
    fn test_from_parts_grows_for_unknown_slots() {
        let far = Entity {
            index: 4,
            generation: 2,
        };
        let mut allocator = EntityAllocator::from_parts(&[], [far]);
        assert!(allocator.is_alive(far));
        assert_eq!(allocator.allocate().index, 0);
    }
}
