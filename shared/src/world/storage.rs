use super::entity::Entity;

/// Dense component column indexed by entity slot.
///
/// Each occupied slot remembers the generation it was written for, so a stale
/// handle never reads a newer entity's component. Iteration is always in slot
/// order, which keeps every system deterministic.
#[derive(Debug, Clone)]
pub struct Storage<T> {
    slots: Vec<Option<(u32, T)>>,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Storage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity, value: T) {
        let index = entity.index as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some((entity.generation, value));
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slots.get_mut(entity.index as usize)?;
        match slot {
            Some((generation, _)) if *generation == entity.generation => {
                slot.take().map(|(_, value)| value)
            }
            _ => None,
        }
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        match self.slots.get(entity.index as usize)? {
            Some((generation, value)) if *generation == entity.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        match self.slots.get_mut(entity.index as usize)? {
            Some((generation, value)) if *generation == entity.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|(generation, value)| {
                (
                    Entity {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            slot.as_mut().map(|(generation, value)| {
                (
                    Entity {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )
            })
        })
    }

    /// Handles of every occupied slot, in slot order.
    pub fn entities(&self) -> Vec<Entity> {
        self.iter().map(|(entity, _)| entity).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32, generation: u32) -> Entity {
        Entity { index, generation }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut storage = Storage::new();
        storage.insert(entity(2, 0), "two");
        assert_eq!(storage.get(entity(2, 0)), Some(&"two"));
        assert_eq!(storage.get(entity(0, 0)), None);
        assert_eq!(storage.len(), 1);

        assert_eq!(storage.remove(entity(2, 0)), Some("two"));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut storage = Storage::new();
        storage.insert(entity(0, 1), 10);
        assert_eq!(storage.get(entity(0, 0)), None);
        assert_eq!(storage.remove(entity(0, 0)), None);
        assert_eq!(storage.get(entity(0, 1)), Some(&10));
    }

    #[test]
    fn test_iteration_in_slot_order() {
        let mut storage = Storage::new();
        storage.insert(entity(3, 0), 'c');
        storage.insert(entity(0, 0), 'a');
        storage.insert(entity(1, 2), 'b');

        let seen: Vec<_> = storage.iter().map(|(e, v)| (e.index, *v)).collect();
        assert_eq!(seen, vec![(0, 'a'), (1, 'b'), (3, 'c')]);

        for (_, value) in storage.iter_mut() {
            *value = value.to_ascii_uppercase();
        }
        assert_eq!(storage.get(entity(1, 2)), Some(&'B'));
    }
}
