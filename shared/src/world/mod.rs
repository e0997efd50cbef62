//! Deterministic entity simulation.
//!
//! Components live in typed [`Storage`] columns indexed by a generational
//! entity slot. [`World::update`] runs the fixed pipeline (input, attack,
//! projectile, physics, collision) exactly once and then advances the tick.
//! Nothing in here reads the clock or iterates in an unspecified order, so the
//! same inputs against the same state always give the same result.

mod components;
mod entity;
mod snapshot;
mod storage;
mod systems;

pub use components::{
    AttackPhase, AttackState, Behavior, Collider, Controller, EnemyKind, EntityKind, Facing, Fist,
    Gravity, Grounded, Player, Position, Velocity,
};
pub use entity::{Entity, EntityAllocator};
pub use snapshot::{compute_checksum, EntityState, Renderable, WorldState};
pub use storage::Storage;

use crate::level::{demo_level, TileOracle};
use crate::protocol::{EntityId, Intent};
use std::sync::Arc;

pub struct World {
    tick: u64,
    level: Arc<dyn TileOracle>,
    allocator: EntityAllocator,
    kinds: Storage<EntityKind>,
    positions: Storage<Position>,
    velocities: Storage<Velocity>,
    colliders: Storage<Collider>,
    grounded: Storage<Grounded>,
    gravity: Storage<Gravity>,
    controllers: Storage<Controller>,
    facing: Storage<Facing>,
    players: Storage<Player>,
    attacks: Storage<AttackState>,
    fists: Storage<Fist>,
    behaviors: Storage<Behavior>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(Arc::new(demo_level()))
    }
}

impl World {
    pub fn new(level: Arc<dyn TileOracle>) -> Self {
        Self {
            tick: 0,
            level,
            allocator: EntityAllocator::new(),
            kinds: Storage::new(),
            positions: Storage::new(),
            velocities: Storage::new(),
            colliders: Storage::new(),
            grounded: Storage::new(),
            gravity: Storage::new(),
            controllers: Storage::new(),
            facing: Storage::new(),
            players: Storage::new(),
            attacks: Storage::new(),
            fists: Storage::new(),
            behaviors: Storage::new(),
        }
    }

    /// A fresh world on `level` seeded from a snapshot.
    pub fn from_state(level: Arc<dyn TileOracle>, state: &WorldState) -> Self {
        let mut world = Self::new(level);
        world.restore(state);
        world
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn level(&self) -> &Arc<dyn TileOracle> {
        &self.level
    }

    pub fn spawn_player(&mut self, id: u32, name: impl Into<String>, x: f32, y: f32) -> Entity {
        let entity = self.allocator.allocate();
        self.attach(&EntityState {
            entity,
            kind: EntityKind::Player,
            position: Position::new(x, y),
            velocity: Velocity::default(),
            grounded: false,
            intents: Intent::NONE,
            facing_right: true,
            player: Some(Player {
                id,
                name: name.into(),
            }),
            attack: Some(AttackState::default()),
            fist: None,
            behavior: None,
        });
        entity
    }

    pub fn spawn_enemy(&mut self, kind: EnemyKind, x: f32, y: f32) -> Entity {
        let entity = self.allocator.allocate();
        self.attach(&EntityState {
            entity,
            kind: EntityKind::Enemy(kind),
            position: Position::new(x, y),
            velocity: Velocity::default(),
            grounded: false,
            intents: Intent::NONE,
            facing_right: true,
            player: None,
            attack: None,
            fist: None,
            behavior: Some(Behavior::Patrol {
                walking_right: true,
            }),
        });
        entity
    }

    fn spawn_fist(&mut self, fist: Fist, x: f32, y: f32) -> Entity {
        let entity = self.allocator.allocate();
        self.attach(&EntityState {
            entity,
            kind: EntityKind::Fist,
            position: Position::new(x, y),
            velocity: Velocity::default(),
            grounded: false,
            intents: Intent::NONE,
            facing_right: fist.direction > 0,
            player: None,
            attack: None,
            fist: Some(fist),
            behavior: None,
        });
        entity
    }

    /// Installs the components an entity of `state.kind` carries.
    fn attach(&mut self, state: &EntityState) {
        let entity = state.entity;
        self.kinds.insert(entity, state.kind);
        self.positions.insert(entity, state.position);
        self.colliders.insert(entity, state.kind.collider());
        self.facing.insert(
            entity,
            Facing {
                right: state.facing_right,
            },
        );

        if matches!(state.kind, EntityKind::Player | EntityKind::Enemy(_)) {
            self.velocities.insert(entity, state.velocity);
            self.grounded.insert(
                entity,
                Grounded {
                    on_ground: state.grounded,
                },
            );
            self.gravity.insert(entity, Gravity::default());
            self.controllers.insert(
                entity,
                Controller {
                    intents: state.intents,
                },
            );
        }
        if let Some(player) = &state.player {
            self.players.insert(entity, player.clone());
        }
        if let Some(attack) = state.attack {
            self.attacks.insert(entity, attack);
        }
        if let Some(fist) = state.fist {
            self.fists.insert(entity, fist);
        }
        if let Some(behavior) = state.behavior {
            self.behaviors.insert(entity, behavior);
        }
    }

    /// Removes the entity and every component it owns. Stale handles are a no-op.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.allocator.free(entity) {
            return false;
        }
        self.kinds.remove(entity);
        self.positions.remove(entity);
        self.velocities.remove(entity);
        self.colliders.remove(entity);
        self.grounded.remove(entity);
        self.gravity.remove(entity);
        self.controllers.remove(entity);
        self.facing.remove(entity);
        self.players.remove(entity);
        self.attacks.remove(entity);
        self.fists.remove(entity);
        self.behaviors.remove(entity);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn player_entity(&self, player_id: u32) -> Option<Entity> {
        self.players
            .iter()
            .find(|(_, player)| player.id == player_id)
            .map(|(entity, _)| entity)
    }

    /// Overwrites the controller of `player_id` for the next update.
    /// Returns `false` when no such player exists.
    pub fn set_player_intent(&mut self, player_id: u32, intents: Intent) -> bool {
        match self.player_entity(player_id) {
            Some(entity) => self.set_intent(entity, intents),
            None => false,
        }
    }

    pub fn set_intent(&mut self, entity: Entity, intents: Intent) -> bool {
        match self.controllers.get_mut(entity) {
            Some(controller) => {
                controller.intents = intents;
                true
            }
            None => false,
        }
    }

    pub fn player_position(&self, player_id: u32) -> Option<Position> {
        self.player_entity(player_id)
            .and_then(|entity| self.position(entity))
    }

    pub fn position(&self, entity: Entity) -> Option<Position> {
        self.positions.get(entity).copied()
    }

    pub fn velocity(&self, entity: Entity) -> Option<Velocity> {
        self.velocities.get(entity).copied()
    }

    pub fn is_grounded(&self, entity: Entity) -> bool {
        self.grounded
            .get(entity)
            .map(|g| g.on_ground)
            .unwrap_or(false)
    }

    pub fn attack_state(&self, entity: Entity) -> Option<AttackState> {
        self.attacks.get(entity).copied()
    }

    pub fn fists(&self) -> Vec<(Entity, Fist)> {
        self.fists.iter().map(|(entity, fist)| (entity, *fist)).collect()
    }

    /// Advances the simulation by exactly one tick.
    pub fn update(&mut self) {
        self.input_system();
        self.attack_system();
        self.projectile_system();
        self.physics_system();
        self.collision_system();
        self.tick += 1;
    }

    fn entity_state(&self, entity: Entity, kind: EntityKind) -> EntityState {
        EntityState {
            entity,
            kind,
            position: self.positions.get(entity).copied().unwrap_or_default(),
            velocity: self.velocities.get(entity).copied().unwrap_or_default(),
            grounded: self.is_grounded(entity),
            intents: self
                .controllers
                .get(entity)
                .map(|c| c.intents)
                .unwrap_or_default(),
            facing_right: self.facing.get(entity).map(|f| f.right).unwrap_or(true),
            player: self.players.get(entity).cloned(),
            attack: self.attacks.get(entity).copied(),
            fist: self.fists.get(entity).copied(),
            behavior: self.behaviors.get(entity).copied(),
        }
    }

    /// Full copy of the simulation at the current tick.
    pub fn snapshot(&self) -> WorldState {
        let entities = self
            .kinds
            .iter()
            .map(|(entity, kind)| self.entity_state(entity, *kind))
            .collect();
        WorldState::new(self.tick, entities, self.allocator.generations().to_vec())
    }

    /// Replaces the whole simulation with `state`. The level is kept.
    pub fn restore(&mut self, state: &WorldState) {
        let level = Arc::clone(&self.level);
        *self = Self::new(level);
        self.tick = state.tick;
        self.allocator = EntityAllocator::from_parts(
            &state.generations,
            state.entities.iter().map(|e| e.entity),
        );
        for entity in &state.entities {
            self.attach(entity);
        }
    }

    pub fn renderables(&self) -> Vec<Renderable> {
        self.kinds
            .iter()
            .map(|(entity, kind)| Renderable::from(&self.entity_state(entity, *kind)))
            .collect()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.kinds.entities().into_iter().map(Entity::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::TileMap;
    use crate::{ATTACK_COOLDOWN, JUMP_SPEED, MAX_CHARGE_TICKS, MAX_FIST_DISTANCE, MIN_FIST_DISTANCE};
    use assert_approx_eq::assert_approx_eq;

    /// 20x10 room: floor on row 9, walls on both edges.
    fn room() -> Arc<dyn TileOracle> {
        let mut map = TileMap::new(20, 10);
        for x in 0..20 {
            map.set(x, 9, crate::level::TileFlag::SOLID);
        }
        for y in 0..10 {
            map.set(0, y, crate::level::TileFlag::SOLID);
            map.set(19, y, crate::level::TileFlag::SOLID);
        }
        Arc::new(map)
    }

    fn world_with_player() -> (World, Entity) {
        let mut world = World::new(room());
        let player = world.spawn_player(1, "Test", 5.0, 8.0);
        world.update();
        (world, player)
    }

    fn count_fists(world: &World) -> usize {
        world.fists().len()
    }

    #[test]
    fn test_idle_player_stays_on_ground() {
        let (mut world, player) = world_with_player();
        let start = world.position(player).unwrap();
        for _ in 0..60 {
            world.update();
        }
        assert_eq!(world.tick(), 61);
        assert_eq!(world.position(player).unwrap(), start);
        assert!(world.is_grounded(player));
    }

    #[test]
    fn test_jump_leaves_ground_same_tick() {
        let (mut world, player) = world_with_player();
        assert!(world.is_grounded(player));

        world.set_player_intent(1, Intent::JUMP);
        world.update();

        assert!(!world.is_grounded(player));
        assert!(world.velocity(player).unwrap().y < 0.0);
        assert!(world.position(player).unwrap().y < 8.0);
    }

    #[test]
    fn test_no_double_jump() {
        let (mut world, player) = world_with_player();
        world.set_player_intent(1, Intent::JUMP);
        world.update();
        let after_first = world.velocity(player).unwrap().y;

        world.update();
        let after_second = world.velocity(player).unwrap().y;
        assert!(after_second > after_first, "second jump should not re-apply");
        assert!(after_second > JUMP_SPEED);
    }

    #[test]
    fn test_left_and_right_cancel() {
        let (mut world, player) = world_with_player();
        world.set_player_intent(1, Intent::LEFT | Intent::RIGHT);
        world.update();
        assert_eq!(world.velocity(player).unwrap().x, 0.0);
        assert_eq!(world.position(player).unwrap().x, 5.0);
    }

    #[test]
    fn test_walking_into_wall_stops() {
        let (mut world, player) = world_with_player();
        world.set_player_intent(1, Intent::LEFT);
        for _ in 0..100 {
            world.update();
        }
        let position = world.position(player).unwrap();
        assert_approx_eq!(position.x, 1.0, 1e-4);
        assert_eq!(world.velocity(player).unwrap().x, 0.0);
        assert!(world.is_grounded(player));
    }

    #[test]
    fn test_charge_release_fires_once() {
        let (mut world, _) = world_with_player();

        for _ in 0..100 {
            world.set_player_intent(1, Intent::ATTACK);
            world.update();
            assert_eq!(count_fists(&world), 0, "must not fire while held");
        }

        world.set_player_intent(1, Intent::NONE);
        world.update();
        assert_eq!(count_fists(&world), 1);
    }

    #[test]
    fn test_quick_tap_gives_minimum_distance() {
        let (mut world, _) = world_with_player();
        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        world.set_player_intent(1, Intent::NONE);
        world.update();

        let fists = world.fists();
        assert_eq!(fists.len(), 1);
        assert_approx_eq!(fists[0].1.max_distance, MIN_FIST_DISTANCE);
    }

    #[test]
    fn test_full_charge_gives_maximum_distance() {
        let (mut world, player) = world_with_player();
        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        for _ in 0..MAX_CHARGE_TICKS {
            world.update();
        }
        assert_eq!(
            world.attack_state(player).unwrap().charge_ticks(),
            MAX_CHARGE_TICKS
        );

        world.set_player_intent(1, Intent::NONE);
        world.update();
        assert_approx_eq!(world.fists()[0].1.max_distance, MAX_FIST_DISTANCE);
    }

    #[test]
    fn test_charge_is_clamped() {
        let (mut world, player) = world_with_player();
        world.set_player_intent(1, Intent::ATTACK);
        for _ in 0..(MAX_CHARGE_TICKS * 2) {
            world.update();
        }
        assert_eq!(
            world.attack_state(player).unwrap().charge_ticks(),
            MAX_CHARGE_TICKS
        );
    }

    #[test]
    fn test_cooldown_blocks_new_charge() {
        let (mut world, player) = world_with_player();
        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        world.set_player_intent(1, Intent::NONE);
        world.update();
        assert!(world.attack_state(player).unwrap().is_attacking());

        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        assert!(!world.attack_state(player).unwrap().is_charging());

        world.set_player_intent(1, Intent::NONE);
        for _ in 0..ATTACK_COOLDOWN + 5 {
            world.update();
        }
        let state = world.attack_state(player).unwrap();
        assert!(!state.is_attacking());
        assert!(!state.is_charging());

        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        assert!(world.attack_state(player).unwrap().is_charging());
    }

    #[test]
    fn test_fist_despawns_after_range() {
        let (mut world, _) = world_with_player();
        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        world.set_player_intent(1, Intent::NONE);
        world.update();
        assert_eq!(count_fists(&world), 1);

        // Minimum range at half a tile per tick.
        for _ in 0..10 {
            world.update();
        }
        assert_eq!(count_fists(&world), 0);
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_fist_travels_facing_direction() {
        let (mut world, _) = world_with_player();
        world.set_player_intent(1, Intent::LEFT);
        world.update();
        world.set_player_intent(1, Intent::ATTACK);
        world.update();
        world.set_player_intent(1, Intent::NONE);
        world.update();

        let (_, fist) = world.fists()[0];
        assert_eq!(fist.direction, -1);
    }

    #[test]
    fn test_despawn_removes_everything() {
        let (mut world, player) = world_with_player();
        assert!(world.despawn(player));
        assert!(!world.is_alive(player));
        assert!(!world.despawn(player));
        assert_eq!(world.entity_count(), 0);
        assert!(world.position(player).is_none());
        assert!(!world.set_player_intent(1, Intent::RIGHT));
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut world = World::new(room());
        let first = world.spawn_enemy(EnemyKind::Slime, 3.0, 8.0);
        world.despawn(first);
        let second = world.spawn_enemy(EnemyKind::Slime, 6.0, 8.0);

        assert_eq!(first.index, second.index);
        assert!(world.position(first).is_none());
        assert_eq!(world.position(second).unwrap().x, 6.0);
    }

    #[test]
    fn test_patrol_turns_at_wall() {
        let mut world = World::new(room());
        let slime = world.spawn_enemy(EnemyKind::Slime, 17.0, 8.0);

        let mut turned = false;
        for _ in 0..200 {
            world.update();
            if world.velocity(slime).unwrap().x < 0.0 {
                turned = true;
                break;
            }
        }
        assert!(turned, "slime never turned around");
        assert!(world.position(slime).unwrap().x <= 18.0);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let (mut world, _) = world_with_player();
        world.spawn_enemy(EnemyKind::Slime, 10.0, 8.0);
        world.set_player_intent(1, Intent::RIGHT | Intent::ATTACK);
        world.update();
        let saved = world.snapshot();

        for _ in 0..30 {
            world.set_player_intent(1, Intent::LEFT | Intent::JUMP);
            world.update();
        }
        assert_ne!(world.snapshot(), saved);

        world.restore(&saved);
        assert_eq!(world.snapshot(), saved);
        assert_eq!(world.tick(), saved.tick);
    }

    #[test]
    fn test_determinism_same_inputs_same_checksums() {
        let script = [
            Intent::RIGHT,
            Intent::RIGHT | Intent::JUMP,
            Intent::ATTACK,
            Intent::ATTACK,
            Intent::NONE,
            Intent::LEFT,
        ];

        let run = || {
            let mut world = World::new(room());
            world.spawn_player(1, "a", 4.0, 3.0);
            world.spawn_enemy(EnemyKind::Slime, 12.0, 8.0);
            let mut checksums = Vec::new();
            for i in 0..240 {
                world.set_player_intent(1, script[i % script.len()]);
                world.update();
                checksums.push(world.snapshot().checksum);
            }
            checksums
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_renderables_cover_all_entities() {
        let (mut world, _) = world_with_player();
        world.spawn_enemy(EnemyKind::Slime, 10.0, 8.0);
        let renderables = world.renderables();
        let sprites: Vec<_> = renderables.iter().map(|r| r.sprite).collect();
        assert_eq!(sprites, vec!["player", "slime"]);
        assert_eq!(renderables[0].player_id, Some(1));
    }
}
