//! The per-tick systems, in pipeline order.

use super::components::{AttackPhase, Behavior, Collider, Fist, Grounded, Position, Velocity};
use super::entity::Entity;
use super::World;
use crate::level::TileOracle;
use crate::protocol::Intent;
use crate::{
    charge_distance, ATTACK_COOLDOWN, FIST_SIZE, FIST_SPEED, GRAVITY, JUMP_SPEED,
    MAX_CHARGE_TICKS, MAX_FALL_SPEED,
};

/// Slack for float error when deciding which side of a tile edge we came from.
const EPSILON: f32 = 1e-3;

fn tile(coordinate: f32) -> i32 {
    coordinate.floor() as i32
}

impl World {
    /// Behaviours write their controllers, then every controller is turned
    /// into horizontal velocity, facing and jumps.
    pub(super) fn input_system(&mut self) {
        for (entity, behavior) in self.behaviors.iter_mut() {
            match behavior {
                Behavior::Patrol { walking_right } => {
                    let blocked = match (self.controllers.get(entity), self.velocities.get(entity)) {
                        (Some(controller), Some(velocity)) => {
                            controller.intents.horizontal() != 0 && velocity.x == 0.0
                        }
                        _ => false,
                    };
                    if blocked {
                        *walking_right = !*walking_right;
                    }
                    if let Some(controller) = self.controllers.get_mut(entity) {
                        controller.intents = if *walking_right {
                            Intent::RIGHT
                        } else {
                            Intent::LEFT
                        };
                    }
                }
            }
        }

        for (entity, controller) in self.controllers.iter() {
            let Some(velocity) = self.velocities.get_mut(entity) else {
                continue;
            };
            let speed = self
                .kinds
                .get(entity)
                .map(|kind| kind.move_speed())
                .unwrap_or(0.0);

            let direction = controller.intents.horizontal();
            velocity.x = direction as f32 * speed;
            if direction != 0 {
                if let Some(facing) = self.facing.get_mut(entity) {
                    facing.right = direction > 0;
                }
            }

            if controller.intents.contains(Intent::JUMP) {
                if let Some(grounded) = self.grounded.get_mut(entity) {
                    if grounded.on_ground {
                        velocity.y = JUMP_SPEED;
                        grounded.on_ground = false;
                    }
                }
            }
        }
    }

    pub(super) fn attack_system(&mut self) {
        let mut throws = Vec::new();

        for (entity, attack) in self.attacks.iter_mut() {
            let pressed = self
                .controllers
                .get(entity)
                .map(|c| c.intents.contains(Intent::ATTACK))
                .unwrap_or(false);
            let rising = pressed && !attack.held;

            attack.phase = match attack.phase {
                AttackPhase::Idle if rising => AttackPhase::Charging { ticks: 0 },
                AttackPhase::Idle => AttackPhase::Idle,
                AttackPhase::Charging { ticks } if pressed => AttackPhase::Charging {
                    ticks: (ticks + 1).min(MAX_CHARGE_TICKS),
                },
                AttackPhase::Charging { ticks } => {
                    throws.push((entity, charge_distance(ticks)));
                    AttackPhase::Attacking {
                        cooldown: ATTACK_COOLDOWN,
                    }
                }
                AttackPhase::Attacking { cooldown } if cooldown > 1 => AttackPhase::Attacking {
                    cooldown: cooldown - 1,
                },
                AttackPhase::Attacking { .. } => AttackPhase::Idle,
            };
            attack.held = pressed;
        }

        for (owner, distance) in throws {
            self.throw_fist(owner, distance);
        }
    }

    /// Spawns a fist just outside the owner's collider on the side it faces.
    fn throw_fist(&mut self, owner: Entity, max_distance: f32) {
        let (Some(position), Some(collider)) = (
            self.positions.get(owner).copied(),
            self.colliders.get(owner).copied(),
        ) else {
            return;
        };
        let right = self.facing.get(owner).map(|f| f.right).unwrap_or(true);

        let bounds = collider.bounds(&position);
        let x = if right {
            bounds.right()
        } else {
            bounds.left() - FIST_SIZE
        };
        let y = bounds.top() + (bounds.height - FIST_SIZE) / 2.0;

        let fist = Fist {
            owner: owner.id(),
            direction: if right { 1 } else { -1 },
            start_x: x,
            max_distance,
        };
        let spawned = self.spawn_fist(fist, x, y);
        log::trace!(
            "tick {}: {} threw {} ({:.2} tiles)",
            self.tick,
            owner.id(),
            spawned.id(),
            max_distance
        );
    }

    pub(super) fn projectile_system(&mut self) {
        let mut spent = Vec::new();
        for (entity, fist) in self.fists.iter() {
            if let Some(position) = self.positions.get_mut(entity) {
                position.x += fist.direction as f32 * FIST_SPEED;
                if fist.traveled(position) >= fist.max_distance {
                    spent.push(entity);
                }
            }
        }
        for entity in spent {
            self.despawn(entity);
        }
    }

    pub(super) fn physics_system(&mut self) {
        for (entity, velocity) in self.velocities.iter_mut() {
            if let Some(gravity) = self.gravity.get(entity) {
                velocity.y = (velocity.y + GRAVITY * gravity.scale).min(MAX_FALL_SPEED);
            }
            if let Some(position) = self.positions.get_mut(entity) {
                position.x += velocity.x;
                position.y += velocity.y;
            }
        }

        for (_, grounded) in self.grounded.iter_mut() {
            grounded.on_ground = false;
        }
    }

    pub(super) fn collision_system(&mut self) {
        let level = self.level.as_ref();
        for (entity, collider) in self.colliders.iter() {
            let (Some(position), Some(velocity)) = (
                self.positions.get_mut(entity),
                self.velocities.get_mut(entity),
            ) else {
                continue;
            };
            let grounded = self.grounded.get_mut(entity);
            resolve_tiles(level, collider, position, velocity, grounded);
            clamp_to_level(level, collider, position, velocity);
        }
    }
}

/// A tile the entity can stand on: solid with open space above it, or a
/// platform.
fn is_floor(level: &dyn TileOracle, x: i32, y: i32) -> bool {
    (level.is_solid(x, y) || level.is_platform(x, y)) && !level.is_solid(x, y - 1)
}

fn is_ceiling(level: &dyn TileOracle, x: i32, y: i32) -> bool {
    level.is_solid(x, y) && !level.is_solid(x, y + 1)
}

fn span(from: f32, to: f32) -> std::ops::RangeInclusive<i32> {
    tile(from)..=tile(to - EPSILON)
}

/// Vertical pass first so an entity falling while pushed sideways still lands
/// this tick, then the horizontal pass.
fn resolve_tiles(
    level: &dyn TileOracle,
    collider: &Collider,
    position: &mut Position,
    velocity: &mut Velocity,
    grounded: Option<&mut Grounded>,
) {
    let bounds = collider.bounds(position);
    if velocity.y >= 0.0 {
        let row = tile(bounds.bottom());
        let previous_bottom = bounds.bottom() - velocity.y;
        if previous_bottom <= row as f32 + EPSILON
            && span(bounds.left(), bounds.right()).any(|x| is_floor(level, x, row))
        {
            position.y = row as f32 - collider.height - collider.offset_y;
            velocity.y = 0.0;
            if let Some(grounded) = grounded {
                grounded.on_ground = true;
            }
        }
    } else {
        let row = tile(bounds.top());
        let previous_top = bounds.top() - velocity.y;
        if previous_top >= (row + 1) as f32 - EPSILON
            && span(bounds.left(), bounds.right()).any(|x| is_ceiling(level, x, row))
        {
            position.y = (row + 1) as f32 - collider.offset_y;
            velocity.y = 0.0;
        }
    }

    let bounds = collider.bounds(position);
    if velocity.x > 0.0 {
        let column = tile(bounds.right());
        let previous_right = bounds.right() - velocity.x;
        if previous_right <= column as f32 + EPSILON
            && span(bounds.top(), bounds.bottom()).any(|y| level.is_solid(column, y))
        {
            position.x = column as f32 - collider.width - collider.offset_x;
            velocity.x = 0.0;
        }
    } else if velocity.x < 0.0 {
        let column = tile(bounds.left());
        let previous_left = bounds.left() - velocity.x;
        if previous_left >= (column + 1) as f32 - EPSILON
            && span(bounds.top(), bounds.bottom()).any(|y| level.is_solid(column, y))
        {
            position.x = (column + 1) as f32 - collider.offset_x;
            velocity.x = 0.0;
        }
    }
}

/// Keeps the collider inside the level even where no boundary tiles exist.
fn clamp_to_level(
    level: &dyn TileOracle,
    collider: &Collider,
    position: &mut Position,
    velocity: &mut Velocity,
) {
    let (width, height) = level.bounds();
    let min_x = -collider.offset_x;
    let max_x = (width as f32 - collider.width - collider.offset_x).max(min_x);
    let min_y = -collider.offset_y;
    let max_y = (height as f32 - collider.height - collider.offset_y).max(min_y);

    if position.x < min_x {
        position.x = min_x;
        velocity.x = velocity.x.max(0.0);
    } else if position.x > max_x {
        position.x = max_x;
        velocity.x = velocity.x.min(0.0);
    }
    if position.y < min_y {
        position.y = min_y;
        velocity.y = velocity.y.max(0.0);
    } else if position.y > max_y {
        position.y = max_y;
        velocity.y = velocity.y.min(0.0);
    }
}
