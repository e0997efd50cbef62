//! Plain component value types. Only the tick pipeline mutates them.

use crate::collision::Aabb;
use crate::protocol::{EntityId, Intent};
use crate::{ENEMY_SPEED, FIST_SIZE, MOVE_SPEED, PLAYER_HEIGHT, PLAYER_WIDTH};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Bounds relative to the entity's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Collider {
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            width,
            height,
        }
    }

    pub fn bounds(&self, position: &Position) -> Aabb {
        Aabb::new(
            position.x + self.offset_x,
            position.y + self.offset_y,
            self.width,
            self.height,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Grounded {
    pub on_ground: bool,
}

/// Gravity multiplier; 0 disables gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gravity {
    pub scale: f32,
}

impl Default for Gravity {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

/// Intents in effect for the current tick. Replaced wholesale, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Controller {
    pub intents: Intent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facing {
    pub right: bool,
}

impl Default for Facing {
    fn default() -> Self {
        Self { right: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: u32,
    pub name: String,
}

/// `Idle -> Charging -> Attacking(cooldown) -> Idle`.
///
/// Being a single enum, an entity can never be charging and attacking at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttackPhase {
    #[default]
    Idle,
    /// `ticks` stays within `0..=MAX_CHARGE_TICKS`.
    Charging { ticks: u32 },
    /// No new charge can start until `cooldown` runs out.
    Attacking { cooldown: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttackState {
    pub phase: AttackPhase,
    /// Attack intent as seen last tick, for edge detection.
    pub held: bool,
}

impl AttackState {
    pub fn is_charging(&self) -> bool {
        matches!(self.phase, AttackPhase::Charging { .. })
    }

    pub fn is_attacking(&self) -> bool {
        matches!(self.phase, AttackPhase::Attacking { .. })
    }

    pub fn charge_ticks(&self) -> u32 {
        match self.phase {
            AttackPhase::Charging { ticks } => ticks,
            _ => 0,
        }
    }
}

/// A thrown fist travelling horizontally until it covers `max_distance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fist {
    pub owner: EntityId,
    /// -1 for left, 1 for right.
    pub direction: i8,
    pub start_x: f32,
    pub max_distance: f32,
}

impl Fist {
    pub fn traveled(&self, position: &Position) -> f32 {
        (position.x - self.start_x).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnemyKind {
    Slime,
}

impl EnemyKind {
    pub fn sprite_id(self) -> &'static str {
        match self {
            EnemyKind::Slime => "slime",
        }
    }

    pub fn collider(self) -> Collider {
        match self {
            EnemyKind::Slime => Collider::sized(1.0, 1.0),
        }
    }

    pub fn speed(self) -> f32 {
        match self {
            EnemyKind::Slime => ENEMY_SPEED,
        }
    }
}

/// AI that drives an enemy's controller during the input stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behavior {
    /// Walk in one direction and turn around when a wall stops us.
    Patrol { walking_right: bool },
}

/// What an entity is. Decides which components it carries and how it is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Enemy(EnemyKind),
    Fist,
}

impl EntityKind {
    pub fn sprite_id(self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Enemy(kind) => kind.sprite_id(),
            EntityKind::Fist => "fist",
        }
    }

    pub fn collider(self) -> Collider {
        match self {
            EntityKind::Player => Collider::sized(PLAYER_WIDTH, PLAYER_HEIGHT),
            EntityKind::Enemy(kind) => kind.collider(),
            EntityKind::Fist => Collider::sized(FIST_SIZE, FIST_SIZE),
        }
    }

    /// Horizontal speed when a direction intent is held.
    pub fn move_speed(self) -> f32 {
        match self {
            EntityKind::Player => MOVE_SPEED,
            EntityKind::Enemy(kind) => kind.speed(),
            EntityKind::Fist => 0.0,
        }
    }
}
