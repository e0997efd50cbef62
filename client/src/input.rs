//! Scripted input for headless play.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Intent, MAX_CHARGE_TICKS};

/// Produces one intent bitmask per tick: walks in bursts, hops now and then,
/// and charges punches of random length. The same seed always plays the same
/// way.
#[derive(Debug, Clone)]
pub struct Autopilot {
    rng: StdRng,
    walk: Intent,
    walk_ticks: u32,
    charge_ticks: u32,
}

impl Autopilot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            walk: Intent::NONE,
            walk_ticks: 0,
            charge_ticks: 0,
        }
    }

    pub fn next_intents(&mut self) -> Intent {
        if self.walk_ticks == 0 {
            self.walk = match self.rng.gen_range(0..4) {
                0 => Intent::NONE,
                1 => Intent::LEFT,
                _ => Intent::RIGHT,
            };
            self.walk_ticks = self.rng.gen_range(20..90);
        }
        self.walk_ticks -= 1;

        let mut intents = self.walk;
        if self.rng.gen_bool(0.03) {
            intents.insert(Intent::JUMP);
        }

        if self.charge_ticks > 0 {
            self.charge_ticks -= 1;
            intents.insert(Intent::ATTACK);
        } else if self.rng.gen_bool(0.01) {
            self.charge_ticks = self.rng.gen_range(1..=MAX_CHARGE_TICKS);
            intents.insert(Intent::ATTACK);
        }
        intents
    }
}

impl Iterator for Autopilot {
    type Item = Intent;

    fn next(&mut self) -> Option<Intent> {
        Some(self.next_intents())
    }
}
