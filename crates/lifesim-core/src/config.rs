//! Simulation configuration.
//!
//! All tunables live in one serde-friendly struct with defaults matching the
//! reference parameter set. `validate` is called once at world construction;
//! everything downstream can then assume the invariants hold.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::WorldError;

/// Axis-aligned spawn region in world units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpawnRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl SpawnRect {
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Normalizes flipped corners so sampling always sees a valid range.
    pub fn normalized(self) -> Self {
        Self {
            min_x: self.min_x.min(self.max_x),
            min_y: self.min_y.min(self.max_y),
            max_x: self.min_x.max(self.max_x),
            max_y: self.min_y.max(self.max_y),
        }
    }

    pub fn is_degenerate(self) -> bool {
        let n = self.normalized();
        !(n.min_x.is_finite() && n.min_y.is_finite() && n.max_x.is_finite() && n.max_y.is_finite())
    }
}

/// Full parameter set for a world instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World extent in world units.
    pub world_width: f32,
    pub world_height: f32,
    /// Side length of one spatial chunk.
    pub chunk_size: f32,
    /// Fixed seed for reproducible runs; `None` seeds from entropy.
    pub rng_seed: Option<u64>,

    /// Hard bounds on any animal's size.
    pub min_animal_size: f32,
    pub max_animal_size: f32,
    /// Baseline size for first-generation spawns before chaos perturbation.
    pub default_animal_size: f32,
    /// Numerator of the size-to-speed curve: `speed = base * 2.5 / size^0.4`.
    pub base_speed: f32,
    /// Hunger drain scale: `rate = base * sqrt(size)` per second.
    pub base_hunger: f32,
    pub max_saturation: f32,
    /// Mean lifespan floor in seconds; actual lifespan adds jitter and size.
    pub base_lifespan: f32,
    pub lifespan_jitter: f32,
    /// Fraction of lifespan before an animal may reproduce.
    pub maturity_fraction: f32,
    /// Seconds a corpse persists before removal.
    pub rot_duration: f32,

    /// Extra reach added to mating range on top of the mean of both sizes.
    pub mate_padding: f32,
    /// Largest size difference two mates may have.
    pub size_diff_threshold: f32,
    /// Largest predation-inclination gap two mates may have.
    pub mating_inclination_gap: f32,
    /// Minimum inclination advantage required to prey on another animal.
    pub predation_gap: f32,
    /// Damage per second per unit of size advantage while grappling live prey.
    pub damage_rate: f32,
    /// Inclination drift per second when local food/prey supply is lopsided.
    pub drift_rate: f32,
    /// Supply ratio that counts as lopsided for drift purposes.
    pub drift_imbalance: f32,

    /// Diet-interpolated knobs: fully herbivorous value first, fully
    /// predatory second.
    pub reproduction_cost: (f32, f32),
    pub reproduction_cooldown: (f32, f32),
    pub hunger_threshold: (f32, f32),
    /// Offspring size deviates from the parental mean by at most this much.
    pub offspring_size_jitter: f32,
    /// Offspring inclination deviates from the parental mean by at most this.
    pub offspring_inclination_jitter: f32,

    /// Predator within `size * danger_radius_factor` triggers fleeing.
    pub danger_radius_factor: f32,
    /// Fleeing ends once the threat is `size * safe_distance_factor` away.
    pub safe_distance_factor: f32,

    /// World-wide food ceiling; replenishment pauses above it.
    pub food_cap: usize,
    /// Upper bound on the uniform per-tick food top-up count.
    pub food_spawn_per_tick: u32,
    pub food_spawn_rect: SpawnRect,
    pub food_size_range: (f32, f32),
    pub food_lifespan_range: (f32, f32),
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_width: 8192.0,
            world_height: 8192.0,
            chunk_size: 128.0,
            rng_seed: None,
            min_animal_size: 2.0,
            max_animal_size: 30.0,
            default_animal_size: 8.0,
            base_speed: 16.0,
            base_hunger: 0.4,
            max_saturation: 20.0,
            base_lifespan: 24.0,
            lifespan_jitter: 16.0,
            maturity_fraction: 0.2,
            rot_duration: 6.0,
            mate_padding: 4.0,
            size_diff_threshold: 5.0,
            mating_inclination_gap: 0.25,
            predation_gap: 0.2,
            damage_rate: 2.0,
            drift_rate: 0.05,
            drift_imbalance: 2.0,
            reproduction_cost: (2.0, 5.0),
            reproduction_cooldown: (5.0, 8.0),
            hunger_threshold: (4.0, 6.0),
            offspring_size_jitter: 2.0,
            offspring_inclination_jitter: 0.1,
            danger_radius_factor: 4.0,
            safe_distance_factor: 5.0,
            food_cap: 4000,
            food_spawn_per_tick: 5,
            food_spawn_rect: SpawnRect::new(0.0, 0.0, 2048.0, 2048.0),
            food_size_range: (2.0, 6.0),
            food_lifespan_range: (20.0, 40.0),
        }
    }
}

impl WorldConfig {
    /// Checks the cross-field invariants the tick pipeline relies on.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !(self.world_width > 0.0 && self.world_height > 0.0) {
            return Err(WorldError::InvalidConfig(format!(
                "world extent must be positive, got {}x{}",
                self.world_width, self.world_height
            )));
        }
        if !(self.chunk_size > 0.0) {
            return Err(WorldError::InvalidConfig(format!(
                "chunk size must be positive, got {}",
                self.chunk_size
            )));
        }
        if !(self.min_animal_size > 0.0 && self.min_animal_size <= self.max_animal_size) {
            return Err(WorldError::InvalidConfig(format!(
                "animal size bounds are inverted: {}..{}",
                self.min_animal_size, self.max_animal_size
            )));
        }
        if !(self.default_animal_size >= self.min_animal_size
            && self.default_animal_size <= self.max_animal_size)
        {
            return Err(WorldError::InvalidConfig(format!(
                "default animal size {} outside {}..{}",
                self.default_animal_size, self.min_animal_size, self.max_animal_size
            )));
        }
        if !(self.max_saturation > 0.0) {
            return Err(WorldError::InvalidConfig(
                "max saturation must be positive".into(),
            ));
        }
        if !(self.rot_duration > 0.0) {
            return Err(WorldError::InvalidConfig(
                "rot duration must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.maturity_fraction) {
            return Err(WorldError::InvalidConfig(format!(
                "maturity fraction {} outside [0, 1]",
                self.maturity_fraction
            )));
        }
        // The 3x3 neighborhood contract: nothing may cross more than one
        // chunk per movement sub-step, which a max-speed animal could do if
        // chunks were smaller than its per-second travel.
        let top_speed = self.base_speed * 2.5 / self.min_animal_size.powf(0.4);
        if top_speed > self.chunk_size {
            return Err(WorldError::InvalidConfig(format!(
                "chunk size {} is smaller than top speed {top_speed:.1}; neighborhood queries would miss movers",
                self.chunk_size
            )));
        }
        if self.food_spawn_rect.is_degenerate() {
            return Err(WorldError::InvalidConfig(
                "food spawn rect has non-finite corners".into(),
            ));
        }
        if !(self.food_size_range.0 > 0.0 && self.food_size_range.0 <= self.food_size_range.1) {
            return Err(WorldError::InvalidConfig(format!(
                "food size range is inverted: {:?}",
                self.food_size_range
            )));
        }
        if !(self.food_lifespan_range.0 > 0.0
            && self.food_lifespan_range.0 <= self.food_lifespan_range.1)
        {
            return Err(WorldError::InvalidConfig(format!(
                "food lifespan range is inverted: {:?}",
                self.food_lifespan_range
            )));
        }
        // Jitters feed inclusive sampling ranges; a negative one would make
        // those ranges empty and panic mid-spawn.
        for (name, jitter) in [
            ("lifespan_jitter", self.lifespan_jitter),
            ("offspring_size_jitter", self.offspring_size_jitter),
            (
                "offspring_inclination_jitter",
                self.offspring_inclination_jitter,
            ),
        ] {
            if !(jitter >= 0.0) {
                return Err(WorldError::InvalidConfig(format!(
                    "{name} must be non-negative, got {jitter}"
                )));
            }
        }
        Ok(())
    }

    /// Builds the world RNG, seeded for reproducibility when requested.
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        }
    }

    /// Derived locomotion speed for a given body size.
    pub fn speed_for_size(&self, size: f32) -> f32 {
        self.base_speed * 2.5 / size.powf(0.4)
    }

    /// Derived hunger drain per second for a given body size.
    pub fn hunger_for_size(&self, size: f32) -> f32 {
        self.base_hunger * size.sqrt()
    }

    /// Clamps a position to the world bounds.
    pub fn clamp_position(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.clamp(0.0, self.world_width),
            y.clamp(0.0, self.world_height),
        )
    }
}

/// Chaos-scaled random value: `base` is multiplied by a power of two drawn
/// from `[-down * chaos, up * chaos]`, so chaos zero always returns `base`
/// and higher chaos widens the spread in both directions.
pub fn chaos_scaled(base: f32, chaos: f32, down: f32, up: f32, rng: &mut impl rand::Rng) -> f32 {
    let exponent = rng.gen_range(-(down * chaos)..=(up * chaos).max(-(down * chaos)));
    base * exponent.exp2()
}
