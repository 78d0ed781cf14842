//! Entities: the shared spatial core plus the two concrete kinds, `Food` and
//! `Animal`. There is no entity trait object; the world owns one map per kind
//! and the tick pipeline matches on the kind it is driving.

use rand::Rng;

use crate::behavior::BehaviorState;
use crate::color::Color;
use crate::config::WorldConfig;
use crate::ids::EntityId;

/// Health points per unit of body size.
const HEALTH_PER_SIZE: f32 = 2.0;

/// Spatial state shared by every entity kind.
#[derive(Debug, Clone)]
pub struct EntityCore {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub color: Color,
    /// Set when the entity has been consumed or expired this tick; the world
    /// drops it at the end of the pass.
    pub marked_for_deletion: bool,
}

impl EntityCore {
    pub fn new(id: EntityId, x: f32, y: f32, size: f32, color: Color) -> Self {
        Self {
            id,
            x,
            y,
            size,
            color,
            marked_for_deletion: false,
        }
    }

    /// Saturation restored to whoever consumes this entity.
    pub fn nutrition_value(&self) -> f32 {
        self.size / 2.0
    }

    pub fn distance_sq(&self, other: &EntityCore) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Two entities touch when their centers are within the mean of their
    /// sizes.
    pub fn touches(&self, other: &EntityCore) -> bool {
        let reach = (self.size + other.size) / 2.0;
        self.distance_sq(other) <= reach * reach
    }
}

/// Stationary consumable. Ages out on its own if nothing eats it first.
#[derive(Debug, Clone)]
pub struct Food {
    pub core: EntityCore,
    pub age: f32,
    pub lifespan: f32,
}

impl Food {
    pub fn grow(id: EntityId, x: f32, y: f32, config: &WorldConfig, rng: &mut impl Rng) -> Self {
        let size = rng.gen_range(config.food_size_range.0..=config.food_size_range.1);
        let lifespan = rng.gen_range(config.food_lifespan_range.0..=config.food_lifespan_range.1);
        // Greens, with enough hue spread that patches read as vegetation.
        let color = Color::from_hsl(
            rng.gen_range(85.0..150.0),
            rng.gen_range(0.6..0.9),
            rng.gen_range(0.3..0.5),
        );
        Self {
            core: EntityCore::new(id, x, y, size, color),
            age: 0.0,
            lifespan,
        }
    }

    pub fn expired(&self) -> bool {
        self.age >= self.lifespan
    }
}

/// A living (or rotting) creature.
///
/// Diet is a continuous axis: `predation_inclination` of zero is a pure
/// grazer, one is a pure hunter, and everything between leans both ways.
/// Physiology is derived from size at construction and never re-derived, so
/// persisted animals keep the speed they were born with.
#[derive(Debug, Clone)]
pub struct Animal {
    pub core: EntityCore,
    pub speed: f32,
    pub saturation: f32,
    pub max_saturation: f32,
    pub hunger_rate: f32,
    pub predation_inclination: f32,
    pub health: f32,
    pub max_health: f32,
    pub reproduction_cooldown: f32,
    pub age: f32,
    pub lifespan: f32,
    /// Age at death; negative while alive. Drives corpse fade and removal.
    pub death_age: f32,
    /// Color at death, kept so the rot fade has a fixed starting point.
    pub base_color: Color,
    pub infected: bool,
    pub state: BehaviorState,
    pub target: Option<EntityId>,
    /// One-slot mailbox for an incoming courtship proposal. The owner reads
    /// and clears it on its own update; nobody else touches its state.
    pub mate_request: Option<EntityId>,
}

impl Animal {
    /// Builds a first-generation animal with physiology derived from `size`.
    pub fn spawn(
        id: EntityId,
        x: f32,
        y: f32,
        size: f32,
        predation_inclination: f32,
        color: Color,
        config: &WorldConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let size = size.clamp(config.min_animal_size, config.max_animal_size);
        let lifespan =
            config.base_lifespan + rng.gen_range(0.0..=config.lifespan_jitter) + size / 4.0;
        Self {
            core: EntityCore::new(id, x, y, size, color),
            speed: config.speed_for_size(size),
            saturation: config.max_saturation / 2.0,
            max_saturation: config.max_saturation,
            hunger_rate: config.hunger_for_size(size),
            predation_inclination: predation_inclination.clamp(0.0, 1.0),
            health: size * HEALTH_PER_SIZE,
            max_health: size * HEALTH_PER_SIZE,
            reproduction_cooldown: 0.0,
            age: 0.0,
            lifespan,
            death_age: -1.0,
            base_color: color,
            infected: false,
            state: BehaviorState::Idle,
            target: None,
            mate_request: None,
        }
    }

    /// Builds an offspring at the midpoint of its parents.
    ///
    /// Heritable traits start at the parental mean, perturbed and clamped to
    /// their hard bounds.
    pub fn offspring(
        id: EntityId,
        mother: &Animal,
        father: &Animal,
        config: &WorldConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let j = config.offspring_size_jitter;
        let size = ((mother.core.size + father.core.size) / 2.0 + rng.gen_range(-j..=j))
            .clamp(config.min_animal_size, config.max_animal_size);
        let gi = config.offspring_inclination_jitter;
        let inclination = ((mother.predation_inclination + father.predation_inclination) / 2.0
            + rng.gen_range(-gi..=gi))
        .clamp(0.0, 1.0);
        let color = Color::blend_offspring(mother.core.color, father.core.color, rng);
        let x = (mother.core.x + father.core.x) / 2.0;
        let y = (mother.core.y + father.core.y) / 2.0;
        Self::spawn(id, x, y, size, inclination, color, config, rng)
    }

    pub fn id(&self) -> EntityId {
        self.core.id
    }

    pub fn is_dead(&self) -> bool {
        self.death_age >= 0.0
    }

    /// Kills the animal, freezing it in place as a corpse.
    pub fn die(&mut self) {
        if self.is_dead() {
            return;
        }
        self.death_age = self.age;
        self.base_color = self.core.color;
        self.health = 0.0;
        self.state = BehaviorState::Idle;
        self.target = None;
        self.mate_request = None;
    }

    /// How far along the rot window the corpse is, in `[0, 1]`.
    pub fn rot_fraction(&self, config: &WorldConfig) -> f32 {
        if !self.is_dead() {
            return 0.0;
        }
        ((self.age - self.death_age) / config.rot_duration).clamp(0.0, 1.0)
    }

    /// Interpolates a diet-dependent constant between its herbivorous and
    /// predatory endpoints.
    pub fn diet_lerp(&self, (herb, carn): (f32, f32)) -> f32 {
        herb + (carn - herb) * self.predation_inclination
    }

    pub fn hunger_threshold(&self, config: &WorldConfig) -> f32 {
        self.diet_lerp(config.hunger_threshold)
    }

    pub fn reproduction_cost(&self, config: &WorldConfig) -> f32 {
        self.diet_lerp(config.reproduction_cost)
    }

    pub fn cooldown_duration(&self, config: &WorldConfig) -> f32 {
        self.diet_lerp(config.reproduction_cooldown)
    }

    pub fn is_hungry(&self, config: &WorldConfig) -> bool {
        self.saturation < self.hunger_threshold(config)
    }

    /// Whether the animal is currently able to start a reproduction.
    pub fn can_reproduce(&self, config: &WorldConfig) -> bool {
        !self.is_dead()
            && self.age >= config.maturity_fraction * self.lifespan
            && self.reproduction_cooldown >= self.cooldown_duration(config)
            && self.saturation >= self.hunger_threshold(config)
    }

    /// Predation rule: the attacker must be at least as large as the target
    /// and meaningfully more predatory.
    pub fn can_eat(&self, prey: &Animal, config: &WorldConfig) -> bool {
        self.core.id != prey.core.id
            && !self.is_dead()
            && self.core.size >= prey.core.size
            && self.predation_inclination - prey.predation_inclination >= config.predation_gap
    }

    /// Mating compatibility, symmetric across both partners.
    pub fn compatible_mate(&self, other: &Animal, config: &WorldConfig) -> bool {
        self.core.id != other.core.id
            && self.can_reproduce(config)
            && other.can_reproduce(config)
            && (self.core.size - other.core.size).abs() <= config.size_diff_threshold
            && (self.predation_inclination - other.predation_inclination).abs()
                <= config.mating_inclination_gap
    }

    /// Squared distance inside which two partners can mate.
    pub fn mating_range_sq(&self, other: &Animal, config: &WorldConfig) -> f32 {
        let reach = (self.core.size + other.core.size + config.mate_padding) / 2.0;
        reach * reach
    }

    /// Restores saturation from a consumed entity, capped at the maximum.
    pub fn feed(&mut self, nutrition: f32) {
        self.saturation = (self.saturation + nutrition).min(self.max_saturation);
    }
}
