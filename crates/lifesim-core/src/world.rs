//! The world: entity registry, spatial index, and the tick pipeline.
//!
//! All simulation state hangs off [`World`]. The tick thread is the only
//! mutator; observers take snapshots and the persistence loop drains
//! mutation batches, both through `&mut self` calls made under the same
//! exterior lock. The id pool is the exception and carries its own mutex.
//!
//! Position writes always go through [`World::place_animal`]-style helpers,
//! which clamp to the world bounds and relocate chunk membership in the same
//! call. That keeps the spatial index exactly consistent with entity
//! positions at every point inside a tick, never just at tick edges.

use std::collections::HashMap;

use ordered_float::OrderedFloat;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use lifesim_index::ChunkGrid;

use crate::behavior::{self, BehaviorState};
use crate::color::Color;
use crate::config::{chaos_scaled, SpawnRect, WorldConfig};
use crate::entity::{Animal, EntityCore, Food};
use crate::ids::{EntityId, IdPool};
use crate::persist::{AnimalRecord, FoodRecord, MutationBatch};
use crate::snapshot::{AnimalDto, FoodDto, WorldSnapshot};
use crate::WorldError;

const EPS: f32 = 1e-4;

/// Counters for everything notable that happened in one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub births: u32,
    pub deaths: u32,
    pub corpses_removed: u32,
    pub foods_expired: u32,
    pub foods_spawned: u32,
    pub foods_consumed: u32,
}

/// Resolved view of a potential meal.
pub(crate) struct ConsumableInfo {
    pub x: f32,
    pub y: f32,
    /// Food is always consumable; another animal only once it is a corpse.
    pub consumable_now: bool,
    pub eat_range_sq: f32,
}

/// Resolved view of a courtship partner.
pub(crate) struct MateStatus {
    pub x: f32,
    pub y: f32,
    /// Both sides are targeting each other.
    pub mutual: bool,
    pub eligible: bool,
    pub dist_sq: f32,
    pub range_sq: f32,
}

pub struct World {
    config: WorldConfig,
    rng: SmallRng,
    ids: IdPool,
    clock: f64,
    animals: HashMap<EntityId, Animal>,
    foods: HashMap<EntityId, Food>,
    animal_chunks: ChunkGrid<EntityId>,
    food_chunks: ChunkGrid<EntityId>,
    pending_deletions: Vec<EntityId>,
    events: TickReport,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let animal_chunks =
            ChunkGrid::new(config.chunk_size, config.world_width, config.world_height)?;
        let food_chunks =
            ChunkGrid::new(config.chunk_size, config.world_width, config.world_height)?;
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            rng,
            ids: IdPool::new(),
            clock: 0.0,
            animals: HashMap::new(),
            foods: HashMap::new(),
            animal_chunks,
            food_chunks,
            pending_deletions: Vec::new(),
            events: TickReport::default(),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Seconds of simulated time since world start.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn animal(&self, id: EntityId) -> Option<&Animal> {
        self.animals.get(&id)
    }

    pub fn food(&self, id: EntityId) -> Option<&Food> {
        self.foods.get(&id)
    }

    pub fn animal_count(&self) -> usize {
        self.animals.len()
    }

    pub fn food_count(&self) -> usize {
        self.foods.len()
    }

    /// Animals that are actually alive; corpses do not count toward
    /// extinction checks.
    pub fn live_animal_count(&self) -> usize {
        self.animals.values().filter(|a| !a.is_dead()).count()
    }

    /// Flags or clears an infection marker. Purely cosmetic for observers.
    pub fn set_infected(&mut self, id: EntityId, infected: bool) -> bool {
        match self.animals.get_mut(&id) {
            Some(animal) => {
                animal.infected = infected;
                true
            }
            None => false,
        }
    }

    /// Directly repositions an animal, keeping chunk membership consistent.
    pub fn teleport_animal(&mut self, id: EntityId, x: f32, y: f32) -> bool {
        let (cx, cy) = self.config.clamp_position(x, y);
        match self.animals.get_mut(&id) {
            Some(animal) => {
                self.animal_chunks
                    .relocate(id, (animal.core.x, animal.core.y), (cx, cy));
                animal.core.x = cx;
                animal.core.y = cy;
                true
            }
            None => false,
        }
    }

    /// Mutable access for external tweaks. Positions must not be written
    /// through this handle; use [`World::teleport_animal`] so the spatial
    /// index stays coherent.
    pub fn animal_mut(&mut self, id: EntityId) -> Option<&mut Animal> {
        self.animals.get_mut(&id)
    }

    // ---- spawning -------------------------------------------------------

    /// Spawns up to `count` animals uniformly inside `rect`, with `chaos`
    /// widening the spread of first-generation traits. Returns how many were
    /// actually created; the count falls short only when ids run out.
    pub fn spawn_animals(&mut self, count: usize, rect: SpawnRect, chaos: f32) -> usize {
        let rect = rect.normalized();
        if rect.is_degenerate() || count == 0 {
            return 0;
        }
        let mut spawned = 0;
        for _ in 0..count {
            let x = self.rng.gen_range(rect.min_x..=rect.max_x);
            let y = self.rng.gen_range(rect.min_y..=rect.max_y);
            let size = chaos_scaled(
                self.config.default_animal_size,
                chaos,
                1.0,
                1.0,
                &mut self.rng,
            )
            .clamp(self.config.min_animal_size, self.config.max_animal_size);
            let inclination = (self.rng.gen::<f32>() * chaos).clamp(0.0, 1.0);
            if self.spawn_animal_at(x, y, size, inclination).is_none() {
                break;
            }
            spawned += 1;
        }
        spawned
    }

    /// Spawns a single animal with explicit traits. Returns `None` when the
    /// id space is exhausted.
    pub fn spawn_animal_at(
        &mut self,
        x: f32,
        y: f32,
        size: f32,
        inclination: f32,
    ) -> Option<EntityId> {
        let Some(id) = self.ids.allocate() else {
            warn!("entity id space exhausted, animal spawn dropped");
            return None;
        };
        let (cx, cy) = self.config.clamp_position(x, y);
        let color = Color::random_vivid(&mut self.rng);
        let animal = Animal::spawn(
            id,
            cx,
            cy,
            size,
            inclination,
            color,
            &self.config,
            &mut self.rng,
        );
        self.insert_animal(animal);
        Some(id)
    }

    /// Spawns up to `count` food items uniformly inside `rect`.
    pub fn spawn_food(&mut self, count: usize, rect: SpawnRect) -> usize {
        let rect = rect.normalized();
        if rect.is_degenerate() || count == 0 {
            return 0;
        }
        let mut spawned = 0;
        for _ in 0..count {
            let x = self.rng.gen_range(rect.min_x..=rect.max_x);
            let y = self.rng.gen_range(rect.min_y..=rect.max_y);
            if self.spawn_food_at(x, y).is_none() {
                break;
            }
            spawned += 1;
        }
        spawned
    }

    /// Spawns a single food item. Returns `None` when ids are exhausted.
    pub fn spawn_food_at(&mut self, x: f32, y: f32) -> Option<EntityId> {
        let Some(id) = self.ids.allocate() else {
            warn!("entity id space exhausted, food spawn dropped");
            return None;
        };
        let (cx, cy) = self.config.clamp_position(x, y);
        let food = Food::grow(id, cx, cy, &self.config, &mut self.rng);
        self.insert_food(food);
        Some(id)
    }

    fn insert_animal(&mut self, animal: Animal) {
        self.animal_chunks
            .insert(animal.core.id, animal.core.x, animal.core.y);
        self.animals.insert(animal.core.id, animal);
    }

    fn insert_food(&mut self, food: Food) {
        self.food_chunks.insert(food.core.id, food.core.x, food.core.y);
        self.foods.insert(food.core.id, food);
    }

    /// Removes a food item, releasing its id and queueing the deletion for
    /// persistence.
    fn despawn_food(&mut self, id: EntityId) {
        if let Some(food) = self.foods.remove(&id) {
            self.food_chunks.remove(id, food.core.x, food.core.y);
            self.ids.release(id);
            self.pending_deletions.push(id);
        }
    }

    /// Removes an animal that is still in the map (consumed corpse, etc).
    fn despawn_animal(&mut self, id: EntityId) {
        if let Some(animal) = self.animals.remove(&id) {
            self.animal_chunks.remove(id, animal.core.x, animal.core.y);
            self.ids.release(id);
            self.pending_deletions.push(id);
        }
    }

    /// Finalizes removal of an animal already lifted out of the map.
    fn finalize_animal(&mut self, animal: Animal) {
        self.animal_chunks
            .remove(animal.core.id, animal.core.x, animal.core.y);
        self.ids.release(animal.core.id);
        self.pending_deletions.push(animal.core.id);
    }

    // ---- tick pipeline --------------------------------------------------

    /// Advances the world by `dt` seconds and reports what happened.
    ///
    /// Animals update one at a time in id order. The animal being updated is
    /// lifted out of the registry for the duration of its update, so its
    /// behavior can freely query and mutate the rest of the world.
    pub fn step(&mut self, dt: f32) -> TickReport {
        self.events = TickReport::default();
        self.clock += dt as f64;

        let mut expired = Vec::new();
        for food in self.foods.values_mut() {
            food.age += dt;
            if food.expired() {
                expired.push(food.core.id);
            }
        }
        self.events.foods_expired = expired.len() as u32;
        for id in expired {
            self.despawn_food(id);
        }
        self.replenish_food();

        // Sorted so seeded runs replay identically regardless of map layout.
        let mut ids: Vec<EntityId> = self.animals.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            // May have been consumed or despawned by an earlier update.
            let Some(mut animal) = self.animals.remove(&id) else {
                continue;
            };
            self.update_animal(&mut animal, dt);
            if animal.core.marked_for_deletion {
                self.finalize_animal(animal);
            } else {
                self.animals.insert(id, animal);
            }
        }
        self.events
    }

    /// Tops the food supply back up toward the cap with a small random batch.
    fn replenish_food(&mut self) {
        if self.foods.len() >= self.config.food_cap {
            return;
        }
        let batch = self.rng.gen_range(0..=self.config.food_spawn_per_tick) as usize;
        let budget = batch.min(self.config.food_cap - self.foods.len());
        let spawned = self.spawn_food(budget, self.config.food_spawn_rect);
        self.events.foods_spawned += spawned as u32;
    }

    fn update_animal(&mut self, animal: &mut Animal, dt: f32) {
        animal.age += dt;

        if animal.is_dead() {
            // Corpses are inert: they fade toward gray over the rot window
            // and disappear at its end. Position and size never change.
            animal.core.color = animal.base_color.fade_to_gray(animal.rot_fraction(&self.config));
            if animal.age - animal.death_age >= self.config.rot_duration {
                animal.core.marked_for_deletion = true;
                self.events.corpses_removed += 1;
            }
            return;
        }

        animal.saturation = (animal.saturation - animal.hunger_rate * dt).max(0.0);
        if animal.saturation <= 0.0 || animal.age >= animal.lifespan {
            animal.die();
            self.events.deaths += 1;
            return;
        }
        animal.reproduction_cooldown += dt;
        self.drift_inclination(animal, dt);
        behavior::update(animal, self, dt);
    }

    /// Nudges diet toward whatever the local supply favors: plenty of food
    /// and no prey pulls toward grazing, the reverse pulls toward hunting.
    fn drift_inclination(&mut self, animal: &mut Animal, dt: f32) {
        let food_supply = self
            .food_chunks
            .neighborhood(animal.core.x, animal.core.y)
            .len() as f32;
        let mut prey_supply = 0.0f32;
        for id in self.animal_chunks.neighborhood(animal.core.x, animal.core.y) {
            if id == animal.id() {
                continue;
            }
            if let Some(other) = self.animals.get(&id) {
                if animal.can_eat(other, &self.config) {
                    prey_supply += 1.0;
                }
            }
        }
        let ratio = self.config.drift_imbalance;
        if food_supply > ratio * prey_supply {
            animal.predation_inclination =
                (animal.predation_inclination - self.config.drift_rate * dt).max(0.0);
        } else if prey_supply > ratio * food_supply {
            animal.predation_inclination =
                (animal.predation_inclination + self.config.drift_rate * dt).min(1.0);
        }
    }

    // ---- movement and collisions ---------------------------------------

    /// Clamped position write plus synchronous chunk relocation.
    fn place_animal(&mut self, animal: &mut Animal, x: f32, y: f32) {
        let (cx, cy) = self.config.clamp_position(x, y);
        self.animal_chunks
            .relocate(animal.core.id, (animal.core.x, animal.core.y), (cx, cy));
        animal.core.x = cx;
        animal.core.y = cy;
    }

    /// Moves an animal toward a destination at its own speed.
    ///
    /// Travel is cut into sub-steps no longer than half the animal's size so
    /// it cannot tunnel through anything it should have collided with.
    /// Collisions are resolved after every sub-step.
    pub(crate) fn move_animal_towards(&mut self, animal: &mut Animal, tx: f32, ty: f32, dt: f32) {
        let total = animal.speed * dt;
        if total <= 0.0 {
            return;
        }
        let max_step = (animal.core.size / 2.0).max(0.1);
        let steps = (total / max_step).ceil().max(1.0) as u32;
        let sub_dt = dt / steps as f32;
        for _ in 0..steps {
            let dx = tx - animal.core.x;
            let dy = ty - animal.core.y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < 1e-3 {
                break;
            }
            let step = (animal.speed * sub_dt).min(dist);
            let nx = animal.core.x + dx / dist * step;
            let ny = animal.core.y + dy / dist * step;
            self.place_animal(animal, nx, ny);
            self.handle_collisions(animal, sub_dt);
        }
    }

    /// Resolves contacts between a moving animal and its neighbors: corpses
    /// it may eat are consumed, live prey takes grapple damage, everything
    /// else is pushed apart.
    fn handle_collisions(&mut self, animal: &mut Animal, sub_dt: f32) {
        for id in self.animal_chunks.neighborhood(animal.core.x, animal.core.y) {
            if id == animal.id() {
                continue;
            }
            let (touching, edible, dead, ox, oy, osize, nutrition) = {
                let Some(other) = self.animals.get(&id) else {
                    continue;
                };
                (
                    animal.core.touches(&other.core),
                    animal.can_eat(other, &self.config),
                    other.is_dead(),
                    other.core.x,
                    other.core.y,
                    other.core.size,
                    other.core.nutrition_value(),
                )
            };
            if !touching {
                continue;
            }
            if edible && dead {
                animal.feed(nutrition);
                if animal.target == Some(id) {
                    animal.target = None;
                }
                self.despawn_animal(id);
            } else if edible {
                // Grappling live prey: damage scales with the size
                // advantage, death converts the prey to a corpse in place.
                let damage =
                    self.config.damage_rate * (animal.core.size - osize + 1.0).max(0.0) * sub_dt;
                if let Some(other) = self.animals.get_mut(&id) {
                    other.health -= damage;
                    if other.health <= 0.0 {
                        other.die();
                        self.events.deaths += 1;
                    }
                }
            } else {
                self.push_apart(animal, id, ox, oy, osize, sub_dt);
            }
        }
    }

    /// Symmetric separation for overlapping non-prey animals.
    fn push_apart(
        &mut self,
        animal: &mut Animal,
        other_id: EntityId,
        ox: f32,
        oy: f32,
        osize: f32,
        sub_dt: f32,
    ) {
        let dx = animal.core.x - ox;
        let dy = animal.core.y - oy;
        let dist = (dx * dx + dy * dy).sqrt();
        // Perfectly stacked pairs are left for a later sub-step to separate
        // once numeric noise gives them a direction.
        if dist < 0.1 {
            return;
        }
        let push = (animal.core.size + osize) / dist * sub_dt;
        let ux = dx / dist;
        let uy = dy / dist;
        let (ax, ay) = (animal.core.x + ux * push, animal.core.y + uy * push);
        self.place_animal(animal, ax, ay);
        let (bx, by) = self.config.clamp_position(ox - ux * push, oy - uy * push);
        self.animal_chunks.relocate(other_id, (ox, oy), (bx, by));
        if let Some(other) = self.animals.get_mut(&other_id) {
            other.core.x = bx;
            other.core.y = by;
        }
    }

    // ---- behavior queries ----------------------------------------------

    pub(crate) fn roll_flee_timer(&mut self) -> f32 {
        3.0 + self.rng.gen_range(0.0..2.0)
    }

    /// Nearest live predator close enough to be worth running from.
    pub(crate) fn nearest_threat(&self, animal: &Animal) -> Option<EntityId> {
        let danger = animal.core.size * self.config.danger_radius_factor;
        let danger_sq = danger * danger;
        let mut best: Option<(OrderedFloat<f32>, EntityId)> = None;
        for id in self.animal_chunks.neighborhood(animal.core.x, animal.core.y) {
            if id == animal.id() {
                continue;
            }
            let Some(other) = self.animals.get(&id) else {
                continue;
            };
            if other.is_dead() || !other.can_eat(animal, &self.config) {
                continue;
            }
            let d = OrderedFloat(animal.core.distance_sq(&other.core));
            if *d <= danger_sq && best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Position of a threat, as long as it still exists and still qualifies.
    pub(crate) fn threat_position(&self, animal: &Animal, threat: EntityId) -> Option<(f32, f32)> {
        let other = self.animals.get(&threat)?;
        if other.is_dead() || !other.can_eat(animal, &self.config) {
            return None;
        }
        Some((other.core.x, other.core.y))
    }

    /// Best meal in the neighborhood by the shared heuristic: travel time
    /// plus need-weighted nutrition, biased by diet. Grazers discount plants,
    /// hunters discount prey, and the global minimum wins.
    pub(crate) fn best_consumable_target(&self, animal: &Animal) -> Option<EntityId> {
        let sat = animal.saturation.max(EPS);
        let mut best: Option<(OrderedFloat<f32>, EntityId)> = None;

        let plant_bias = (1.0 - animal.predation_inclination).max(EPS);
        for id in self.food_chunks.neighborhood(animal.core.x, animal.core.y) {
            let Some(food) = self.foods.get(&id) else {
                continue;
            };
            let dist = animal.core.distance_sq(&food.core).sqrt();
            let score = (dist / animal.speed + food.core.nutrition_value() / sat) / plant_bias;
            let score = OrderedFloat(score);
            if best.map_or(true, |(bs, _)| score < bs) {
                best = Some((score, id));
            }
        }

        let prey_bias = animal.predation_inclination.max(EPS);
        for id in self.animal_chunks.neighborhood(animal.core.x, animal.core.y) {
            if id == animal.id() {
                continue;
            }
            let Some(other) = self.animals.get(&id) else {
                continue;
            };
            if !animal.can_eat(other, &self.config) {
                continue;
            }
            let dist = animal.core.distance_sq(&other.core).sqrt();
            let score = (dist / animal.speed + other.core.nutrition_value() / sat) / prey_bias;
            let score = OrderedFloat(score);
            if best.map_or(true, |(bs, _)| score < bs) {
                best = Some((score, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Resolves a food or prey target the animal is allowed to pursue.
    pub(crate) fn consumable_info(&self, animal: &Animal, id: EntityId) -> Option<ConsumableInfo> {
        if let Some(food) = self.foods.get(&id) {
            let reach = (animal.core.size + food.core.size) / 2.0;
            return Some(ConsumableInfo {
                x: food.core.x,
                y: food.core.y,
                consumable_now: true,
                eat_range_sq: reach * reach,
            });
        }
        let other = self.animals.get(&id)?;
        if !animal.can_eat(other, &self.config) {
            return None;
        }
        let reach = (animal.core.size + other.core.size) / 2.0;
        Some(ConsumableInfo {
            x: other.core.x,
            y: other.core.y,
            consumable_now: other.is_dead(),
            eat_range_sq: reach * reach,
        })
    }

    /// Consumes a target entity, crediting its nutrition to the eater. Live
    /// animals are never consumed through this path.
    pub(crate) fn consume_entity(&mut self, eater: &mut Animal, target: EntityId) {
        if let Some(food) = self.foods.get(&target) {
            let nutrition = food.core.nutrition_value();
            eater.feed(nutrition);
            self.despawn_food(target);
            self.events.foods_consumed += 1;
            return;
        }
        let Some(other) = self.animals.get(&target) else {
            return;
        };
        if other.is_dead() && eater.can_eat(other, &self.config) {
            let nutrition = other.core.nutrition_value();
            eater.feed(nutrition);
            self.despawn_animal(target);
        }
    }

    /// Nearest neighbor both sides could mate with right now.
    pub(crate) fn nearest_compatible_mate(&self, animal: &Animal) -> Option<EntityId> {
        let mut best: Option<(OrderedFloat<f32>, EntityId)> = None;
        for id in self.animal_chunks.neighborhood(animal.core.x, animal.core.y) {
            if id == animal.id() {
                continue;
            }
            let Some(other) = self.animals.get(&id) else {
                continue;
            };
            if !animal.compatible_mate(other, &self.config) {
                continue;
            }
            let d = OrderedFloat(animal.core.distance_sq(&other.core));
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Drops a courtship request into the candidate's mailbox unless it is
    /// already engaged with the proposer or someone else.
    pub(crate) fn court(&mut self, proposer: EntityId, candidate: EntityId) {
        if let Some(other) = self.animals.get_mut(&candidate) {
            if !other.is_dead() && other.target != Some(proposer) && other.mate_request.is_none() {
                other.mate_request = Some(proposer);
            }
        }
    }

    pub(crate) fn mate_status(&self, animal: &Animal, mate_id: EntityId) -> Option<MateStatus> {
        let mate = self.animals.get(&mate_id)?;
        let mutual =
            mate.state == BehaviorState::SeekingMate && mate.target == Some(animal.id());
        Some(MateStatus {
            x: mate.core.x,
            y: mate.core.y,
            mutual,
            eligible: animal.compatible_mate(mate, &self.config),
            dist_sq: animal.core.distance_sq(&mate.core),
            range_sq: animal.mating_range_sq(mate, &self.config),
        })
    }

    /// Settles a mutual courtship: charges both partners, resets their
    /// cooldowns, and spawns a litter of one to three offspring at the
    /// midpoint between them.
    pub(crate) fn reproduce_with(&mut self, animal: &mut Animal, mate_id: EntityId) {
        let Some(mut mate) = self.animals.remove(&mate_id) else {
            return;
        };
        if !animal.compatible_mate(&mate, &self.config) {
            self.animals.insert(mate_id, mate);
            return;
        }

        // Litter size: 60% one, 30% two, 10% three.
        let litter = match self.rng.gen_range(0..10) {
            0..=5 => 1,
            6..=8 => 2,
            _ => 3,
        };
        for _ in 0..litter {
            let Some(id) = self.ids.allocate() else {
                warn!("entity id space exhausted, offspring dropped");
                break;
            };
            let child = Animal::offspring(id, animal, &mate, &self.config, &mut self.rng);
            self.insert_animal(child);
            self.events.births += 1;
        }

        let cost_a = animal.reproduction_cost(&self.config);
        animal.saturation = (animal.saturation - cost_a).max(0.0);
        animal.reproduction_cooldown = 0.0;

        let cost_b = mate.reproduction_cost(&self.config);
        mate.saturation = (mate.saturation - cost_b).max(0.0);
        mate.reproduction_cooldown = 0.0;
        mate.state = BehaviorState::Idle;
        mate.target = None;
        mate.mate_request = None;
        self.animals.insert(mate_id, mate);
    }

    // ---- observation and persistence ------------------------------------

    /// Clones a flat read-only view of the whole world.
    pub fn snapshot(&self) -> WorldSnapshot {
        let animals = self
            .animals
            .values()
            .map(|a| {
                (
                    a.core.id.raw(),
                    AnimalDto {
                        id: a.core.id.raw(),
                        x: a.core.x,
                        y: a.core.y,
                        color_hex: a.core.color.to_hex(),
                        size: a.core.size,
                        predation_inclination: a.predation_inclination,
                        dead: a.is_dead(),
                        infected: a.infected,
                    },
                )
            })
            .collect();
        let foods = self
            .foods
            .values()
            .map(|f| {
                (
                    f.core.id.raw(),
                    FoodDto {
                        id: f.core.id.raw(),
                        x: f.core.x,
                        y: f.core.y,
                        color_hex: f.core.color.to_hex(),
                        size: f.core.size,
                    },
                )
            })
            .collect();
        WorldSnapshot {
            clock: self.clock,
            animals,
            foods,
        }
    }

    /// Drains everything the store needs to catch up: records for all
    /// current entities plus the ids deleted since the last drain.
    pub fn drain_mutations(&mut self) -> MutationBatch {
        MutationBatch {
            foods: self.foods.values().map(food_record).collect(),
            animals: self.animals.values().map(animal_record).collect(),
            deleted: std::mem::take(&mut self.pending_deletions),
        }
    }

    /// Restores persisted entities into an empty world. Malformed records
    /// are skipped with a warning rather than poisoning the whole load.
    pub fn load_records(&mut self, foods: Vec<FoodRecord>, animals: Vec<AnimalRecord>) {
        for record in foods {
            match self.restore_food(&record) {
                Some(food) => {
                    self.ids.reserve(food.core.id);
                    self.insert_food(food);
                }
                None => warn!(id = record.id, "skipping malformed food record"),
            }
        }
        for record in animals {
            match self.restore_animal(&record) {
                Some(animal) => {
                    self.ids.reserve(animal.core.id);
                    self.insert_animal(animal);
                }
                None => warn!(id = record.id, "skipping malformed animal record"),
            }
        }
    }

    fn restore_food(&self, r: &FoodRecord) -> Option<Food> {
        // Ids are global across kinds, so collisions with either map are
        // malformed.
        if r.id == 0
            || r.id > EntityId::MAX
            || self.foods.contains_key(&EntityId(r.id))
            || self.animals.contains_key(&EntityId(r.id))
        {
            return None;
        }
        if !(r.x.is_finite() && r.y.is_finite() && r.size.is_finite() && r.size > 0.0) {
            return None;
        }
        let color = Color::from_hex(&r.color_hex)?;
        let (x, y) = self.config.clamp_position(r.x, r.y);
        let lifespan = if r.lifespan.is_finite() && r.lifespan > 0.0 {
            r.lifespan
        } else {
            return None;
        };
        Some(Food {
            core: EntityCore::new(EntityId(r.id), x, y, r.size, color),
            age: r.age.max(0.0),
            lifespan,
        })
    }

    fn restore_animal(&self, r: &AnimalRecord) -> Option<Animal> {
        if r.id == 0
            || r.id > EntityId::MAX
            || self.animals.contains_key(&EntityId(r.id))
            || self.foods.contains_key(&EntityId(r.id))
        {
            return None;
        }
        if !(r.x.is_finite() && r.y.is_finite() && r.size.is_finite() && r.size > 0.0) {
            return None;
        }
        if !(r.lifespan.is_finite() && r.lifespan > 0.0) {
            return None;
        }
        let color = Color::from_hex(&r.color_hex)?;
        let (x, y) = self.config.clamp_position(r.x, r.y);
        let size = r
            .size
            .clamp(self.config.min_animal_size, self.config.max_animal_size);
        let speed = if r.speed.is_finite() && r.speed > 0.0 {
            r.speed
        } else {
            self.config.speed_for_size(size)
        };
        let mut animal = Animal::spawn(
            EntityId(r.id),
            x,
            y,
            size,
            r.predation_inclination,
            color,
            &self.config,
            // Lifespan jitter is overwritten below, so the RNG draw here is
            // discarded; any deterministic source will do.
            &mut SmallRng::seed_from_u64(r.id as u64),
        );
        animal.speed = speed;
        animal.saturation = r.saturation.clamp(0.0, self.config.max_saturation);
        animal.reproduction_cooldown = r.reproduction_cooldown.max(0.0);
        animal.age = r.age.max(0.0);
        animal.lifespan = r.lifespan;
        Some(animal)
    }

    /// Invariant check: every entity is registered in exactly the chunk its
    /// position maps to.
    pub fn chunk_membership_coherent(&self) -> bool {
        self.animals
            .values()
            .all(|a| self.animal_chunks.contains_at(a.core.id, a.core.x, a.core.y))
            && self
                .foods
                .values()
                .all(|f| self.food_chunks.contains_at(f.core.id, f.core.x, f.core.y))
    }
}

fn food_record(food: &Food) -> FoodRecord {
    FoodRecord {
        id: food.core.id.raw(),
        x: food.core.x,
        y: food.core.y,
        color_hex: food.core.color.to_hex(),
        size: food.core.size,
        age: food.age,
        lifespan: food.lifespan,
    }
}

fn animal_record(animal: &Animal) -> AnimalRecord {
    AnimalRecord {
        id: animal.core.id.raw(),
        x: animal.core.x,
        y: animal.core.y,
        color_hex: animal.core.color.to_hex(),
        size: animal.core.size,
        predation_inclination: animal.predation_inclination,
        saturation: animal.saturation,
        reproduction_cooldown: animal.reproduction_cooldown,
        speed: animal.speed,
        age: animal.age,
        lifespan: animal.lifespan,
    }
}
