//! Behavior state machine.
//!
//! Every live animal is in exactly one state. The state enum is closed and
//! carries its own data, so the per-tick driver is a single exhaustive match.
//! Decision functions return the next state (or `None` to stay put); entry
//! actions run once on transition. `Eating` and `Mating` are instantaneous
//! acts: the entry action does the work and the next update falls back to
//! `Idle`.
//!
//! The driver only ever mutates the animal it is updating, with two narrow
//! exceptions that go through world helpers: dropping a courtship request
//! into another animal's mailbox, and settling a reproduction with a partner
//! that has already consented by targeting us back.

use crate::entity::Animal;
use crate::ids::EntityId;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BehaviorState {
    /// Deciding what to do next.
    Idle,
    /// Chasing the best-scored food item, corpse, or live prey.
    SeekingFood,
    /// Approaching a mate; the handshake completes when both target each
    /// other within mating range.
    SeekingMate,
    /// Consuming the current target this tick.
    Eating,
    /// Reproducing with the current target this tick.
    Mating,
    /// Running from a predator until it is far enough away or the timer runs
    /// out.
    Fleeing { threat: EntityId, time_left: f32 },
}

/// Advances one animal's behavior by `dt` seconds.
pub(crate) fn update(animal: &mut Animal, world: &mut World, dt: f32) {
    let next = match animal.state {
        BehaviorState::Idle => idle(animal, world),
        BehaviorState::SeekingFood => seeking_food(animal, world, dt),
        BehaviorState::SeekingMate => seeking_mate(animal, world, dt),
        BehaviorState::Eating => Some(BehaviorState::Idle),
        BehaviorState::Mating => Some(BehaviorState::Idle),
        BehaviorState::Fleeing { threat, time_left } => {
            fleeing(animal, world, threat, time_left, dt)
        }
    };
    if let Some(next) = next {
        enter(animal, world, next);
    }
}

/// Runs the entry action for `next` and commits the transition.
fn enter(animal: &mut Animal, world: &mut World, next: BehaviorState) {
    animal.state = next;
    match next {
        BehaviorState::Idle => {
            animal.target = None;
        }
        BehaviorState::SeekingFood => {
            animal.target = world.best_consumable_target(animal);
        }
        BehaviorState::SeekingMate => {
            // Target was chosen by the decision that triggered the
            // transition; announce ourselves to the candidate.
            if let Some(mate_id) = animal.target {
                world.court(animal.id(), mate_id);
            }
        }
        BehaviorState::Eating => {
            if let Some(target) = animal.target.take() {
                world.consume_entity(animal, target);
            }
        }
        BehaviorState::Mating => {
            if let Some(mate_id) = animal.target.take() {
                world.reproduce_with(animal, mate_id);
            }
        }
        BehaviorState::Fleeing { .. } => {
            animal.target = None;
        }
    }
}

fn flee_from(world: &mut World, threat: EntityId) -> BehaviorState {
    BehaviorState::Fleeing {
        threat,
        time_left: world.roll_flee_timer(),
    }
}

fn idle(animal: &mut Animal, world: &mut World) -> Option<BehaviorState> {
    if let Some(threat) = world.nearest_threat(animal) {
        return Some(flee_from(world, threat));
    }
    // An incoming courtship request is answered before anything else, so a
    // proposer standing in range is not left waiting forever.
    if let Some(proposer) = animal.mate_request.take() {
        let compatible = world
            .animal(proposer)
            .is_some_and(|mate| animal.compatible_mate(mate, world.config()));
        if compatible {
            animal.target = Some(proposer);
            return Some(BehaviorState::SeekingMate);
        }
    }
    if animal.can_reproduce(world.config()) {
        if let Some(mate_id) = world.nearest_compatible_mate(animal) {
            animal.target = Some(mate_id);
            return Some(BehaviorState::SeekingMate);
        }
    }
    // With nothing else to do, forage. A sated animal still builds reserves;
    // SeekingFood holds on its own when nothing edible is around.
    Some(BehaviorState::SeekingFood)
}

fn seeking_food(animal: &mut Animal, world: &mut World, dt: f32) -> Option<BehaviorState> {
    if let Some(threat) = world.nearest_threat(animal) {
        return Some(flee_from(world, threat));
    }
    // Re-validate the target every tick; consumed or rotted-away targets are
    // replaced rather than chased as ghosts. With nothing edible nearby the
    // animal stays in this state and keeps scanning.
    let resolved = animal
        .target
        .and_then(|id| world.consumable_info(animal, id));
    let info = match resolved {
        Some(info) => info,
        None => {
            animal.target = world.best_consumable_target(animal);
            match animal.target.and_then(|id| world.consumable_info(animal, id)) {
                Some(info) => info,
                None => return None,
            }
        }
    };

    let dx = info.x - animal.core.x;
    let dy = info.y - animal.core.y;
    if info.consumable_now && dx * dx + dy * dy <= info.eat_range_sq {
        return Some(BehaviorState::Eating);
    }
    world.move_animal_towards(animal, info.x, info.y, dt);
    None
}

fn seeking_mate(animal: &mut Animal, world: &mut World, dt: f32) -> Option<BehaviorState> {
    if let Some(threat) = world.nearest_threat(animal) {
        return Some(flee_from(world, threat));
    }
    // Hunger overrides courtship.
    if animal.is_hungry(world.config()) {
        return Some(BehaviorState::SeekingFood);
    }
    let Some(mate_id) = animal.target else {
        return Some(BehaviorState::Idle);
    };
    let Some(status) = world.mate_status(animal, mate_id) else {
        animal.target = None;
        return Some(BehaviorState::Idle);
    };
    if !status.eligible {
        animal.target = None;
        return Some(BehaviorState::Idle);
    }
    if status.mutual && status.dist_sq <= status.range_sq {
        return Some(BehaviorState::Mating);
    }
    // Keep the proposal alive in case the mate cleared its mailbox without
    // consenting yet, then close the distance.
    world.court(animal.id(), mate_id);
    world.move_animal_towards(animal, status.x, status.y, dt);
    None
}

fn fleeing(
    animal: &mut Animal,
    world: &mut World,
    threat: EntityId,
    time_left: f32,
    dt: f32,
) -> Option<BehaviorState> {
    let Some((tx, ty)) = world.threat_position(animal, threat) else {
        return Some(BehaviorState::Idle);
    };
    let dx = animal.core.x - tx;
    let dy = animal.core.y - ty;
    let dist_sq = dx * dx + dy * dy;
    let safe = animal.core.size * world.config().safe_distance_factor;
    let remaining = time_left - dt;
    if dist_sq > safe * safe || remaining <= 0.0 {
        return Some(BehaviorState::Idle);
    }
    let dist = dist_sq.sqrt();
    if dist > 1e-3 {
        let away_x = animal.core.x + dx / dist * animal.speed;
        let away_y = animal.core.y + dy / dist * animal.speed;
        world.move_animal_towards(animal, away_x, away_y, dt);
    }
    animal.state = BehaviorState::Fleeing {
        threat,
        time_left: remaining,
    };
    None
}
