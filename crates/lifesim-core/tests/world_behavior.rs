//! End-to-end behavior scenarios driven through the public `World` API.

use lifesim_core::{BehaviorState, SpawnRect, World, WorldConfig};

/// Config with a fixed seed and automatic food growth turned off, so
/// scenarios control exactly what is in the world.
fn quiet_config() -> WorldConfig {
    WorldConfig {
        rng_seed: Some(42),
        food_spawn_per_tick: 0,
        ..WorldConfig::default()
    }
}

fn quiet_world() -> World {
    World::new(quiet_config()).expect("valid config")
}

#[test]
fn seeded_runs_replay_identically() {
    let build = || {
        let mut world = World::new(WorldConfig {
            rng_seed: Some(7),
            ..WorldConfig::default()
        })
        .expect("valid config");
        world.spawn_food(150, SpawnRect::new(400.0, 400.0, 900.0, 900.0));
        world.spawn_animals(20, SpawnRect::new(400.0, 400.0, 900.0, 900.0), 0.8);
        world
    };
    let mut a = build();
    let mut b = build();
    for _ in 0..40 {
        a.step(0.25);
        b.step(0.25);
    }
    assert_eq!(a.snapshot(), b.snapshot());
}

#[test]
fn state_and_index_invariants_hold_under_load() {
    let mut world = World::new(WorldConfig {
        rng_seed: Some(11),
        food_spawn_rect: SpawnRect::new(4000.0, 4000.0, 4600.0, 4600.0),
        ..WorldConfig::default()
    })
    .expect("valid config");
    world.spawn_food(200, SpawnRect::new(4000.0, 4000.0, 4600.0, 4600.0));
    world.spawn_animals(30, SpawnRect::new(4000.0, 4000.0, 4600.0, 4600.0), 1.0);

    for _ in 0..60 {
        world.step(0.25);
        assert!(world.chunk_membership_coherent());
    }

    let config = world.config().clone();
    let snapshot = world.snapshot();
    for animal in snapshot.animals.values() {
        assert!((0.0..=config.world_width).contains(&animal.x));
        assert!((0.0..=config.world_height).contains(&animal.y));
        assert!((0.0..=1.0).contains(&animal.predation_inclination));
    }
    assert!(world.food_count() <= config.food_cap);
}

#[test]
fn well_fed_animal_forages_instead_of_idling() {
    let mut world = quiet_world();
    let id = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    {
        let animal = world.animal(id).unwrap();
        assert!(!animal.is_hungry(world.config()));
        assert!(!animal.can_reproduce(world.config()));
    }

    // Foraging is the default occupation, not a hunger response.
    world.step(0.1);
    assert_eq!(world.animal(id).unwrap().state, BehaviorState::SeekingFood);

    // Nothing edible exists, so the state must hold instead of flapping back
    // through Idle every tick.
    for _ in 0..4 {
        world.step(0.5);
        assert_eq!(world.animal(id).unwrap().state, BehaviorState::SeekingFood);
    }
}

#[test]
fn hungry_grazer_eats_adjacent_food() {
    let mut world = quiet_world();
    let animal_id = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    let food_id = world.spawn_food_at(5004.0, 5000.0).unwrap();
    let nutrition = world.food(food_id).unwrap().core.nutrition_value();
    let hunger_rate = world.animal(animal_id).unwrap().hunger_rate;
    world.animal_mut(animal_id).unwrap().saturation = 3.0;

    let dt = 0.05;
    world.step(dt); // Idle -> SeekingFood, food targeted
    assert_eq!(
        world.animal(animal_id).unwrap().state,
        BehaviorState::SeekingFood
    );
    let report = world.step(dt); // within reach -> Eating, food consumed

    assert_eq!(world.animal(animal_id).unwrap().state, BehaviorState::Eating);
    assert_eq!(report.foods_consumed, 1);
    assert!(world.food(food_id).is_none());
    let expected = 3.0 - 2.0 * hunger_rate * dt + nutrition;
    let actual = world.animal(animal_id).unwrap().saturation;
    assert!(
        (actual - expected).abs() < 1e-4,
        "saturation {actual}, expected {expected}"
    );

    world.step(dt);
    assert_eq!(world.animal(animal_id).unwrap().state, BehaviorState::Idle);
}

#[test]
fn mutual_courtship_produces_a_litter() {
    let mut world = quiet_world();
    let a = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    let b = world.spawn_animal_at(5003.0, 5000.0, 8.0, 0.0).unwrap();
    for id in [a, b] {
        let animal = world.animal_mut(id).unwrap();
        animal.age = 20.0;
        animal.reproduction_cooldown = 10.0;
    }

    let dt = 0.1;
    world.step(dt); // both sides enter SeekingMate via the request mailbox
    assert_eq!(world.animal(a).unwrap().state, BehaviorState::SeekingMate);
    assert_eq!(world.animal(b).unwrap().state, BehaviorState::SeekingMate);
    assert_eq!(world.animal(b).unwrap().target, Some(a));

    let report = world.step(dt); // handshake completes, litter spawns
    assert!(
        (1..=3).contains(&report.births),
        "litter size {} outside 1..=3",
        report.births
    );
    assert_eq!(world.animal_count(), 2 + report.births as usize);

    // Both parents paid the cost and restarted their cooldowns.
    for id in [a, b] {
        let parent = world.animal(id).unwrap();
        assert!(parent.reproduction_cooldown < 1.0);
        assert!(parent.saturation < 10.0 - 1.5);
    }

    // Offspring traits stay inside the parental band.
    let snapshot = world.snapshot();
    for (raw, dto) in &snapshot.animals {
        if *raw == a.raw() || *raw == b.raw() {
            continue;
        }
        assert!((6.0..=10.0).contains(&dto.size), "child size {}", dto.size);
        assert!(dto.predation_inclination <= 0.11);
    }

    world.step(dt);
    assert_eq!(world.animal(a).unwrap().state, BehaviorState::Idle);
}

#[test]
fn starved_animal_becomes_an_inert_corpse_then_rots_away() {
    let mut world = quiet_world();
    let id = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    world.animal_mut(id).unwrap().saturation = 0.05;

    let report = world.step(0.1);
    assert_eq!(report.deaths, 1);
    let corpse = world.animal(id).unwrap();
    assert!(corpse.is_dead());
    assert_eq!(world.live_animal_count(), 0);
    let resting = (corpse.core.x, corpse.core.y);
    let living_color = corpse.base_color;

    // Mid-rot: still present, frozen in place, fading toward gray.
    for _ in 0..3 {
        world.step(1.0);
    }
    let corpse = world.animal(id).unwrap();
    assert_eq!((corpse.core.x, corpse.core.y), resting);
    assert_eq!(corpse.state, BehaviorState::Idle);
    assert_ne!(corpse.core.color, living_color);
    assert!(world.snapshot().animals[&id.raw()].dead);

    // Past the rot window the corpse is removed entirely.
    let mut removed = 0;
    for _ in 0..5 {
        removed += world.step(1.0).corpses_removed;
    }
    assert_eq!(removed, 1);
    assert!(world.animal(id).is_none());
    assert_eq!(world.animal_count(), 0);
}

#[test]
fn predator_scavenges_a_corpse() {
    let mut world = quiet_world();
    let predator = world.spawn_animal_at(5000.0, 5000.0, 12.0, 0.9).unwrap();
    let prey = world.spawn_animal_at(5010.0, 5000.0, 8.0, 0.0).unwrap();
    world.animal_mut(prey).unwrap().saturation = 0.01;
    world.animal_mut(predator).unwrap().saturation = 3.0;

    let mut consumed = false;
    for _ in 0..20 {
        world.step(0.2);
        if world.animal(prey).is_none() {
            consumed = true;
            break;
        }
    }
    assert!(consumed, "corpse was never scavenged");
    let predator = world.animal(predator).unwrap();
    assert!(predator.saturation > 3.0, "no nutrition gained");
}

#[test]
fn predator_grapples_live_prey() {
    let mut world = quiet_world();
    let predator = world.spawn_animal_at(5000.0, 5000.0, 12.0, 0.9).unwrap();
    let prey = world.spawn_animal_at(5005.0, 5000.0, 8.0, 0.0).unwrap();
    world.animal_mut(predator).unwrap().saturation = 3.0;
    let full_health = world.animal(prey).unwrap().max_health;

    world.step(0.5); // targets acquired, prey starts fleeing
    world.step(0.5); // contact damage lands
    match world.animal(prey) {
        Some(p) => assert!(
            p.health < full_health || p.is_dead(),
            "prey took no damage"
        ),
        None => (), // killed and scavenged within the window
    }
}

#[test]
fn threatened_animal_flees_until_the_predator_is_gone() {
    let mut world = quiet_world();
    let prey = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    let predator = world.spawn_animal_at(5020.0, 5000.0, 12.0, 0.9).unwrap();

    world.step(0.2);
    match world.animal(prey).unwrap().state {
        BehaviorState::Fleeing { threat, time_left } => {
            assert_eq!(threat, predator);
            assert!((3.0..5.0).contains(&time_left));
        }
        other => panic!("expected fleeing, got {other:?}"),
    }

    // Runs directly away from the threat on the next tick.
    let before = world.animal(prey).unwrap().core.x;
    world.step(0.2);
    let after = world.animal(prey).unwrap().core.x;
    assert!(after < before, "prey did not move away: {before} -> {after}");

    // Once the threat is beyond the safe distance the flight ends.
    assert!(world.teleport_animal(predator, 7000.0, 7000.0));
    world.step(0.2);
    assert_eq!(world.animal(prey).unwrap().state, BehaviorState::Idle);
}

#[test]
fn flee_timer_expiry_returns_the_animal_to_idle() {
    let mut world = quiet_world();
    let prey = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    let predator = world.spawn_animal_at(5030.0, 5000.0, 12.0, 0.9).unwrap();
    world.animal_mut(prey).unwrap().saturation = 18.0;
    world.animal_mut(predator).unwrap().saturation = 18.0;

    // The predator is re-placed near the prey after every tick, so the
    // flight can only end through the timer running out.
    let mut settled = false;
    for _ in 0..8 {
        world.step(1.0);
        let state = world.animal(prey).unwrap().state;
        if state == BehaviorState::Idle {
            settled = true;
            break;
        }
        assert!(
            matches!(state, BehaviorState::Fleeing { .. }),
            "unexpected state {state:?}"
        );
        let (px, py) = {
            let p = world.animal(prey).unwrap();
            (p.core.x, p.core.y)
        };
        world.teleport_animal(predator, px + 20.0, py);
    }
    assert!(settled, "flee timer never expired");
    assert!(!world.animal(prey).unwrap().is_dead());
}

#[test]
fn inclination_drifts_toward_grazing_when_food_abounds() {
    let mut world = quiet_world();
    let id = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.5).unwrap();
    for offset in 0..6 {
        world
            .spawn_food_at(5040.0 + 10.0 * offset as f32, 5000.0)
            .unwrap();
    }

    let start = world.animal(id).unwrap().predation_inclination;
    for _ in 0..5 {
        world.step(0.1);
    }
    let drifted = world.animal(id).unwrap().predation_inclination;
    assert!(drifted < start, "no grazing drift: {start} -> {drifted}");
}

#[test]
fn inclination_drifts_toward_hunting_when_prey_abounds() {
    let mut world = quiet_world();
    let hunter = world.spawn_animal_at(5000.0, 5000.0, 12.0, 0.8).unwrap();
    for offset in 0..3 {
        world
            .spawn_animal_at(5040.0, 5000.0 + 15.0 * offset as f32, 6.0, 0.1)
            .unwrap();
    }

    let start = world.animal(hunter).unwrap().predation_inclination;
    for _ in 0..5 {
        world.step(0.1);
    }
    let drifted = world.animal(hunter).unwrap().predation_inclination;
    assert!(drifted > start, "no hunting drift: {start} -> {drifted}");
}

#[test]
fn infection_marker_shows_up_in_snapshots() {
    let mut world = quiet_world();
    let id = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.3).unwrap();
    assert!(!world.snapshot().animals[&id.raw()].infected);

    assert!(world.set_infected(id, true));
    assert!(world.snapshot().animals[&id.raw()].infected);

    // Unknown ids are reported back, not panicked on.
    assert!(!world.set_infected(lifesim_core::EntityId(9999), false));
}

#[test]
fn peer_sized_animals_never_prey_on_each_other() {
    let mut world = quiet_world();
    let a = world.spawn_animal_at(5000.0, 5000.0, 10.0, 0.5).unwrap();
    let b = world.spawn_animal_at(5004.0, 5000.0, 10.0, 0.45).unwrap();
    for _ in 0..20 {
        world.step(0.2);
    }
    // Both still alive: the inclination gap is under the predation threshold.
    assert!(!world.animal(a).unwrap().is_dead());
    assert!(!world.animal(b).unwrap().is_dead());
    // And the overlap push kept them separated.
    let (pa, pb) = (world.animal(a).unwrap(), world.animal(b).unwrap());
    let dx = pa.core.x - pb.core.x;
    let dy = pa.core.y - pb.core.y;
    assert!(dx * dx + dy * dy > 1.0, "pair remained stacked");
}

#[test]
fn zero_jitter_config_spawns_without_panicking() {
    let mut world = World::new(WorldConfig {
        rng_seed: Some(3),
        lifespan_jitter: 0.0,
        offspring_size_jitter: 0.0,
        offspring_inclination_jitter: 0.0,
        food_spawn_per_tick: 0,
        ..WorldConfig::default()
    })
    .expect("zero jitter is a valid configuration");

    let id = world.spawn_animal_at(5000.0, 5000.0, 8.0, 0.0).unwrap();
    let lifespan = world.animal(id).unwrap().lifespan;
    let expected = world.config().base_lifespan + 8.0 / 4.0;
    assert!((lifespan - expected).abs() < 1e-5);
}

#[test]
fn drained_mutations_round_trip_through_a_fresh_world() {
    let mut world = quiet_world();
    world.spawn_animals(6, SpawnRect::new(4000.0, 4000.0, 4400.0, 4400.0), 0.5);
    world.spawn_food(12, SpawnRect::new(4000.0, 4000.0, 4400.0, 4400.0));
    world.step(0.25);

    let batch = world.drain_mutations();
    assert_eq!(batch.animals.len(), world.animal_count());
    assert_eq!(batch.foods.len(), world.food_count());

    let mut restored = quiet_world();
    restored.load_records(batch.foods.clone(), batch.animals.clone());
    assert_eq!(restored.animal_count(), world.animal_count());
    assert_eq!(restored.food_count(), world.food_count());
    assert!(restored.chunk_membership_coherent());
    for record in &batch.animals {
        let animal = restored
            .animal(lifesim_core::EntityId(record.id))
            .expect("restored animal");
        assert!((animal.core.x - record.x).abs() < 1e-4);
        assert!((animal.speed - record.speed).abs() < 1e-4);
        assert!((animal.saturation - record.saturation).abs() < 1e-4);
    }

    // A second drain has no stale deletions.
    assert!(world.drain_mutations().deleted.is_empty());
}

#[test]
fn malformed_records_are_skipped_on_load() {
    use lifesim_core::{AnimalRecord, FoodRecord};
    let mut world = quiet_world();
    let good_food = FoodRecord {
        id: 10,
        x: 100.0,
        y: 100.0,
        color_hex: "#44AA33".into(),
        size: 4.0,
        age: 1.0,
        lifespan: 30.0,
    };
    let bad_color = FoodRecord {
        color_hex: "oops".into(),
        id: 11,
        ..good_food.clone()
    };
    let bad_size = FoodRecord {
        size: f32::NAN,
        id: 12,
        ..good_food.clone()
    };
    let reserved_id = FoodRecord {
        id: 0,
        ..good_food.clone()
    };
    let bad_animal = AnimalRecord {
        id: 20,
        x: f32::INFINITY,
        y: 0.0,
        color_hex: "#AA3344".into(),
        size: 8.0,
        predation_inclination: 0.2,
        saturation: 5.0,
        reproduction_cooldown: 0.0,
        speed: 10.0,
        age: 2.0,
        lifespan: 30.0,
    };
    world.load_records(
        vec![good_food, bad_color, bad_size, reserved_id],
        vec![bad_animal],
    );
    assert_eq!(world.food_count(), 1);
    assert_eq!(world.animal_count(), 0);
}
