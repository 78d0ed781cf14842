//! Runner glue: a shared world plus the loop machinery around it.

pub mod diff;
pub mod loops;

use std::sync::{Arc, Mutex};

use tracing::info;

use lifesim_core::{PersistenceProvider, SpawnRect, World, WorldConfig};

pub use diff::{BroadcastFrame, SnapshotDiff};
pub use loops::{
    flush_pending, spawn_broadcast_loop, spawn_flush_loop, spawn_tick_loop, LogSink, LoopOptions,
    ReseedOptions, Shutdown, SnapshotSink,
};

/// The one lock everything shares. The tick thread mutates through it;
/// observers and the flush loop take short read-or-drain turns.
pub type SharedWorld = Arc<Mutex<World>>;

pub fn shared_world(world: World) -> SharedWorld {
    Arc::new(Mutex::new(world))
}

/// Initial population for a world that starts out empty.
#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    pub animals: usize,
    pub foods: usize,
    pub rect: SpawnRect,
    pub chaos: f32,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            animals: 50,
            foods: 1500,
            rect: SpawnRect::new(0.0, 0.0, 2048.0, 2048.0),
            chaos: 1.0,
        }
    }
}

/// Builds the world, restores persisted state, and seeds a fresh population
/// when the store had nothing alive in it.
pub fn bootstrap_world(
    config: WorldConfig,
    provider: &mut dyn PersistenceProvider,
    seed: SeedOptions,
) -> anyhow::Result<SharedWorld> {
    let mut world = World::new(config)?;
    let (foods, animals) = provider.load_all()?;
    let restored = foods.len() + animals.len();
    world.load_records(foods, animals);
    if restored > 0 {
        info!(
            animals = world.animal_count(),
            foods = world.food_count(),
            "restored world from store"
        );
    }
    if world.live_animal_count() == 0 {
        let animals = world.spawn_animals(seed.animals, seed.rect, seed.chaos);
        let foods = world.spawn_food(seed.foods, seed.rect);
        info!(animals, foods, "seeded fresh population");
    }
    Ok(shared_world(world))
}
