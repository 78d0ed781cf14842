//! Core simulation engine for a bounded 2D artificial-life world.
//!
//! Animals graze, hunt, flee, and court each other across a chunked plane;
//! food grows back on its own; corpses rot away. The engine is synchronous
//! and deterministic under a fixed seed: one [`World::step`] call advances
//! everything by a time slice, and everything else (snapshots, persistence
//! drains) is a read or a queue swap.
//!
//! Concurrency is the embedding application's concern. The intended shape is
//! a single tick thread mutating the world behind a lock, with observer and
//! persistence loops taking short turns on the same lock.

pub mod behavior;
pub mod color;
pub mod config;
pub mod entity;
pub mod ids;
pub mod persist;
pub mod snapshot;
pub mod world;

pub use behavior::BehaviorState;
pub use color::Color;
pub use config::{SpawnRect, WorldConfig};
pub use entity::{Animal, EntityCore, Food};
pub use ids::{EntityId, IdPool};
pub use persist::{
    AnimalRecord, FoodRecord, MutationBatch, NullPersistence, PersistenceError,
    PersistenceProvider,
};
pub use snapshot::{AnimalDto, FoodDto, WorldSnapshot};
pub use world::{TickReport, World};

use thiserror::Error;

/// Errors raised while building a world.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("invalid world configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Index(#[from] lifesim_index::IndexError),
}
