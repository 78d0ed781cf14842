//! Durable-state boundary.
//!
//! The world never talks to a database directly. It accumulates flat records
//! for changed entities and ids for removed ones; a storage backend
//! implementing [`PersistenceProvider`] turns a drained [`MutationBatch`]
//! into transactions on whatever store it wraps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::EntityId;

/// Persisted form of a food entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub id: u16,
    pub x: f32,
    pub y: f32,
    pub color_hex: String,
    pub size: f32,
    pub age: f32,
    pub lifespan: f32,
}

/// Persisted form of an animal, covering everything needed to resume it.
///
/// Behavior state and targets are deliberately not persisted; a restored
/// animal re-decides from `Idle` on its first tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalRecord {
    pub id: u16,
    pub x: f32,
    pub y: f32,
    pub color_hex: String,
    pub size: f32,
    pub predation_inclination: f32,
    pub saturation: f32,
    pub reproduction_cooldown: f32,
    pub speed: f32,
    pub age: f32,
    pub lifespan: f32,
}

/// One drained round of pending world mutations.
#[derive(Debug, Default, Clone)]
pub struct MutationBatch {
    pub foods: Vec<FoodRecord>,
    pub animals: Vec<AnimalRecord>,
    pub deleted: Vec<EntityId>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.foods.is_empty() && self.animals.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.foods.len() + self.animals.len() + self.deleted.len()
    }

    /// Folds another batch in, keeping the later record when both touch the
    /// same entity. Used to merge a failed flush with the next drain.
    pub fn merge(&mut self, newer: MutationBatch) {
        // A deletion supersedes upserts drained before it. It must never
        // strip a newer upsert: the id may have been freed and reissued to a
        // brand-new entity between the two drains. Applying delete-then-
        // upsert in that order at the backend yields the right final row.
        self.foods.retain(|f| {
            !newer.foods.iter().any(|n| n.id == f.id)
                && !newer.deleted.contains(&EntityId(f.id))
        });
        self.foods.extend(newer.foods);
        self.animals.retain(|a| {
            !newer.animals.iter().any(|n| n.id == a.id)
                && !newer.deleted.contains(&EntityId(a.id))
        });
        self.animals.extend(newer.animals);
        for id in newer.deleted {
            if !self.deleted.contains(&id) {
                self.deleted.push(id);
            }
        }
    }
}

/// Errors surfaced by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Abstraction over the durable store.
pub trait PersistenceProvider: Send {
    /// Loads every persisted entity for world bootstrap.
    fn load_all(&mut self) -> Result<(Vec<FoodRecord>, Vec<AnimalRecord>), PersistenceError>;

    /// Applies one batch atomically: either every upsert and delete lands,
    /// or none do.
    fn apply(&mut self, batch: &MutationBatch) -> Result<(), PersistenceError>;
}

/// Backend that drops everything, for ephemeral worlds and tests.
#[derive(Debug, Default)]
pub struct NullPersistence;

impl PersistenceProvider for NullPersistence {
    fn load_all(&mut self) -> Result<(Vec<FoodRecord>, Vec<AnimalRecord>), PersistenceError> {
        Ok((Vec::new(), Vec::new()))
    }

    fn apply(&mut self, _batch: &MutationBatch) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(id: u16, x: f32) -> FoodRecord {
        FoodRecord {
            id,
            x,
            y: 0.0,
            color_hex: "#44AA33".into(),
            size: 4.0,
            age: 0.0,
            lifespan: 30.0,
        }
    }

    #[test]
    fn merge_prefers_newer_records() {
        let mut held = MutationBatch {
            foods: vec![food(1, 10.0), food(2, 20.0)],
            ..MutationBatch::default()
        };
        let newer = MutationBatch {
            foods: vec![food(1, 99.0)],
            ..MutationBatch::default()
        };
        held.merge(newer);
        assert_eq!(held.foods.len(), 2);
        let one = held.foods.iter().find(|f| f.id == 1).unwrap();
        assert_eq!(one.x, 99.0);
    }

    #[test]
    fn merge_lets_deletions_supersede_upserts() {
        let mut held = MutationBatch {
            foods: vec![food(5, 1.0)],
            ..MutationBatch::default()
        };
        let newer = MutationBatch {
            deleted: vec![EntityId(5)],
            ..MutationBatch::default()
        };
        held.merge(newer);
        assert!(held.foods.is_empty());
        assert_eq!(held.deleted, vec![EntityId(5)]);
    }

    #[test]
    fn merge_keeps_newer_record_for_a_reissued_id() {
        // The entity behind id 5 died, the flush failed, and a new entity
        // was issued the freed id before the retry.
        let mut held = MutationBatch {
            deleted: vec![EntityId(5)],
            ..MutationBatch::default()
        };
        let newer = MutationBatch {
            foods: vec![food(5, 77.0)],
            ..MutationBatch::default()
        };
        held.merge(newer);
        assert_eq!(held.foods.len(), 1);
        assert_eq!(held.foods[0].x, 77.0);
        // The stale delete stays; it lands before the upsert at the backend.
        assert_eq!(held.deleted, vec![EntityId(5)]);
    }
}
