//! Snapshot diffing for broadcast frames.
//!
//! Observers get the full world once, then only what changed between
//! consecutive snapshots. Entity ids are recycled, so removal and addition
//! of the same id across one interval shows up as an update with entirely
//! new fields; viewers treat an update as a full overwrite, which makes
//! that harmless.

use serde::Serialize;

use lifesim_core::{AnimalDto, FoodDto, WorldSnapshot};

/// Changes between two snapshots, split per entity kind.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SnapshotDiff {
    pub added_animals: Vec<AnimalDto>,
    pub updated_animals: Vec<AnimalDto>,
    pub removed_animals: Vec<u16>,
    pub added_foods: Vec<FoodDto>,
    pub updated_foods: Vec<FoodDto>,
    pub removed_foods: Vec<u16>,
}

impl SnapshotDiff {
    /// Computes the delta that turns `prev` into `next`.
    pub fn between(prev: &WorldSnapshot, next: &WorldSnapshot) -> Self {
        let mut diff = Self::default();
        for (id, dto) in &next.animals {
            match prev.animals.get(id) {
                None => diff.added_animals.push(dto.clone()),
                Some(old) if old != dto => diff.updated_animals.push(dto.clone()),
                Some(_) => {}
            }
        }
        for id in prev.animals.keys() {
            if !next.animals.contains_key(id) {
                diff.removed_animals.push(*id);
            }
        }
        for (id, dto) in &next.foods {
            match prev.foods.get(id) {
                None => diff.added_foods.push(dto.clone()),
                Some(old) if old != dto => diff.updated_foods.push(dto.clone()),
                Some(_) => {}
            }
        }
        for id in prev.foods.keys() {
            if !next.foods.contains_key(id) {
                diff.removed_foods.push(*id);
            }
        }
        // Stable ordering keeps frames reproducible for consumers and tests.
        diff.added_animals.sort_by_key(|a| a.id);
        diff.updated_animals.sort_by_key(|a| a.id);
        diff.removed_animals.sort_unstable();
        diff.added_foods.sort_by_key(|f| f.id);
        diff.updated_foods.sort_by_key(|f| f.id);
        diff.removed_foods.sort_unstable();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added_animals.is_empty()
            && self.updated_animals.is_empty()
            && self.removed_animals.is_empty()
            && self.added_foods.is_empty()
            && self.updated_foods.is_empty()
            && self.removed_foods.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added_animals.len()
            + self.updated_animals.len()
            + self.removed_animals.len()
            + self.added_foods.len()
            + self.updated_foods.len()
            + self.removed_foods.len()
    }
}

/// One broadcast payload: the delta plus enough context to sanity-check it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastFrame {
    /// Simulated seconds at the moment the snapshot was taken.
    pub clock: f64,
    pub animal_count: usize,
    pub food_count: usize,
    pub diff: SnapshotDiff,
}

impl BroadcastFrame {
    pub fn new(snapshot: &WorldSnapshot, diff: SnapshotDiff) -> Self {
        Self {
            clock: snapshot.clock,
            animal_count: snapshot.animals.len(),
            food_count: snapshot.foods.len(),
            diff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal(id: u16, x: f32) -> AnimalDto {
        AnimalDto {
            id,
            x,
            y: 0.0,
            color_hex: "#AA2233".into(),
            size: 8.0,
            predation_inclination: 0.2,
            dead: false,
            infected: false,
        }
    }

    fn food(id: u16) -> FoodDto {
        FoodDto {
            id,
            x: 10.0,
            y: 20.0,
            color_hex: "#44AA33".into(),
            size: 4.0,
        }
    }

    fn snapshot(animals: Vec<AnimalDto>, foods: Vec<FoodDto>) -> WorldSnapshot {
        WorldSnapshot {
            clock: 1.0,
            animals: animals.into_iter().map(|a| (a.id, a)).collect(),
            foods: foods.into_iter().map(|f| (f.id, f)).collect(),
        }
    }

    #[test]
    fn classifies_added_updated_and_removed() {
        let prev = snapshot(vec![animal(1, 0.0), animal(2, 0.0)], vec![food(9)]);
        let next = snapshot(vec![animal(2, 5.0), animal(3, 1.0)], vec![]);
        let diff = SnapshotDiff::between(&prev, &next);
        assert_eq!(diff.added_animals.len(), 1);
        assert_eq!(diff.added_animals[0].id, 3);
        assert_eq!(diff.updated_animals.len(), 1);
        assert_eq!(diff.updated_animals[0].id, 2);
        assert_eq!(diff.removed_animals, vec![1]);
        assert_eq!(diff.removed_foods, vec![9]);
        assert_eq!(diff.change_count(), 4);
    }

    #[test]
    fn identical_snapshots_diff_to_empty() {
        let snap = snapshot(vec![animal(1, 3.0)], vec![food(2)]);
        let diff = SnapshotDiff::between(&snap, &snap.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn first_frame_reports_everything_as_added() {
        let empty = WorldSnapshot::default();
        let next = snapshot(vec![animal(1, 0.0)], vec![food(2), food(3)]);
        let diff = SnapshotDiff::between(&empty, &next);
        assert_eq!(diff.added_animals.len(), 1);
        assert_eq!(diff.added_foods.len(), 2);
        assert!(diff.removed_animals.is_empty());
    }
}
