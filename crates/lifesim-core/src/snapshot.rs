//! Read-only world snapshots for observers.
//!
//! A snapshot is a flat, cloneable view taken under the world lock and
//! consumed outside it. DTOs carry only what a viewer needs to draw the
//! world, keyed by raw id so diffing stays cheap.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wire view of one food item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodDto {
    pub id: u16,
    pub x: f32,
    pub y: f32,
    pub color_hex: String,
    pub size: f32,
}

/// Wire view of one animal, corpses included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalDto {
    pub id: u16,
    pub x: f32,
    pub y: f32,
    pub color_hex: String,
    pub size: f32,
    pub predation_inclination: f32,
    pub dead: bool,
    pub infected: bool,
}

/// Complete world view at a single tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Seconds of simulated time since world start.
    pub clock: f64,
    pub animals: HashMap<u16, AnimalDto>,
    pub foods: HashMap<u16, FoodDto>,
}
