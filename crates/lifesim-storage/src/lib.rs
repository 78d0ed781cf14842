//! DuckDB-backed persistence for world state.
//!
//! One table per entity kind, keyed by entity id. A mutation batch is
//! applied as a single transaction: deletions first, then upserts, so a
//! failed flush leaves the previous durable state fully intact and the
//! caller free to retry with a merged batch.

use std::path::Path;

use duckdb::{params, Connection};
use thiserror::Error;
use tracing::{debug, warn};

use lifesim_core::{
    AnimalRecord, FoodRecord, MutationBatch, PersistenceError, PersistenceProvider,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duckdb failure: {0}")]
    Duckdb(#[from] duckdb::Error),
}

impl From<StorageError> for PersistenceError {
    fn from(err: StorageError) -> Self {
        PersistenceError::Backend(err.to_string())
    }
}

const SCHEMA: &str = r"
create table if not exists foods (
    id bigint primary key,
    x double not null,
    y double not null,
    color_hex varchar not null,
    size double not null,
    age double not null,
    lifespan double not null
);
create table if not exists animals (
    id bigint primary key,
    x double not null,
    y double not null,
    color_hex varchar not null,
    size double not null,
    predation_inclination double not null,
    saturation double not null,
    reproduction_cooldown double not null,
    speed double not null,
    age double not null,
    lifespan double not null
);
";

/// Durable store wrapping a single DuckDB database.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens (or creates) a database file and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Ephemeral store for tests and throwaway worlds.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Loads every persisted entity. Rows that fail to map cleanly are
    /// skipped with a warning instead of aborting the whole load.
    pub fn load_everything(&mut self) -> Result<(Vec<FoodRecord>, Vec<AnimalRecord>), StorageError> {
        let mut foods = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "select id, x, y, color_hex, size, age, lifespan from foods order by id",
            )?;
            let rows = stmt.query_map(params![], |row| {
                Ok(FoodRecord {
                    id: row.get::<_, i64>(0)? as u16,
                    x: row.get::<_, f64>(1)? as f32,
                    y: row.get::<_, f64>(2)? as f32,
                    color_hex: row.get(3)?,
                    size: row.get::<_, f64>(4)? as f32,
                    age: row.get::<_, f64>(5)? as f32,
                    lifespan: row.get::<_, f64>(6)? as f32,
                })
            })?;
            for row in rows {
                match row {
                    Ok(record) => foods.push(record),
                    Err(err) => warn!(%err, "skipping unreadable food row"),
                }
            }
        }

        let mut animals = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "select id, x, y, color_hex, size, predation_inclination, saturation, \
                 reproduction_cooldown, speed, age, lifespan from animals order by id",
            )?;
            let rows = stmt.query_map(params![], |row| {
                Ok(AnimalRecord {
                    id: row.get::<_, i64>(0)? as u16,
                    x: row.get::<_, f64>(1)? as f32,
                    y: row.get::<_, f64>(2)? as f32,
                    color_hex: row.get(3)?,
                    size: row.get::<_, f64>(4)? as f32,
                    predation_inclination: row.get::<_, f64>(5)? as f32,
                    saturation: row.get::<_, f64>(6)? as f32,
                    reproduction_cooldown: row.get::<_, f64>(7)? as f32,
                    speed: row.get::<_, f64>(8)? as f32,
                    age: row.get::<_, f64>(9)? as f32,
                    lifespan: row.get::<_, f64>(10)? as f32,
                })
            })?;
            for row in rows {
                match row {
                    Ok(record) => animals.push(record),
                    Err(err) => warn!(%err, "skipping unreadable animal row"),
                }
            }
        }
        debug!(
            foods = foods.len(),
            animals = animals.len(),
            "loaded persisted world state"
        );
        Ok((foods, animals))
    }

    /// Applies one mutation batch atomically.
    pub fn apply_batch(&mut self, batch: &MutationBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut delete_food = tx.prepare("delete from foods where id = ?")?;
            let mut delete_animal = tx.prepare("delete from animals where id = ?")?;
            for id in &batch.deleted {
                delete_food.execute(params![id.raw() as i64])?;
                delete_animal.execute(params![id.raw() as i64])?;
            }

            let mut upsert_food = tx.prepare(
                "insert or replace into foods \
                 (id, x, y, color_hex, size, age, lifespan) \
                 values (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for f in &batch.foods {
                upsert_food.execute(params![
                    f.id as i64,
                    f.x as f64,
                    f.y as f64,
                    f.color_hex,
                    f.size as f64,
                    f.age as f64,
                    f.lifespan as f64,
                ])?;
            }

            let mut upsert_animal = tx.prepare(
                "insert or replace into animals \
                 (id, x, y, color_hex, size, predation_inclination, saturation, \
                  reproduction_cooldown, speed, age, lifespan) \
                 values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for a in &batch.animals {
                upsert_animal.execute(params![
                    a.id as i64,
                    a.x as f64,
                    a.y as f64,
                    a.color_hex,
                    a.size as f64,
                    a.predation_inclination as f64,
                    a.saturation as f64,
                    a.reproduction_cooldown as f64,
                    a.speed as f64,
                    a.age as f64,
                    a.lifespan as f64,
                ])?;
            }
        }
        tx.commit()?;
        debug!(rows = batch.len(), "flushed mutation batch");
        Ok(())
    }

    /// Row counts for diagnostics: `(foods, animals)`.
    pub fn counts(&self) -> Result<(u64, u64), StorageError> {
        let foods: u64 = self
            .conn
            .query_row("select count(*) from foods", params![], |r| r.get(0))?;
        let animals: u64 = self
            .conn
            .query_row("select count(*) from animals", params![], |r| r.get(0))?;
        Ok((foods, animals))
    }
}

impl PersistenceProvider for Storage {
    fn load_all(&mut self) -> Result<(Vec<FoodRecord>, Vec<AnimalRecord>), PersistenceError> {
        Ok(self.load_everything()?)
    }

    fn apply(&mut self, batch: &MutationBatch) -> Result<(), PersistenceError> {
        Ok(self.apply_batch(batch)?)
    }
}
