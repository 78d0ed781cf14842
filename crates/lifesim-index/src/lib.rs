//! Chunked spatial index over a bounded 2D plane.
//!
//! The world is partitioned into a uniform grid of square chunks. Every entity
//! is a member of exactly one chunk, determined by flooring its position by the
//! chunk size. Proximity queries walk the 3x3 block of chunks centered on a
//! position instead of scanning every entity, which keeps interaction checks
//! local no matter how crowded the world gets.

use std::collections::HashSet;
use std::hash::Hash;

use thiserror::Error;

/// Errors raised while configuring the grid.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid grid configuration: {0}")]
    InvalidConfig(String),
}

/// Integer coordinates of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    pub col: u32,
    pub row: u32,
}

/// Uniform grid of chunks keyed by entity handles.
///
/// The grid stores membership only; positions live with the entities. Callers
/// are responsible for relocating a key whenever a position write crosses a
/// chunk boundary, which keeps membership synchronously consistent with the
/// authoritative position.
#[derive(Debug)]
pub struct ChunkGrid<K> {
    chunk_size: f32,
    cols: u32,
    rows: u32,
    cells: Vec<HashSet<K>>,
    len: usize,
}

impl<K: Copy + Eq + Hash + Ord> ChunkGrid<K> {
    /// Builds a grid covering `width` x `height` world units.
    ///
    /// The chunk count along each axis is the ceiling of extent over chunk
    /// size, so positions right on the far edge still map to a valid chunk.
    pub fn new(chunk_size: f32, width: f32, height: f32) -> Result<Self, IndexError> {
        if !(chunk_size.is_finite() && chunk_size > 0.0) {
            return Err(IndexError::InvalidConfig(format!(
                "chunk size must be positive, got {chunk_size}"
            )));
        }
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(IndexError::InvalidConfig(format!(
                "world extent must be positive, got {width}x{height}"
            )));
        }
        let cols = (width / chunk_size).ceil() as u32;
        let rows = (height / chunk_size).ceil() as u32;
        let cells = (0..cols as usize * rows as usize)
            .map(|_| HashSet::new())
            .collect();
        Ok(Self {
            chunk_size,
            cols,
            rows,
            cells,
            len: 0,
        })
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    /// Total number of keys tracked by the grid.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Chunk coordinates for a world position, clamped to the grid bounds.
    pub fn chunk_at(&self, x: f32, y: f32) -> ChunkCoord {
        let col = ((x / self.chunk_size).floor().max(0.0) as u32).min(self.cols - 1);
        let row = ((y / self.chunk_size).floor().max(0.0) as u32).min(self.rows - 1);
        ChunkCoord { col, row }
    }

    fn cell_index(&self, coord: ChunkCoord) -> usize {
        coord.row as usize * self.cols as usize + coord.col as usize
    }

    /// Registers `key` at `(x, y)`.
    pub fn insert(&mut self, key: K, x: f32, y: f32) {
        let idx = self.cell_index(self.chunk_at(x, y));
        if self.cells[idx].insert(key) {
            self.len += 1;
        }
    }

    /// Removes `key` from the chunk containing `(x, y)`. Returns whether the
    /// key was present there.
    pub fn remove(&mut self, key: K, x: f32, y: f32) -> bool {
        let idx = self.cell_index(self.chunk_at(x, y));
        let removed = self.cells[idx].remove(&key);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Moves `key` between chunks after a position write. No-op when both
    /// positions land in the same chunk.
    pub fn relocate(&mut self, key: K, from: (f32, f32), to: (f32, f32)) {
        let old = self.chunk_at(from.0, from.1);
        let new = self.chunk_at(to.0, to.1);
        if old == new {
            return;
        }
        let old_idx = self.cell_index(old);
        if self.cells[old_idx].remove(&key) {
            let new_idx = self.cell_index(new);
            if !self.cells[new_idx].insert(key) {
                self.len -= 1;
            }
        } else {
            self.insert(key, to.0, to.1);
        }
    }

    /// Whether `key` is registered in the chunk containing `(x, y)`.
    pub fn contains_at(&self, key: K, x: f32, y: f32) -> bool {
        let idx = self.cell_index(self.chunk_at(x, y));
        self.cells[idx].contains(&key)
    }

    /// Collects every key in the 3x3 chunk neighborhood around `(x, y)`,
    /// sorted so callers iterate candidates in a reproducible order.
    ///
    /// Edge chunks clamp the neighborhood instead of wrapping, so corner
    /// positions see a 2x2 block.
    pub fn neighborhood(&self, x: f32, y: f32) -> Vec<K> {
        let mut out = Vec::new();
        self.for_each_neighbor(x, y, |k| out.push(k));
        out.sort_unstable();
        out
    }

    /// Visits every key in the 3x3 chunk neighborhood around `(x, y)`, in no
    /// particular order.
    pub fn for_each_neighbor(&self, x: f32, y: f32, mut visit: impl FnMut(K)) {
        let center = self.chunk_at(x, y);
        let col_lo = center.col.saturating_sub(1);
        let col_hi = (center.col + 1).min(self.cols - 1);
        let row_lo = center.row.saturating_sub(1);
        let row_hi = (center.row + 1).min(self.rows - 1);
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let idx = self.cell_index(ChunkCoord { col, row });
                for key in &self.cells[idx] {
                    visit(*key);
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ChunkGrid<u16> {
        ChunkGrid::new(128.0, 8192.0, 8192.0).expect("valid grid")
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(ChunkGrid::<u16>::new(0.0, 100.0, 100.0).is_err());
        assert!(ChunkGrid::<u16>::new(-1.0, 100.0, 100.0).is_err());
        assert!(ChunkGrid::<u16>::new(16.0, 0.0, 100.0).is_err());
        assert!(ChunkGrid::<u16>::new(f32::NAN, 100.0, 100.0).is_err());
    }

    #[test]
    fn chunk_coordinates_floor_the_position() {
        let g = grid();
        assert_eq!(g.chunk_at(0.0, 0.0), ChunkCoord { col: 0, row: 0 });
        assert_eq!(g.chunk_at(127.9, 127.9), ChunkCoord { col: 0, row: 0 });
        assert_eq!(g.chunk_at(128.0, 0.0), ChunkCoord { col: 1, row: 0 });
        assert_eq!(g.chunk_at(500.0, 300.0), ChunkCoord { col: 3, row: 2 });
    }

    #[test]
    fn out_of_bounds_positions_clamp_to_edge_chunks() {
        let g = grid();
        assert_eq!(g.chunk_at(-50.0, -50.0), ChunkCoord { col: 0, row: 0 });
        assert_eq!(g.chunk_at(9000.0, 9000.0), ChunkCoord { col: 63, row: 63 });
        // Positions exactly on the far edge still land inside the grid.
        assert_eq!(g.chunk_at(8192.0, 8192.0), ChunkCoord { col: 63, row: 63 });
    }

    #[test]
    fn insert_and_remove_track_membership() {
        let mut g = grid();
        g.insert(7, 200.0, 200.0);
        assert_eq!(g.len(), 1);
        assert!(g.contains_at(7, 200.0, 200.0));
        assert!(!g.contains_at(7, 600.0, 600.0));
        assert!(g.remove(7, 200.0, 200.0));
        assert!(!g.remove(7, 200.0, 200.0));
        assert!(g.is_empty());
    }

    #[test]
    fn relocate_moves_between_chunks() {
        let mut g = grid();
        g.insert(3, 100.0, 100.0);
        g.relocate(3, (100.0, 100.0), (400.0, 100.0));
        assert!(!g.contains_at(3, 100.0, 100.0));
        assert!(g.contains_at(3, 400.0, 100.0));
        assert_eq!(g.len(), 1);

        // Same-chunk moves leave membership untouched.
        g.relocate(3, (400.0, 100.0), (410.0, 110.0));
        assert!(g.contains_at(3, 400.0, 100.0));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn neighborhood_covers_adjacent_chunks_only() {
        let mut g = grid();
        g.insert(1, 500.0, 500.0); // same chunk as query
        g.insert(2, 400.0, 600.0); // adjacent chunk
        g.insert(3, 2000.0, 2000.0); // far away
        let mut found = g.neighborhood(520.0, 520.0);
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn neighborhood_clamps_at_world_corners() {
        let mut g = grid();
        g.insert(1, 10.0, 10.0);
        g.insert(2, 200.0, 200.0);
        let mut found = g.neighborhood(0.0, 0.0);
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);

        g.insert(4, 8100.0, 8100.0);
        assert_eq!(g.neighborhood(8191.0, 8191.0), vec![4]);
    }
}
