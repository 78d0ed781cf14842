//! Entity identifier allocation.
//!
//! Identifiers are 16-bit so a full snapshot stays compact on the wire. Zero
//! is reserved as the "no entity" sentinel. Freed identifiers are recycled
//! through a free list, so allocation and release are both O(1) regardless of
//! how many ids are live.

use std::sync::Mutex;

/// Handle to a single entity. Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u16);

impl EntityId {
    pub const MAX: u16 = u16::MAX - 1;

    pub fn raw(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct PoolState {
    /// Next never-used id; ids above this are all available.
    next: u16,
    /// Ids returned to the pool, handed back out LIFO.
    free: Vec<u16>,
}

/// Mutex-guarded free list of entity ids.
///
/// The pool carries its own lock so ids can be reserved for staged spawns
/// without holding the world lock.
#[derive(Debug)]
pub struct IdPool {
    state: Mutex<PoolState>,
}

impl Default for IdPool {
    fn default() -> Self {
        Self::new()
    }
}

impl IdPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState { next: 1, free: Vec::new() }),
        }
    }

    /// Hands out an unused id, or `None` when all 65534 ids are live.
    pub fn allocate(&self) -> Option<EntityId> {
        let mut state = self.state.lock().expect("id pool lock poisoned");
        if let Some(id) = state.free.pop() {
            return Some(EntityId(id));
        }
        if state.next > EntityId::MAX {
            return None;
        }
        let id = state.next;
        state.next += 1;
        Some(EntityId(id))
    }

    /// Returns an id to the pool for reuse.
    pub fn release(&self, id: EntityId) {
        debug_assert!(id.0 != 0, "released the reserved zero id");
        let mut state = self.state.lock().expect("id pool lock poisoned");
        state.free.push(id.0);
    }

    /// Marks an id as in use during restore from persistence. Ids at or above
    /// the high-water mark push it forward; ids below it are assumed to have
    /// been accounted for by the caller walking the restored set in order.
    pub fn reserve(&self, id: EntityId) {
        let mut state = self.state.lock().expect("id pool lock poisoned");
        if id.0 >= state.next {
            for gap in state.next..id.0 {
                state.free.push(gap);
            }
            state.next = id.0 + 1;
        } else {
            state.free.retain(|&f| f != id.0);
        }
    }

    /// Number of ids currently handed out.
    pub fn live_count(&self) -> usize {
        let state = self.state.lock().expect("id pool lock poisoned");
        (state.next as usize - 1) - state.free.len()
    }
}
