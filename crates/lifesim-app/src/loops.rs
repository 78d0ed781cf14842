//! The three long-running loops.
//!
//! The tick loop is the only writer of simulation state. The broadcast loop
//! publishes diffs to whatever sink is plugged in. The flush loop drains
//! mutation batches and hands them to the persistence provider, retrying
//! failed batches so a slow or briefly unavailable store never stalls the
//! simulation itself. Each loop holds the world lock only for the moment it
//! needs: one step, one snapshot, or one queue drain.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use lifesim_core::{MutationBatch, PersistenceProvider, SpawnRect, WorldSnapshot};

use crate::diff::{BroadcastFrame, SnapshotDiff};
use crate::SharedWorld;

/// Cooperative stop signal shared by every loop.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cadence of the three loops.
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    pub tick_interval: Duration,
    pub broadcast_interval: Duration,
    pub flush_interval: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            broadcast_interval: Duration::from_millis(300),
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// How to reseed the world when the population dies out.
#[derive(Debug, Clone, Copy)]
pub struct ReseedOptions {
    pub animals: usize,
    pub rect: SpawnRect,
    pub chaos: f32,
}

impl Default for ReseedOptions {
    fn default() -> Self {
        Self {
            animals: 50,
            rect: SpawnRect::new(0.0, 0.0, 2048.0, 2048.0),
            chaos: 1.0,
        }
    }
}

/// Receives broadcast frames. Implementations own delivery: a websocket fan
/// out, a channel, or just a log line.
pub trait SnapshotSink: Send {
    fn publish(&mut self, frame: &BroadcastFrame);
}

/// Sink that records frame traffic in the log and nothing else.
#[derive(Debug, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn publish(&mut self, frame: &BroadcastFrame) {
        debug!(
            clock = frame.clock,
            animals = frame.animal_count,
            foods = frame.food_count,
            changes = frame.diff.change_count(),
            "broadcast frame"
        );
    }
}

/// Starts the authoritative simulation thread.
///
/// Each pass sleeps one interval, measures the wall-clock time actually
/// elapsed, and advances the world by that much, so a slow tick stretches
/// the next time slice instead of silently slowing the simulation down.
pub fn spawn_tick_loop(
    world: SharedWorld,
    shutdown: Shutdown,
    interval: Duration,
    reseed: Option<ReseedOptions>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lifesim-tick".into())
        .spawn(move || {
            let mut last = Instant::now();
            while !shutdown.is_requested() {
                thread::sleep(interval);
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f32();
                last = now;
                let mut world = world.lock().expect("world lock poisoned");
                let report = world.step(dt);
                if report.deaths > 0 || report.births > 0 {
                    debug!(
                        births = report.births,
                        deaths = report.deaths,
                        "population changed"
                    );
                }
                if let Some(reseed) = reseed {
                    if world.live_animal_count() == 0 {
                        let spawned = world.spawn_animals(reseed.animals, reseed.rect, reseed.chaos);
                        info!(spawned, "population extinct, reseeding");
                    }
                }
            }
            info!("tick loop stopped");
        })
}

/// Starts the observer thread: snapshot, diff against the previous frame,
/// publish when anything changed.
pub fn spawn_broadcast_loop(
    world: SharedWorld,
    shutdown: Shutdown,
    interval: Duration,
    mut sink: Box<dyn SnapshotSink>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lifesim-broadcast".into())
        .spawn(move || {
            let mut previous = WorldSnapshot::default();
            while !shutdown.is_requested() {
                thread::sleep(interval);
                let current = {
                    let world = world.lock().expect("world lock poisoned");
                    world.snapshot()
                };
                let diff = SnapshotDiff::between(&previous, &current);
                if !diff.is_empty() {
                    sink.publish(&BroadcastFrame::new(&current, diff));
                }
                previous = current;
            }
            info!("broadcast loop stopped");
        })
}

/// Starts the persistence thread. On shutdown a final drain and flush runs
/// so the store reflects the last simulated state.
pub fn spawn_flush_loop(
    world: SharedWorld,
    shutdown: Shutdown,
    interval: Duration,
    mut provider: Box<dyn PersistenceProvider>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("lifesim-flush".into())
        .spawn(move || {
            let mut held: Option<MutationBatch> = None;
            while !shutdown.is_requested() {
                thread::sleep(interval);
                flush_pending(&world, provider.as_mut(), &mut held);
            }
            flush_pending(&world, provider.as_mut(), &mut held);
            if held.is_some() {
                error!("final flush failed, last batch lost");
            }
            info!("flush loop stopped");
        })
}

/// One flush round: drain under the lock, merge with any batch a previous
/// round failed to apply, write outside the lock. A failed write keeps the
/// merged batch for the next round instead of dropping it.
pub fn flush_pending(
    world: &SharedWorld,
    provider: &mut dyn PersistenceProvider,
    held: &mut Option<MutationBatch>,
) {
    let drained = {
        let mut world = world.lock().expect("world lock poisoned");
        world.drain_mutations()
    };
    let batch = match held.take() {
        Some(mut earlier) => {
            earlier.merge(drained);
            earlier
        }
        None => drained,
    };
    if batch.is_empty() {
        return;
    }
    match provider.apply(&batch) {
        Ok(()) => debug!(rows = batch.len(), "flush committed"),
        Err(err) => {
            warn!(%err, rows = batch.len(), "flush failed, batch retained for retry");
            *held = Some(batch);
        }
    }
}
