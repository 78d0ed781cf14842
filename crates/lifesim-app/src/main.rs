//! Simulation server entry point.
//!
//! Environment knobs:
//! - `LIFESIM_DB`: database file path (default `lifesim.db`).
//! - `LIFESIM_CONFIG`: JSON world config path; defaults apply when unset.
//! - `LIFESIM_RUN_SECS`: run for a fixed duration then stop gracefully;
//!   unset means run until the process is killed.
//! - `RUST_LOG`: standard tracing filter.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lifesim_app::{
    bootstrap_world, spawn_broadcast_loop, spawn_flush_loop, spawn_tick_loop, LogSink,
    LoopOptions, ReseedOptions, SeedOptions, Shutdown,
};
use lifesim_core::WorldConfig;
use lifesim_storage::Storage;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn load_config() -> anyhow::Result<WorldConfig> {
    match std::env::var_os("LIFESIM_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config: WorldConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(WorldConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    let db_path = std::env::var("LIFESIM_DB").unwrap_or_else(|_| "lifesim.db".into());
    let mut storage = Storage::open(&db_path).context("opening world database")?;
    info!(db = %db_path, "storage ready");

    let world = bootstrap_world(config, &mut storage, SeedOptions::default())?;
    let shutdown = Shutdown::new();
    let options = LoopOptions::default();

    let tick = spawn_tick_loop(
        world.clone(),
        shutdown.clone(),
        options.tick_interval,
        Some(ReseedOptions::default()),
    )?;
    let broadcast = spawn_broadcast_loop(
        world.clone(),
        shutdown.clone(),
        options.broadcast_interval,
        Box::new(LogSink),
    )?;
    let flush = spawn_flush_loop(
        world,
        shutdown.clone(),
        options.flush_interval,
        Box::new(storage),
    )?;
    info!("simulation running");

    if let Ok(secs) = std::env::var("LIFESIM_RUN_SECS") {
        let secs: u64 = secs.parse().context("parsing LIFESIM_RUN_SECS")?;
        std::thread::sleep(Duration::from_secs(secs));
        info!("run duration elapsed, shutting down");
        shutdown.request();
    }

    for handle in [tick, broadcast, flush] {
        if handle.join().is_err() {
            anyhow::bail!("worker thread panicked");
        }
    }
    Ok(())
}
