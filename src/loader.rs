//! Bulk spawning of stored holograms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::display::DisplayManager;
use crate::error::Result;
use crate::hologram::Hologram;
use crate::host::Host;
use crate::logging::Logger;
use crate::spawner::{BatchProgress, BatchSpawner};
use crate::store::HologramStore;

pub struct BatchLoader {
    host: Arc<dyn Host>,
    store: Arc<RwLock<HologramStore>>,
    displays: Arc<DisplayManager>,
    spawner: BatchSpawner<dyn Host>,
    batch_size: usize,
    interval_ticks: u32,
    log: Logger,
}

impl BatchLoader {
    pub fn new(
        host: Arc<dyn Host>,
        store: Arc<RwLock<HologramStore>>,
        displays: Arc<DisplayManager>,
        batch_size: usize,
        interval_ticks: u32,
        log: &Logger,
    ) -> Self {
        Self {
            spawner: BatchSpawner::new(Arc::clone(&host), log),
            host,
            store,
            displays,
            batch_size,
            interval_ticks,
            log: log.scoped("mcholo::loader"),
        }
    }

    /// Queues every enabled hologram whose world is loaded. Returns how many.
    pub fn spawn_all(&self) -> Result<usize> {
        self.spawn_matching("all worlds", |_| true)
    }

    pub fn spawn_world(&self, world: &str) -> Result<usize> {
        self.spawn_matching(world, |h| h.world() == world)
    }

    fn spawn_matching(&self, what: &str, filter: impl Fn(&Hologram) -> bool) -> Result<usize> {
        let items: Vec<Hologram> = self
            .store
            .read()
            .all()
            .into_iter()
            .filter(|h| h.enabled && filter(*h))
            .filter(|h| self.host.is_world_loaded(h.world()) && !self.displays.is_active(&h.name))
            .cloned()
            .collect();
        if items.is_empty() {
            self.log.warn(format_args!("no holograms to spawn in {what}"));
            return Ok(0);
        }
        let count = items.len();
        self.log.info(format_args!("spawning {count} holograms in {what}"));
        let displays = Arc::clone(&self.displays);
        self.spawner.start(items, self.batch_size, self.interval_ticks, move |hologram: &Hologram| {
            displays.spawn(hologram.clone())
        })?;
        Ok(count)
    }

    pub fn cancel(&self) {
        self.spawner.cancel();
    }
    pub fn is_processing(&self) -> bool {
        self.spawner.is_running()
    }
    pub fn progress(&self) -> Option<BatchProgress> {
        self.spawner.progress()
    }
}

/// Spawns a world's holograms when the host loads it, once the startup
/// batch has run.
pub struct WorldListener {
    loader: Arc<BatchLoader>,
    initial_load_completed: AtomicBool,
    log: Logger,
}

impl WorldListener {
    pub fn new(loader: Arc<BatchLoader>, log: &Logger) -> Self {
        Self {
            loader,
            initial_load_completed: AtomicBool::new(false),
            log: log.scoped("mcholo::loader"),
        }
    }

    pub fn set_initial_load_completed(&self) {
        self.initial_load_completed.store(true, Ordering::Release);
    }
    pub fn has_initial_load_completed(&self) -> bool {
        self.initial_load_completed.load(Ordering::Acquire)
    }

    pub fn on_world_load(&self, world: &str) {
        if !self.has_initial_load_completed() {
            self.log.debug(format_args!("world '{world}' loaded before startup spawn, leaving it to that"));
            return;
        }
        self.log.info(format_args!("world '{world}' loaded, spawning its holograms"));
        if let Err(e) = self.loader.spawn_world(world) {
            self.log.warn(format_args!("could not spawn holograms for world '{world}': {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hologram::Line;
    use crate::logging::testing::Recorder;
    use crate::server::Server;
    use crate::tags::TagManager;
    use crate::types::{Location, V3};
    use crate::visibility::VisibilityManager;

    struct Fixture {
        server: Arc<Server>,
        displays: Arc<DisplayManager>,
        loader: Arc<BatchLoader>,
        _dir: tempfile::TempDir,
    }

    fn fixture(holograms: &[(&str, &str, bool)]) -> Fixture {
        let (_, log) = Recorder::logger();
        let dir = tempfile::tempdir().unwrap();
        let mut store = HologramStore::open(dir.path(), &log).unwrap();
        for &(name, world, enabled) in holograms {
            let line = Line::new(name, V3(0.0, 0.0, 0.0));
            let holo = Hologram::new(name, Location::new(world, 0.0, 64.0, 0.0), vec![line]).with_enabled(enabled);
            store.create(holo).unwrap();
        }
        let server = Arc::new(Server::with_worlds(log.clone(), &["world"]));
        let tags = Arc::new(TagManager::new(server.clone(), &log));
        let visibility = Arc::new(VisibilityManager::new(server.clone()));
        let displays = Arc::new(DisplayManager::new(server.clone(), tags, visibility, &log));
        let store = Arc::new(RwLock::new(store));
        let loader = Arc::new(BatchLoader::new(server.clone(), store, displays.clone(), 2, 5, &log));
        Fixture { server, displays, loader, _dir: dir }
    }

    #[test]
    fn spawns_loaded_enabled_holograms_in_batches() {
        let f = fixture(&[
            ("a", "world", true),
            ("b", "world", true),
            ("c", "world", true),
            ("off", "world", false),
            ("far", "nether", true),
        ]);
        assert_eq!(f.loader.spawn_all().unwrap(), 3);
        assert!(f.loader.is_processing());
        f.server.tick();
        assert_eq!(f.displays.active_count(), 2);
        assert_eq!(f.loader.progress().unwrap().to_string(), "2/3 (66%)");
        f.server.run_ticks(5);
        assert_eq!(f.displays.active_names(), ["a", "b", "c"]);
        assert!(!f.loader.is_processing());
        assert_eq!(f.loader.spawn_all().unwrap(), 0);
    }

    #[test]
    fn world_loads_wait_for_the_initial_spawn() {
        let f = fixture(&[("a", "world", true), ("n", "nether", true)]);
        let listener = WorldListener::new(f.loader.clone(), &Logger::default());
        f.server.add_world("nether");
        listener.on_world_load("nether");
        f.server.run_ticks(10);
        assert_eq!(f.displays.active_count(), 0);

        f.loader.spawn_all().unwrap();
        f.server.run_ticks(10);
        listener.set_initial_load_completed();
        assert_eq!(f.displays.active_names(), ["a", "n"]);

        f.displays.despawn("n");
        listener.on_world_load("nether");
        f.server.tick();
        assert!(f.displays.is_active("n"));
    }

    #[test]
    fn cancel_stops_the_batch() {
        let f = fixture(&[("a", "world", true), ("b", "world", true), ("c", "world", true)]);
        f.loader.spawn_all().unwrap();
        f.server.tick();
        f.loader.cancel();
        f.server.run_ticks(20);
        assert_eq!(f.displays.active_count(), 2);
        assert!(f.loader.progress().is_none());
    }
}
