//! The hologram plugin: owns every manager and reacts to host events.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::commands::{CommandRegistry, COMMANDS};
use crate::config::Config;
use crate::display::DisplayManager;
use crate::error::Result;
use crate::host::{Host, Listener};
use crate::loader::{BatchLoader, WorldListener};
use crate::logging::Logger;
use crate::messages::Messages;
use crate::store::HologramStore;
use crate::tags::TagManager;
use crate::types::{PlayerId, Sender};
use crate::visibility::VisibilityManager;

pub const LABELS: &[&str] = &["holo", "hologram", "holofx"];

pub struct Plugin {
    this: Weak<Plugin>,
    host: Arc<dyn Host>,
    config: Config,
    messages: RwLock<Messages>,
    store: Arc<RwLock<HologramStore>>,
    tags: Arc<TagManager>,
    visibility: Arc<VisibilityManager>,
    displays: Arc<DisplayManager>,
    loader: Arc<BatchLoader>,
    worlds: WorldListener,
    commands: CommandRegistry,
    log: Logger,
}

impl Plugin {
    /// Loads messages and hologram files and schedules the first spawn
    /// `startup_delay_ticks` from now.
    pub fn enable(host: Arc<dyn Host>, config: Config, log: Logger) -> Result<Arc<Self>> {
        let log = log.scoped("mcholo");
        let messages = Messages::load(&config.data_folder, &log);
        let store = HologramStore::open(config.holograms_dir(), &log)?;
        let store = Arc::new(RwLock::new(store));

        let tags = Arc::new(TagManager::new(Arc::clone(&host), &log));
        let leftovers = tags.remove_all();
        if leftovers > 0 {
            log.info(format_args!("removed {leftovers} hologram entities left from a previous run"));
        }
        let visibility = Arc::new(VisibilityManager::new(Arc::clone(&host)));
        let displays = Arc::new(DisplayManager::new(
            Arc::clone(&host),
            Arc::clone(&tags),
            Arc::clone(&visibility),
            &log,
        ));
        let loader = Arc::new(BatchLoader::new(
            Arc::clone(&host),
            Arc::clone(&store),
            Arc::clone(&displays),
            config.batch.size,
            config.batch.interval_ticks,
            &log,
        ));
        let worlds = WorldListener::new(Arc::clone(&loader), &log);

        let plugin = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            host,
            config,
            messages: RwLock::new(messages),
            store,
            tags,
            visibility,
            displays,
            loader,
            worlds,
            commands: CommandRegistry::new(COMMANDS),
            log,
        });

        let this = Arc::downgrade(&plugin);
        plugin.host.run_later(
            plugin.config.startup_delay_ticks,
            Box::new(move || {
                if let Some(plugin) = this.upgrade() {
                    plugin.spawn_stored();
                    plugin.worlds.set_initial_load_completed();
                }
            }),
        );
        plugin.log.info(format_args!(
            "enabled, spawning holograms in {} ticks",
            plugin.config.startup_delay_ticks
        ));
        Ok(plugin)
    }

    /// Tears down everything the plugin put into the world.
    pub fn disable(&self) {
        self.loader.cancel();
        let despawned = self.displays.despawn_all();
        let swept = self.tags.remove_all();
        self.visibility.clear_all();
        self.log.info(format_args!("disabled, despawned {despawned} holograms, swept {swept} stray entities"));
    }

    /// Starts the batch that spawns every stored hologram whose world is loaded.
    pub fn spawn_stored(&self) {
        let loaded = self.host.loaded_worlds();
        let waiting = self.store.read().validate_worlds(|world| loaded.iter().any(|w| w == world));
        for name in &waiting {
            self.log.debug(format_args!("'{name}' waits for its world to load"));
        }
        if let Err(e) = self.loader.spawn_all() {
            self.log.warn(format_args!("could not start spawning holograms: {e}"));
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn messages(&self) -> &RwLock<Messages> {
        &self.messages
    }
    pub fn store(&self) -> &RwLock<HologramStore> {
        &self.store
    }
    pub fn displays(&self) -> &DisplayManager {
        &self.displays
    }
    pub fn loader(&self) -> &BatchLoader {
        &self.loader
    }
    pub fn visibility(&self) -> &VisibilityManager {
        &self.visibility
    }
    pub fn worlds(&self) -> &WorldListener {
        &self.worlds
    }
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Sends the prefixed message `key` to `to`.
    pub fn reply(&self, to: Sender, key: &str, args: &[(&str, &str)]) {
        let message = self.messages.read().format(key, args);
        self.host.send_message(to, &message);
    }

    /// Like [`reply`](Self::reply) but without the prefix.
    pub fn reply_raw(&self, to: Sender, key: &str, args: &[(&str, &str)]) {
        let message = self.messages.read().raw(key, args);
        self.host.send_message(to, &message);
    }

    /// The console may do anything.
    pub fn may(&self, sender: Sender, permission: &str) -> bool {
        match sender {
            Sender::Console => true,
            Sender::Player(pid) => self.host.has_permission(pid, permission),
        }
    }
}

impl Listener for Plugin {
    fn on_world_load(&self, world: &str) {
        self.worlds.on_world_load(world);
    }

    fn on_player_join(&self, player: PlayerId) {
        let this = self.this.clone();
        self.host.run_later(
            self.config.join_visibility_delay_ticks,
            Box::new(move || {
                if let Some(plugin) = this.upgrade() {
                    plugin.displays.update_visibility_for(player);
                }
            }),
        );
    }

    fn on_player_quit(&self, player: PlayerId) {
        self.visibility.clear_player(player);
    }

    fn on_command(&self, sender: Sender, label: &str, args: &[&str]) -> bool {
        if !LABELS.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            return false;
        }
        if let Some(plugin) = self.this.upgrade() {
            self.commands.dispatch(&plugin, sender, args);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hologram::{Hologram, Line};
    use crate::logging::testing::Recorder;
    use crate::server::Server;
    use crate::types::{Location, V3};

    fn setup(dir: &std::path::Path, holograms: &[(&str, &str)]) -> (Arc<Server>, Arc<Plugin>) {
        let (_, log) = Recorder::logger();
        let config = Config {
            data_folder: dir.to_owned(),
            startup_delay_ticks: 3,
            ..Config::default()
        };
        let mut store = HologramStore::open(config.holograms_dir(), &log).unwrap();
        for &(name, world) in holograms {
            let line = Line::new(format!("{name} text"), V3(0.0, 0.0, 0.0));
            store.create(Hologram::new(name, Location::new(world, 0.0, 70.0, 0.0), vec![line])).unwrap();
        }
        let server = Arc::new(Server::with_worlds(log.clone(), &["world"]));
        let plugin = Plugin::enable(server.clone(), config, log).unwrap();
        server.register(plugin.clone());
        (server, plugin)
    }

    #[test]
    fn spawns_after_the_startup_delay() {
        let dir = tempfile::tempdir().unwrap();
        let (server, plugin) = setup(dir.path(), &[("a", "world"), ("b", "world"), ("n", "nether")]);
        server.run_ticks(2);
        assert!(!plugin.worlds().has_initial_load_completed());
        server.tick();
        assert!(plugin.worlds().has_initial_load_completed());
        assert!(plugin.loader().is_processing());
        server.tick();
        assert_eq!(plugin.displays().active_names(), ["a", "b"]);

        server.load_world("nether");
        server.tick();
        assert_eq!(plugin.displays().active_names(), ["a", "b", "n"]);
    }

    #[test]
    fn disable_clears_the_world() {
        let dir = tempfile::tempdir().unwrap();
        let (server, plugin) = setup(dir.path(), &[("a", "world")]);
        server.run_ticks(5);
        assert_eq!(server.entity_count(), 1);
        plugin.disable();
        assert_eq!(server.entity_count(), 0);
        assert_eq!(plugin.displays().active_count(), 0);
    }

    #[test]
    fn only_claims_its_own_labels() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _plugin) = setup(dir.path(), &[]);
        assert!(server.console_command("HOLOFX"));
        assert!(!server.console_command("/weather clear"));
        let console = server.take_messages(Sender::Console);
        assert!(console.iter().any(|m| m.contains("/holo create")));
        assert_eq!(console.last().map(String::as_str), Some("Unknown command 'weather'."));
    }
}
