//! Holograms that currently exist in the world.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::hologram::{Hologram, Line};
use crate::host::Host;
use crate::logging::Logger;
use crate::queue::OperationQueue;
use crate::store::key;
use crate::tags::TagManager;
use crate::types::{EntityId, Location, PlayerId};
use crate::visibility::VisibilityManager;

/// One spawned instance of a hologram: a text display entity per line.
pub struct HologramDisplay {
    config: Hologram,
    instance: Uuid,
    entities: Vec<Option<EntityId>>,
    base: Location,
    active: bool,
    host: Arc<dyn Host>,
    tags: Arc<TagManager>,
    log: Logger,
}

impl HologramDisplay {
    pub fn new(config: Hologram, host: Arc<dyn Host>, tags: Arc<TagManager>, log: &Logger) -> Self {
        Self {
            base: config.location.clone(),
            entities: vec![None; config.lines.len()],
            config,
            instance: Uuid::new_v4(),
            active: false,
            host,
            tags,
            log: log.scoped("mcholo::display"),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
    pub fn config(&self) -> &Hologram {
        &self.config
    }
    pub fn instance(&self) -> Uuid {
        self.instance
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn base_location(&self) -> &Location {
        &self.base
    }
    pub fn entity(&self, line: usize) -> Option<EntityId> {
        self.entities.get(line).copied().flatten()
    }
    pub fn is_line_spawned(&self, line: usize) -> bool {
        self.entity(line).map_or(false, |e| self.host.is_entity_valid(e))
    }
    pub fn active_line_count(&self) -> usize {
        self.entities.iter().flatten().count()
    }

    pub fn spawn(&mut self) -> Result<()> {
        if self.active {
            return Err(Error::AlreadyActive(self.config.name.clone()));
        }
        if !self.config.enabled {
            return Err(Error::Disabled(self.config.name.clone()));
        }
        if !self.host.is_world_loaded(&self.base.world) {
            return Err(Error::WorldNotLoaded(self.base.world.clone()));
        }
        self.entities = vec![None; self.config.lines.len()];
        for i in 0..self.config.lines.len() {
            match self.spawn_line(i) {
                Ok(entity) => self.entities[i] = Some(entity),
                Err(e) => self.log.warn(format_args!(
                    "failed to spawn line {} of '{}': {e}",
                    i + 1,
                    self.config.name
                )),
            }
        }
        if self.active_line_count() == 0 {
            return Err(Error::NothingSpawned(self.config.name.clone()));
        }
        self.active = true;
        self.log.debug(format_args!(
            "spawned '{}' with {} lines",
            self.config.name,
            self.active_line_count()
        ));
        Ok(())
    }

    fn spawn_line(&self, i: usize) -> Result<EntityId> {
        let line = &self.config.lines[i];
        let entity = self.host.spawn_text_display(&self.base.offset(line.offset), line)?;
        if let Err(e) = self.tags.mark(entity, &self.config.name, i, self.instance) {
            self.log.warn(format_args!("could not tag line {} of '{}': {e}", i + 1, self.config.name));
        }
        Ok(entity)
    }

    pub fn despawn(&mut self) {
        for entity in self.entities.iter_mut().filter_map(Option::take) {
            self.host.remove_entity(entity);
        }
        self.tags.remove_all_for_instance(self.instance);
        self.active = false;
        self.log.debug(format_args!("despawned '{}'", self.config.name));
    }

    /// Replaces line `i`, respawning its entity if it went away.
    pub fn update_line(&mut self, i: usize, line: Line) -> Result<()> {
        if !self.active {
            return Err(Error::NotActive(self.config.name.clone()));
        }
        if i >= self.config.lines.len() {
            return Err(Error::Usage);
        }
        self.config.lines[i] = line;
        match self.entity(i).filter(|e| self.host.is_entity_valid(*e)) {
            Some(entity) => {
                let line = &self.config.lines[i];
                self.host.update_text_display(entity, line)?;
                self.host.teleport_entity(entity, &self.base.offset(line.offset))
            }
            None => self.respawn_line(i),
        }
    }

    fn respawn_line(&mut self, i: usize) -> Result<()> {
        if let Some(old) = self.entities[i].take() {
            self.host.remove_entity(old);
        }
        let entity = self.spawn_line(i)?;
        self.entities[i] = Some(entity);
        self.log.info(format_args!("respawned line {} of '{}'", i + 1, self.config.name));
        Ok(())
    }

    pub fn move_to(&mut self, to: Location) -> Result<()> {
        if !self.active {
            return Err(Error::NotActive(self.config.name.clone()));
        }
        if !self.host.is_world_loaded(&to.world) {
            return Err(Error::WorldNotLoaded(to.world));
        }
        let mut moved = vec![];
        for (i, line) in self.config.lines.iter().enumerate() {
            let Some(entity) = self.entity(i).filter(|e| self.host.is_entity_valid(*e)) else {
                continue;
            };
            if let Err(e) = self.host.teleport_entity(entity, &to.offset(line.offset)) {
                for (entity, offset) in moved {
                    if let Err(e) = self.host.teleport_entity(entity, &self.base.offset(offset)) {
                        self.log.warn(format_args!("could not put back a line of '{}': {e}", self.config.name));
                    }
                }
                return Err(e);
            }
            moved.push((entity, line.offset));
        }
        self.config.location = to.clone();
        self.base = to;
        Ok(())
    }
}

/// Every active display, keyed by lower-cased name, plus the edit queue.
pub struct DisplayManager {
    host: Arc<dyn Host>,
    tags: Arc<TagManager>,
    visibility: Arc<VisibilityManager>,
    active: Mutex<HashMap<String, HologramDisplay>>,
    edits: OperationQueue,
    log: Logger,
}

impl DisplayManager {
    pub fn new(host: Arc<dyn Host>, tags: Arc<TagManager>, visibility: Arc<VisibilityManager>, log: &Logger) -> Self {
        Self {
            host,
            tags,
            visibility,
            active: Default::default(),
            edits: OperationQueue::new(log),
            log: log.clone(),
        }
    }

    pub fn edits(&self) -> &OperationQueue {
        &self.edits
    }

    pub fn spawn(&self, config: Hologram) -> Result<()> {
        let key = key(&config.name);
        let mut active = self.active.lock();
        if active.contains_key(&key) {
            return Err(Error::AlreadyActive(config.name));
        }
        let mut display = HologramDisplay::new(config, Arc::clone(&self.host), Arc::clone(&self.tags), &self.log);
        display.spawn()?;
        self.visibility.after_spawn(&display);
        self.log.info(format_args!(
            "spawned hologram '{}' with {} lines",
            display.name(),
            display.active_line_count()
        ));
        active.insert(key, display);
        Ok(())
    }

    fn take_down(&self, name: &str) -> bool {
        let Some(mut display) = self.active.lock().remove(&key(name)) else {
            return false;
        };
        display.despawn();
        true
    }

    /// Removes the hologram from the world and sweeps anything still
    /// tagged with its name. Queued edits are kept.
    pub fn unload(&self, name: &str) -> bool {
        let was_active = self.take_down(name);
        self.tags.remove_all_for(name);
        was_active
    }

    /// Like [`unload`](Self::unload), for a hologram that is gone for good:
    /// its queued edits are dropped too.
    pub fn despawn(&self, name: &str) -> bool {
        let was_active = self.unload(name);
        self.edits.clear(&key(name));
        was_active
    }

    /// Replaces the live hologram with `config`. Queued edits are kept.
    pub fn respawn(&self, name: &str, config: Hologram) -> Result<()> {
        self.take_down(name);
        self.spawn(config)
    }

    pub fn despawn_all(&self) -> usize {
        let displays: Vec<_> = self.active.lock().drain().collect();
        let count = displays.len();
        for (_, mut display) in displays {
            display.despawn();
        }
        self.edits.clear_all();
        count
    }

    pub fn get(&self, name: &str) -> Option<Hologram> {
        self.active.lock().get(&key(name)).map(|d| d.config().clone())
    }
    pub fn with_display<R>(&self, name: &str, f: impl FnOnce(&HologramDisplay) -> R) -> Option<R> {
        self.active.lock().get(&key(name)).map(f)
    }
    pub fn is_active(&self, name: &str) -> bool {
        self.active.lock().contains_key(&key(name))
    }
    pub fn active_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.active.lock().values().map(|d| d.name().to_owned()).collect();
        names.sort();
        names
    }
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
    pub fn base_location(&self, name: &str) -> Option<Location> {
        self.active.lock().get(&key(name)).map(|d| d.base_location().clone())
    }

    pub fn move_to(&self, name: &str, to: Location) -> Result<()> {
        let mut active = self.active.lock();
        let display = active.get_mut(&key(name)).ok_or_else(|| Error::NotActive(name.to_owned()))?;
        display.move_to(to)
    }

    pub fn update_line(&self, name: &str, i: usize, line: Line) -> Result<()> {
        let mut active = self.active.lock();
        let display = active.get_mut(&key(name)).ok_or_else(|| Error::NotActive(name.to_owned()))?;
        display.update_line(i, line)
    }

    pub fn update_visibility_for(&self, player: PlayerId) {
        let active = self.active.lock();
        self.visibility.update_for_player(player, active.values());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Entities, Players};
    use crate::logging::testing::Recorder;
    use crate::server::Server;
    use crate::types::V3;

    struct Fixture {
        server: Arc<Server>,
        tags: Arc<TagManager>,
        visibility: Arc<VisibilityManager>,
        displays: DisplayManager,
    }

    fn fixture() -> Fixture {
        let (_, log) = Recorder::logger();
        let server = Arc::new(Server::with_worlds(log.clone(), &["world"]));
        let tags = Arc::new(TagManager::new(server.clone(), &log));
        let visibility = Arc::new(VisibilityManager::new(server.clone()));
        let displays = DisplayManager::new(server.clone(), tags.clone(), visibility.clone(), &log);
        Fixture { server, tags, visibility, displays }
    }

    fn hologram(name: &str, world: &str, texts: &[&str]) -> Hologram {
        let lines = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Line::new(*t, V3(0.0, -(i as f64) * 0.25, 0.0)))
            .collect();
        Hologram::new(name, Location::new(world, 0.5, 70.0, 0.5), lines)
    }

    #[test]
    fn spawn_places_each_line() {
        let f = fixture();
        f.displays.spawn(hologram("Lobby", "world", &["one", "two"])).unwrap();
        assert!(f.displays.is_active("lobby"));
        assert_eq!(f.server.entity_count(), 2);
        let second = f.displays.with_display("LOBBY", |d| d.entity(1)).flatten().unwrap();
        assert_eq!(f.server.entity_location(second), Some(Location::new("world", 0.5, 69.75, 0.5)));
        assert_eq!(f.server.entity_text(second).as_deref(), Some("two"));
        assert_eq!(f.tags.displays_for("lobby").len(), 2);

        let again = f.displays.spawn(hologram("lobby", "world", &["x"]));
        assert!(matches!(again, Err(Error::AlreadyActive(_))));
    }

    #[test]
    fn spawn_refuses_unusable_configs() {
        let f = fixture();
        let missing = f.displays.spawn(hologram("far", "the_end", &["x"]));
        assert!(matches!(missing, Err(Error::WorldNotLoaded(w)) if w == "the_end"));
        let disabled = f.displays.spawn(hologram("off", "world", &["x"]).with_enabled(false));
        assert!(matches!(disabled, Err(Error::Disabled(_))));
        assert_eq!(f.displays.active_count(), 0);
        assert_eq!(f.server.entity_count(), 0);
    }

    #[test]
    fn failed_lines_are_skipped() {
        let f = fixture();
        f.server.refuse_spawns_containing("broken");
        f.displays.spawn(hologram("partial", "world", &["ok", "broken", "fine"])).unwrap();
        f.displays.with_display("partial", |d| {
            assert_eq!(d.active_line_count(), 2);
            assert!(d.is_line_spawned(0));
            assert!(!d.is_line_spawned(1));
        });
        let all_bad = f.displays.spawn(hologram("bad", "world", &["broken"]));
        assert!(matches!(all_bad, Err(Error::NothingSpawned(_))));
    }

    #[test]
    fn despawn_sweeps_orphans_and_queue() {
        let f = fixture();
        f.displays.spawn(hologram("lobby", "world", &["one"])).unwrap();
        // left behind by an earlier instance
        let orphan = f.server.spawn_text_display(&Location::new("world", 0.0, 0.0, 0.0), &Line::new("old", V3(0.0, 0.0, 0.0))).unwrap();
        f.tags.mark(orphan, "Lobby", 0, Uuid::new_v4()).unwrap();

        assert!(f.displays.despawn("LOBBY"));
        assert!(!f.displays.is_active("lobby"));
        assert_eq!(f.server.entity_count(), 0);
        assert!(!f.displays.despawn("lobby"));
    }

    #[test]
    fn update_and_move() {
        let f = fixture();
        f.displays.spawn(hologram("sign", "world", &["one", "two"])).unwrap();
        let first = f.displays.with_display("sign", |d| d.entity(0)).flatten().unwrap();

        f.displays.update_line("sign", 0, Line::new("uno", V3(0.0, 0.5, 0.0))).unwrap();
        assert_eq!(f.server.entity_text(first).as_deref(), Some("uno"));
        assert_eq!(f.server.entity_location(first), Some(Location::new("world", 0.5, 70.5, 0.5)));

        // entity killed behind our back gets respawned
        f.server.remove_entity(first);
        f.displays.update_line("sign", 0, Line::new("eins", V3(0.0, 0.0, 0.0))).unwrap();
        let replacement = f.displays.with_display("sign", |d| d.entity(0)).flatten().unwrap();
        assert_ne!(replacement, first);
        assert_eq!(f.server.entity_text(replacement).as_deref(), Some("eins"));
        assert!(matches!(f.displays.update_line("sign", 5, Line::new("x", V3(0.0, 0.0, 0.0))), Err(Error::Usage)));

        f.displays.move_to("sign", Location::new("world", 10.0, 80.0, 10.0)).unwrap();
        assert_eq!(f.server.entity_location(replacement), Some(Location::new("world", 10.0, 80.0, 10.0)));
        let second = f.displays.with_display("sign", |d| d.entity(1)).flatten().unwrap();
        assert_eq!(f.server.entity_location(second), Some(Location::new("world", 10.0, 79.75, 10.0)));
        assert_eq!(f.displays.get("sign").unwrap().location, Location::new("world", 10.0, 80.0, 10.0));
        assert!(matches!(f.displays.move_to("nope", Location::new("world", 0.0, 0.0, 0.0)), Err(Error::NotActive(_))));
    }

    #[test]
    fn move_to_an_unloaded_world_leaves_lines_in_place() {
        let f = fixture();
        f.displays.spawn(hologram("sign", "world", &["one", "two"])).unwrap();
        let moved = f.displays.move_to("sign", Location::new("the_end", 1.0, 2.0, 3.0));
        assert!(matches!(moved, Err(Error::WorldNotLoaded(w)) if w == "the_end"));
        let home = Location::new("world", 0.5, 70.0, 0.5);
        assert_eq!(f.displays.base_location("sign"), Some(home.clone()));
        let first = f.displays.with_display("sign", |d| d.entity(0)).flatten().unwrap();
        let second = f.displays.with_display("sign", |d| d.entity(1)).flatten().unwrap();
        assert_eq!(f.server.entity_location(first), Some(home));
        assert_eq!(f.server.entity_location(second), Some(Location::new("world", 0.5, 69.75, 0.5)));
    }

    #[test]
    fn unload_keeps_queued_edits() {
        let (_, log) = Recorder::logger();
        let server = Arc::new(Server::with_worlds(log.clone(), &["world"]));
        let tags = Arc::new(TagManager::new(server.clone(), &log));
        let visibility = Arc::new(VisibilityManager::new(server.clone()));
        let displays = Arc::new(DisplayManager::new(server.clone(), tags, visibility, &log));
        displays.spawn(hologram("sign", "world", &["one"])).unwrap();

        let inner = displays.clone();
        let drained = displays.edits().submit("sign", move || {
            inner.edits().submit("sign", || true);
            assert!(inner.unload("sign"));
            assert_eq!(inner.edits().pending_count("sign"), 1);
            inner.despawn("sign");
            assert_eq!(inner.edits().pending_count("sign"), 0);
            true
        });
        assert!(drained);
        assert_eq!(server.entity_count(), 0);
    }

    #[test]
    fn respawn_keeps_queue_and_replaces_entities() {
        let f = fixture();
        f.displays.spawn(hologram("sign", "world", &["one"])).unwrap();
        let old = f.displays.with_display("sign", |d| d.entity(0)).flatten().unwrap();
        let edited = hologram("sign", "world", &["one", "two", "three"]);
        f.displays.respawn("sign", edited).unwrap();
        assert!(!f.server.is_entity_valid(old));
        assert_eq!(f.server.entity_count(), 3);
        assert_eq!(f.displays.get("sign").unwrap().lines.len(), 3);
    }

    #[test]
    fn gated_lines_follow_permissions() {
        let f = fixture();
        let vip = f.server.login("vip", Location::new("world", 0.0, 64.0, 0.0));
        let guest = f.server.login("guest", Location::new("world", 0.0, 64.0, 0.0));
        f.server.grant(vip, "holo.vip");

        let mut holo = hologram("club", "world", &["everyone", "members only"]);
        holo.lines[1] = holo.lines[1].clone().with_settings(|s| s.with_permission(Some("holo.vip".into())));
        f.displays.spawn(holo).unwrap();
        let gated = f.displays.with_display("club", |d| d.entity(1)).flatten().unwrap();
        assert!(f.server.is_hidden_from(guest, gated));
        assert!(!f.server.is_hidden_from(vip, gated));

        f.server.grant(guest, "holo.vip");
        f.displays.update_visibility_for(guest);
        assert!(!f.server.is_hidden_from(guest, gated));
        assert!(f.visibility.is_line_visible(guest, "Club", 1));
        assert_eq!(f.visibility.visible_lines(guest, "club").len(), 2);

        f.server.revoke(guest, "holo.vip");
        f.displays.update_visibility_for(guest);
        assert!(f.server.is_hidden_from(guest, gated));
        assert!(!f.visibility.is_line_visible(guest, "club", 1));
        assert!(f.server.has_permission(vip, "holo.vip"));

        f.visibility.clear_player(guest);
        assert!(f.visibility.visible_lines(guest, "club").is_empty());
    }

    #[test]
    fn despawn_all_clears_everything() {
        let f = fixture();
        f.displays.spawn(hologram("a", "world", &["1"])).unwrap();
        f.displays.spawn(hologram("b", "world", &["1", "2"])).unwrap();
        assert_eq!(f.displays.active_names(), ["a", "b"]);
        assert_eq!(f.displays.despawn_all(), 2);
        assert_eq!(f.displays.active_count(), 0);
        assert_eq!(f.server.entity_count(), 0);
    }
}
