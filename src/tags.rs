//! NBT tags on spawned entities.
//!
//! Every display entity the plugin spawns carries a [`HologramTag`], so that
//! entities left behind by a crash or an earlier instance can be found and
//! swept.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::host::Host;
use crate::logging::Logger;
use crate::types::EntityId;

pub const TAG_KEY: &str = "holo:hologram";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HologramTag {
    hologram: i8,
    pub hologram_name: String,
    pub line_index: i32,
    pub hologram_uuid: String,
}

impl HologramTag {
    pub fn new(name: &str, line_index: usize, instance: Uuid) -> Self {
        Self {
            hologram: 1,
            hologram_name: name.to_owned(),
            line_index: line_index as i32,
            hologram_uuid: instance.to_string(),
        }
    }
    pub fn instance(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.hologram_uuid).ok()
    }
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(fastnbt::to_bytes(self)?)
    }
    fn decode(data: &[u8]) -> Result<Self> {
        Ok(fastnbt::from_bytes(data)?)
    }
}

pub struct TagManager {
    host: Arc<dyn Host>,
    log: Logger,
}

impl TagManager {
    pub fn new(host: Arc<dyn Host>, log: &Logger) -> Self {
        Self { host, log: log.scoped("mcholo::tags") }
    }

    pub fn mark(&self, entity: EntityId, name: &str, line_index: usize, instance: Uuid) -> Result<()> {
        let tag = HologramTag::new(name, line_index, instance);
        self.host.set_persistent_data(entity, TAG_KEY, tag.encode()?)
    }

    pub fn read(&self, entity: EntityId) -> Option<HologramTag> {
        let data = self.host.persistent_data(entity, TAG_KEY)?;
        self.decode(entity, &data)
    }

    fn decode(&self, entity: EntityId, data: &[u8]) -> Option<HologramTag> {
        match HologramTag::decode(data) {
            Ok(tag) if tag.hologram != 0 => Some(tag),
            Ok(_) => None,
            Err(e) => {
                self.log.debug(format_args!("unreadable tag on {entity:?}: {e}"));
                None
            }
        }
    }

    fn tagged(&self) -> Vec<(EntityId, HologramTag)> {
        self.host
            .entities_with_data(TAG_KEY)
            .into_iter()
            .filter_map(|(entity, data)| Some((entity, self.decode(entity, &data)?)))
            .collect()
    }

    /// Entities tagged with `name`, any instance.
    pub fn displays_for(&self, name: &str) -> Vec<(EntityId, HologramTag)> {
        self.tagged()
            .into_iter()
            .filter(|(_, tag)| tag.hologram_name.eq_ignore_ascii_case(name))
            .collect()
    }

    fn remove_where(&self, what: &str, pred: impl Fn(&HologramTag) -> bool) -> usize {
        let mut removed = 0;
        for (entity, tag) in self.tagged() {
            if pred(&tag) {
                self.host.remove_entity(entity);
                removed += 1;
            }
        }
        if removed > 0 {
            self.log.debug(format_args!("removed {removed} tagged entities for {what}"));
        }
        removed
    }

    pub fn remove_all_for(&self, name: &str) -> usize {
        self.remove_where(name, |tag| tag.hologram_name.eq_ignore_ascii_case(name))
    }

    pub fn remove_all_for_instance(&self, instance: Uuid) -> usize {
        self.remove_where("one instance", |tag| tag.instance() == Some(instance))
    }

    pub fn remove_all(&self) -> usize {
        self.remove_where("every hologram", |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hologram::Line;
    use crate::host::Entities;
    use crate::logging::testing::Recorder;
    use crate::server::Server;
    use crate::types::{Location, V3};

    fn setup() -> (Arc<Server>, TagManager) {
        let (_, log) = Recorder::logger();
        let server = Arc::new(Server::with_worlds(log.clone(), &["world"]));
        let tags = TagManager::new(server.clone(), &log);
        (server, tags)
    }

    fn spawn(server: &Server) -> EntityId {
        let line = Line::new("hi", V3(0.0, 0.0, 0.0));
        server.spawn_text_display(&Location::new("world", 0.0, 64.0, 0.0), &line).unwrap()
    }

    #[test]
    fn tag_survives_a_round_trip() {
        let (server, tags) = setup();
        let entity = spawn(&server);
        let instance = Uuid::new_v4();
        tags.mark(entity, "Lobby", 2, instance).unwrap();
        let tag = tags.read(entity).unwrap();
        assert_eq!(tag.hologram_name, "Lobby");
        assert_eq!(tag.line_index, 2);
        assert_eq!(tag.instance(), Some(instance));
        assert_eq!(tags.read(spawn(&server)), None);
    }

    #[test]
    fn sweeps_by_name_and_instance() {
        let (server, tags) = setup();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        for i in 0..3 {
            tags.mark(spawn(&server), "lobby", i, first).unwrap();
        }
        tags.mark(spawn(&server), "LOBBY", 0, second).unwrap();
        tags.mark(spawn(&server), "shop", 0, second).unwrap();
        let untagged = spawn(&server);

        assert_eq!(tags.displays_for("Lobby").len(), 4);
        assert_eq!(tags.remove_all_for_instance(first), 3);
        assert_eq!(tags.remove_all_for("lobby"), 1);
        assert_eq!(tags.displays_for("lobby").len(), 0);
        assert_eq!(tags.remove_all(), 1);
        assert!(server.is_entity_valid(untagged));
        assert_eq!(server.entity_count(), 1);
    }

    #[test]
    fn garbage_data_is_ignored() {
        let (server, tags) = setup();
        let entity = spawn(&server);
        server.set_persistent_data(entity, TAG_KEY, vec![1, 2, 3]).unwrap();
        assert_eq!(tags.read(entity), None);
        assert_eq!(tags.remove_all(), 0);
    }
}
