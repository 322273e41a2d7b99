//! Per-player visibility of permission-gated lines.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::display::HologramDisplay;
use crate::host::Host;
use crate::store::key;
use crate::types::PlayerId;

pub struct VisibilityManager {
    host: Arc<dyn Host>,
    // player -> hologram key -> visible line indices
    cache: Mutex<HashMap<PlayerId, HashMap<String, BTreeSet<usize>>>>,
}

impl VisibilityManager {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host, cache: Default::default() }
    }

    /// Hides freshly spawned gated lines from online players without the permission.
    pub fn after_spawn(&self, display: &HologramDisplay) {
        let players = self.host.online_players();
        for (i, line) in display.config().lines.iter().enumerate() {
            let Some(permission) = line.settings.requires_permission() else {
                continue;
            };
            let Some(entity) = display.entity(i).filter(|e| self.host.is_entity_valid(*e)) else {
                continue;
            };
            for &player in &players {
                if !self.host.has_permission(player, permission) {
                    self.host.hide_entity(player, entity);
                }
            }
        }
    }

    /// Recomputes what `player` may see across every active display.
    pub fn update_for_player<'a>(&self, player: PlayerId, displays: impl IntoIterator<Item = &'a HologramDisplay>) {
        let mut visible = HashMap::new();
        for display in displays {
            if !display.is_active() {
                continue;
            }
            let mut lines = BTreeSet::new();
            for (i, line) in display.config().lines.iter().enumerate() {
                let allowed = match line.settings.requires_permission() {
                    Some(permission) => self.host.has_permission(player, permission),
                    None => true,
                };
                if allowed {
                    lines.insert(i);
                }
                if let Some(entity) = display.entity(i).filter(|e| self.host.is_entity_valid(*e)) {
                    if allowed {
                        self.host.show_entity(player, entity);
                    } else {
                        self.host.hide_entity(player, entity);
                    }
                }
            }
            visible.insert(key(display.name()), lines);
        }
        self.cache.lock().insert(player, visible);
    }

    pub fn visible_lines(&self, player: PlayerId, hologram: &str) -> BTreeSet<usize> {
        self.cache
            .lock()
            .get(&player)
            .and_then(|holograms| holograms.get(&key(hologram)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_line_visible(&self, player: PlayerId, hologram: &str, line: usize) -> bool {
        self.visible_lines(player, hologram).contains(&line)
    }

    pub fn clear_player(&self, player: PlayerId) {
        self.cache.lock().remove(&player);
    }

    pub fn clear_all(&self) {
        self.cache.lock().clear();
    }
}
