//! The capabilities the plugin needs from the game server.
//!
//! Everything here is implemented by the host engine. The plugin never
//! renders, moves or permission-checks anything itself, it asks through these
//! traits. [`crate::server::Server`] is an in-memory implementation.

use std::ops::ControlFlow;

use crate::error::Result;
use crate::hologram::Line;
use crate::types::{EntityId, Location, PlayerId, Sender, TaskId};

/// A repeating task. Returning `Break` unschedules it.
pub type TimerTask = Box<dyn FnMut() -> ControlFlow<()> + Send>;
pub type DelayedTask = Box<dyn FnOnce() + Send>;

pub trait Scheduler: Send + Sync {
    /// Runs `task` after `delay` ticks, then every `period` ticks until it
    /// breaks or is cancelled. A delay of 0 means the next tick.
    fn run_timer(&self, delay: u32, period: u32, task: TimerTask) -> TaskId;
    fn run_later(&self, delay: u32, task: DelayedTask) -> TaskId;
    fn cancel(&self, task: TaskId);
    fn current_tick(&self) -> u64;
}

pub trait Worlds: Send + Sync {
    fn is_world_loaded(&self, world: &str) -> bool;
    fn loaded_worlds(&self) -> Vec<String>;
}

pub trait Entities: Send + Sync {
    /// Creates a text display showing `line` at `at`. The host applies text,
    /// styling and transformation.
    fn spawn_text_display(&self, at: &Location, line: &Line) -> Result<EntityId>;
    fn update_text_display(&self, entity: EntityId, line: &Line) -> Result<()>;
    fn teleport_entity(&self, entity: EntityId, to: &Location) -> Result<()>;
    fn remove_entity(&self, entity: EntityId);
    fn is_entity_valid(&self, entity: EntityId) -> bool;

    /// Plugin-owned data that survives on the entity (a persistent data container).
    fn set_persistent_data(&self, entity: EntityId, key: &str, data: Vec<u8>) -> Result<()>;
    fn persistent_data(&self, entity: EntityId, key: &str) -> Option<Vec<u8>>;
    /// Every live entity in any world carrying data under `key`.
    fn entities_with_data(&self, key: &str) -> Vec<(EntityId, Vec<u8>)>;
}

pub trait Players: Send + Sync {
    fn online_players(&self) -> Vec<PlayerId>;
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool;
    fn player_location(&self, player: PlayerId) -> Option<Location>;
    fn teleport_player(&self, player: PlayerId, to: &Location) -> Result<()>;
    fn show_entity(&self, player: PlayerId, entity: EntityId);
    fn hide_entity(&self, player: PlayerId, entity: EntityId);
    fn send_message(&self, to: Sender, message: &str);
}

pub trait Host: Scheduler + Worlds + Entities + Players {}
impl<T: Scheduler + Worlds + Entities + Players + ?Sized> Host for T {}

/// Lifecycle events the host delivers to a plugin.
pub trait Listener: Send + Sync {
    fn on_world_load(&self, _world: &str) {}
    fn on_player_join(&self, _player: PlayerId) {}
    fn on_player_quit(&self, _player: PlayerId) {}
    /// Returns whether the command label belonged to this listener.
    fn on_command(&self, _sender: Sender, _label: &str, _args: &[&str]) -> bool {
        false
    }
}
