//! Text-display holograms for a block game server.
//!
//! Holograms are stored as YAML files, spawned as text display entities in
//! batches spread over ticks, and edited through the `/holo` command. All
//! access to the game goes through the traits in [`host`]. [`server::Server`]
//! is a headless host that the binary and the tests run against.

mod collections;
pub mod commands;
pub mod config;
pub mod console;
pub mod display;
pub mod error;
pub mod hologram;
pub mod host;
pub mod loader;
pub mod logging;
pub mod messages;
pub mod plugin;
pub mod queue;
pub mod server;
pub mod spawner;
pub mod store;
pub mod tags;
pub mod types;
pub mod visibility;

pub use config::Config;
pub use error::{Error, Result};
pub use plugin::Plugin;
pub use server::Server;
