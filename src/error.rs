use std::path::PathBuf;

use thiserror::Error;

use crate::types::{EntityId, PlayerId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid hologram file {}: {reason}", .path.display())]
    InvalidHologram { path: PathBuf, reason: String },
    #[error("entity tag encoding failed: {0}")]
    Tag(#[from] fastnbt::error::Error),

    #[error("hologram '{0}' not found")]
    NotFound(String),
    #[error("hologram '{0}' already exists")]
    AlreadyExists(String),
    #[error("hologram '{0}' is already active")]
    AlreadyActive(String),
    #[error("hologram '{0}' is not active")]
    NotActive(String),
    #[error("hologram '{0}' is disabled")]
    Disabled(String),
    #[error("world '{0}' is not loaded")]
    WorldNotLoaded(String),
    #[error("no line of hologram '{0}' could be spawned")]
    NothingSpawned(String),

    #[error("entity {0:?} no longer exists")]
    StaleEntity(EntityId),
    #[error("player {0:?} is not online")]
    PlayerOffline(PlayerId),
    #[error("host refused: {0}")]
    Host(String),

    #[error("a batch is already in progress")]
    BatchInProgress,
    #[error("wrong command usage")]
    Usage,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
