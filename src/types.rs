use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct V3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}
#[allow(non_snake_case)]
pub const fn V3<T>(x: T, y: T, z: T) -> V3<T> {
    V3 { x, y, z }
}
impl V3<f64> {
    pub fn offset(self, by: V3<f64>) -> Self {
        V3(self.x + by.x, self.y + by.y, self.z + by.z)
    }
}

/// A point in a named world, as stored in hologram files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    #[serde(flatten)]
    pub pos: V3<f64>,
    #[serde(default)]
    pub yaw: f32,
}
impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self { world: world.into(), pos: V3(x, y, z), yaw: 0.0 }
    }
    pub fn offset(&self, by: V3<f64>) -> Self {
        Self { world: self.world.clone(), pos: self.pos.offset(by), yaw: self.yaw }
    }
    pub fn raised(&self, dy: f64) -> Self {
        self.offset(V3(0.0, dy, 0.0))
    }
}

/// Handle to a host entity. The generation makes handles to removed
/// entities detectable after their slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// Whoever issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    Console,
    Player(PlayerId),
}
impl Sender {
    pub fn player(self) -> Option<PlayerId> {
        match self {
            Sender::Player(pid) => Some(pid),
            Sender::Console => None,
        }
    }
}
