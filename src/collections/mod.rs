mod arena;

pub use arena::Arena;
