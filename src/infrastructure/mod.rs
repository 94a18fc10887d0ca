pub mod storage;

pub use storage::{FileStorage, LocalStorage, MemoryStorage};
