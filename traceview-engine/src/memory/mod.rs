pub mod lru;
pub mod manager;
pub mod pool;

pub use lru::{EvictionTarget, LruEntry};
pub use manager::MemoryManager;
pub use pool::{Pool, Slot};
