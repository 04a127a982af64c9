//! Client network synchronization layer

pub mod sync;

pub use sync::{MessageSender, NetworkSync, SyncEvent, UpdateThrottle, PLAYER_UPDATE_INTERVAL_MS};
