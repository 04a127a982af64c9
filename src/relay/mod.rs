//! Room relay server core

pub mod hub;
pub mod room;
pub mod state;

pub use hub::{RelayCommand, RelayHandle, RelayHub};
pub use room::{Room, RoomId};
pub use state::{ConnId, RelayState, RelayStats};
