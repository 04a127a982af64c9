//! Client simulation core

pub mod ai;
pub mod audio;
pub mod combat;
pub mod competition;
pub mod engine;
pub mod entity;
pub mod geometry;
pub mod session;
pub mod spawn;

pub use audio::{Audio, AudioService, SoundEffect};
pub use engine::{Direction, EngineState, EntitySnapshot, GameEngine, PlayerViewport};
pub use entity::{Bullet, Tank, TankClass, TankId, TankKind, WorldState};
pub use geometry::{Vector2, WorldBounds};
pub use session::{EngineError, EngineOptions, GameOverData, PlayerStats, Upgrade, Viewport};
