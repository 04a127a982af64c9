//! Session configuration and the payloads the engine reports outward

use std::sync::Arc;

use serde::Serialize;

use crate::net::MessageSender;
use crate::ws::protocol::ChatEntry;

use super::audio::AudioService;
use super::competition::DEFAULT_COMPETITION_SECS;
use super::entity::TankClass;

/// Fatal construction failures
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no render surface: viewport is {width}x{height}")]
    MissingSurface { width: f32, height: f32 },
}

/// Size of the drawing surface the camera centres on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// A zero or non-finite size stands for a missing surface
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn center(&self) -> super::geometry::Vector2 {
        super::geometry::Vector2::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Per-tick player stats for the HUD
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub score: u32,
    pub level: u32,
    pub kills: u32,
    /// Clamped at zero
    pub health: f32,
    pub max_health: f32,
    pub is_regenerating: bool,
}

/// Structured result emitted when the player is eliminated or a match ends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverData {
    pub final_score: u32,
    pub final_level: u32,
    pub total_kills: u32,
    /// Whole seconds since `start()`
    pub survival_time: u64,
    pub cause: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub time_up: bool,
    pub is_competition_mode: bool,
    /// Winner with at least one kill
    pub player_qualified: bool,
    pub player_won: bool,
}

pub type StatsCallback = Box<dyn FnMut(&PlayerStats) + Send>;
pub type GameOverCallback = Box<dyn FnMut(&GameOverData) + Send>;
pub type ChatCallback = Box<dyn FnMut(&ChatEntry) + Send>;

/// Everything a session is built from
pub struct EngineOptions {
    pub player_name: String,
    pub tank_class: TankClass,
    /// Mode name announced on `join`
    pub game_mode: String,
    pub enable_bots: bool,
    pub competition: bool,
    pub competition_duration_secs: u64,
    pub audio: Option<Arc<dyn AudioService>>,
    pub sender: Option<MessageSender>,
    pub on_stats: Option<StatsCallback>,
    pub on_game_over: Option<GameOverCallback>,
    pub on_chat: Option<ChatCallback>,
    /// Fixed RNG seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            player_name: "Player".to_string(),
            tank_class: TankClass::Basic,
            game_mode: "endless".to_string(),
            enable_bots: true,
            competition: false,
            competition_duration_secs: DEFAULT_COMPETITION_SECS,
            audio: None,
            sender: None,
            on_stats: None,
            on_game_over: None,
            on_chat: None,
            seed: None,
        }
    }
}

impl EngineOptions {
    /// Competition session preset
    pub fn competition(player_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            game_mode: "competition".to_string(),
            competition: true,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("player_name", &self.player_name)
            .field("tank_class", &self.tank_class)
            .field("game_mode", &self.game_mode)
            .field("enable_bots", &self.enable_bots)
            .field("competition", &self.competition)
            .field("competition_duration_secs", &self.competition_duration_secs)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Purchasable upgrades
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upgrade {
    /// +100 max health and a full heal
    MaxHealth,
    /// +10 flat bullet damage
    Damage,
}

impl Upgrade {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "max-health" => Some(Self::MaxHealth),
            "damage" => Some(Self::Damage),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MaxHealth => "max-health",
            Self::Damage => "damage",
        }
    }
}
