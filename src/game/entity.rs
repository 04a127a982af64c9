//! World entities: tanks, bullets and the reserved obstacle/power-up slots

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::geometry::Vector2;

/// Tank identifier. Players use a random token; bots carry the `bot_` prefix
/// for readability only, bot-ness is decided by [`TankKind`].
pub type TankId = String;

/// Prefix given to locally simulated bot ids
pub const BOT_ID_PREFIX: &str = "bot_";

/// Score needed per level
pub const SCORE_PER_LEVEL: u32 = 1000;

/// Level for a given score: `floor(score / 1000) + 1`
pub fn level_for_score(score: u32) -> u32 {
    score / SCORE_PER_LEVEL + 1
}

/// Cosmetic tank class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TankClass {
    Basic,
    Twin,
    Sniper,
    MachineGun,
}

impl TankClass {
    pub const BOT_CLASSES: [TankClass; 3] = [TankClass::Basic, TankClass::Twin, TankClass::Sniper];

    /// Body color used by the client for the local player
    pub fn client_color(self) -> &'static str {
        match self {
            TankClass::Basic => "#4A90E2",
            TankClass::Twin => "#7ED321",
            TankClass::Sniper => "#F5A623",
            TankClass::MachineGun => "#D0021B",
        }
    }

    /// Body color the relay assigns to its own tank records
    pub fn relay_color(self) -> &'static str {
        match self {
            TankClass::Basic => "#4A90E2",
            TankClass::Twin => "#E24A4A",
            TankClass::Sniper => "#4AE24A",
            TankClass::MachineGun => "#E2E24A",
        }
    }
}

impl Default for TankClass {
    fn default() -> Self {
        Self::Basic
    }
}

impl std::str::FromStr for TankClass {
    type Err = String;

    /// Wire names: `basic`, `twin`, `sniper`, `machine-gun`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "twin" => Ok(Self::Twin),
            "sniper" => Ok(Self::Sniper),
            "machine-gun" => Ok(Self::MachineGun),
            other => Err(format!("unknown tank class: {other}")),
        }
    }
}

/// Whether a tank is a (possibly remote) human player or a local bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TankKind {
    #[default]
    Player,
    Bot,
}

/// The fundamental actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tank {
    pub id: TankId,
    pub name: String,
    pub position: Vector2,
    /// Facing/aim direction in radians
    pub rotation: f32,
    /// Authoritative health; may be negative for the instant before removal
    pub health: f32,
    pub max_health: f32,
    pub score: u32,
    pub level: u32,
    pub kills: u32,
    pub tank_class: TankClass,
    pub color: String,
    #[serde(default)]
    pub kind: TankKind,
}

impl Tank {
    pub fn is_bot(&self) -> bool {
        self.kind == TankKind::Bot
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    /// Health as shown to players: never below zero or above max
    pub fn display_health(&self) -> f32 {
        self.health.clamp(0.0, self.max_health.max(0.0))
    }
}

/// Ephemeral projectile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bullet {
    pub id: String,
    pub position: Vector2,
    /// Units per second
    pub velocity: Vector2,
    pub damage: f32,
    pub owner_id: TankId,
    pub size: f32,
    pub color: String,
}

/// Reserved: static world geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    pub id: String,
    pub position: Vector2,
    pub size: Vector2,
    pub kind: String,
}

/// Reserved: pickups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUp {
    pub id: String,
    pub position: Vector2,
    pub kind: String,
    pub value: f32,
}

/// Everything the engine simulates for this client
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    pub tanks: HashMap<TankId, Tank>,
    pub bullets: Vec<Bullet>,
    pub obstacles: Vec<Obstacle>,
    pub power_ups: Vec<PowerUp>,
}

impl WorldState {
    pub fn clear(&mut self) {
        self.tanks.clear();
        self.bullets.clear();
        self.obstacles.clear();
        self.power_ups.clear();
    }

    pub fn bot_count(&self) -> usize {
        self.tanks.values().filter(|t| t.is_bot()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tank_class_parses_wire_names() {
        assert_eq!("machine-gun".parse::<TankClass>(), Ok(TankClass::MachineGun));
        assert_eq!("twin".parse::<TankClass>(), Ok(TankClass::Twin));
        assert!("tank".parse::<TankClass>().is_err());
    }

    #[test]
    fn level_formula_is_monotonic() {
        let mut previous = 0;
        for score in (0..50_000).step_by(37) {
            let level = level_for_score(score);
            assert_eq!(level, score / 1000 + 1);
            assert!(level >= previous);
            previous = level;
        }
        assert_eq!(level_for_score(999), 1);
        assert_eq!(level_for_score(1000), 2);
    }

    #[test]
    fn tank_wire_format_is_camel_case() {
        let json = r##"{
            "id": "abc123xyz",
            "name": "Ace",
            "position": {"x": 1.5, "y": -2.0},
            "rotation": 0.5,
            "health": 1000,
            "maxHealth": 1000,
            "score": 0,
            "level": 1,
            "kills": 0,
            "tankClass": "machine-gun",
            "color": "#E2E24A",
            "lastSeen": 1700000000000
        }"##;
        let tank: Tank = serde_json::from_str(json).unwrap();
        assert_eq!(tank.tank_class, TankClass::MachineGun);
        assert_eq!(tank.kind, TankKind::Player);
        assert_eq!(tank.max_health, 1000.0);

        let value = serde_json::to_value(&tank).unwrap();
        assert_eq!(value["tankClass"], "machine-gun");
        assert_eq!(value["maxHealth"], 1000.0);
    }

    #[test]
    fn display_health_is_clamped() {
        let mut tank = Tank {
            id: "p".into(),
            name: "p".into(),
            position: Vector2::ZERO,
            rotation: 0.0,
            health: -40.0,
            max_health: 400.0,
            score: 0,
            level: 1,
            kills: 0,
            tank_class: TankClass::Basic,
            color: TankClass::Basic.client_color().into(),
            kind: TankKind::Player,
        };
        assert_eq!(tank.display_health(), 0.0);
        tank.health = 450.0;
        assert_eq!(tank.display_health(), 400.0);
    }
}
