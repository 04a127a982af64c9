//! Room bookkeeping: tanks, in-flight bullets and chat history

use std::collections::{HashMap, VecDeque};

use rand::Rng;

use crate::game::entity::{Bullet, Tank, TankClass, TankId, TankKind};
use crate::game::geometry::Vector2;
use crate::ws::protocol::{ChatEntry, ChatKind, PlayerPatch, ShotFired};

pub type RoomId = String;

/// Chat entries kept per room
pub const CHAT_HISTORY: usize = 50;
/// Relay bullets beyond this distance from the origin are dropped
pub const BULLET_RADIUS: f32 = 2000.0;

/// Defaults for `shoot` frames that omit them
pub const DEFAULT_SHOT_DAMAGE: f32 = 30.0;
pub const DEFAULT_SHOT_SIZE: f32 = 6.0;
pub const DEFAULT_SHOT_COLOR: &str = "#FFFF00";

/// Initial relay-side health for every player
pub const SERVER_TANK_HEALTH: f32 = 1000.0;

/// Relay copy of a player's tank
#[derive(Debug, Clone)]
pub struct ServerTank {
    pub tank: Tank,
    pub last_seen: u64,
}

/// Relay copy of a bullet, kept for lifetime bookkeeping only
#[derive(Debug, Clone)]
pub struct ServerBullet {
    pub bullet: Bullet,
    pub fired_at: u64,
}

/// One broadcast domain
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub tanks: HashMap<TankId, ServerTank>,
    pub bullets: Vec<ServerBullet>,
    pub chat: VecDeque<ChatEntry>,
    pub created_at: u64,
    pub last_activity: u64,
}

impl Room {
    pub fn new(id: RoomId, now: u64) -> Self {
        Self {
            id,
            tanks: HashMap::new(),
            bullets: Vec::new(),
            chat: VecDeque::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn has_space(&self, capacity: usize) -> bool {
        self.tanks.len() < capacity
    }

    pub fn is_empty(&self) -> bool {
        self.tanks.is_empty()
    }

    /// Place a fresh tank within 100 units of the origin
    pub fn spawn_tank<R: Rng + ?Sized>(
        &mut self,
        id: TankId,
        name: String,
        tank_class: TankClass,
        now: u64,
        rng: &mut R,
    ) -> Tank {
        let tank = Tank {
            id: id.clone(),
            name,
            position: Vector2::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)),
            rotation: rng.gen_range(0.0..std::f32::consts::TAU),
            health: SERVER_TANK_HEALTH,
            max_health: SERVER_TANK_HEALTH,
            score: 0,
            level: 1,
            kills: 0,
            tank_class,
            color: tank_class.relay_color().to_string(),
            kind: TankKind::Player,
        };
        self.tanks.insert(
            id,
            ServerTank {
                tank: tank.clone(),
                last_seen: now,
            },
        );
        self.last_activity = now;
        tank
    }

    /// Apply a client patch to the relay copy. Returns false for unknown tanks.
    pub fn apply_patch(&mut self, patch: &PlayerPatch, now: u64) -> bool {
        match self.tanks.get_mut(&patch.player_id) {
            Some(entry) => {
                patch.apply_to(&mut entry.tank);
                entry.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Record a shot, filling in defaults
    pub fn record_shot(&mut self, id: String, owner_id: TankId, shot: &ShotFired, now: u64) -> Bullet {
        let bullet = Bullet {
            id,
            position: shot.position,
            velocity: shot.velocity,
            damage: shot.damage.unwrap_or(DEFAULT_SHOT_DAMAGE),
            owner_id,
            size: shot.size.unwrap_or(DEFAULT_SHOT_SIZE),
            color: shot.color.clone().unwrap_or_else(|| DEFAULT_SHOT_COLOR.to_string()),
        };
        self.bullets.push(ServerBullet {
            bullet: bullet.clone(),
            fired_at: now,
        });
        bullet
    }

    /// Append to chat history, dropping the oldest past the cap
    pub fn push_chat(&mut self, entry: ChatEntry) {
        if self.chat.len() >= CHAT_HISTORY {
            self.chat.pop_front();
        }
        self.chat.push_back(entry);
    }

    /// Age and advance bullets by one relay tick
    pub fn advance_bullets(&mut self, now: u64, ttl_ms: u64, dt_secs: f32) {
        self.bullets.retain_mut(|entry| {
            if now.saturating_sub(entry.fired_at) > ttl_ms {
                return false;
            }
            let bullet = &mut entry.bullet;
            bullet.position += bullet.velocity.scale(dt_secs);
            bullet.position.length() < BULLET_RADIUS
        });
    }

    pub fn tank_list(&self) -> Vec<Tank> {
        self.tanks.values().map(|entry| entry.tank.clone()).collect()
    }

    pub fn bullet_list(&self) -> Vec<Bullet> {
        self.bullets.iter().map(|entry| entry.bullet.clone()).collect()
    }
}

/// System chat line
pub fn system_message(id: String, message: String, now: u64) -> ChatEntry {
    ChatEntry {
        id,
        player_name: "System".to_string(),
        message,
        timestamp: now,
        kind: ChatKind::System,
    }
}
