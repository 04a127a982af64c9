//! Combat system - weapons, damage, hit detection

use std::collections::HashMap;

use rand::Rng;

use crate::util::id::random_token;

use super::entity::{level_for_score, Bullet, Tank, TankId, TankKind};
use super::geometry::{Vector2, WorldBounds};

/// Hitbox radius every tank shares; a bullet hits when closer than this plus its own size
pub const TANK_HIT_RADIUS: f32 = 20.0;

/// Score for destroying a bot
pub const BOT_KILL_SCORE: u32 = 200;
/// Score for destroying a player
pub const PLAYER_KILL_SCORE: u32 = 500;

/// Weapon stats for one kind of shooter
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: f32,
    /// Projectile speed (units/sec)
    pub projectile_speed: f32,
    /// Minimum time between shots (ms)
    pub cooldown_ms: u64,
    /// Projectile radius
    pub projectile_size: f32,
}

impl WeaponStats {
    /// Player cannon: damage grows by 10 per level above 1
    pub fn player(level: u32) -> Self {
        Self {
            damage: 50.0 + level.saturating_sub(1) as f32 * 10.0,
            projectile_speed: 800.0,
            cooldown_ms: 300,
            projectile_size: 8.0,
        }
    }

    /// Bot cannon. Cooldown depends on difficulty and is owned by the AI.
    pub fn bot() -> Self {
        Self {
            damage: 30.0,
            projectile_speed: 600.0,
            cooldown_ms: 0,
            projectile_size: 6.0,
        }
    }
}

/// Build a bullet leaving `shooter` along its current rotation
pub fn spawn_bullet<R: Rng + ?Sized>(
    rng: &mut R,
    shooter: &Tank,
    stats: &WeaponStats,
    damage: f32,
) -> Bullet {
    Bullet {
        id: random_token(rng),
        position: shooter.position,
        velocity: Vector2::from_angle(shooter.rotation).scale(stats.projectile_speed),
        damage,
        owner_id: shooter.id.clone(),
        size: stats.projectile_size,
        color: shooter.color.clone(),
    }
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub bullet_id: String,
    pub shooter_id: TankId,
    pub target_id: TankId,
    pub damage: f32,
    /// The hit took the target from alive to dead
    pub target_killed: bool,
}

/// Combat system for managing weapons and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a shooter can fire given the time of its last shot
    pub fn can_fire(last_shot: Option<u64>, now: u64, cooldown_ms: u64) -> bool {
        match last_shot {
            Some(last) => now.saturating_sub(last) >= cooldown_ms,
            None => true,
        }
    }

    /// Calculate damage with a flat upgrade modifier
    pub fn calculate_damage(base_damage: f32, modifier: f32) -> f32 {
        base_damage + modifier
    }

    /// Apply damage to health, returns (new_health, is_dead). Health is not
    /// floored here; callers clamp for display.
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = current_health - damage;
        (new_health, new_health <= 0.0)
    }

    /// Score awarded for destroying a tank of `victim` kind
    pub fn kill_score(victim: TankKind) -> u32 {
        match victim {
            TankKind::Bot => BOT_KILL_SCORE,
            TankKind::Player => PLAYER_KILL_SCORE,
        }
    }

    /// Credit `shooter` with a kill. Returns true if the shooter levelled up.
    pub fn award_kill(shooter: &mut Tank, victim: TankKind) -> bool {
        // Remote shooters carry relayed score values
        shooter.kills = shooter.kills.saturating_add(1);
        shooter.score = shooter.score.saturating_add(Self::kill_score(victim));
        let level = level_for_score(shooter.score);
        if level > shooter.level {
            shooter.level = level;
            return true;
        }
        false
    }

    /// Advance bullets by `dt_secs` and drop the ones that left the world
    pub fn advance_bullets(bullets: &mut Vec<Bullet>, dt_secs: f32, bounds: &WorldBounds) {
        bullets.retain_mut(|bullet| {
            bullet.position += bullet.velocity.scale(dt_secs);
            bounds.contains(bullet.position)
        });
    }

    /// Resolve bullet/tank contacts. Each bullet hits the first tank (other
    /// than its owner) within range and is consumed. Damage is applied in
    /// place; removals are left to the caller.
    pub fn resolve_hits(bullets: &mut Vec<Bullet>, tanks: &mut HashMap<TankId, Tank>) -> Vec<HitResult> {
        let mut hits = Vec::new();

        bullets.retain(|bullet| {
            let target = tanks.values_mut().find(|tank| {
                tank.id != bullet.owner_id
                    && tank.position.distance(bullet.position) < TANK_HIT_RADIUS + bullet.size
            });

            let Some(target) = target else {
                return true;
            };

            let was_alive = target.is_alive();
            let (new_health, dead) = Self::apply_damage(target.health, bullet.damage);
            target.health = new_health;

            hits.push(HitResult {
                bullet_id: bullet.id.clone(),
                shooter_id: bullet.owner_id.clone(),
                target_id: target.id.clone(),
                damage: bullet.damage,
                target_killed: was_alive && dead,
            });
            false
        });

        hits
    }
}
