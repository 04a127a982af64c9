//! Per-bot AI controller: movement, targeting and shooting

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::combat::{spawn_bullet, WeaponStats};
use super::entity::{Bullet, Tank, TankId, TankKind};
use super::geometry::{Vector2, WorldBounds};

/// Distance a bot keeps from its target before it starts orbiting
pub const ORBIT_DISTANCE: f32 = 150.0;
/// Bots re-plan their heading when this close to a boundary
pub const BOUNDARY_MARGIN: f32 = 100.0;

/// Bot difficulty tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Per-tier bot parameters
#[derive(Debug, Clone, Copy)]
pub struct DifficultyProfile {
    /// Movement speed (units/sec)
    pub speed: f32,
    /// Minimum time between shots (ms)
    pub shoot_cooldown_ms: u64,
    pub health: f32,
    pub aggro_range: f32,
    pub shoot_range: f32,
    pub color: &'static str,
}

impl DifficultyProfile {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self {
                speed: 120.0,
                shoot_cooldown_ms: 800,
                health: 200.0,
                aggro_range: 350.0,
                shoot_range: 300.0,
                color: "#90EE90",
            },
            Difficulty::Medium => Self {
                speed: 160.0,
                shoot_cooldown_ms: 600,
                health: 300.0,
                aggro_range: 450.0,
                shoot_range: 400.0,
                color: "#FFA500",
            },
            Difficulty::Hard => Self {
                speed: 200.0,
                shoot_cooldown_ms: 400,
                health: 400.0,
                aggro_range: 600.0,
                shoot_range: 550.0,
                color: "#FF6B6B",
            },
        }
    }
}

/// Which tanks a bot may engage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetingRule {
    /// Endless mode: human players only
    PlayersOnly,
    /// Competition mode: every other tank, bots included
    AnyTank,
}

/// What a bot can see of another tank this tick
#[derive(Debug, Clone)]
pub struct TargetCandidate {
    pub id: TankId,
    pub position: Vector2,
    pub kind: TankKind,
}

impl From<&Tank> for TargetCandidate {
    fn from(tank: &Tank) -> Self {
        Self {
            id: tank.id.clone(),
            position: tank.position,
            kind: tank.kind,
        }
    }
}

/// AI-only state for one bot. Never leaves the client.
#[derive(Debug, Clone)]
pub struct BotBrain {
    pub target: Option<Vector2>,
    pub last_shot: Option<u64>,
    pub move_direction: Vector2,
    pub change_direction_at: u64,
    pub aggro_range: f32,
    pub shoot_range: f32,
    pub difficulty: Difficulty,
    pub targeting: TargetingRule,
}

impl BotBrain {
    pub fn new(difficulty: Difficulty, targeting: TargetingRule, now: u64) -> Self {
        let profile = DifficultyProfile::for_difficulty(difficulty);
        Self {
            target: None,
            last_shot: None,
            move_direction: Vector2::ZERO,
            change_direction_at: now,
            aggro_range: profile.aggro_range,
            shoot_range: profile.shoot_range,
            difficulty,
            targeting,
        }
    }

    pub fn profile(&self) -> DifficultyProfile {
        DifficultyProfile::for_difficulty(self.difficulty)
    }

    /// Run one AI tick for `bot`. Returns the bullet fired this tick, if any.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        bot: &mut Tank,
        tanks: &[TargetCandidate],
        dt_ms: f32,
        now: u64,
        bounds: &WorldBounds,
        rng: &mut R,
    ) -> Option<Bullet> {
        self.update_movement(bot, dt_ms, now, bounds, rng);
        self.update_targeting(bot, tanks);
        self.update_shooting(bot, now, rng)
    }

    fn update_movement<R: Rng + ?Sized>(
        &mut self,
        bot: &mut Tank,
        dt_ms: f32,
        now: u64,
        bounds: &WorldBounds,
        rng: &mut R,
    ) {
        let step = self.profile().speed * (dt_ms / 1000.0);

        if now > self.change_direction_at || bounds.near_edge(bot.position, BOUNDARY_MARGIN) {
            self.choose_new_direction(bot.position, now, bounds, rng);
        }

        match self.target {
            Some(target) if self.within(bot.position, target, self.aggro_range) => {
                self.move_towards(bot, target, step, bounds);
            }
            _ => self.wander(bot, step, bounds),
        }
    }

    fn choose_new_direction<R: Rng + ?Sized>(
        &mut self,
        position: Vector2,
        now: u64,
        bounds: &WorldBounds,
        rng: &mut R,
    ) {
        let angle = if bounds.near_edge(position, BOUNDARY_MARGIN) {
            (-position.y).atan2(-position.x)
        } else {
            rng.gen_range(0.0..std::f32::consts::TAU)
        };
        self.move_direction = Vector2::from_angle(angle);
        self.change_direction_at = now + rng.gen_range(2000..5000);
    }

    fn move_towards(&self, bot: &mut Tank, target: Vector2, step: f32, bounds: &WorldBounds) {
        let delta = target - bot.position;
        let distance = delta.length();
        if distance <= 0.0 {
            return;
        }

        let next = if distance > ORBIT_DISTANCE {
            bot.position + delta.scale(step / distance)
        } else {
            let orbit = delta.y.atan2(delta.x) + std::f32::consts::FRAC_PI_2;
            bot.position + Vector2::from_angle(orbit).scale(step * 0.5)
        };

        if bounds.contains_x(next.x) {
            bot.position.x = next.x;
        }
        if bounds.contains_y(next.y) {
            bot.position.y = next.y;
        }
        bot.position = bounds.clamp(bot.position);
    }

    fn wander(&mut self, bot: &mut Tank, step: f32, bounds: &WorldBounds) {
        let next = bot.position + self.move_direction.scale(step);

        if bounds.contains_x(next.x) {
            bot.position.x = next.x;
        } else {
            self.move_direction.x = -self.move_direction.x;
        }
        if bounds.contains_y(next.y) {
            bot.position.y = next.y;
        } else {
            self.move_direction.y = -self.move_direction.y;
        }
        bot.position = bounds.clamp(bot.position);
    }

    fn update_targeting(&mut self, bot: &mut Tank, tanks: &[TargetCandidate]) {
        let mut closest: Option<Vector2> = None;
        let mut closest_distance = self.aggro_range;

        for candidate in tanks {
            if candidate.id == bot.id {
                continue;
            }
            if self.targeting == TargetingRule::PlayersOnly && candidate.kind == TankKind::Bot {
                continue;
            }

            let distance = bot.position.distance(candidate.position);
            if distance < closest_distance {
                closest = Some(candidate.position);
                closest_distance = distance;
            }
        }

        self.target = closest;
        if let Some(target) = closest {
            bot.rotation = bot.position.angle_to(target);
        }
    }

    fn update_shooting<R: Rng + ?Sized>(&mut self, bot: &mut Tank, now: u64, rng: &mut R) -> Option<Bullet> {
        let target = self.target?;

        if self.within(bot.position, target, self.aggro_range) {
            bot.rotation = bot.position.angle_to(target);
        }

        let cooled_down = self
            .last_shot
            .map_or(true, |last| now.saturating_sub(last) > self.profile().shoot_cooldown_ms);

        if self.within(bot.position, target, self.shoot_range) && cooled_down {
            self.last_shot = Some(now);
            let stats = WeaponStats::bot();
            return Some(spawn_bullet(rng, bot, &stats, stats.damage));
        }

        None
    }

    fn within(&self, from: Vector2, to: Vector2, range: f32) -> bool {
        from.distance(to) <= range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::TankClass;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tank(id: &str, kind: TankKind, x: f32, y: f32) -> Tank {
        Tank {
            id: id.into(),
            name: id.into(),
            position: Vector2::new(x, y),
            rotation: 0.0,
            health: 400.0,
            max_health: 400.0,
            score: 0,
            level: 1,
            kills: 0,
            tank_class: TankClass::Basic,
            color: "#FF6B6B".into(),
            kind,
        }
    }

    #[test]
    fn hard_bot_fires_at_most_every_400ms() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut bot = tank("bot_a", TankKind::Bot, 0.0, 0.0);
        let player = tank("p", TankKind::Player, 300.0, 0.0);
        let mut brain = BotBrain::new(Difficulty::Hard, TargetingRule::PlayersOnly, 0);

        let mut shots = Vec::new();
        let mut now = 10_000;
        for _ in 0..600 {
            let candidates = vec![TargetCandidate::from(&player)];
            if let Some(bullet) = brain.update(&mut bot, &candidates, 16.0, now, &WorldBounds::ARENA, &mut rng) {
                assert_eq!(bullet.damage, 30.0);
                assert_eq!(bullet.owner_id, "bot_a");
                shots.push(now);
            }
            now += 16;
        }

        assert!(shots.len() > 5);
        for pair in shots.windows(2) {
            assert!(pair[1] - pair[0] >= 400, "fired after {}ms", pair[1] - pair[0]);
        }
    }

    #[test]
    fn endless_bots_ignore_other_bots() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut bot = tank("bot_a", TankKind::Bot, 0.0, 0.0);
        let other = tank("bot_b", TankKind::Bot, 50.0, 0.0);
        let mut brain = BotBrain::new(Difficulty::Medium, TargetingRule::PlayersOnly, 0);

        let fired = brain.update(
            &mut bot,
            &[TargetCandidate::from(&other)],
            16.0,
            1_000,
            &WorldBounds::ARENA,
            &mut rng,
        );
        assert!(fired.is_none());
        assert!(brain.target.is_none());
    }

    #[test]
    fn competition_bots_target_nearest_tank_of_any_kind() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut bot = tank("bot_a", TankKind::Bot, 0.0, 0.0);
        let near_bot = tank("bot_b", TankKind::Bot, 100.0, 0.0);
        let far_player = tank("p", TankKind::Player, 0.0, 500.0);
        let mut brain = BotBrain::new(Difficulty::Hard, TargetingRule::AnyTank, 1_000);

        let candidates = vec![TargetCandidate::from(&far_player), TargetCandidate::from(&near_bot)];
        brain.update(&mut bot, &candidates, 16.0, 1_000, &WorldBounds::ARENA, &mut rng);
        assert_eq!(brain.target, Some(Vector2::new(100.0, 0.0)));
        assert!(bot.rotation.abs() < 1e-5);
    }

    #[test]
    fn bot_keeps_orbit_distance() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut bot = tank("bot_a", TankKind::Bot, 0.0, 0.0);
        let player = tank("p", TankKind::Player, 400.0, 0.0);
        let mut brain = BotBrain::new(Difficulty::Hard, TargetingRule::PlayersOnly, 0);

        let candidates = vec![TargetCandidate::from(&player)];
        let mut now = 0;
        for _ in 0..400 {
            brain.update(&mut bot, &candidates, 16.0, now, &WorldBounds::ARENA, &mut rng);
            now += 16;
        }
        let distance = bot.position.distance(player.position);
        assert!(distance > 100.0 && distance < 200.0, "distance {distance}");
    }

    #[test]
    fn wandering_bot_stays_in_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let bounds = WorldBounds::ARENA;
        let mut bot = tank("bot_a", TankKind::Bot, 1990.0, -1990.0);
        let mut brain = BotBrain::new(Difficulty::Hard, TargetingRule::PlayersOnly, 0);

        let mut now = 0;
        for _ in 0..5_000 {
            brain.update(&mut bot, &[], 33.0, now, &bounds, &mut rng);
            assert!(bounds.contains(bot.position));
            now += 33;
        }
    }
}
