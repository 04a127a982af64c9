//! Bot rosters, placement and difficulty selection

use rand::seq::SliceRandom;
use rand::Rng;

use super::ai::{BotBrain, Difficulty, DifficultyProfile, TargetingRule};
use super::competition::COMPETITION_HEALTH;
use super::entity::{level_for_score, Tank, TankClass, TankKind, BOT_ID_PREFIX};
use super::geometry::{Vector2, WorldBounds};
use crate::util::id::random_token;

/// Upper bound on simultaneously live endless-mode bots
pub const MAX_BOTS: usize = 15;
/// Delay before a destroyed endless-mode bot is replaced
pub const RESPAWN_DELAY_MS: u64 = 1000;
/// Initial wave size and spacing
pub const INITIAL_WAVE: u64 = 6;
pub const INITIAL_WAVE_STEP_MS: u64 = 500;
/// First continuous-spawn interval; later ones are drawn from 1.5..2.5s
pub const FIRST_SPAWN_INTERVAL_MS: u64 = 2000;

/// Per-tick bot health regeneration
pub const BOT_REGEN_PER_TICK: f32 = 0.3;

const BOT_NAMES: [&str; 14] = [
    "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta", "Theta", "Hunter", "Stalker",
    "Predator", "Warrior", "Guardian", "Sentinel",
];

const COMPETITION_NAMES: [&str; 8] = [
    "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta", "Theta",
];

/// Next continuous-spawn interval
pub fn next_spawn_interval<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.gen_range(1500..2500)
}

/// Pick a tier from the player's progress. No player means easy.
pub fn dynamic_difficulty<R: Rng + ?Sized>(player: Option<&Tank>, rng: &mut R) -> Difficulty {
    let Some(player) = player else {
        return Difficulty::Easy;
    };

    let score_tier = player.score as f32 / 1000.0;
    let level = player.level;

    if score_tier > 20.0 || level > 15 {
        if rng.gen_bool(0.5) {
            Difficulty::Hard
        } else {
            Difficulty::Medium
        }
    } else if score_tier > 10.0 || level > 8 {
        if rng.gen_bool(0.3) {
            Difficulty::Hard
        } else if rng.gen_bool(0.6) {
            Difficulty::Medium
        } else {
            Difficulty::Easy
        }
    } else if rng.gen_bool(0.2) {
        Difficulty::Medium
    } else {
        Difficulty::Easy
    }
}

fn bot_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{BOT_ID_PREFIX}{}", random_token(rng))
}

fn random_class<R: Rng + ?Sized>(rng: &mut R) -> TankClass {
    TankClass::BOT_CLASSES
        .choose(rng)
        .copied()
        .unwrap_or_default()
}

/// Endless-mode bot, placed 400..1000 units from the player when there is one
pub fn endless_bot<R: Rng + ?Sized>(
    difficulty: Difficulty,
    near: Option<Vector2>,
    bounds: &WorldBounds,
    now: u64,
    rng: &mut R,
) -> (Tank, BotBrain) {
    let profile = DifficultyProfile::for_difficulty(difficulty);

    let position = match near {
        Some(anchor) => {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = rng.gen_range(400.0..1000.0);
            anchor + Vector2::from_angle(angle).scale(distance)
        }
        None => Vector2::new(
            rng.gen_range(bounds.min_x..bounds.max_x),
            rng.gen_range(bounds.min_y..bounds.max_y),
        ),
    };

    // Cosmetic progress so the leaderboard looks lived-in
    let score = rng.gen_range(0..5000);

    let tank = Tank {
        id: bot_id(rng),
        name: BOT_NAMES.choose(rng).copied().unwrap_or("Bot").to_string(),
        position: bounds.clamp(position),
        rotation: rng.gen_range(0.0..std::f32::consts::TAU),
        health: profile.health,
        max_health: profile.health,
        score,
        level: level_for_score(score),
        kills: 0,
        tank_class: random_class(rng),
        color: profile.color.to_string(),
        kind: TankKind::Bot,
    };
    let brain = BotBrain::new(difficulty, TargetingRule::PlayersOnly, now);
    (tank, brain)
}

/// Competition bot with a name not already in `taken`
pub fn competition_bot<R: Rng + ?Sized>(
    taken: &[&str],
    bounds: &WorldBounds,
    now: u64,
    rng: &mut R,
) -> (Tank, BotBrain) {
    let profile = DifficultyProfile::for_difficulty(Difficulty::Hard);

    let free: Vec<&str> = COMPETITION_NAMES
        .iter()
        .copied()
        .filter(|name| !taken.contains(name))
        .collect();
    let name = match free.choose(rng) {
        Some(name) => name.to_string(),
        None => format!("Bot {}", taken.len() + 1),
    };

    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = rng.gen_range(500.0..1000.0);

    let tank = Tank {
        id: bot_id(rng),
        name,
        position: bounds.clamp(Vector2::from_angle(angle).scale(distance)),
        rotation: rng.gen_range(0.0..std::f32::consts::TAU),
        health: COMPETITION_HEALTH,
        max_health: COMPETITION_HEALTH,
        score: 0,
        level: 1,
        kills: 0,
        tank_class: random_class(rng),
        color: profile.color.to_string(),
        kind: TankKind::Bot,
    };
    let brain = BotBrain::new(Difficulty::Hard, TargetingRule::AnyTank, now);
    (tank, brain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn player(score: u32) -> Tank {
        Tank {
            id: "me".into(),
            name: "me".into(),
            position: Vector2::ZERO,
            rotation: 0.0,
            health: 1000.0,
            max_health: 1000.0,
            score,
            level: level_for_score(score),
            kills: 0,
            tank_class: TankClass::Basic,
            color: "#4A90E2".into(),
            kind: TankKind::Player,
        }
    }

    #[test]
    fn beginners_never_face_hard_bots() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let me = player(0);
        for _ in 0..500 {
            assert_ne!(dynamic_difficulty(Some(&me), &mut rng), Difficulty::Hard);
        }
        assert_eq!(dynamic_difficulty(None, &mut rng), Difficulty::Easy);
    }

    #[test]
    fn veterans_never_face_easy_bots() {
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let me = player(25_000);
        let mut saw_hard = false;
        for _ in 0..500 {
            let d = dynamic_difficulty(Some(&me), &mut rng);
            assert_ne!(d, Difficulty::Easy);
            saw_hard |= d == Difficulty::Hard;
        }
        assert!(saw_hard);
    }

    #[test]
    fn endless_bots_spawn_inside_world_with_tier_stats() {
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let bounds = WorldBounds::ARENA;
        for _ in 0..200 {
            let (bot, brain) = endless_bot(
                Difficulty::Medium,
                Some(Vector2::new(1900.0, -1900.0)),
                &bounds,
                0,
                &mut rng,
            );
            assert!(bounds.contains(bot.position));
            assert!(bot.is_bot());
            assert!(bot.id.starts_with(BOT_ID_PREFIX));
            assert_eq!(bot.max_health, 300.0);
            assert_eq!(bot.level, level_for_score(bot.score));
            assert_eq!(brain.targeting, TargetingRule::PlayersOnly);
        }
    }

    #[test]
    fn competition_bots_get_unique_names() {
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let bounds = WorldBounds::ARENA;
        let mut names: Vec<String> = vec!["Alpha".into()];
        for _ in 0..7 {
            let taken: Vec<&str> = names.iter().map(String::as_str).collect();
            let (bot, brain) = competition_bot(&taken, &bounds, 0, &mut rng);
            assert!(!names.contains(&bot.name));
            let distance = bot.position.length();
            assert!((499.0..=1001.0).contains(&distance), "{distance}");
            assert_eq!(bot.health, COMPETITION_HEALTH);
            assert_eq!(brain.difficulty, Difficulty::Hard);
            names.push(bot.name);
        }
    }
}
