//! Client-side simulation engine
//!
//! Owns the world table and drives one session: player input, bot AI,
//! bullets, collisions, scoring, spawning and the competition lifecycle.
//! Everything runs on the caller's task via [`GameEngine::update`]; timers
//! are deadlines checked each tick so `stop()` cancels them all at once.

use std::collections::HashMap;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::net::{NetworkSync, SyncEvent};
use crate::util::id::random_token;
use crate::util::time::Clock;
use crate::ws::protocol::ServerMsg;

use super::ai::{BotBrain, TargetCandidate};
use super::audio::{Audio, SoundEffect};
use super::combat::{spawn_bullet, CombatSystem, HitResult, WeaponStats};
use super::competition::{Competition, CompetitionResult, COMPETITION_HEALTH, COMPETITION_REGEN_PER_SEC};
use super::entity::{level_for_score, Bullet, Tank, TankId, TankKind, WorldState};
use super::geometry::{Vector2, WorldBounds};
use super::session::{
    ChatCallback, EngineError, EngineOptions, GameOverCallback, GameOverData, PlayerStats,
    StatsCallback, Upgrade, Viewport,
};
use super::spawn::{
    self, BOT_REGEN_PER_TICK, FIRST_SPAWN_INTERVAL_MS, INITIAL_WAVE, INITIAL_WAVE_STEP_MS, MAX_BOTS,
    RESPAWN_DELAY_MS,
};

/// Player movement speed (units/sec)
pub const PLAYER_SPEED: f32 = 200.0;
/// Player health outside competitions
pub const PLAYER_HEALTH: f32 = 1000.0;
/// Quiet time after a shot before health regenerates
pub const REGEN_COOLDOWN_MS: u64 = 3000;
/// Endless-mode regeneration per tick
pub const ENDLESS_REGEN_PER_TICK: f32 = 3.0;
/// Camera smoothing factor per frame
pub const CAMERA_SMOOTHING: f32 = 0.1;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Built or stopped; `update` is a no-op
    Idle,
    Running,
    /// Eliminated during a competition; the match keeps simulating
    Spectating,
    /// Eliminated in endless mode
    GameOver,
    /// Competition resolved; terminal for the session
    CompetitionEnded,
}

/// Movement keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Default)]
struct InputState {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    /// Cursor in screen space
    cursor: Vector2,
    auto_fire: bool,
}

impl InputState {
    fn clear(&mut self) {
        self.up = false;
        self.down = false;
        self.left = false;
        self.right = false;
        self.auto_fire = false;
    }
}

/// Minimap view of the player's screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerViewport {
    pub center: Vector2,
    pub width: f32,
    pub height: f32,
}

/// Minimap view of every entity
#[derive(Debug)]
pub struct EntitySnapshot<'a> {
    pub tanks: Vec<&'a Tank>,
    pub bullets: &'a [Bullet],
    pub player_id: &'a str,
}

#[derive(Default)]
struct Callbacks {
    on_stats: Option<StatsCallback>,
    on_game_over: Option<GameOverCallback>,
    on_chat: Option<ChatCallback>,
}

/// Settings kept after construction
#[derive(Debug, Clone)]
struct SessionSettings {
    player_name: String,
    tank_class: super::entity::TankClass,
    game_mode: String,
    enable_bots: bool,
    competition: bool,
}

/// One client's simulation
pub struct GameEngine {
    settings: SessionSettings,
    callbacks: Callbacks,
    clock: Arc<dyn Clock>,
    rng: ChaCha8Rng,
    audio: Audio,
    sync: NetworkSync,

    state: EngineState,
    player_id: TankId,
    world: WorldState,
    bots: HashMap<TankId, BotBrain>,
    bounds: WorldBounds,

    // Presentation
    viewport: Viewport,
    camera: Vector2,
    input: InputState,

    // Player timers and modifiers
    last_player_shot: Option<u64>,
    damage_bonus: f32,
    started_at: u64,

    // Endless-mode spawning
    last_spawn_at: u64,
    spawn_interval_ms: u64,
    pending_spawns: Vec<u64>,

    competition: Option<Competition>,
}

impl GameEngine {
    /// Build a session and announce the player. Fails only without a usable surface.
    pub fn new(
        viewport: Viewport,
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        if !viewport.is_usable() {
            return Err(EngineError::MissingSurface {
                width: viewport.width,
                height: viewport.height,
            });
        }

        let mut rng = match options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let player_id = random_token(&mut rng);

        let competition = options
            .competition
            .then(|| Competition::new(options.competition_duration_secs));

        let mut engine = Self {
            settings: SessionSettings {
                player_name: options.player_name,
                tank_class: options.tank_class,
                game_mode: options.game_mode,
                enable_bots: options.enable_bots,
                competition: options.competition,
            },
            callbacks: Callbacks {
                on_stats: options.on_stats,
                on_game_over: options.on_game_over,
                on_chat: options.on_chat,
            },
            clock,
            rng,
            audio: Audio::new(options.audio),
            sync: NetworkSync::new(player_id.clone(), options.sender),
            state: EngineState::Idle,
            player_id,
            world: WorldState::default(),
            bots: HashMap::new(),
            bounds: WorldBounds::ARENA,
            viewport,
            camera: Vector2::ZERO,
            input: InputState {
                cursor: viewport.center(),
                ..InputState::default()
            },
            last_player_shot: None,
            damage_bonus: 0.0,
            started_at: 0,
            last_spawn_at: 0,
            spawn_interval_ms: FIRST_SPAWN_INTERVAL_MS,
            pending_spawns: Vec::new(),
            competition,
        };

        engine.initialize_player();
        engine.join();
        engine.snap_camera();
        Ok(engine)
    }

    fn player_health(&self) -> f32 {
        if self.settings.competition {
            COMPETITION_HEALTH
        } else {
            PLAYER_HEALTH
        }
    }

    fn initialize_player(&mut self) {
        let health = self.player_health();
        let player = Tank {
            id: self.player_id.clone(),
            name: self.settings.player_name.clone(),
            position: Vector2::ZERO,
            rotation: 0.0,
            health,
            max_health: health,
            score: 0,
            level: 1,
            kills: 0,
            tank_class: self.settings.tank_class,
            color: self.settings.tank_class.client_color().to_string(),
            kind: TankKind::Player,
        };
        self.world.tanks.insert(player.id.clone(), player);
    }

    fn join(&mut self) {
        self.sync.join(
            &self.settings.player_name,
            self.settings.tank_class,
            &self.settings.game_mode,
        );
    }

    /// Begin simulating. Ignored while already running.
    pub fn start(&mut self) {
        if matches!(self.state, EngineState::Running | EngineState::Spectating) {
            return;
        }

        let now = self.clock.now_ms();
        self.state = EngineState::Running;
        self.started_at = now;
        self.last_spawn_at = now;
        self.spawn_interval_ms = FIRST_SPAWN_INTERVAL_MS;

        if !self.world.tanks.contains_key(&self.player_id) {
            self.initialize_player();
        }
        if !self.sync.is_joined() {
            self.join();
        }

        self.audio.music();

        let competition_mode = self.settings.competition;
        if let Some(player) = self.world.tanks.get_mut(&self.player_id) {
            player.position = Vector2::ZERO;
            if competition_mode {
                player.health = COMPETITION_HEALTH;
                player.max_health = COMPETITION_HEALTH;
                player.score = 0;
                player.level = 1;
                player.kills = 0;
            } else {
                player.health = player.max_health;
            }
        }

        match self.competition.as_mut() {
            // Bots join on the first tick
            Some(competition) => competition.begin(now),
            None => {
                self.pending_spawns = (0..INITIAL_WAVE)
                    .map(|i| now + i * INITIAL_WAVE_STEP_MS)
                    .collect();
            }
        }

        self.snap_camera();
        self.publish_stats(now);
        info!(player_id = %self.player_id, competition = competition_mode, "session started");
    }

    /// Halt the session and release everything it scheduled. Safe to repeat.
    pub fn stop(&mut self) {
        if self.state != EngineState::Idle {
            info!(player_id = %self.player_id, "session stopped");
        }
        self.state = EngineState::Idle;
        self.sync.leave();

        self.world.clear();
        self.bots.clear();
        self.pending_spawns.clear();
        self.input.clear();

        self.last_player_shot = None;
        self.last_spawn_at = 0;
        self.spawn_interval_ms = FIRST_SPAWN_INTERVAL_MS;

        if let Some(competition) = self.competition.as_mut() {
            competition.reset();
        }
    }

    /// Fresh session under a new identity
    pub fn restart(&mut self) {
        self.stop();

        self.player_id = random_token(&mut self.rng);
        self.sync.set_local_id(self.player_id.clone());
        self.damage_bonus = 0.0;

        self.initialize_player();
        self.join();

        self.input.cursor = self.viewport.center();
        self.start();
        self.snap_camera();
    }

    /// Advance the simulation by one frame of `dt_ms` milliseconds
    pub fn update(&mut self, dt_ms: f32) {
        if !matches!(self.state, EngineState::Running | EngineState::Spectating) {
            return;
        }
        let now = self.clock.now_ms();

        if self.state == EngineState::Running {
            self.update_player(dt_ms);
            self.regenerate_player(dt_ms, now);
        }

        self.update_bots(dt_ms, now);
        CombatSystem::advance_bullets(&mut self.world.bullets, dt_ms / 1000.0, &self.bounds);
        self.resolve_collisions(now);
        self.update_camera();
        self.update_spawning(now);

        if self.settings.competition {
            self.check_competition_end(now);
        }

        if self.state == EngineState::Running {
            if let Some(player) = self.world.tanks.get(&self.player_id) {
                self.sync.maybe_send_player_update(now, player);
            }
            if self.input.auto_fire {
                self.try_fire(now);
            }
            self.publish_stats(now);
        }
    }

    fn update_player(&mut self, dt_ms: f32) {
        let camera = self.camera;
        let cursor = self.input.cursor;
        let bounds = self.bounds;
        let input = &self.input;
        let Some(player) = self.world.tanks.get_mut(&self.player_id) else {
            return;
        };

        // Per-axis, so diagonals are faster
        let step = PLAYER_SPEED * (dt_ms / 1000.0);
        let mut next = player.position;
        if input.up {
            next.y -= step;
        }
        if input.down {
            next.y += step;
        }
        if input.left {
            next.x -= step;
        }
        if input.right {
            next.x += step;
        }
        if bounds.contains_x(next.x) {
            player.position.x = next.x;
        }
        if bounds.contains_y(next.y) {
            player.position.y = next.y;
        }
        player.position = bounds.clamp(player.position);

        let on_screen = player.position + camera;
        player.rotation = on_screen.angle_to(cursor);
    }

    fn regen_ready(&self, now: u64) -> bool {
        self.last_player_shot
            .map_or(true, |shot| now.saturating_sub(shot) > REGEN_COOLDOWN_MS)
    }

    fn regenerate_player(&mut self, dt_ms: f32, now: u64) {
        if !self.regen_ready(now) {
            return;
        }
        let amount = if self.settings.competition {
            COMPETITION_REGEN_PER_SEC * (dt_ms / 1000.0)
        } else {
            ENDLESS_REGEN_PER_TICK
        };
        if let Some(player) = self.world.tanks.get_mut(&self.player_id) {
            if player.is_alive() && player.health < player.max_health {
                player.health = (player.health + amount).min(player.max_health);
            }
        }
    }

    fn update_bots(&mut self, dt_ms: f32, now: u64) {
        let candidates: Vec<TargetCandidate> = self
            .world
            .tanks
            .values()
            .filter(|tank| tank.is_alive())
            .map(TargetCandidate::from)
            .collect();

        let mut fired = Vec::new();
        for (id, brain) in self.bots.iter_mut() {
            let Some(bot) = self.world.tanks.get_mut(id) else {
                continue;
            };
            if !bot.is_alive() {
                continue;
            }

            if let Some(bullet) = brain.update(bot, &candidates, dt_ms, now, &self.bounds, &mut self.rng) {
                fired.push(bullet);
            }

            if bot.health < bot.max_health {
                bot.health = (bot.health + BOT_REGEN_PER_TICK).min(bot.max_health);
            }
        }
        self.world.bullets.extend(fired);

        let tanks = &self.world.tanks;
        self.bots.retain(|id, _| tanks.contains_key(id));
    }

    fn resolve_collisions(&mut self, now: u64) {
        let hits = CombatSystem::resolve_hits(&mut self.world.bullets, &mut self.world.tanks);
        if hits.is_empty() {
            return;
        }

        // Mark
        let mut killed: Vec<(TankId, Option<String>)> = Vec::new();
        for hit in &hits {
            self.audio.play(SoundEffect::Hit);
            if !hit.target_killed {
                continue;
            }
            self.audio.play(SoundEffect::Explosion);
            let killer = self.credit_kill(hit, now);
            killed.push((hit.target_id.clone(), killer));
        }

        // Sweep
        for (victim_id, killer) in killed {
            if victim_id == self.player_id {
                self.eliminate_player(killer, now);
                continue;
            }

            let is_bot = self.world.tanks.get(&victim_id).is_some_and(Tank::is_bot);
            if !is_bot {
                // Remote players are corrected by their next snapshot
                continue;
            }
            let Some(victim) = self.world.tanks.remove(&victim_id) else {
                continue;
            };
            self.bots.remove(&victim_id);
            debug!(bot_id = %victim_id, killer = ?killer, "bot destroyed");

            match self.competition.as_mut() {
                Some(competition) => competition.snapshot(&victim),
                None => self.pending_spawns.push(now + RESPAWN_DELAY_MS),
            }
        }
    }

    /// Credit the shooter of a lethal hit; returns the shooter's name
    fn credit_kill(&mut self, hit: &HitResult, now: u64) -> Option<String> {
        let victim_kind = self.world.tanks.get(&hit.target_id)?.kind;
        let shooter = self.world.tanks.get_mut(&hit.shooter_id)?;

        let levelled_up = CombatSystem::award_kill(shooter, victim_kind);
        let name = shooter.name.clone();

        if levelled_up && hit.shooter_id == self.player_id {
            self.audio.play(SoundEffect::LevelUp);
        }
        if let Some(competition) = self.competition.as_mut() {
            competition.record_kill(&hit.shooter_id, now);
        }
        Some(name)
    }

    fn eliminate_player(&mut self, killer: Option<String>, now: u64) {
        if self.state != EngineState::Running {
            return;
        }
        self.audio.play(SoundEffect::GameOver);
        self.input.clear();

        let survival_time = now.saturating_sub(self.started_at) / 1000;

        let data = if let Some(competition) = self.competition.as_mut() {
            let player = self.world.tanks.remove(&self.player_id);
            if let Some(player) = &player {
                competition.snapshot(player);
            }
            self.state = EngineState::Spectating;
            info!(player_id = %self.player_id, "eliminated, spectating");

            let cause = match &killer {
                Some(name) => format!("Destroyed by {name}! You can spectate the remaining competition."),
                None => "You were eliminated from the competition. You can spectate the remaining competition."
                    .to_string(),
            };
            game_over_data(player.as_ref(), survival_time, cause, killer, true)
        } else {
            self.state = EngineState::GameOver;
            self.bots.clear();
            self.pending_spawns.clear();
            info!(player_id = %self.player_id, killer = ?killer, "game over");

            let cause = if killer.is_some() { "Destroyed by enemy" } else { "Unknown" };
            let player = self.world.tanks.get(&self.player_id);
            game_over_data(player, survival_time, cause.to_string(), killer, false)
        };

        self.emit_game_over(&data);
    }

    fn update_camera(&mut self) {
        if let Some(player) = self.world.tanks.get(&self.player_id) {
            let target = self.viewport.center() - player.position;
            self.camera += (target - self.camera).scale(CAMERA_SMOOTHING);
        }
    }

    fn snap_camera(&mut self) {
        if let Some(player) = self.world.tanks.get(&self.player_id) {
            self.camera = self.viewport.center() - player.position;
        }
    }

    fn update_spawning(&mut self, now: u64) {
        if self.state != EngineState::Running && self.state != EngineState::Spectating {
            return;
        }

        if let Some(competition) = self.competition.as_ref() {
            if !competition.bots_spawned() {
                self.spawn_competition_field(now);
            }
            return;
        }

        if !self.settings.enable_bots {
            self.pending_spawns.clear();
            return;
        }

        let due = self.pending_spawns.iter().filter(|&&at| at <= now).count();
        self.pending_spawns.retain(|&at| at > now);
        for _ in 0..due {
            self.spawn_endless_bot(now);
        }

        if now.saturating_sub(self.last_spawn_at) > self.spawn_interval_ms && self.bots.len() < MAX_BOTS {
            self.spawn_endless_bot(now);
            self.last_spawn_at = now;
            self.spawn_interval_ms = spawn::next_spawn_interval(&mut self.rng);
        }
    }

    fn spawn_endless_bot(&mut self, now: u64) {
        if self.bots.len() >= MAX_BOTS {
            return;
        }
        let player = self.world.tanks.get(&self.player_id);
        let difficulty = spawn::dynamic_difficulty(player, &mut self.rng);
        let near = player.map(|p| p.position);

        let (bot, brain) = spawn::endless_bot(difficulty, near, &self.bounds, now, &mut self.rng);
        debug!(bot_id = %bot.id, ?difficulty, "bot spawned");
        self.bots.insert(bot.id.clone(), brain);
        self.world.tanks.insert(bot.id.clone(), bot);
    }

    fn spawn_competition_field(&mut self, now: u64) {
        let Some(competition) = self.competition.as_mut() else {
            return;
        };

        self.bots.clear();
        if let Some(player) = self.world.tanks.get(&self.player_id) {
            competition.snapshot(player);
        }

        for _ in 0..super::competition::COMPETITION_BOTS {
            let taken: Vec<&str> = self.world.tanks.values().map(|t| t.name.as_str()).collect();
            let (bot, brain) = spawn::competition_bot(&taken, &self.bounds, now, &mut self.rng);
            competition.snapshot(&bot);
            self.bots.insert(bot.id.clone(), brain);
            self.world.tanks.insert(bot.id.clone(), bot);
        }

        competition.mark_bots_spawned();
        info!(bots = self.bots.len(), "competition field spawned");
    }

    fn check_competition_end(&mut self, now: u64) {
        let Some(competition) = self.competition.as_mut() else {
            return;
        };
        if !competition.bots_spawned() {
            return;
        }

        let live: Vec<&Tank> = self
            .world
            .tanks
            .values()
            .filter(|tank| tank.is_alive() && competition.is_participant(&tank.id))
            .collect();
        let time_up = competition.time_up(now);
        if live.len() > 1 && !time_up {
            return;
        }

        let survivor = if live.len() == 1 { live.first().copied() } else { None };
        competition.refresh(&self.world.tanks);
        let result = competition.resolve(survivor, time_up);
        self.finish_competition(result, now);
    }

    fn finish_competition(&mut self, result: CompetitionResult, now: u64) {
        self.state = EngineState::CompetitionEnded;
        self.bots.clear();
        self.input.clear();
        if let Some(competition) = self.competition.as_mut() {
            competition.cancel_countdown();
        }

        let winner_name = result
            .winner
            .as_ref()
            .map_or_else(|| "No winner".to_string(), |w| w.name.clone());
        info!(winner = %winner_name, highest_kills = result.highest_kills, time_up = result.time_up, "competition ended");

        let player = self
            .world
            .tanks
            .get(&self.player_id)
            .or_else(|| self.competition.as_ref()?.participants().get(&self.player_id));

        let player_won = result.winner.as_ref().is_some_and(|w| w.id == self.player_id);
        let kills = player.map_or(0, |p| p.kills);

        let cause = if result.time_up {
            "Time's up! Competition ended.".to_string()
        } else {
            format!("Competition ended! Winner: {winner_name}")
        };
        let survival_time = now.saturating_sub(self.started_at) / 1000;

        let mut data = game_over_data(player, survival_time, cause, None, true);
        data.winner = Some(winner_name);
        data.time_up = result.time_up;
        data.player_won = player_won;
        data.player_qualified = player_won && kills >= 1;

        self.emit_game_over(&data);
    }

    fn emit_game_over(&mut self, data: &GameOverData) {
        if let Some(callback) = self.callbacks.on_game_over.as_mut() {
            callback(data);
        }
    }

    fn publish_stats(&mut self, now: u64) {
        let regen_ready = self.regen_ready(now);
        let Some(player) = self.world.tanks.get_mut(&self.player_id) else {
            return;
        };

        let level = level_for_score(player.score);
        if level > player.level {
            player.level = level;
            self.audio.play(SoundEffect::LevelUp);
        }

        let stats = PlayerStats {
            score: player.score,
            level: player.level,
            kills: player.kills,
            health: player.display_health(),
            max_health: player.max_health,
            is_regenerating: regen_ready && player.is_alive() && player.health < player.max_health,
        };
        if let Some(callback) = self.callbacks.on_stats.as_mut() {
            callback(&stats);
        }
    }

    // Input

    pub fn set_direction(&mut self, direction: Direction, pressed: bool) {
        if self.state != EngineState::Running {
            return;
        }
        match direction {
            Direction::Up => self.input.up = pressed,
            Direction::Down => self.input.down = pressed,
            Direction::Left => self.input.left = pressed,
            Direction::Right => self.input.right = pressed,
        }
    }

    /// Cursor position in screen coordinates
    pub fn set_cursor(&mut self, x: f32, y: f32) {
        self.input.cursor = Vector2::new(x, y);
    }

    /// Flip auto-fire; returns the new setting
    pub fn toggle_auto_fire(&mut self) -> bool {
        if self.state != EngineState::Running {
            return false;
        }
        self.input.auto_fire = !self.input.auto_fire;
        self.input.auto_fire
    }

    /// Fire once if the fire-rate gate allows. Returns whether a shot left.
    pub fn fire(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.try_fire(now)
    }

    fn try_fire(&mut self, now: u64) -> bool {
        if self.state != EngineState::Running {
            return false;
        }
        let Some(player) = self.world.tanks.get(&self.player_id) else {
            return false;
        };
        let stats = WeaponStats::player(player.level);
        if !CombatSystem::can_fire(self.last_player_shot, now, stats.cooldown_ms) {
            return false;
        }

        let damage = CombatSystem::calculate_damage(stats.damage, self.damage_bonus);
        let bullet = spawn_bullet(&mut self.rng, player, &stats, damage);
        self.last_player_shot = Some(now);

        self.audio.play(SoundEffect::Shoot);
        self.sync.on_local_shot(&bullet);
        self.world.bullets.push(bullet);
        true
    }

    /// Apply an upgrade to the local player and announce it
    pub fn upgrade_player(&mut self, upgrade: Upgrade) {
        if self.state != EngineState::Running {
            return;
        }
        let Some(player) = self.world.tanks.get_mut(&self.player_id) else {
            return;
        };
        match upgrade {
            Upgrade::MaxHealth => {
                player.max_health += 100.0;
                player.health = player.max_health;
            }
            Upgrade::Damage => self.damage_bonus += 10.0,
        }
        self.sync.send_upgrade(upgrade.name());
        let now = self.clock.now_ms();
        self.publish_stats(now);
    }

    /// Chat through the relay
    pub fn send_chat(&mut self, message: &str) {
        self.sync.send_chat(&self.settings.player_name, message);
    }

    /// New surface size. Unusable sizes are ignored.
    pub fn handle_resize(&mut self, width: f32, height: f32) {
        let viewport = Viewport::new(width, height);
        if !viewport.is_usable() {
            warn!(width, height, "ignoring unusable viewport size");
            return;
        }
        self.viewport = viewport;
        if self.input.cursor == Vector2::ZERO {
            self.input.cursor = viewport.center();
        }
        self.snap_camera();
    }

    // Network

    /// Decode and apply one inbound frame. Malformed frames are dropped.
    pub fn handle_server_message(&mut self, text: &str) {
        match ServerMsg::decode(text) {
            Ok(msg) => self.handle_server_event(msg),
            Err(e) => warn!(error = %e, "dropping malformed server message"),
        }
    }

    pub fn handle_server_event(&mut self, msg: ServerMsg) {
        match self.sync.apply(msg, &mut self.world) {
            SyncEvent::None => {}
            SyncEvent::Chat(entry) => {
                if let Some(callback) = self.callbacks.on_chat.as_mut() {
                    callback(&entry);
                }
            }
            SyncEvent::Connected { player_id } => {
                debug!(conn_id = %player_id, "relay acknowledged connection");
            }
            SyncEvent::ServerStats {
                online_players,
                active_games,
            } => {
                debug!(online_players, active_games, "relay stats");
            }
        }
    }

    // Competition timer

    /// External time-up callback
    pub fn signal_time_up(&mut self) {
        if let Some(competition) = self.competition.as_mut() {
            competition.signal_time_up();
        }
    }

    /// Re-arm the match countdown
    pub fn reset_countdown(&mut self, duration_secs: u64) {
        let now = self.clock.now_ms();
        if let Some(competition) = self.competition.as_mut() {
            competition.reset_countdown(now, duration_secs);
        }
    }

    pub fn cancel_countdown(&mut self) {
        if let Some(competition) = self.competition.as_mut() {
            competition.cancel_countdown();
        }
    }

    /// Remaining match time, `None` outside a running competition
    pub fn competition_remaining_ms(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        self.competition.as_ref()?.remaining_ms(now)
    }

    // Accessors

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Eliminated or finished
    pub fn is_game_over(&self) -> bool {
        matches!(
            self.state,
            EngineState::GameOver | EngineState::Spectating | EngineState::CompetitionEnded
        )
    }

    pub fn is_competition(&self) -> bool {
        self.settings.competition
    }

    pub fn game_state(&self) -> &WorldState {
        &self.world
    }

    pub fn camera(&self) -> Vector2 {
        self.camera
    }

    pub fn auto_fire(&self) -> bool {
        self.input.auto_fire
    }

    /// Human players only, for the leaderboard
    pub fn multiplayer_tanks(&self) -> Vec<&Tank> {
        self.world.tanks.values().filter(|tank| !tank.is_bot()).collect()
    }

    /// Participant snapshots, refreshed from live tanks first. Empty outside competitions.
    pub fn competition_participants(&mut self) -> HashMap<TankId, Tank> {
        match self.competition.as_mut() {
            Some(competition) => {
                competition.refresh(&self.world.tanks);
                competition.participants().clone()
            }
            None => HashMap::new(),
        }
    }

    pub fn world_bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn player_viewport(&self) -> Option<PlayerViewport> {
        let player = self.world.tanks.get(&self.player_id)?;
        Some(PlayerViewport {
            center: player.position,
            width: self.viewport.width,
            height: self.viewport.height,
        })
    }

    pub fn all_entities(&self) -> EntitySnapshot<'_> {
        EntitySnapshot {
            tanks: self.world.tanks.values().collect(),
            bullets: &self.world.bullets,
            player_id: &self.player_id,
        }
    }
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine")
            .field("player_id", &self.player_id)
            .field("state", &self.state)
            .field("tanks", &self.world.tanks.len())
            .field("bullets", &self.world.bullets.len())
            .field("bots", &self.bots.len())
            .finish_non_exhaustive()
    }
}

fn game_over_data(
    player: Option<&Tank>,
    survival_time: u64,
    cause: String,
    killed_by: Option<String>,
    is_competition_mode: bool,
) -> GameOverData {
    GameOverData {
        final_score: player.map_or(0, |p| p.score),
        final_level: player.map_or(1, |p| p.level),
        total_kills: player.map_or(0, |p| p.kills),
        survival_time,
        cause,
        killed_by,
        winner: None,
        time_up: false,
        is_competition_mode,
        player_qualified: false,
        player_won: false,
    }
}
