//! Drives one engine session against a relay on a single task
//!
//! The engine is never shared: frame ticks, inbound frames and the match
//! countdown are multiplexed with `tokio::select!` and each branch calls
//! into the engine in turn.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::game::session::{GameOverCallback, StatsCallback};
use crate::game::{
    EngineError, EngineOptions, EngineState, GameEngine, GameOverData, PlayerStats, TankClass,
    Vector2, Viewport,
};
use crate::net::MessageSender;
use crate::util::time::{frame_delta_ms, SystemClock};
use crate::ws::protocol::{ChatEntry, ClientMsg};

/// Outbound frames buffered before the session starts dropping them
const OUTBOX_CAPACITY: usize = 256;

/// Headless surface size
const HEADLESS_VIEWPORT: Viewport = Viewport {
    width: 1280.0,
    height: 720.0,
};

/// Radius of the aim sweep around the screen centre
const AIM_RADIUS: f32 = 200.0;
/// Full aim revolutions per second
const AIM_TURNS_PER_SEC: f32 = 0.25;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid value for {0}")]
    Invalid(&'static str),
}

/// What to play and where
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub relay_url: String,
    pub player_name: String,
    pub tank_class: TankClass,
    /// `endless` or `competition`
    pub game_mode: String,
    /// Hard cap on wall-clock session length
    pub max_duration: Duration,
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:10000/ws".to_string(),
            player_name: "Headless".to_string(),
            tank_class: TankClass::Basic,
            game_mode: "endless".to_string(),
            max_duration: Duration::from_secs(60),
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Read `RELAY_URL`, `PLAYER_NAME`, `TANK_CLASS`, `GAME_MODE`, `SESSION_SECS`
    pub fn from_env() -> Result<Self, ClientError> {
        let defaults = Self::default();

        let tank_class = match env::var("TANK_CLASS") {
            Ok(raw) => raw.parse().map_err(|_| ClientError::Invalid("TANK_CLASS"))?,
            Err(_) => defaults.tank_class,
        };
        let game_mode = env::var("GAME_MODE").unwrap_or(defaults.game_mode);
        if game_mode != "endless" && game_mode != "competition" {
            return Err(ClientError::Invalid("GAME_MODE"));
        }
        let max_duration = match env::var("SESSION_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .map_err(|_| ClientError::Invalid("SESSION_SECS"))?,
            ),
            Err(_) => defaults.max_duration,
        };

        Ok(Self {
            relay_url: env::var("RELAY_URL").unwrap_or(defaults.relay_url),
            player_name: env::var("PLAYER_NAME").unwrap_or(defaults.player_name),
            tank_class,
            game_mode,
            max_duration,
            seed: None,
        })
    }

    pub fn is_competition(&self) -> bool {
        self.game_mode == "competition"
    }
}

/// How a session ended
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub player_id: String,
    pub frames: u64,
    /// Last game-over payload, absent if the session hit its time cap
    pub game_over: Option<GameOverData>,
    pub last_stats: Option<PlayerStats>,
}

#[derive(Default)]
struct Observed {
    game_over: Option<GameOverData>,
    stats: Option<PlayerStats>,
}

/// Point on a circle around the screen centre, advancing with time
pub fn aim_point(viewport: Viewport, elapsed: Duration) -> Vector2 {
    let angle = elapsed.as_secs_f32() * AIM_TURNS_PER_SEC * std::f32::consts::TAU;
    viewport.center() + Vector2::from_angle(angle).scale(AIM_RADIUS)
}

/// Connect, play until game over or the time cap, then leave
pub async fn run_session(config: &SessionConfig) -> Result<SessionReport, ClientError> {
    let (socket, _) = connect_async(config.relay_url.as_str()).await?;
    info!(url = %config.relay_url, "connected to relay");
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer task: engine outbox -> WebSocket
    let (out_tx, mut out_rx) = mpsc::channel::<ClientMsg>(OUTBOX_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let frame = match msg.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "failed to encode client message");
                    continue;
                }
            };
            if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                debug!(error = %e, "relay send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let sender: MessageSender = Box::new(move |msg: ClientMsg| {
        if let Err(e) = out_tx.try_send(msg) {
            warn!(error = %e, "dropping outbound message");
        }
    });

    let observed = Arc::new(Mutex::new(Observed::default()));
    let on_game_over: GameOverCallback = {
        let observed = observed.clone();
        Box::new(move |data: &GameOverData| {
            info!(cause = %data.cause, score = data.final_score, "game over");
            observed.lock().game_over = Some(data.clone());
        })
    };
    let on_stats: StatsCallback = {
        let observed = observed.clone();
        Box::new(move |stats: &PlayerStats| {
            observed.lock().stats = Some(stats.clone());
        })
    };

    let base = if config.is_competition() {
        EngineOptions::competition(config.player_name.clone())
    } else {
        EngineOptions {
            player_name: config.player_name.clone(),
            ..EngineOptions::default()
        }
    };
    let options = EngineOptions {
        tank_class: config.tank_class,
        game_mode: config.game_mode.clone(),
        sender: Some(sender),
        on_stats: Some(on_stats),
        on_game_over: Some(on_game_over),
        on_chat: Some(Box::new(|entry: &ChatEntry| {
            info!(from = %entry.player_name, message = %entry.message, "chat");
        })),
        seed: config.seed,
        ..base
    };

    let mut engine = GameEngine::new(HEADLESS_VIEWPORT, options, Arc::new(SystemClock))?;
    engine.start();
    engine.toggle_auto_fire();

    let started = Instant::now();
    let session_deadline = tokio::time::sleep(config.max_duration);
    tokio::pin!(session_deadline);

    // Disarmed outside competitions
    let countdown = tokio::time::sleep(
        engine
            .competition_remaining_ms()
            .map(Duration::from_millis)
            .unwrap_or(config.max_duration),
    );
    tokio::pin!(countdown);
    let mut countdown_armed = engine.competition_remaining_ms().is_some();

    let mut frame = interval(Duration::from_secs_f32(frame_delta_ms() / 1000.0));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();
    let mut frames = 0u64;

    loop {
        tokio::select! {
            _ = frame.tick() => {
                let now = Instant::now();
                let dt_ms = now.duration_since(last_frame).as_secs_f32() * 1000.0;
                last_frame = now;

                let aim = aim_point(HEADLESS_VIEWPORT, now.duration_since(started));
                engine.set_cursor(aim.x, aim.y);
                engine.update(dt_ms);
                frames += 1;

                if matches!(engine.state(), EngineState::GameOver | EngineState::CompetitionEnded) {
                    break;
                }
            }
            inbound = ws_stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => engine.handle_server_message(&text),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("relay closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "relay read failed");
                        break;
                    }
                }
            }
            _ = &mut countdown, if countdown_armed => {
                countdown_armed = false;
                engine.signal_time_up();
            }
            _ = &mut session_deadline => {
                info!(frames, "session time cap reached");
                break;
            }
        }
    }

    let player_id = engine.player_id().to_string();
    engine.stop();
    // Dropping the engine drops the sender, which ends the writer
    drop(engine);
    if let Err(e) = writer.await {
        debug!(error = %e, "writer task ended abnormally");
    }

    let observed = std::mem::take(&mut *observed.lock());
    Ok(SessionReport {
        player_id,
        frames,
        game_over: observed.game_over,
        last_stats: observed.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aim_sweeps_around_centre() {
        let viewport = Viewport::new(800.0, 600.0);
        let start = aim_point(viewport, Duration::ZERO);
        assert_eq!(start, Vector2::new(600.0, 300.0));

        // A quarter turn takes one second
        let quarter = aim_point(viewport, Duration::from_secs(1));
        assert!((quarter.x - 400.0).abs() < 1e-2);
        assert!((quarter.y - 500.0).abs() < 1e-2);

        for ms in (0..10_000).step_by(137) {
            let p = aim_point(viewport, Duration::from_millis(ms));
            assert!((p.distance(viewport.center()) - AIM_RADIUS).abs() < 1e-2);
        }
    }

    #[test]
    fn default_session_is_endless() {
        let config = SessionConfig::default();
        assert!(!config.is_competition());
        assert_eq!(config.tank_class, TankClass::Basic);
    }
}
