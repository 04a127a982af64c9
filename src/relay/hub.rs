//! Relay actor: owns all room state and runs the periodic loops

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::util::time::unix_millis;
use crate::ws::protocol::ClientMsg;

use super::state::{ConnId, Outbox, RelayState, RelayStats};

/// Command queue depth for the hub
const COMMAND_BUFFER: usize = 1024;

/// Work sent to the hub by connection tasks
#[derive(Debug)]
pub enum RelayCommand {
    Connect { conn_id: ConnId, tx: Outbox },
    Frame { conn_id: ConnId, msg: ClientMsg },
    /// Undecodable frame; still counts as liveness
    Touch { conn_id: ConnId },
    Disconnect { conn_id: ConnId },
}

/// Cloneable handle used by the HTTP and WebSocket layers
#[derive(Clone)]
pub struct RelayHandle {
    command_tx: mpsc::Sender<RelayCommand>,
    stats: Arc<RwLock<RelayStats>>,
}

impl RelayHandle {
    /// Latest published stats
    pub fn stats(&self) -> RelayStats {
        *self.stats.read()
    }

    pub async fn connect(&self, conn_id: ConnId, tx: Outbox) {
        self.send(RelayCommand::Connect { conn_id, tx }).await;
    }

    pub async fn frame(&self, conn_id: ConnId, msg: ClientMsg) {
        self.send(RelayCommand::Frame { conn_id, msg }).await;
    }

    pub async fn touch(&self, conn_id: ConnId) {
        self.send(RelayCommand::Touch { conn_id }).await;
    }

    pub async fn disconnect(&self, conn_id: ConnId) {
        self.send(RelayCommand::Disconnect { conn_id }).await;
    }

    async fn send(&self, command: RelayCommand) {
        if self.command_tx.send(command).await.is_err() {
            warn!("relay hub is not running");
        }
    }
}

/// The relay actor
pub struct RelayHub {
    state: RelayState,
    config: RelayConfig,
    command_rx: mpsc::Receiver<RelayCommand>,
    stats: Arc<RwLock<RelayStats>>,
}

impl RelayHub {
    pub fn new(config: RelayConfig) -> (Self, RelayHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let stats = Arc::new(RwLock::new(RelayStats::default()));

        let handle = RelayHandle {
            command_tx,
            stats: stats.clone(),
        };
        let hub = Self {
            state: RelayState::new(config.clone()),
            config,
            command_rx,
            stats,
        };
        (hub, handle)
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!(
            tick_hz = self.config.tick_hz,
            room_capacity = self.config.room_capacity,
            "Relay hub started"
        );

        let mut tick = interval(self.config.tick_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = interval(self.config.stats_interval);
        stats.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.apply(command);
                }
                _ = tick.tick() => {
                    self.state.tick(unix_millis());
                }
                _ = sweep.tick() => {
                    self.state.sweep(unix_millis());
                }
                _ = stats.tick() => {
                    self.state.broadcast_stats();
                }
            }
            self.publish();
        }

        info!("Relay hub stopped");
    }

    fn apply(&mut self, command: RelayCommand) {
        let now = unix_millis();
        match command {
            RelayCommand::Connect { conn_id, tx } => self.state.connect(conn_id, tx, now),
            RelayCommand::Frame { conn_id, msg } => self.state.handle(&conn_id, msg, now),
            RelayCommand::Touch { conn_id } => {
                debug!(conn_id = %conn_id, "undecodable frame");
                self.state.touch(&conn_id, now);
            }
            RelayCommand::Disconnect { conn_id } => self.state.disconnect(&conn_id, now),
        }
    }

    fn publish(&self) {
        let current = self.state.stats();
        let mut published = self.stats.write();
        if *published != current {
            *published = current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::TankClass;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;

    #[tokio::test]
    async fn handle_reaches_running_hub() {
        let (hub, handle) = RelayHub::new(RelayConfig::default());
        tokio::spawn(hub.run());

        let (tx, mut rx) = mpsc::channel(64);
        handle.connect("c1".into(), tx).await;
        handle
            .frame(
                "c1".into(),
                ClientMsg::Join {
                    player_id: Some("p1".into()),
                    player_name: "Ace".into(),
                    tank_class: TankClass::Basic,
                    game_mode: "endless".into(),
                },
            )
            .await;

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ServerMsg::decode(&first).unwrap(), ServerMsg::Connected { .. }));

        let mut joined = false;
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            if matches!(ServerMsg::decode(&frame).unwrap(), ServerMsg::PlayerJoined { .. }) {
                joined = true;
                break;
            }
        }
        assert!(joined);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stats().online_players, 1);
        assert_eq!(handle.stats().active_games, 1);

        handle.disconnect("c1".into()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stats().online_players, 0);
    }
}
