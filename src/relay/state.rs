//! Relay state machine: room membership, fan-out and cleanup
//!
//! Every operation runs to completion against plain maps owned by the hub
//! task, and takes the current time explicitly. Rooms and connections may
//! disappear between operations, so every lookup is re-validated.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::game::entity::{TankClass, TankId};
use crate::util::id::random_token;
use crate::ws::protocol::{ChatEntry, ChatKind, ClientMsg, PlayerPatch, ServerMsg, ShotFired};

use super::room::{system_message, Room, RoomId};

pub type ConnId = String;

/// Outbound queue of one connection (pre-encoded JSON frames)
pub type Outbox = mpsc::Sender<String>;

/// A live connection
#[derive(Debug)]
pub struct ClientConn {
    pub tx: Outbox,
    /// Tank id inside `room_id`, once joined
    pub tank_id: Option<TankId>,
    pub player_name: String,
    pub room_id: Option<RoomId>,
    pub last_seen: u64,
}

/// Aggregate numbers shown by `serverStats` and `/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub online_players: usize,
    pub active_games: usize,
    pub rooms: usize,
}

/// All relay state
pub struct RelayState {
    config: RelayConfig,
    rooms: HashMap<RoomId, Room>,
    clients: HashMap<ConnId, ClientConn>,
    rng: ChaCha8Rng,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_rng(config, ChaCha8Rng::from_entropy())
    }

    pub fn with_rng(config: RelayConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            clients: HashMap::new(),
            rng,
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            online_players: self.clients.len(),
            active_games: self.rooms.values().filter(|room| !room.is_empty()).count(),
            rooms: self.rooms.len(),
        }
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn client(&self, id: &str) -> Option<&ClientConn> {
        self.clients.get(id)
    }

    fn stats_msg(&self) -> ServerMsg {
        let stats = self.stats();
        ServerMsg::ServerStats {
            online_players: stats.online_players,
            active_games: stats.active_games,
            servers: 1,
        }
    }

    /// Register a connection; acks with its id and the current stats
    pub fn connect(&mut self, conn_id: ConnId, tx: Outbox, now: u64) {
        info!(conn_id = %conn_id, "new connection");
        self.clients.insert(
            conn_id.clone(),
            ClientConn {
                tx,
                tank_id: None,
                player_name: String::new(),
                room_id: None,
                last_seen: now,
            },
        );

        let connected = ServerMsg::Connected {
            player_id: conn_id.clone(),
            server_time: now,
        };
        self.send_to(&conn_id, &connected);
        let stats = self.stats_msg();
        self.send_to(&conn_id, &stats);
    }

    /// Refresh liveness for any inbound frame
    pub fn touch(&mut self, conn_id: &str, now: u64) {
        if let Some(client) = self.clients.get_mut(conn_id) {
            client.last_seen = now;
        }
    }

    /// Dispatch one decoded client message
    pub fn handle(&mut self, conn_id: &str, msg: ClientMsg, now: u64) {
        if !self.clients.contains_key(conn_id) {
            debug!(conn_id = %conn_id, "message from unknown connection");
            return;
        }
        self.touch(conn_id, now);

        match msg {
            ClientMsg::Join {
                player_id,
                player_name,
                tank_class,
                game_mode,
            } => self.join(conn_id, player_id, player_name, tank_class, &game_mode, now),
            ClientMsg::Leave { .. } => self.leave_room(conn_id, now),
            ClientMsg::PlayerUpdate(patch) => self.player_update(conn_id, patch, now),
            ClientMsg::Shoot(shot) => self.shoot(conn_id, shot, now),
            ClientMsg::Chat {
                player_name,
                message,
                ..
            } => self.chat(conn_id, player_name, message, now),
            ClientMsg::Ping { .. } => {
                self.send_to(conn_id, &ServerMsg::Pong { timestamp: now });
            }
            ClientMsg::PlayerUpgrade { upgrade_type, .. } => self.upgrade(conn_id, upgrade_type),
        }
    }

    fn join(
        &mut self,
        conn_id: &str,
        requested_id: Option<TankId>,
        player_name: String,
        tank_class: TankClass,
        game_mode: &str,
        now: u64,
    ) {
        if player_name.trim().is_empty() || game_mode.is_empty() {
            debug!(conn_id = %conn_id, "join without name or mode ignored");
            return;
        }

        // Re-joining moves the player out of the old room first
        self.leave_room(conn_id, now);

        let tank_id = match requested_id {
            Some(id) if !id.is_empty() && !self.tank_id_taken(&id) => id,
            _ => conn_id.to_string(),
        };

        let room_id = self.find_or_create_room(now);
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let tank = room.spawn_tank(tank_id.clone(), player_name.clone(), tank_class, now, &mut self.rng);
        let player_count = room.tanks.len();

        let entry = system_message(
            random_token(&mut self.rng),
            format!("{player_name} joined the battle!"),
            now,
        );
        room.push_chat(entry.clone());

        if let Some(client) = self.clients.get_mut(conn_id) {
            client.room_id = Some(room_id.clone());
            client.tank_id = Some(tank_id.clone());
            client.player_name = player_name.clone();
        }

        info!(conn_id = %conn_id, tank_id = %tank_id, room_id = %room_id, game_mode, "player joined");
        self.broadcast(&room_id, &ServerMsg::PlayerJoined { player: tank, player_count }, None);
        self.broadcast(&room_id, &ServerMsg::ChatMessage { message: entry }, None);
    }

    fn tank_id_taken(&self, id: &str) -> bool {
        self.rooms.values().any(|room| room.tanks.contains_key(id))
    }

    fn find_or_create_room(&mut self, now: u64) -> RoomId {
        let capacity = self.config.room_capacity;
        if let Some(room) = self.rooms.values_mut().find(|room| room.has_space(capacity)) {
            room.last_activity = now;
            return room.id.clone();
        }

        let id = random_token(&mut self.rng);
        info!(room_id = %id, "room created");
        self.rooms.insert(id.clone(), Room::new(id.clone(), now));
        id
    }

    /// Remove the connection's tank from its room, keeping the connection
    fn leave_room(&mut self, conn_id: &str, now: u64) {
        let Some(client) = self.clients.get_mut(conn_id) else {
            return;
        };
        let (Some(room_id), Some(tank_id)) = (client.room_id.take(), client.tank_id.take()) else {
            return;
        };

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let Some(removed) = room.tanks.remove(&tank_id) else {
            return;
        };
        let player_count = room.tanks.len();

        let entry = system_message(
            random_token(&mut self.rng),
            format!("{} left the battle!", removed.tank.name),
            now,
        );
        room.push_chat(entry.clone());
        let now_empty = room.is_empty();

        info!(conn_id = %conn_id, tank_id = %tank_id, room_id = %room_id, "player left");
        self.broadcast(&room_id, &ServerMsg::PlayerLeft { player_id: tank_id, player_count }, None);
        self.broadcast(&room_id, &ServerMsg::ChatMessage { message: entry }, None);

        if now_empty {
            self.rooms.remove(&room_id);
            info!(room_id = %room_id, "cleaned up empty room");
        }
    }

    /// Connection closed or timed out
    pub fn disconnect(&mut self, conn_id: &str, now: u64) {
        self.leave_room(conn_id, now);
        if self.clients.remove(conn_id).is_some() {
            info!(conn_id = %conn_id, "connection closed");
        }
    }

    /// Joined connection's (room, tank) if both still exist
    fn membership(&self, conn_id: &str) -> Option<(RoomId, TankId)> {
        let client = self.clients.get(conn_id)?;
        let room_id = client.room_id.clone()?;
        let tank_id = client.tank_id.clone()?;
        self.rooms.contains_key(&room_id).then_some((room_id, tank_id))
    }

    fn player_update(&mut self, conn_id: &str, mut patch: PlayerPatch, now: u64) {
        let Some((room_id, tank_id)) = self.membership(conn_id) else {
            return;
        };
        patch.player_id = tank_id;

        let applied = self
            .rooms
            .get_mut(&room_id)
            .is_some_and(|room| room.apply_patch(&patch, now));
        if applied {
            self.broadcast(&room_id, &ServerMsg::PlayerUpdate(patch), Some(conn_id));
        }
    }

    fn shoot(&mut self, conn_id: &str, shot: ShotFired, now: u64) {
        let Some((room_id, tank_id)) = self.membership(conn_id) else {
            return;
        };
        let bullet_id = random_token(&mut self.rng);
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let bullet = room.record_shot(bullet_id, tank_id, &shot, now);
        self.broadcast(&room_id, &ServerMsg::BulletFired { bullet }, None);
    }

    fn chat(&mut self, conn_id: &str, player_name: Option<String>, message: String, now: u64) {
        if message.is_empty() {
            return;
        }
        let Some(client) = self.clients.get(conn_id) else {
            return;
        };
        let Some(room_id) = client.room_id.clone() else {
            return;
        };
        let player_name = player_name.unwrap_or_else(|| client.player_name.clone());

        let entry = ChatEntry {
            id: random_token(&mut self.rng),
            player_name,
            message,
            timestamp: now,
            kind: ChatKind::Chat,
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        room.push_chat(entry.clone());
        self.broadcast(&room_id, &ServerMsg::ChatMessage { message: entry }, None);
    }

    fn upgrade(&mut self, conn_id: &str, upgrade_type: String) {
        let Some((room_id, tank_id)) = self.membership(conn_id) else {
            return;
        };
        let msg = ServerMsg::PlayerUpgrade {
            player_id: tank_id,
            upgrade_type,
        };
        self.broadcast(&room_id, &msg, Some(conn_id));
    }

    /// Periodic room tick: age bullets and push a bulk resync
    pub fn tick(&mut self, now: u64) {
        let ttl = self.config.bullet_ttl_ms;
        let dt = self.config.tick_secs();

        let mut updates = Vec::new();
        for room in self.rooms.values_mut() {
            if room.is_empty() {
                continue;
            }
            room.advance_bullets(now, ttl, dt);
            room.last_activity = now;
            updates.push((
                room.id.clone(),
                ServerMsg::GameStateUpdate {
                    tanks: room.tank_list(),
                    bullets: room.bullet_list(),
                    timestamp: now,
                },
            ));
        }

        for (room_id, msg) in updates {
            self.broadcast(&room_id, &msg, None);
        }
    }

    /// Drop silent connections and idle rooms
    pub fn sweep(&mut self, now: u64) {
        let timeout = self.config.connection_timeout.as_millis() as u64;
        let stale: Vec<ConnId> = self
            .clients
            .iter()
            .filter(|(_, client)| now.saturating_sub(client.last_seen) > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for conn_id in stale {
            info!(conn_id = %conn_id, "cleaning up inactive client");
            self.disconnect(&conn_id, now);
        }

        let idle = self.config.room_idle_timeout.as_millis() as u64;
        self.rooms.retain(|room_id, room| {
            let keep = now.saturating_sub(room.last_activity) <= idle;
            if !keep {
                info!(room_id = %room_id, "cleaning up inactive room");
            }
            keep
        });
    }

    /// Push aggregate stats to every connection
    pub fn broadcast_stats(&self) {
        let stats = self.stats();
        info!(
            online_players = stats.online_players,
            rooms = stats.rooms,
            active_games = stats.active_games,
            "server stats"
        );
        for room in self.rooms.values() {
            debug!(room_id = %room.id, players = room.tanks.len(), bullets = room.bullets.len(), "room");
        }

        let Some(frame) = encode(&self.stats_msg()) else {
            return;
        };
        for (conn_id, client) in &self.clients {
            deliver(conn_id, client, &frame);
        }
    }

    fn send_to(&self, conn_id: &str, msg: &ServerMsg) {
        let (Some(client), Some(frame)) = (self.clients.get(conn_id), encode(msg)) else {
            return;
        };
        deliver(conn_id, client, &frame);
    }

    /// Fan out to every member of `room_id` except `exclude`
    fn broadcast(&self, room_id: &str, msg: &ServerMsg, exclude: Option<&str>) {
        let Some(frame) = encode(msg) else {
            return;
        };
        for (conn_id, client) in &self.clients {
            if client.room_id.as_deref() != Some(room_id) || exclude == Some(conn_id.as_str()) {
                continue;
            }
            deliver(conn_id, client, &frame);
        }
    }
}

fn encode(msg: &ServerMsg) -> Option<String> {
    match msg.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "failed to encode server message");
            None
        }
    }
}

/// Queue a frame; a full or closed outbox is logged and skipped
fn deliver(conn_id: &str, client: &ClientConn, frame: &str) {
    if let Err(e) = client.tx.try_send(frame.to_string()) {
        warn!(conn_id = %conn_id, error = %e, "failed to queue message for client");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::Vector2;
    use std::time::Duration;

    struct Peer {
        id: ConnId,
        rx: mpsc::Receiver<String>,
    }

    impl Peer {
        fn drain(&mut self) -> Vec<ServerMsg> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(ServerMsg::decode(&frame).unwrap());
            }
            out
        }
    }

    fn relay() -> RelayState {
        RelayState::with_rng(RelayConfig::default(), ChaCha8Rng::seed_from_u64(1))
    }

    fn connect(state: &mut RelayState, id: &str, now: u64) -> Peer {
        let (tx, rx) = mpsc::channel(256);
        state.connect(id.to_string(), tx, now);
        Peer { id: id.to_string(), rx }
    }

    fn join(state: &mut RelayState, peer: &Peer, player_id: &str, now: u64) {
        state.handle(
            &peer.id,
            ClientMsg::Join {
                player_id: Some(player_id.to_string()),
                player_name: format!("name-{player_id}"),
                tank_class: TankClass::Basic,
                game_mode: "endless".into(),
            },
            now,
        );
    }

    #[test]
    fn connect_acks_with_id_and_stats() {
        let mut state = relay();
        let mut peer = connect(&mut state, "c1", 5);
        let msgs = peer.drain();
        assert_eq!(
            msgs[0],
            ServerMsg::Connected {
                player_id: "c1".into(),
                server_time: 5
            }
        );
        assert!(matches!(msgs[1], ServerMsg::ServerStats { online_players: 1, active_games: 0, .. }));
    }

    #[test]
    fn join_keys_tank_by_client_id_and_announces() {
        let mut state = relay();
        let mut a = connect(&mut state, "c1", 0);
        join(&mut state, &a, "alpha", 0);

        let msgs = a.drain();
        let joined = msgs
            .iter()
            .find_map(|m| match m {
                ServerMsg::PlayerJoined { player, player_count } => Some((player.id.clone(), *player_count)),
                _ => None,
            })
            .unwrap();
        assert_eq!(joined, ("alpha".to_string(), 1));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::ChatMessage { message } if message.kind == ChatKind::System
                && message.message == "name-alpha joined the battle!"
        )));
        assert_eq!(state.stats().active_games, 1);
    }

    #[test]
    fn duplicate_client_id_falls_back_to_connection_id() {
        let mut state = relay();
        let a = connect(&mut state, "c1", 0);
        let b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "same", 0);
        join(&mut state, &b, "same", 0);
        assert_eq!(state.client("c2").unwrap().tank_id.as_deref(), Some("c2"));
    }

    #[test]
    fn rooms_fill_to_capacity_before_new_one() {
        let mut state = relay();
        let mut peers = Vec::new();
        for i in 0..11 {
            let peer = connect(&mut state, &format!("c{i}"), 0);
            join(&mut state, &peer, &format!("p{i}"), 0);
            peers.push(peer);
        }
        assert_eq!(state.stats().rooms, 2);
        let first = state.client("c0").unwrap().room_id.clone();
        let last = state.client("c10").unwrap().room_id.clone();
        assert_ne!(first, last);
        for i in 0..10 {
            assert_eq!(state.client(&format!("c{i}")).unwrap().room_id, first);
        }
    }

    #[test]
    fn player_update_goes_to_others_only() {
        let mut state = relay();
        let mut a = connect(&mut state, "c1", 0);
        let mut b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "alpha", 0);
        join(&mut state, &b, "beta", 0);
        a.drain();
        b.drain();

        let patch = PlayerPatch {
            player_id: "whatever".into(),
            position: Some(Vector2::new(5.0, 6.0)),
            ..Default::default()
        };
        state.handle("c1", ClientMsg::PlayerUpdate(patch), 10);

        assert!(a.drain().is_empty());
        let got = b.drain();
        assert_eq!(got.len(), 1);
        match &got[0] {
            ServerMsg::PlayerUpdate(p) => {
                assert_eq!(p.player_id, "alpha");
                assert_eq!(p.position, Some(Vector2::new(5.0, 6.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
        let room_id = state.client("c1").unwrap().room_id.clone().unwrap();
        assert_eq!(state.room(&room_id).unwrap().tanks["alpha"].tank.position, Vector2::new(5.0, 6.0));
    }

    #[test]
    fn shots_are_echoed_to_whole_room() {
        let mut state = relay();
        let mut a = connect(&mut state, "c1", 0);
        let mut b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "alpha", 0);
        join(&mut state, &b, "beta", 0);
        a.drain();
        b.drain();

        let shot = ShotFired {
            player_id: Some("alpha".into()),
            position: Vector2::ZERO,
            velocity: Vector2::new(800.0, 0.0),
            damage: Some(70.0),
            size: None,
            color: None,
        };
        state.handle("c1", ClientMsg::Shoot(shot), 1);

        for peer in [&mut a, &mut b] {
            let msgs = peer.drain();
            assert!(msgs.iter().any(|m| matches!(
                m,
                ServerMsg::BulletFired { bullet } if bullet.owner_id == "alpha" && bullet.damage == 70.0 && bullet.size == 6.0
            )));
        }
    }

    #[test]
    fn ping_answers_pong() {
        let mut state = relay();
        let mut a = connect(&mut state, "c1", 0);
        a.drain();
        state.handle("c1", ClientMsg::Ping { timestamp: Some(1) }, 42);
        assert_eq!(a.drain(), vec![ServerMsg::Pong { timestamp: 42 }]);
    }

    #[test]
    fn leave_keeps_connection_and_removes_empty_room() {
        let mut state = relay();
        let a = connect(&mut state, "c1", 0);
        join(&mut state, &a, "alpha", 0);
        state.handle("c1", ClientMsg::Leave { player_id: None }, 1);
        assert!(state.client("c1").is_some());
        assert_eq!(state.stats().rooms, 0);
    }

    #[test]
    fn disconnect_notifies_remaining_members() {
        let mut state = relay();
        let a = connect(&mut state, "c1", 0);
        let mut b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "alpha", 0);
        join(&mut state, &b, "beta", 0);
        b.drain();

        state.disconnect("c1", 5);
        let msgs = b.drain();
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::PlayerLeft { player_id, player_count: 1 } if player_id == "alpha"
        )));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMsg::ChatMessage { message } if message.message == "name-alpha left the battle!"
        )));
        assert_eq!(state.stats().online_players, 1);
    }

    #[test]
    fn one_dead_peer_does_not_stop_broadcast() {
        let mut state = relay();
        let a = connect(&mut state, "c1", 0);
        let mut b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "alpha", 0);
        join(&mut state, &b, "beta", 0);
        b.drain();
        drop(a);

        state.tick(16);
        assert!(b.drain().iter().any(|m| matches!(m, ServerMsg::GameStateUpdate { tanks, .. } if tanks.len() == 2)));
    }

    #[test]
    fn sweep_drops_silent_connections_but_not_chatty_ones() {
        let mut state = relay();
        let a = connect(&mut state, "c1", 0);
        let b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "alpha", 0);
        join(&mut state, &b, "beta", 0);

        // Any frame counts as liveness
        state.handle("c2", ClientMsg::Chat { player_name: None, message: "hi".into(), player_id: None }, 25_000);

        state.sweep(31_000);
        assert!(state.client("c1").is_none());
        assert!(state.client("c2").is_some());
        assert_eq!(state.stats().online_players, 1);
    }

    #[test]
    fn idle_rooms_are_swept() {
        let mut state = RelayState::with_rng(
            RelayConfig {
                room_idle_timeout: Duration::from_secs(60),
                connection_timeout: Duration::from_secs(3600),
                ..RelayConfig::default()
            },
            ChaCha8Rng::seed_from_u64(2),
        );
        let a = connect(&mut state, "c1", 0);
        join(&mut state, &a, "alpha", 0);
        state.tick(1_000);
        state.sweep(30_000);
        assert_eq!(state.stats().rooms, 1);
        state.sweep(70_000);
        assert_eq!(state.stats().rooms, 0);

        // Stale membership is tolerated
        state.handle(
            "c1",
            ClientMsg::PlayerUpdate(PlayerPatch {
                player_id: "alpha".into(),
                ..Default::default()
            }),
            70_001,
        );
        state.tick(70_016);
    }

    #[test]
    fn upgrade_alias_is_rebroadcast() {
        let mut state = relay();
        let a = connect(&mut state, "c1", 0);
        let mut b = connect(&mut state, "c2", 0);
        join(&mut state, &a, "alpha", 0);
        join(&mut state, &b, "beta", 0);
        b.drain();

        let msg = ClientMsg::decode(r#"{"type":"upgrade","upgradeType":"damage"}"#).unwrap();
        state.handle("c1", msg, 3);
        assert_eq!(
            b.drain(),
            vec![ServerMsg::PlayerUpgrade {
                player_id: "alpha".into(),
                upgrade_type: "damage".into()
            }]
        );
    }
}
