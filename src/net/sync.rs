//! Bridges local simulation state to and from the wire protocol.
//!
//! Outbound traffic is a throttled `playerUpdate` stream plus event-driven
//! `shoot`/`join`/`leave`. Inbound frames are merged into the world table
//! with last-message-wins semantics; the local player is never overwritten.

use tracing::{debug, trace};

use crate::game::entity::{Bullet, Tank, TankClass, TankId, TankKind, WorldState};
use crate::ws::protocol::{ChatEntry, ClientMsg, PlayerPatch, ServerMsg, ShotFired};

/// Interval between outbound `playerUpdate` frames (20 Hz)
pub const PLAYER_UPDATE_INTERVAL_MS: u64 = 50;

/// Outbound transport. Fire-and-forget: implementations drop messages they
/// cannot deliver.
pub type MessageSender = Box<dyn FnMut(ClientMsg) + Send>;

/// Fixed-interval gate decoupled from the frame rate
#[derive(Debug, Clone)]
pub struct UpdateThrottle {
    interval_ms: u64,
    last_sent: Option<u64>,
}

impl UpdateThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent: None,
        }
    }

    /// Check if it's time to send, and mark the send if so
    pub fn should_send(&mut self, now: u64) -> bool {
        let due = self
            .last_sent
            .map_or(true, |last| now.saturating_sub(last) > self.interval_ms);
        if due {
            self.last_sent = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Inbound effects the engine forwards to collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Nothing beyond world-table changes
    None,
    Chat(ChatEntry),
    Connected { player_id: String },
    ServerStats { online_players: usize, active_games: usize },
}

/// Client side of the synchronization protocol
pub struct NetworkSync {
    local_id: TankId,
    sender: Option<MessageSender>,
    throttle: UpdateThrottle,
    joined: bool,
}

impl NetworkSync {
    pub fn new(local_id: TankId, sender: Option<MessageSender>) -> Self {
        Self {
            local_id,
            sender,
            throttle: UpdateThrottle::new(PLAYER_UPDATE_INTERVAL_MS),
            joined: false,
        }
    }

    pub fn local_id(&self) -> &TankId {
        &self.local_id
    }

    /// Adopt a new local identity (restart generates a fresh id)
    pub fn set_local_id(&mut self, id: TankId) {
        self.local_id = id;
        self.throttle.reset();
    }

    pub fn has_transport(&self) -> bool {
        self.sender.is_some()
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    fn send(&mut self, msg: ClientMsg) {
        match self.sender.as_mut() {
            Some(sender) => sender(msg),
            None => trace!("no transport, dropping outbound message"),
        }
    }

    pub fn join(&mut self, player_name: &str, tank_class: TankClass, game_mode: &str) {
        let msg = ClientMsg::Join {
            player_id: Some(self.local_id.clone()),
            player_name: player_name.to_string(),
            tank_class,
            game_mode: game_mode.to_string(),
        };
        self.send(msg);
        self.joined = true;
    }

    /// Announce departure once; repeated calls are no-ops
    pub fn leave(&mut self) {
        if !self.joined {
            return;
        }
        let msg = ClientMsg::Leave {
            player_id: Some(self.local_id.clone()),
        };
        self.send(msg);
        self.joined = false;
        self.throttle.reset();
    }

    /// Send the local player's state if the update interval elapsed
    pub fn maybe_send_player_update(&mut self, now: u64, player: &Tank) -> bool {
        if !self.throttle.should_send(now) {
            return false;
        }
        self.send(ClientMsg::PlayerUpdate(PlayerPatch::from_tank(player)));
        true
    }

    /// Echo a local shot immediately
    pub fn on_local_shot(&mut self, bullet: &Bullet) {
        let msg = ClientMsg::Shoot(ShotFired {
            player_id: Some(self.local_id.clone()),
            position: bullet.position,
            velocity: bullet.velocity,
            damage: Some(bullet.damage),
            size: Some(bullet.size),
            color: Some(bullet.color.clone()),
        });
        self.send(msg);
    }

    pub fn send_upgrade(&mut self, upgrade_type: &str) {
        let msg = ClientMsg::PlayerUpgrade {
            player_id: Some(self.local_id.clone()),
            upgrade_type: upgrade_type.to_string(),
        };
        self.send(msg);
    }

    pub fn send_chat(&mut self, player_name: &str, message: &str) {
        let msg = ClientMsg::Chat {
            player_name: Some(player_name.to_string()),
            message: message.to_string(),
            player_id: Some(self.local_id.clone()),
        };
        self.send(msg);
    }

    /// Merge one inbound message into `world`
    pub fn apply(&self, msg: ServerMsg, world: &mut WorldState) -> SyncEvent {
        match msg {
            ServerMsg::PlayerJoined { player, .. } => {
                self.upsert_remote(world, player);
                SyncEvent::None
            }
            ServerMsg::GameStateUpdate { tanks, bullets, .. } => {
                for tank in tanks {
                    self.upsert_remote(world, tank);
                }
                self.replace_remote_bullets(world, bullets);
                SyncEvent::None
            }
            ServerMsg::PlayerUpdate(patch) => {
                if patch.player_id == self.local_id {
                    return SyncEvent::None;
                }
                match world.tanks.get_mut(&patch.player_id) {
                    Some(tank) if !tank.is_bot() => patch.apply_to(tank),
                    _ => trace!(player_id = %patch.player_id, "update for unknown tank ignored"),
                }
                SyncEvent::None
            }
            ServerMsg::BulletFired { bullet } => {
                if bullet.owner_id != self.local_id {
                    world.bullets.retain(|b| b.id != bullet.id);
                    world.bullets.push(bullet);
                }
                SyncEvent::None
            }
            ServerMsg::PlayerLeft { player_id, .. } => {
                if player_id != self.local_id {
                    let is_remote = world.tanks.get(&player_id).is_some_and(|t| !t.is_bot());
                    if is_remote {
                        world.tanks.remove(&player_id);
                    }
                }
                SyncEvent::None
            }
            ServerMsg::ChatMessage { message } => SyncEvent::Chat(message),
            ServerMsg::Connected { player_id, .. } => SyncEvent::Connected { player_id },
            ServerMsg::ServerStats {
                online_players,
                active_games,
                ..
            } => SyncEvent::ServerStats {
                online_players,
                active_games,
            },
            ServerMsg::Pong { timestamp } => {
                trace!(timestamp, "pong");
                SyncEvent::None
            }
            ServerMsg::PlayerUpgrade {
                player_id,
                upgrade_type,
            } => {
                debug!(player_id = %player_id, upgrade_type = %upgrade_type, "remote upgrade");
                SyncEvent::None
            }
        }
    }

    fn upsert_remote(&self, world: &mut WorldState, mut tank: Tank) {
        if tank.id == self.local_id {
            return;
        }
        if world.tanks.get(&tank.id).is_some_and(|t| t.is_bot()) {
            return;
        }
        tank.kind = TankKind::Player;
        world.tanks.insert(tank.id.clone(), tank);
    }

    /// Keep locally simulated bullets (ours and our bots'), take the rest from the relay
    fn replace_remote_bullets(&self, world: &mut WorldState, bullets: Vec<Bullet>) {
        let tanks = &world.tanks;
        let local_id = &self.local_id;
        world.bullets.retain(|bullet| {
            &bullet.owner_id == local_id || tanks.get(&bullet.owner_id).is_some_and(|t| t.is_bot())
        });
        world
            .bullets
            .extend(bullets.into_iter().filter(|bullet| &bullet.owner_id != local_id));
    }
}

impl std::fmt::Debug for NetworkSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSync")
            .field("local_id", &self.local_id)
            .field("has_transport", &self.sender.is_some())
            .field("joined", &self.joined)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::Vector2;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn tank(id: &str, kind: TankKind) -> Tank {
        Tank {
            id: id.into(),
            name: id.into(),
            position: Vector2::new(10.0, 10.0),
            rotation: 0.0,
            health: 1000.0,
            max_health: 1000.0,
            score: 0,
            level: 1,
            kills: 0,
            tank_class: TankClass::Basic,
            color: "#4A90E2".into(),
            kind,
        }
    }

    fn bullet(id: &str, owner: &str) -> Bullet {
        Bullet {
            id: id.into(),
            position: Vector2::ZERO,
            velocity: Vector2::new(1.0, 0.0),
            damage: 30.0,
            owner_id: owner.into(),
            size: 6.0,
            color: "#FFFF00".into(),
        }
    }

    fn recording_sync(local: &str) -> (NetworkSync, Arc<Mutex<Vec<ClientMsg>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let sender: MessageSender = Box::new(move |msg| sink.lock().push(msg));
        (NetworkSync::new(local.into(), Some(sender)), sent)
    }

    #[test]
    fn echo_of_local_player_is_ignored() {
        let (sync, _) = recording_sync("me");
        let mut world = WorldState::default();
        world.tanks.insert("me".into(), tank("me", TankKind::Player));

        let patch = PlayerPatch {
            player_id: "me".into(),
            position: Some(Vector2::new(999.0, 999.0)),
            health: Some(1.0),
            ..Default::default()
        };
        sync.apply(ServerMsg::PlayerUpdate(patch), &mut world);

        let me = &world.tanks["me"];
        assert_eq!(me.position, Vector2::new(10.0, 10.0));
        assert_eq!(me.health, 1000.0);
    }

    #[test]
    fn player_update_patches_only_present_fields_of_known_tanks() {
        let (sync, _) = recording_sync("me");
        let mut world = WorldState::default();
        world.tanks.insert("other".into(), tank("other", TankKind::Player));

        let patch = PlayerPatch {
            player_id: "other".into(),
            kills: Some(4),
            ..Default::default()
        };
        sync.apply(ServerMsg::PlayerUpdate(patch), &mut world);
        assert_eq!(world.tanks["other"].kills, 4);
        assert_eq!(world.tanks["other"].position, Vector2::new(10.0, 10.0));

        let stranger = PlayerPatch {
            player_id: "stranger".into(),
            kills: Some(1),
            ..Default::default()
        };
        sync.apply(ServerMsg::PlayerUpdate(stranger), &mut world);
        assert!(!world.tanks.contains_key("stranger"));
    }

    #[test]
    fn joined_and_left_skip_local_player() {
        let (sync, _) = recording_sync("me");
        let mut world = WorldState::default();
        world.tanks.insert("me".into(), tank("me", TankKind::Player));

        let mut ghost = tank("me", TankKind::Player);
        ghost.health = 1.0;
        sync.apply(ServerMsg::PlayerJoined { player: ghost, player_count: 2 }, &mut world);
        sync.apply(
            ServerMsg::PlayerJoined {
                player: tank("other", TankKind::Player),
                player_count: 2,
            },
            &mut world,
        );
        assert_eq!(world.tanks["me"].health, 1000.0);
        assert!(world.tanks.contains_key("other"));

        sync.apply(ServerMsg::PlayerLeft { player_id: "me".into(), player_count: 1 }, &mut world);
        sync.apply(ServerMsg::PlayerLeft { player_id: "other".into(), player_count: 1 }, &mut world);
        assert!(world.tanks.contains_key("me"));
        assert!(!world.tanks.contains_key("other"));
    }

    #[test]
    fn bulk_resync_keeps_local_bullets_and_replaces_remote_ones() {
        let (sync, _) = recording_sync("me");
        let mut world = WorldState::default();
        world.tanks.insert("bot_x".into(), tank("bot_x", TankKind::Bot));
        world.bullets = vec![bullet("mine", "me"), bullet("bots", "bot_x"), bullet("stale", "other")];

        sync.apply(
            ServerMsg::GameStateUpdate {
                tanks: vec![tank("me", TankKind::Player), tank("other", TankKind::Player)],
                bullets: vec![bullet("mine-echo", "me"), bullet("fresh", "other")],
                timestamp: 1,
            },
            &mut world,
        );

        let mut ids: Vec<_> = world.bullets.iter().map(|b| b.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["bots", "fresh", "mine"]);
        assert!(world.tanks.contains_key("other"));
    }

    #[test]
    fn bullet_fired_is_not_duplicated_for_own_shots() {
        let (sync, _) = recording_sync("me");
        let mut world = WorldState::default();
        sync.apply(ServerMsg::BulletFired { bullet: bullet("a", "me") }, &mut world);
        sync.apply(ServerMsg::BulletFired { bullet: bullet("b", "other") }, &mut world);
        sync.apply(ServerMsg::BulletFired { bullet: bullet("b", "other") }, &mut world);
        assert_eq!(world.bullets.len(), 1);
        assert_eq!(world.bullets[0].id, "b");
    }

    #[test]
    fn player_updates_are_throttled_to_interval() {
        let (mut sync, sent) = recording_sync("me");
        let me = tank("me", TankKind::Player);

        let mut now = 0;
        let mut count = 0;
        for _ in 0..60 {
            if sync.maybe_send_player_update(now, &me) {
                count += 1;
            }
            now += 16;
        }
        // 60 frames of 16ms is 960ms; one send per >50ms window
        assert!(count >= 14 && count <= 20, "sent {count}");
        assert_eq!(sent.lock().len(), count);
    }

    #[test]
    fn leave_is_sent_once_after_join() {
        let (mut sync, sent) = recording_sync("me");
        sync.leave();
        assert!(sent.lock().is_empty());

        sync.join("Ace", TankClass::Basic, "endless");
        sync.leave();
        sync.leave();
        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1], ClientMsg::Leave { .. }));
    }

    #[test]
    fn missing_transport_drops_silently() {
        let mut sync = NetworkSync::new("me".into(), None);
        sync.join("Ace", TankClass::Basic, "endless");
        sync.on_local_shot(&bullet("a", "me"));
        assert!(!sync.has_transport());
    }
}
