//! WebSocket protocol message definitions
//! These are the wire types for client-relay communication. Every frame is a
//! JSON object discriminated by its `type` field.

use serde::{Deserialize, Serialize};

use crate::game::entity::{Bullet, Tank, TankClass, TankId};
use crate::game::geometry::Vector2;

/// Wire decode/encode failures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Partial tank state. Absent fields are left untouched by the receiver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    pub player_id: TankId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vector2>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kills: Option<u32>,
}

impl PlayerPatch {
    /// Full patch describing `tank`
    pub fn from_tank(tank: &Tank) -> Self {
        Self {
            player_id: tank.id.clone(),
            position: Some(tank.position),
            rotation: Some(tank.rotation),
            health: Some(tank.health),
            score: Some(tank.score),
            level: Some(tank.level),
            kills: Some(tank.kills),
        }
    }

    /// Apply present fields onto `tank`; last message wins per field
    pub fn apply_to(&self, tank: &mut Tank) {
        if let Some(position) = self.position {
            tank.position = position;
        }
        if let Some(rotation) = self.rotation {
            tank.rotation = rotation;
        }
        if let Some(health) = self.health {
            tank.health = health;
        }
        if let Some(score) = self.score {
            tank.score = score;
        }
        if let Some(level) = self.level {
            tank.level = level;
        }
        if let Some(kills) = self.kills {
            tank.kills = kills;
        }
    }
}

/// A shot as announced by the shooter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotFired {
    #[serde(default)]
    pub player_id: Option<TankId>,
    pub position: Vector2,
    pub velocity: Vector2,
    #[serde(default)]
    pub damage: Option<f32>,
    #[serde(default)]
    pub size: Option<f32>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Chat line kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Chat,
    System,
}

/// Chat entry kept in room history and broadcast verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: String,
    pub player_name: String,
    pub message: String,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

/// Messages sent from client to relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Enter a room
    #[serde(rename_all = "camelCase")]
    Join {
        #[serde(default)]
        player_id: Option<TankId>,
        player_name: String,
        tank_class: TankClass,
        game_mode: String,
    },

    /// Leave the current room but keep the connection
    #[serde(rename_all = "camelCase")]
    Leave {
        #[serde(default)]
        player_id: Option<TankId>,
    },

    /// Throttled local state
    PlayerUpdate(PlayerPatch),

    /// Event-driven shot
    Shoot(ShotFired),

    #[serde(rename_all = "camelCase")]
    Chat {
        #[serde(default)]
        player_name: Option<String>,
        message: String,
        #[serde(default)]
        player_id: Option<TankId>,
    },

    Ping {
        #[serde(default)]
        timestamp: Option<u64>,
    },

    /// Cosmetic upgrade announcement
    #[serde(alias = "upgrade", rename_all = "camelCase")]
    PlayerUpgrade {
        #[serde(default)]
        player_id: Option<TankId>,
        upgrade_type: String,
    },
}

/// Messages sent from relay to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Handshake ack
    #[serde(rename_all = "camelCase")]
    Connected { player_id: String, server_time: u64 },

    /// Aggregate server statistics, UI display only
    #[serde(rename_all = "camelCase")]
    ServerStats {
        online_players: usize,
        active_games: usize,
        servers: u32,
    },

    #[serde(rename_all = "camelCase")]
    PlayerJoined { player: Tank, player_count: usize },

    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: TankId, player_count: usize },

    /// Rebroadcast of another member's patch
    PlayerUpdate(PlayerPatch),

    BulletFired { bullet: Bullet },

    /// Bulk resync of a room
    GameStateUpdate {
        tanks: Vec<Tank>,
        bullets: Vec<Bullet>,
        timestamp: u64,
    },

    ChatMessage { message: ChatEntry },

    Pong { timestamp: u64 },

    #[serde(rename_all = "camelCase")]
    PlayerUpgrade { player_id: TankId, upgrade_type: String },
}

impl ClientMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_uses_camel_case_tag_and_fields() {
        let msg = ClientMsg::decode(
            r#"{"type":"join","playerId":"abc","playerName":"Ace","tankClass":"twin","gameMode":"endless"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMsg::Join {
                player_id: Some("abc".into()),
                player_name: "Ace".into(),
                tank_class: TankClass::Twin,
                game_mode: "endless".into(),
            }
        );
    }

    #[test]
    fn player_update_patch_omits_missing_fields() {
        let msg = ClientMsg::decode(r#"{"type":"playerUpdate","playerId":"p1","rotation":1.5}"#).unwrap();
        let ClientMsg::PlayerUpdate(patch) = msg else {
            panic!("expected playerUpdate");
        };
        assert_eq!(patch.rotation, Some(1.5));
        assert!(patch.position.is_none());

        let encoded = serde_json::to_value(ServerMsg::PlayerUpdate(patch)).unwrap();
        assert_eq!(encoded, json!({"type": "playerUpdate", "playerId": "p1", "rotation": 1.5}));
    }

    #[test]
    fn legacy_upgrade_tag_is_accepted() {
        let msg = ClientMsg::decode(r#"{"type":"upgrade","upgradeType":"max-health"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::PlayerUpgrade { ref upgrade_type, .. } if upgrade_type == "max-health"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(ServerMsg::decode(r#"{"type":"teleport"}"#).is_err());
        assert!(ServerMsg::decode("not json").is_err());
    }

    #[test]
    fn server_stats_wire_shape() {
        let value = serde_json::to_value(ServerMsg::ServerStats {
            online_players: 3,
            active_games: 1,
            servers: 1,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "serverStats", "onlinePlayers": 3, "activeGames": 1, "servers": 1})
        );
    }

    #[test]
    fn chat_entry_carries_kind_as_type() {
        let entry = ChatEntry {
            id: "1".into(),
            player_name: "System".into(),
            message: "Ace joined the battle!".into(),
            timestamp: 5,
            kind: ChatKind::System,
        };
        let value = serde_json::to_value(ServerMsg::ChatMessage { message: entry }).unwrap();
        assert_eq!(value["type"], "chatMessage");
        assert_eq!(value["message"]["type"], "system");
        assert_eq!(value["message"]["playerName"], "System");
    }
}
