//! Wire protocol between peers.
//!
//! Two disjoint families travel over the mesh:
//! - [`Intent`]s flow from any peer to the current host and ask for a state change.
//! - [`HostEvent`]s flow from the host to everyone and describe what changed.
//!
//! Delta structs follow an "absent means unchanged" rule: every optional
//! field is applied independently and `None` never resets anything.
//!
//! Messages are bincode encoded. Stream transports prefix each message with a
//! 4-byte big-endian length, see [`encode_frame`].

use crate::config::{Character, SpellId, UnitClass};
use crate::entities::{Castle, Neutral, Player, Team, Unit};
use crate::error::ProtocolError;
use crate::ids::{CastleId, ClientId, EntityId, EntityKind, NeutralId, UnitId};
use crate::level::NeutralKind;
use crate::math::Vector2;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Upper bound on a single framed message.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GarrisonDirection {
    /// Player hands units to the castle.
    Deposit,
    /// Player takes units out of the castle.
    Withdraw,
}

/// Peer to host requests. Ping and Pong are the exception and travel between any two peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    ReadyToJoin {
        character: Character,
    },
    RequestBuyUnit {
        buyer: ClientId,
        unit_class: UnitClass,
        n: u32,
        castle: CastleId,
    },
    RequestBuySpell {
        buyer: ClientId,
        spell: SpellId,
        castle: CastleId,
    },
    RequestCastSpell {
        instigator: ClientId,
        position: Vector2,
        spell: SpellId,
        cast_id: String,
    },
    RequestGarrison {
        instigator: ClientId,
        unit_class: UnitClass,
        n: u32,
        castle: CastleId,
        direction: GarrisonDirection,
    },
    KeyDown {
        control: ControlKey,
    },
    KeyUp {
        control: ControlKey,
    },
    Ping {
        code: String,
    },
    Pong {
        code: String,
    },
    /// Round trip times in milliseconds measured by the sender.
    LatencyReport {
        entries: Vec<(ClientId, u32)>,
    },
}

impl Intent {
    pub fn is_host_bound(&self) -> bool {
        !matches!(self, Intent::Ping { .. } | Intent::Pong { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialData {
    pub teams: Vec<Team>,
    pub players: Vec<Player>,
    pub castles: Vec<Castle>,
    pub neutrals: Vec<Neutral>,
    pub units: Vec<Unit>,
    pub host_priority: Vec<ClientId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerDelta {
    pub id: ClientId,
    pub pos: Option<Vector2>,
    pub vel: Option<Vector2>,
    pub acc: Option<Vector2>,
    pub health: Option<f32>,
    pub mana: Option<f32>,
    pub gold: Option<u32>,
    pub team: Option<usize>,
    pub castle_ids: Option<Vec<CastleId>>,
    pub spells: Option<Vec<SpellId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CastleDelta {
    pub id: CastleId,
    pub health: Option<f32>,
    pub owner: Option<ClientId>,
    pub team: Option<usize>,
    pub nearby_players: Option<Vec<ClientId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOwnerDelta {
    pub owner: EntityId,
    pub owner_kind: EntityKind,
    pub team: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitDelta {
    pub id: UnitId,
    pub pos: Option<Vector2>,
    pub vel: Option<Vector2>,
    pub acc: Option<Vector2>,
    pub health: Option<f32>,
    pub owner: Option<UnitOwnerDelta>,
    pub leader: Option<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeutralDelta {
    pub id: NeutralId,
    pub pos: Option<Vector2>,
    pub owner: Option<ClientId>,
    pub team: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodicUpdate {
    pub tick: u64,
    pub player_deltas: Vec<PlayerDelta>,
    pub castle_deltas: Vec<CastleDelta>,
    pub unit_deltas: Vec<UnitDelta>,
    pub neutral_deltas: Vec<NeutralDelta>,
    /// Fraction of the current day that has passed.
    pub day_phase: f32,
    pub host_priority: Vec<ClientId>,
}

/// Host to everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostEvent {
    InitialData(Box<InitialData>),
    PeriodicUpdate(PeriodicUpdate),
    UnitBought {
        buyer: ClientId,
        unit_class: UnitClass,
        n: u32,
        castle: CastleId,
        new_ids: Vec<UnitId>,
    },
    SpellBought {
        buyer: ClientId,
        castle: CastleId,
        spell: SpellId,
    },
    SpellCastConfirmed {
        instigator: ClientId,
        position: Vector2,
        spell: SpellId,
        cast_id: String,
    },
    GarrisonMoved {
        instigator: ClientId,
        castle: CastleId,
        direction: GarrisonDirection,
        unit_ids: Vec<UnitId>,
    },
    EntityDeath {
        id: EntityId,
        kind: EntityKind,
    },
    NeutralYielded {
        id: NeutralId,
        kind: NeutralKind,
        new_owner: ClientId,
    },
    Winner {
        team_name: String,
    },
    Pause,
    Resume,
}

/// Everything that crosses a transport channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// First frame on a fresh stream link, names the dialing peer.
    Hello { id: ClientId },
    Intent { sender: ClientId, intent: Intent },
    Host(HostEvent),
}

pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    serialize(message).map_err(ProtocolError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    deserialize(bytes).map_err(ProtocolError::Decode)
}

/// Encodes a message behind a big-endian length prefix.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = encode(message)?;
    check_frame_len(body.len())?;
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn check_frame_len(size: usize) -> Result<(), ProtocolError> {
    if size > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_roundtrip() {
        let message = Message::Intent {
            sender: ClientId::from("p1"),
            intent: Intent::RequestBuyUnit {
                buyer: ClientId::from("p1"),
                unit_class: UnitClass::LaserDrone,
                n: 5,
                castle: CastleId::from("c1"),
            },
        };
        let bytes = encode(&message).unwrap();
        assert_eq!(decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_frame_has_length_prefix() {
        let message = Message::Host(HostEvent::Winner {
            team_name: "Tie".to_string(),
        });
        let frame = encode_frame(&message).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(decode(&frame[4..]).unwrap(), message);
    }

    #[test]
    fn test_sparse_delta_carries_only_changes() {
        let delta = PlayerDelta {
            id: ClientId::from("p1"),
            gold: Some(500),
            ..Default::default()
        };
        assert_eq!(delta.pos, None);
        assert_eq!(delta.health, None);
        assert_eq!(CastleDelta::default().id, CastleId::default());
        assert_eq!(UnitDelta::default().owner, None);
        assert_eq!(NeutralDelta::default().id.as_str(), "");
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let result = decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        assert!(check_frame_len(MAX_FRAME_LEN).is_ok());
        assert!(matches!(
            check_frame_len(MAX_FRAME_LEN + 1),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_probe_intents_are_not_host_bound() {
        assert!(!Intent::Ping { code: "x".into() }.is_host_bound());
        assert!(Intent::KeyDown {
            control: ControlKey::Up
        }
        .is_host_bound());
    }
}
