//! # Shared Game Types
//!
//! Everything both roles need to agree on: entity state, identifiers, the
//! tuned game constants, level data and the wire protocol. The host mutates
//! these types authoritatively; every other peer only ever overwrites its
//! copy from host snapshots.
//!
//! ## Modules
//!
//! - `math`: 2D vector math used by motion, combat and pathing
//! - `ids`: per-kind id newtypes plus a type-erased `EntityId`
//! - `config`: `GameConfig`, unit and spell catalogues, character stats
//! - `controls`: `ControlState`, the directional keys held for one player
//! - `level`: map bounds, castle sites, colliders and neutral spawns
//! - `entities`: `Team`, `Player`, `Castle`, `Unit`, `Neutral` and the `Combatant` trait
//! - `protocol`: intents, host events, snapshot deltas and the bincode codec

pub mod config;
pub mod controls;
pub mod entities;
pub mod error;
pub mod ids;
pub mod level;
pub mod math;
pub mod protocol;

pub use config::{Character, CharacterStats, Faction, GameConfig, SpellId, UnitClass};
pub use controls::ControlState;
pub use entities::{Castle, Combatant, Controller, FiringAt, Neutral, Player, Team, Unit};
pub use error::{ConfigError, ProtocolError};
pub use ids::{CastleId, ClientId, EntityId, EntityKind, NeutralId, UnitId};
pub use level::{Collider, Level, NeutralKind, NeutralSpawn};
pub use math::Vector2;
pub use protocol::{ControlKey, GarrisonDirection, HostEvent, InitialData, Intent, Message, PeriodicUpdate};
