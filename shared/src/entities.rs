//! Entity state shared by the authoritative host and every mirror.
//!
//! One plain struct per entity kind. Cross references are ids, resolved
//! through the host's registry or the peer's mirror, never pointers.

use crate::config::{Character, Faction, GameConfig, SpellId, UnitClass};
use crate::ids::{CastleId, ClientId, EntityId, EntityKind, NeutralId, UnitId};
use crate::level::{NeutralKind, NeutralSpawn};
use crate::math::Vector2;
use serde::{Deserialize, Serialize};

/// Behaviour shared by everything that can be engaged in combat.
pub trait Combatant {
    fn entity_id(&self) -> EntityId;
    fn kind(&self) -> EntityKind;
    fn pos(&self) -> Vector2;
    fn radius(&self) -> f32;
    /// `None` for unaligned neutrals.
    fn team(&self) -> Option<usize>;
    fn health(&self) -> f32;
    fn attackable(&self) -> bool;
    fn targeted_by(&self) -> &[UnitId];
    fn targeted_by_mut(&mut self) -> &mut Vec<UnitId>;
    fn health_mut(&mut self) -> &mut f32;

    fn is_alive(&self) -> bool {
        self.health() > 0.0
    }

    /// Point on the hull an attacker standing at `from` aims for.
    fn firing_position(&self, from: Vector2) -> Vector2 {
        let offset = (from - self.pos()).normalize().scale(self.radius());
        self.pos() + offset
    }

    /// Applies damage and reports whether this call was the killing blow.
    ///
    /// Non-positive amounts and hits on dead entities are ignored, so a death
    /// is reported exactly once.
    fn receive_damage(&mut self, amount: f32) -> bool {
        if amount <= 0.0 || !self.is_alive() {
            return false;
        }
        let health = self.health_mut();
        *health -= amount;
        if *health <= 0.0 {
            *health = 0.0;
            return true;
        }
        false
    }
}

pub fn is_enemy(a: Option<usize>, b: Option<usize>) -> bool {
    a != b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub index: usize,
    pub name: String,
    pub color: u32,
    pub player_ids: Vec<ClientId>,
    pub castle_ids: Vec<CastleId>,
}

impl Team {
    pub fn new(index: usize) -> Self {
        const NAMES: [&str; 4] = ["Red", "Blue", "Green", "Gold"];
        const COLORS: [u32; 4] = [0xd03030, 0x3050d0, 0x30a040, 0xd0a020];
        Self {
            index,
            name: NAMES.get(index).map_or_else(|| format!("Team {}", index + 1), |n| n.to_string()),
            color: COLORS[index % COLORS.len()],
            player_ids: Vec::new(),
            castle_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Controller {
    /// Driven by KeyDown/KeyUp intents from the owning peer.
    Human,
    /// Driven by the host's AI state machine.
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: ClientId,
    pub name: String,
    pub faction: Faction,
    pub team: usize,
    pub controller: Controller,
    pub pos: Vector2,
    pub vel: Vector2,
    pub acc: Vector2,
    pub radius: f32,
    pub mass: f32,
    pub health: f32,
    pub max_health: f32,
    pub gold: u32,
    pub mana: f32,
    pub max_mana: f32,
    /// Movement multiplier from character stats.
    pub speed: f32,
    /// Spell multiplier from character stats.
    pub power: f32,
    pub max_vel: f32,
    pub max_acc: f32,
    pub income: u32,
    /// Timed speed spell modifier and seconds left on it.
    pub speed_modifier: f32,
    pub speed_modifier_left: f32,
    pub castle_ids: Vec<CastleId>,
    pub spells: Vec<SpellId>,
    pub targeted_by: Vec<UnitId>,
}

impl Player {
    pub fn from_character(
        id: ClientId,
        character: &Character,
        team: usize,
        pos: Vector2,
        controller: Controller,
        config: &GameConfig,
    ) -> Self {
        let attrs = config.character_attributes(&character.stats);
        Self {
            id,
            name: character.name.clone(),
            faction: character.faction,
            team,
            controller,
            pos,
            vel: Vector2::ZERO,
            acc: Vector2::ZERO,
            radius: 20.0,
            mass: 50.0 * 50.0 * 50.0,
            health: attrs.max_health,
            max_health: attrs.max_health,
            gold: config.faction_start_gold,
            mana: attrs.max_mana,
            max_mana: attrs.max_mana,
            speed: attrs.speed,
            power: attrs.power,
            max_vel: config.player_max_vel,
            max_acc: config.player_max_acc,
            income: config.player_self_income,
            speed_modifier: 0.0,
            speed_modifier_left: 0.0,
            castle_ids: Vec::new(),
            spells: Vec::new(),
            targeted_by: Vec::new(),
        }
    }

    /// Velocity cap after stats and active speed spells.
    pub fn effective_max_vel(&self) -> f32 {
        (self.max_vel * (self.speed + self.speed_modifier)).max(0.0)
    }
}

impl Combatant for Player {
    fn entity_id(&self) -> EntityId {
        self.id.entity()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Player
    }
    fn pos(&self) -> Vector2 {
        self.pos
    }
    fn radius(&self) -> f32 {
        self.radius
    }
    fn team(&self) -> Option<usize> {
        Some(self.team)
    }
    fn health(&self) -> f32 {
        self.health
    }
    fn attackable(&self) -> bool {
        true
    }
    fn targeted_by(&self) -> &[UnitId] {
        &self.targeted_by
    }
    fn targeted_by_mut(&mut self) -> &mut Vec<UnitId> {
        &mut self.targeted_by
    }
    fn health_mut(&mut self) -> &mut f32 {
        &mut self.health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Castle {
    pub id: CastleId,
    pub team: usize,
    pub owner: ClientId,
    pub pos: Vector2,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub income: u32,
    pub sq_activation_dist: f32,
    /// Players within activation range, recomputed every tick.
    pub nearby_players: Vec<ClientId>,
    pub spells_for_sale: Vec<SpellId>,
    pub targeted_by: Vec<UnitId>,
}

impl Castle {
    pub fn new(id: CastleId, team: usize, owner: ClientId, pos: Vector2, config: &GameConfig) -> Self {
        Self {
            id,
            team,
            owner,
            pos,
            radius: 20.0,
            health: config.castle_health,
            max_health: config.castle_health,
            income: config.castle_income,
            sq_activation_dist: config.sq_castle_activation_dist(),
            nearby_players: Vec::new(),
            spells_for_sale: config.castle_spells.clone(),
            targeted_by: Vec::new(),
        }
    }

    pub fn player_within_range(&self, player: &ClientId) -> bool {
        self.nearby_players.contains(player)
    }
}

impl Combatant for Castle {
    fn entity_id(&self) -> EntityId {
        self.id.entity()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Castle
    }
    fn pos(&self) -> Vector2 {
        self.pos
    }
    fn radius(&self) -> f32 {
        self.radius
    }
    fn team(&self) -> Option<usize> {
        Some(self.team)
    }
    fn health(&self) -> f32 {
        self.health
    }
    fn attackable(&self) -> bool {
        true
    }
    fn targeted_by(&self) -> &[UnitId] {
        &self.targeted_by
    }
    fn targeted_by_mut(&mut self) -> &mut Vec<UnitId> {
        &mut self.targeted_by
    }
    fn health_mut(&mut self) -> &mut f32 {
        &mut self.health
    }
}

/// An attacker's ongoing fire at one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiringAt {
    pub target: EntityId,
    /// Damage dealt per tick, ramps toward 1.0.
    pub intensity: f32,
    pub firing_position: Vector2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub class: UnitClass,
    pub owner: EntityId,
    pub owner_kind: EntityKind,
    pub leader: Option<EntityId>,
    pub team: Option<usize>,
    pub pos: Vector2,
    pub vel: Vector2,
    pub acc: Vector2,
    pub radius: f32,
    pub mass: f32,
    pub health: f32,
    pub max_health: f32,
    pub engaging: Vec<EntityId>,
    pub firing_at: Vec<FiringAt>,
    pub is_boiding: bool,
    pub is_engaging: bool,
    pub desired_pos: Option<Vector2>,
    pub targeted_by: Vec<UnitId>,
}

impl Unit {
    pub fn new(
        id: UnitId,
        class: UnitClass,
        owner: EntityId,
        owner_kind: EntityKind,
        team: Option<usize>,
        pos: Vector2,
        config: &GameConfig,
    ) -> Self {
        let stats = config.unit;
        Self {
            id,
            class,
            leader: Some(owner.clone()),
            owner,
            owner_kind,
            team,
            pos,
            vel: Vector2::ZERO,
            acc: Vector2::ZERO,
            radius: stats.radius(),
            mass: stats.mass,
            health: stats.max_health,
            max_health: stats.max_health,
            engaging: Vec::new(),
            firing_at: Vec::new(),
            is_boiding: true,
            is_engaging: false,
            desired_pos: None,
            targeted_by: Vec::new(),
        }
    }

    pub fn firing_record(&self, target: &EntityId) -> Option<&FiringAt> {
        self.firing_at.iter().find(|record| &record.target == target)
    }
}

impl Combatant for Unit {
    fn entity_id(&self) -> EntityId {
        self.id.entity()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Unit
    }
    fn pos(&self) -> Vector2 {
        self.pos
    }
    fn radius(&self) -> f32 {
        self.radius
    }
    fn team(&self) -> Option<usize> {
        self.team
    }
    fn health(&self) -> f32 {
        self.health
    }
    fn attackable(&self) -> bool {
        true
    }
    fn targeted_by(&self) -> &[UnitId] {
        &self.targeted_by
    }
    fn targeted_by_mut(&mut self) -> &mut Vec<UnitId> {
        &mut self.targeted_by
    }
    fn health_mut(&mut self) -> &mut f32 {
        &mut self.health
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neutral {
    pub id: NeutralId,
    pub kind: NeutralKind,
    pub pos: Vector2,
    pub vel: Vector2,
    pub max_vel: f32,
    pub radius: f32,
    pub health: f32,
    pub team: Option<usize>,
    pub owner: Option<ClientId>,
    pub waypoints: Vec<Vector2>,
    pub waypoint_index: usize,
    pub sq_yield_distance: f32,
    pub yield_limit: f32,
    pub yielding_to: Option<ClientId>,
    pub income: u32,
    pub targeted_by: Vec<UnitId>,
}

impl Neutral {
    pub fn from_spawn(spawn: &NeutralSpawn, config: &GameConfig) -> Self {
        let (sq_yield_distance, yield_limit, income, max_vel) = match spawn.kind {
            NeutralKind::GoldMine => (
                config.mine_yield_check_sq_dist,
                config.mine_yield_limit,
                config.mine_income,
                0.0,
            ),
            NeutralKind::RovingSwarm => (
                config.swarm_yield_check_sq_dist,
                config.swarm_yield_limit,
                0,
                config.roving_swarm_vel,
            ),
        };
        Self {
            id: NeutralId::new(spawn.id.clone()),
            kind: spawn.kind,
            pos: spawn.pos,
            vel: Vector2::ZERO,
            max_vel,
            radius: 20.0,
            health: 1.0,
            team: None,
            owner: None,
            waypoints: spawn.waypoints.clone(),
            waypoint_index: 0,
            sq_yield_distance,
            yield_limit,
            yielding_to: None,
            income,
            targeted_by: Vec::new(),
        }
    }
}

impl Combatant for Neutral {
    fn entity_id(&self) -> EntityId {
        self.id.entity()
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Neutral
    }
    fn pos(&self) -> Vector2 {
        self.pos
    }
    fn radius(&self) -> f32 {
        self.radius
    }
    fn team(&self) -> Option<usize> {
        self.team
    }
    fn health(&self) -> f32 {
        self.health
    }
    // Neutrals change hands by yielding, never by damage.
    fn attackable(&self) -> bool {
        false
    }
    fn targeted_by(&self) -> &[UnitId] {
        &self.targeted_by
    }
    fn targeted_by_mut(&mut self) -> &mut Vec<UnitId> {
        &mut self.targeted_by
    }
    fn health_mut(&mut self) -> &mut f32 {
        &mut self.health
    }
}
