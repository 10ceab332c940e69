//! Canonical entity store for the authoritative simulation
//!
//! The registry owns every team, player, castle, neutral and unit plus the
//! [`UnitOwnershipLedger`]. It hands out ids, answers kind-agnostic lookups
//! for combat and AI code, and is the only place that physically removes
//! units, so no `engaging`/`targeted_by` reference can outlive its target.
//!
//! Players, castles and neutrals are never removed; a dead one keeps its id
//! with zero health. Ids are never handed out twice within a session.

use crate::ledger::UnitOwnershipLedger;
use log::{debug, warn};
use rand::Rng;
use shared::{
    Castle, CastleId, ClientId, Combatant, EntityId, EntityKind, GameConfig, Neutral, NeutralId,
    Player, Team, Unit, UnitClass, UnitId, Vector2,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    pub(crate) teams: Vec<Team>,
    pub(crate) players: BTreeMap<ClientId, Player>,
    pub(crate) castles: BTreeMap<CastleId, Castle>,
    pub(crate) neutrals: BTreeMap<NeutralId, Neutral>,
    pub(crate) units: BTreeMap<UnitId, Unit>,
    /// Every id ever issued, including removed units
    kinds: HashMap<EntityId, EntityKind>,
    ledger: UnitOwnershipLedger,
}

impl EntityRegistry {
    pub fn new(teams: Vec<Team>) -> Self {
        Self {
            teams,
            ..Self::default()
        }
    }

    /// Rebuilds a registry from replicated state, e.g. after host migration
    pub fn from_parts(
        teams: Vec<Team>,
        players: impl IntoIterator<Item = Player>,
        castles: impl IntoIterator<Item = Castle>,
        neutrals: impl IntoIterator<Item = Neutral>,
        units: impl IntoIterator<Item = Unit>,
    ) -> Self {
        let mut registry = Self::new(teams);
        for player in players {
            registry.kinds.insert(player.id.entity(), EntityKind::Player);
            registry.players.insert(player.id.clone(), player);
        }
        for castle in castles {
            registry.kinds.insert(castle.id.entity(), EntityKind::Castle);
            registry.castles.insert(castle.id.clone(), castle);
        }
        for neutral in neutrals {
            registry.kinds.insert(neutral.id.entity(), EntityKind::Neutral);
            registry.neutrals.insert(neutral.id.clone(), neutral);
        }
        for unit in units {
            if !unit.is_alive() {
                continue;
            }
            registry.insert_unit(unit);
        }
        registry.repair_engagements();
        registry
    }

    pub fn ledger(&self) -> &UnitOwnershipLedger {
        &self.ledger
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn players(&self) -> &BTreeMap<ClientId, Player> {
        &self.players
    }

    pub fn castles(&self) -> &BTreeMap<CastleId, Castle> {
        &self.castles
    }

    pub fn neutrals(&self) -> &BTreeMap<NeutralId, Neutral> {
        &self.neutrals
    }

    pub fn units(&self) -> &BTreeMap<UnitId, Unit> {
        &self.units
    }

    pub fn player_mut(&mut self, id: &ClientId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn castle_mut(&mut self, id: &CastleId) -> Option<&mut Castle> {
        self.castles.get_mut(id)
    }

    pub fn neutral_mut(&mut self, id: &NeutralId) -> Option<&mut Neutral> {
        self.neutrals.get_mut(id)
    }

    /// Owner changes must go through [`Self::switch_unit_owner`] so the
    /// ledger follows.
    pub fn unit_mut(&mut self, id: &UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id)
    }

    pub fn kind_of(&self, id: &EntityId) -> Option<EntityKind> {
        self.kinds.get(id).copied()
    }

    /// Whether the id was ever issued in this session
    pub fn is_known(&self, id: &str) -> bool {
        self.kinds.contains_key(id)
    }

    pub fn add_player(&mut self, player: Player) -> bool {
        let id = player.id.entity();
        if self.kinds.contains_key(&id) {
            warn!("Refusing to reuse id {} for a player", id);
            return false;
        }
        if let Some(team) = self.teams.get_mut(player.team) {
            team.player_ids.push(player.id.clone());
        }
        self.kinds.insert(id, EntityKind::Player);
        self.players.insert(player.id.clone(), player);
        true
    }

    pub fn add_castle(&mut self, castle: Castle) -> bool {
        let id = castle.id.entity();
        if self.kinds.contains_key(&id) {
            warn!("Refusing to reuse id {} for a castle", id);
            return false;
        }
        if let Some(team) = self.teams.get_mut(castle.team) {
            team.castle_ids.push(castle.id.clone());
        }
        if let Some(owner) = self.players.get_mut(&castle.owner) {
            owner.castle_ids.push(castle.id.clone());
        }
        self.kinds.insert(id, EntityKind::Castle);
        self.castles.insert(castle.id.clone(), castle);
        true
    }

    pub fn add_neutral(&mut self, neutral: Neutral) -> bool {
        let id = neutral.id.entity();
        if self.kinds.contains_key(&id) {
            return false;
        }
        self.kinds.insert(id, EntityKind::Neutral);
        self.neutrals.insert(neutral.id.clone(), neutral);
        true
    }

    /// Inserts a unit under the id it already carries, e.g. one replicated from the host
    pub fn insert_unit(&mut self, unit: Unit) -> bool {
        let id = unit.id.entity();
        if self.kinds.contains_key(&id) {
            return false;
        }
        self.kinds.insert(id, EntityKind::Unit);
        self.ledger.add(unit.id.clone(), unit.owner.clone(), unit.class);
        self.units.insert(unit.id.clone(), unit);
        true
    }

    /// Creates a unit next to its owner with a fresh id
    ///
    /// Returns None when the owner is unknown or cannot own units.
    pub fn spawn_unit(
        &mut self,
        class: UnitClass,
        owner: &EntityId,
        spawn_at: Vector2,
        config: &GameConfig,
        rng: &mut impl Rng,
    ) -> Option<UnitId> {
        let owner_kind = self.kind_of(owner)?;
        if owner_kind == EntityKind::Unit {
            return None;
        }
        let team = self.get(owner, EntityKind::Any)?.team();

        let mut id = UnitId::generate();
        while self.kinds.contains_key(id.as_str()) {
            id = UnitId::generate();
        }

        let jitter = config.unit.spawn_jitter;
        let pos = spawn_at
            + Vector2::new(
                rng.gen_range(-jitter..=jitter),
                rng.gen_range(-jitter..=jitter),
            );
        let mut unit = Unit::new(id.clone(), class, owner.clone(), owner_kind, team, pos, config);
        unit.vel = Vector2::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));

        self.insert_unit(unit);
        debug!("Spawned unit {} for {}", id, owner);
        Some(id)
    }

    /// Kind-checked immutable lookup by erased id
    pub fn get(&self, id: &EntityId, expected: EntityKind) -> Option<&dyn Combatant> {
        let kind = self.kind_of(id)?;
        if !kind.matches(expected) {
            return None;
        }
        let key = id.as_str();
        match kind {
            EntityKind::Player => self.players.get(key).map(|e| e as &dyn Combatant),
            EntityKind::Castle => self.castles.get(key).map(|e| e as &dyn Combatant),
            EntityKind::Unit => self.units.get(key).map(|e| e as &dyn Combatant),
            EntityKind::Neutral => self.neutrals.get(key).map(|e| e as &dyn Combatant),
            EntityKind::Any => None,
        }
    }

    /// Kind-checked mutable lookup by erased id
    pub fn get_mut(&mut self, id: &EntityId, expected: EntityKind) -> Option<&mut dyn Combatant> {
        let kind = self.kind_of(id)?;
        if !kind.matches(expected) {
            return None;
        }
        let key = id.as_str();
        match kind {
            EntityKind::Player => self.players.get_mut(key).map(|e| e as &mut dyn Combatant),
            EntityKind::Castle => self.castles.get_mut(key).map(|e| e as &mut dyn Combatant),
            EntityKind::Unit => self.units.get_mut(key).map(|e| e as &mut dyn Combatant),
            EntityKind::Neutral => self.neutrals.get_mut(key).map(|e| e as &mut dyn Combatant),
            EntityKind::Any => None,
        }
    }

    pub fn position_of(&self, id: &EntityId) -> Option<Vector2> {
        self.get(id, EntityKind::Any).map(|e| e.pos())
    }

    pub fn is_alive(&self, id: &EntityId) -> bool {
        self.get(id, EntityKind::Any).is_some_and(|e| e.is_alive())
    }

    /// Physically removes a unit and every reference to it
    ///
    /// Clears the unit from the ledger, from the `targeted_by` list of each
    /// target it engaged, and from the `engaging`/`firing_at` lists of each
    /// unit attacking it.
    pub fn remove_unit(&mut self, id: &UnitId) -> Option<Unit> {
        let unit = self.units.remove(id)?;
        self.ledger.remove(id);

        for target in &unit.engaging {
            if let Some(entity) = self.get_mut(target, EntityKind::Any) {
                entity.targeted_by_mut().retain(|attacker| attacker != id);
            }
        }

        let erased = id.entity();
        for attacker in &unit.targeted_by {
            if let Some(other) = self.units.get_mut(attacker) {
                other.engaging.retain(|target| target != &erased);
                other.firing_at.retain(|record| record.target != erased);
            }
        }
        debug!("Removed unit {}", id);
        Some(unit)
    }

    /// Bookkeeping after a death; units are removed, others stay as dead records
    pub fn handle_death(&mut self, id: &EntityId) -> Option<EntityKind> {
        let kind = self.kind_of(id)?;
        match kind {
            EntityKind::Unit => {
                self.remove_unit(&id.as_unit());
            }
            EntityKind::Player => {
                let player_id = id.as_client();
                if let Some(player) = self.players.get_mut(&player_id) {
                    player.health = 0.0;
                    player.vel = Vector2::ZERO;
                    player.acc = Vector2::ZERO;
                }
                for team in &mut self.teams {
                    team.player_ids.retain(|member| member != &player_id);
                }
            }
            EntityKind::Castle => {
                if let Some(castle) = self.castles.get_mut(id.as_str()) {
                    castle.health = 0.0;
                }
            }
            EntityKind::Neutral | EntityKind::Any => {}
        }
        Some(kind)
    }

    /// Hands a unit to a new owner, keeping ledger and unit fields in step
    pub fn switch_unit_owner(&mut self, unit_id: &UnitId, new_owner: &EntityId) -> bool {
        let Some(owner_kind) = self.kind_of(new_owner) else {
            return false;
        };
        let Some(team) = self.get(new_owner, EntityKind::Any).map(|e| e.team()) else {
            return false;
        };
        let Some(unit) = self.units.get_mut(unit_id) else {
            return false;
        };
        if !self.ledger.switch_owner(unit_id, new_owner.clone()) {
            return false;
        }
        unit.owner = new_owner.clone();
        unit.owner_kind = owner_kind;
        unit.leader = Some(new_owner.clone());
        unit.team = team;
        true
    }

    /// Moves a neutral, and the units it owns, onto a player's team
    pub fn transfer_neutral(&mut self, neutral_id: &NeutralId, player_id: &ClientId) -> bool {
        let Some(team) = self.players.get(player_id).map(|p| p.team) else {
            return false;
        };
        let Some(neutral) = self.neutrals.get_mut(neutral_id) else {
            return false;
        };
        neutral.owner = Some(player_id.clone());
        neutral.team = Some(team);

        let owned: Vec<UnitId> = self.ledger.units_of(&neutral_id.entity()).cloned().collect();
        for unit_id in owned {
            if let Some(unit) = self.units.get_mut(&unit_id) {
                unit.team = Some(team);
            }
        }
        true
    }

    /// Recomputes which players stand within each castle's activation range
    pub fn update_nearby_players(&mut self) {
        for castle in self.castles.values_mut() {
            castle.nearby_players = self
                .players
                .values()
                .filter(|p| p.is_alive() && p.pos.sq_dist(&castle.pos) < castle.sq_activation_dist)
                .map(|p| p.id.clone())
                .collect();
        }
    }

    /// Teams that still field a living player
    pub fn surviving_teams(&self) -> Vec<&Team> {
        self.teams.iter().filter(|team| !team.player_ids.is_empty()).collect()
    }

    /// Unit count used for strength estimates
    pub fn strength_of(&self, owner: &EntityId) -> usize {
        self.ledger.count_for(owner)
    }

    /// Checks the attacker/target bookkeeping is mirrored on both sides
    pub fn engagements_consistent(&self) -> bool {
        for unit in self.units.values() {
            for target in &unit.engaging {
                let Some(entity) = self.get(target, EntityKind::Any) else {
                    return false;
                };
                if !entity.targeted_by().contains(&unit.id) {
                    return false;
                }
            }
        }
        let erased_targets = self
            .players
            .values()
            .map(|e| e as &dyn Combatant)
            .chain(self.castles.values().map(|e| e as &dyn Combatant))
            .chain(self.neutrals.values().map(|e| e as &dyn Combatant))
            .chain(self.units.values().map(|e| e as &dyn Combatant));
        for entity in erased_targets {
            let id = entity.entity_id();
            for attacker in entity.targeted_by() {
                match self.units.get(attacker) {
                    Some(unit) if unit.engaging.contains(&id) => {}
                    _ => return false,
                }
            }
        }
        true
    }

    /// Drops one-sided engagement entries, used after rebuilding from snapshots
    fn repair_engagements(&mut self) {
        let links: Vec<(UnitId, EntityId)> = self
            .units
            .values()
            .flat_map(|u| u.engaging.iter().map(move |t| (u.id.clone(), t.clone())))
            .collect();
        for unit in self.units.values_mut() {
            unit.engaging.clear();
            unit.firing_at.clear();
        }
        for player in self.players.values_mut() {
            player.targeted_by.clear();
        }
        for castle in self.castles.values_mut() {
            castle.targeted_by.clear();
        }
        for neutral in self.neutrals.values_mut() {
            neutral.targeted_by.clear();
        }
        for unit in self.units.values_mut() {
            unit.targeted_by.clear();
        }
        for (attacker, target) in links {
            if self.get(&target, EntityKind::Any).is_none() {
                continue;
            }
            if let Some(entity) = self.get_mut(&target, EntityKind::Any) {
                entity.targeted_by_mut().push(attacker.clone());
            }
            if let Some(unit) = self.units.get_mut(&attacker) {
                unit.engaging.push(target);
            }
        }
    }
}
