//! Replicated copy of the host's world
//!
//! Every peer, the host included, keeps a [`ReplicatedMirror`] and feeds it
//! each host event it receives. The mirror never decides anything; it only
//! copies what the host reports:
//! - `InitialData` replaces the whole world
//! - `PeriodicUpdate` sets the fields present in each delta, in the order
//!   players, castles, units, neutrals
//! - purchase, garrison, death and yield events patch the entities they name
//!
//! Fields are assigned, never accumulated, so applying the same update twice
//! leaves the same state as applying it once. An absent field is left alone.
//!
//! When the local peer is promoted to host, [`ReplicatedMirror::snapshot`]
//! is what the new authoritative simulation starts from.

use host::{EntityRegistry, WorldSnapshot};
use log::{debug, info, warn};
use shared::protocol::{CastleDelta, NeutralDelta, PlayerDelta, UnitDelta};
use shared::{
    CastleId, ClientId, Combatant, EntityKind, GameConfig, GarrisonDirection, HostEvent, InitialData, PeriodicUpdate,
    Unit,
};
use std::collections::HashSet;

pub struct ReplicatedMirror {
    config: GameConfig,
    registry: EntityRegistry,
    tick: u64,
    day_phase: f32,
    bootstrapped: bool,
    paused: bool,
    winner: Option<String>,
    confirmed_casts: HashSet<String>,
}

impl ReplicatedMirror {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            registry: EntityRegistry::default(),
            tick: 0,
            day_phase: 0.0,
            bootstrapped: false,
            paused: true,
            winner: None,
            confirmed_casts: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn day_phase(&self) -> f32 {
        self.day_phase
    }

    /// Whether initial data has arrived.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn seen_casts(&self) -> &HashSet<String> {
        &self.confirmed_casts
    }

    /// An owned, living castle `player` currently stands in.
    pub fn castle_in_range(&self, player: &ClientId) -> Option<CastleId> {
        self.registry
            .castles()
            .values()
            .find(|castle| castle.is_alive() && castle.owner == *player && castle.player_within_range(player))
            .map(|castle| castle.id.clone())
    }

    pub fn apply(&mut self, event: &HostEvent) {
        match event {
            HostEvent::InitialData(data) => self.apply_initial(data),
            HostEvent::PeriodicUpdate(update) => self.apply_update(update),
            HostEvent::UnitBought {
                buyer,
                unit_class,
                castle,
                new_ids,
                ..
            } => {
                let Some(spawn_at) = self.registry.castles().get(castle).map(|c| c.pos) else {
                    warn!("Units bought at unknown castle {}", castle);
                    return;
                };
                let team = self.registry.players().get(buyer).map(|p| p.team);
                for id in new_ids {
                    if self.registry.is_known(id.as_str()) {
                        continue;
                    }
                    let unit = Unit::new(
                        id.clone(),
                        *unit_class,
                        buyer.entity(),
                        EntityKind::Player,
                        team,
                        spawn_at,
                        &self.config,
                    );
                    self.registry.insert_unit(unit);
                }
            }
            HostEvent::SpellBought { buyer, spell, .. } => {
                if let Some(player) = self.registry.player_mut(buyer) {
                    if !player.spells.contains(spell) {
                        player.spells.push(*spell);
                    }
                }
            }
            HostEvent::SpellCastConfirmed { cast_id, .. } => {
                self.confirmed_casts.insert(cast_id.clone());
            }
            HostEvent::GarrisonMoved {
                instigator,
                castle,
                direction,
                unit_ids,
            } => {
                let new_owner = match direction {
                    GarrisonDirection::Deposit => castle.entity(),
                    GarrisonDirection::Withdraw => instigator.entity(),
                };
                for unit in unit_ids {
                    if !self.registry.switch_unit_owner(unit, &new_owner) {
                        debug!("Garrison move of unknown unit {}", unit);
                    }
                }
            }
            HostEvent::EntityDeath { id, .. } => {
                if self.registry.handle_death(id).is_none() {
                    debug!("Death of unknown entity {}", id);
                }
            }
            HostEvent::NeutralYielded { id, new_owner, .. } => {
                if !self.registry.transfer_neutral(id, new_owner) {
                    debug!("Yield of {} to unknown {}", id, new_owner);
                }
            }
            HostEvent::Winner { team_name } => {
                info!("Winner: {}", team_name);
                self.winner = Some(team_name.clone());
            }
            HostEvent::Pause => self.paused = true,
            HostEvent::Resume => self.paused = false,
        }
    }

    fn apply_initial(&mut self, data: &InitialData) {
        self.registry = EntityRegistry::from_parts(
            data.teams.clone(),
            data.players.iter().cloned(),
            data.castles.iter().cloned(),
            data.neutrals.iter().cloned(),
            data.units.iter().cloned(),
        );
        self.bootstrapped = true;
        self.winner = None;
        info!(
            "World received: {} players, {} castles, {} units",
            self.registry.players().len(),
            self.registry.castles().len(),
            self.registry.units().len()
        );
    }

    fn apply_update(&mut self, update: &PeriodicUpdate) {
        for delta in &update.player_deltas {
            self.apply_player(delta);
        }
        for delta in &update.castle_deltas {
            self.apply_castle(delta);
        }
        for delta in &update.unit_deltas {
            self.apply_unit(delta);
        }
        for delta in &update.neutral_deltas {
            self.apply_neutral(delta);
        }
        self.tick = update.tick;
        self.day_phase = update.day_phase;
    }

    fn apply_player(&mut self, delta: &PlayerDelta) {
        let Some(player) = self.registry.player_mut(&delta.id) else {
            debug!("Update for unknown player {}", delta.id);
            return;
        };
        if let Some(pos) = delta.pos {
            player.pos = pos;
        }
        if let Some(vel) = delta.vel {
            player.vel = vel;
        }
        if let Some(acc) = delta.acc {
            player.acc = acc;
        }
        if let Some(health) = delta.health {
            player.health = health;
        }
        if let Some(mana) = delta.mana {
            player.mana = mana;
        }
        if let Some(gold) = delta.gold {
            player.gold = gold;
        }
        if let Some(team) = delta.team {
            player.team = team;
        }
        if let Some(castle_ids) = &delta.castle_ids {
            player.castle_ids = castle_ids.clone();
        }
        if let Some(spells) = &delta.spells {
            player.spells = spells.clone();
        }
    }

    fn apply_castle(&mut self, delta: &CastleDelta) {
        let Some(castle) = self.registry.castle_mut(&delta.id) else {
            debug!("Update for unknown castle {}", delta.id);
            return;
        };
        if let Some(health) = delta.health {
            castle.health = health;
        }
        if let Some(owner) = &delta.owner {
            castle.owner = owner.clone();
        }
        if let Some(team) = delta.team {
            castle.team = team;
        }
        if let Some(nearby) = &delta.nearby_players {
            castle.nearby_players = nearby.clone();
        }
    }

    fn apply_unit(&mut self, delta: &UnitDelta) {
        if let Some(owner) = &delta.owner {
            let current = self.registry.units().get(&delta.id).map(|u| u.owner.clone());
            if current.as_ref().is_some_and(|o| *o != owner.owner)
                && !self.registry.switch_unit_owner(&delta.id, &owner.owner)
            {
                warn!("Unit {} moved to unknown owner {}", delta.id, owner.owner);
            }
        }
        let Some(unit) = self.registry.unit_mut(&delta.id) else {
            debug!("Update for unknown unit {}", delta.id);
            return;
        };
        if let Some(pos) = delta.pos {
            unit.pos = pos;
        }
        if let Some(vel) = delta.vel {
            unit.vel = vel;
        }
        if let Some(acc) = delta.acc {
            unit.acc = acc;
        }
        if let Some(health) = delta.health {
            unit.health = health;
        }
        if let Some(owner) = &delta.owner {
            unit.owner_kind = owner.owner_kind;
            unit.team = owner.team;
        }
        if let Some(leader) = &delta.leader {
            unit.leader = Some(leader.clone());
        }
    }

    fn apply_neutral(&mut self, delta: &NeutralDelta) {
        let Some(neutral) = self.registry.neutral_mut(&delta.id) else {
            debug!("Update for unknown neutral {}", delta.id);
            return;
        };
        if let Some(pos) = delta.pos {
            neutral.pos = pos;
        }
        if let Some(owner) = &delta.owner {
            neutral.owner = Some(owner.clone());
        }
        if let Some(team) = delta.team {
            neutral.team = Some(team);
        }
    }

    /// The replicated world in the shape a promoted host starts from.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            teams: self.registry.teams().to_vec(),
            players: self.registry.players().values().cloned().collect(),
            castles: self.registry.castles().values().cloned().collect(),
            neutrals: self.registry.neutrals().values().cloned().collect(),
            units: self.registry.units().values().cloned().collect(),
            day_elapsed: self.day_phase * self.config.day_length,
            tick: self.tick,
        }
    }
}
