//! Periodic update construction
//!
//! The host remembers the last values it broadcast for every entity and only
//! sends fields that changed since then. A field left as `None` means
//! "unchanged", never "reset". Entities nothing changed on are omitted.
//!
//! A freshly promoted host starts with an empty baseline, so its first
//! update carries every field of every entity.

use crate::registry::EntityRegistry;
use shared::protocol::{CastleDelta, NeutralDelta, PlayerDelta, UnitDelta, UnitOwnerDelta};
use shared::{Castle, CastleId, ClientId, Neutral, NeutralId, PeriodicUpdate, Player, Unit, UnitId};
use std::collections::BTreeMap;

fn changed<T: PartialEq + Clone>(now: &T, before: Option<&T>) -> Option<T> {
    match before {
        Some(previous) if previous == now => None,
        _ => Some(now.clone()),
    }
}

#[derive(Debug, Default)]
pub struct DeltaTracker {
    players: BTreeMap<ClientId, Player>,
    castles: BTreeMap<CastleId, Castle>,
    units: BTreeMap<UnitId, Unit>,
    neutrals: BTreeMap<NeutralId, Neutral>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the update for this tick and records it as the new baseline.
    pub fn build(
        &mut self,
        registry: &EntityRegistry,
        tick: u64,
        day_phase: f32,
        host_priority: Vec<ClientId>,
    ) -> PeriodicUpdate {
        let player_deltas = registry
            .players
            .values()
            .filter_map(|player| player_delta(player, self.players.get(&player.id)))
            .collect();
        let castle_deltas = registry
            .castles
            .values()
            .filter_map(|castle| castle_delta(castle, self.castles.get(&castle.id)))
            .collect();
        let unit_deltas = registry
            .units
            .values()
            .filter_map(|unit| unit_delta(unit, self.units.get(&unit.id)))
            .collect();
        let neutral_deltas = registry
            .neutrals
            .values()
            .filter_map(|neutral| neutral_delta(neutral, self.neutrals.get(&neutral.id)))
            .collect();

        self.players = registry.players.clone();
        self.castles = registry.castles.clone();
        self.units = registry.units.clone();
        self.neutrals = registry.neutrals.clone();

        PeriodicUpdate {
            tick,
            player_deltas,
            castle_deltas,
            unit_deltas,
            neutral_deltas,
            day_phase,
            host_priority,
        }
    }
}

fn player_delta(now: &Player, before: Option<&Player>) -> Option<PlayerDelta> {
    let delta = PlayerDelta {
        id: now.id.clone(),
        pos: changed(&now.pos, before.map(|p| &p.pos)),
        vel: changed(&now.vel, before.map(|p| &p.vel)),
        acc: changed(&now.acc, before.map(|p| &p.acc)),
        health: changed(&now.health, before.map(|p| &p.health)),
        mana: changed(&now.mana, before.map(|p| &p.mana)),
        gold: changed(&now.gold, before.map(|p| &p.gold)),
        team: changed(&now.team, before.map(|p| &p.team)),
        castle_ids: changed(&now.castle_ids, before.map(|p| &p.castle_ids)),
        spells: changed(&now.spells, before.map(|p| &p.spells)),
    };
    let empty = PlayerDelta {
        id: now.id.clone(),
        ..PlayerDelta::default()
    };
    (delta != empty).then_some(delta)
}

fn castle_delta(now: &Castle, before: Option<&Castle>) -> Option<CastleDelta> {
    let delta = CastleDelta {
        id: now.id.clone(),
        health: changed(&now.health, before.map(|c| &c.health)),
        owner: changed(&now.owner, before.map(|c| &c.owner)),
        team: changed(&now.team, before.map(|c| &c.team)),
        nearby_players: changed(&now.nearby_players, before.map(|c| &c.nearby_players)),
    };
    let empty = CastleDelta {
        id: now.id.clone(),
        ..CastleDelta::default()
    };
    (delta != empty).then_some(delta)
}

fn unit_delta(now: &Unit, before: Option<&Unit>) -> Option<UnitDelta> {
    let owner_changed = before.map_or(true, |u| u.owner != now.owner || u.owner_kind != now.owner_kind || u.team != now.team);
    let delta = UnitDelta {
        id: now.id.clone(),
        pos: changed(&now.pos, before.map(|u| &u.pos)),
        vel: changed(&now.vel, before.map(|u| &u.vel)),
        acc: changed(&now.acc, before.map(|u| &u.acc)),
        health: changed(&now.health, before.map(|u| &u.health)),
        owner: owner_changed.then(|| UnitOwnerDelta {
            owner: now.owner.clone(),
            owner_kind: now.owner_kind,
            team: now.team,
        }),
        leader: match (&now.leader, before.and_then(|u| u.leader.as_ref())) {
            (Some(leader), Some(previous)) if leader == previous => None,
            (leader, _) => leader.clone(),
        },
    };
    let empty = UnitDelta {
        id: now.id.clone(),
        ..UnitDelta::default()
    };
    (delta != empty).then_some(delta)
}

fn neutral_delta(now: &Neutral, before: Option<&Neutral>) -> Option<NeutralDelta> {
    let delta = NeutralDelta {
        id: now.id.clone(),
        pos: changed(&now.pos, before.map(|n| &n.pos)),
        owner: match (&now.owner, before.and_then(|n| n.owner.as_ref())) {
            (Some(owner), Some(previous)) if owner == previous => None,
            (owner, _) => owner.clone(),
        },
        team: match (now.team, before.and_then(|n| n.team)) {
            (Some(team), Some(previous)) if team == previous => None,
            (team, _) => team,
        },
    };
    let empty = NeutralDelta {
        id: now.id.clone(),
        ..NeutralDelta::default()
    };
    (delta != empty).then_some(delta)
}
