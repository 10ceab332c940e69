//! Engagement selection and damage
//!
//! Engagement is symmetric bookkeeping: when unit A engages X, A gets an
//! `engaging` entry and X gets a matching `targeted_by` entry. Both sides are
//! dropped together when X dies, switches to A's team or leaves engage range.
//!
//! Firing ramps per target: a fresh record starts at intensity 0 once the
//! target's firing position is inside fire range, then every tick the
//! intensity rises by a fixed step toward 1.0 and is dealt as damage.

use crate::registry::EntityRegistry;
use log::debug;
use shared::config::UnitStats;
use shared::entities::is_enemy;
use shared::{Combatant, EntityId, EntityKind, FiringAt, GameConfig, UnitId, Vector2};

/// An entity whose health crossed zero during a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Death {
    pub id: EntityId,
    pub kind: EntityKind,
}

pub struct CombatEngine {
    stats: UnitStats,
}

impl CombatEngine {
    pub fn new(config: &GameConfig) -> Self {
        Self { stats: config.unit }
    }

    /// Engagement followed by firing; returns the deaths caused this tick.
    pub fn run(&self, registry: &mut EntityRegistry) -> Vec<Death> {
        self.engage(registry);
        self.fire(registry)
    }

    fn sq_firing_distance(registry: &EntityRegistry, from: Vector2, target: &EntityId) -> Option<f32> {
        registry
            .get(target, EntityKind::Any)
            .map(|entity| from.sq_dist(&entity.firing_position(from)))
    }

    /// Whether `me` may engage `other` right now.
    fn can_engage(&self, registry: &EntityRegistry, me: &UnitId, other: &EntityId) -> bool {
        let Some(unit) = registry.units.get(me) else {
            return false;
        };
        if other.as_str() == me.as_str() || unit.engaging.contains(other) {
            return false;
        }
        let Some(target) = registry.get(other, EntityKind::Any) else {
            return false;
        };
        if !target.is_alive() || !target.attackable() || !is_enemy(unit.team, target.team()) {
            return false;
        }
        unit.pos.sq_dist(&target.firing_position(unit.pos)) <= self.stats.sq_engage_radius
    }

    /// Candidate targets in scan order: each enemy side's players, castles and
    /// neutrals, each followed by the units it owns.
    fn candidates(registry: &EntityRegistry, team: Option<usize>) -> Vec<EntityId> {
        let mut owners = Vec::new();
        for side in &registry.teams {
            if !is_enemy(team, Some(side.index)) {
                continue;
            }
            owners.extend(side.player_ids.iter().map(|p| p.entity()));
            owners.extend(side.castle_ids.iter().map(|c| c.entity()));
        }
        owners.extend(
            registry
                .neutrals
                .values()
                .filter(|n| is_enemy(team, n.team))
                .map(|n| n.id.entity()),
        );

        let mut out = Vec::new();
        for owner in owners {
            let units: Vec<EntityId> = registry.ledger().units_of(&owner).map(|u| u.entity()).collect();
            out.push(owner);
            out.extend(units);
        }
        out
    }

    pub fn engage(&self, registry: &mut EntityRegistry) {
        let ids: Vec<UnitId> = registry.units.keys().cloned().collect();
        for id in ids {
            let Some(unit) = registry.units.get(&id) else {
                continue;
            };
            if !unit.is_alive() {
                continue;
            }
            let (pos, team) = (unit.pos, unit.team);

            let stale: Vec<EntityId> = unit
                .engaging
                .iter()
                .filter(|target| {
                    let keep = registry.get(target, EntityKind::Any).is_some_and(|entity| {
                        entity.is_alive()
                            && is_enemy(team, entity.team())
                            && Self::sq_firing_distance(registry, pos, target)
                                .is_some_and(|d| d < self.stats.sq_engage_radius)
                    });
                    !keep
                })
                .cloned()
                .collect();
            for target in &stale {
                disengage(registry, &id, target);
            }

            let engaged = registry.units.get(&id).map_or(0, |u| u.engaging.len());
            if engaged >= self.stats.max_targets {
                continue;
            }

            let mut slots = self.stats.max_targets - engaged;
            for candidate in Self::candidates(registry, team) {
                if slots == 0 {
                    break;
                }
                if self.can_engage(registry, &id, &candidate) {
                    engage(registry, &id, &candidate);
                    slots -= 1;
                }
            }
        }
    }

    pub fn fire(&self, registry: &mut EntityRegistry) -> Vec<Death> {
        let mut deaths = Vec::new();
        let ids: Vec<UnitId> = registry.units.keys().cloned().collect();

        for id in ids {
            let Some(unit) = registry.units.get(&id) else {
                continue;
            };
            if !unit.is_alive() {
                continue;
            }
            let pos = unit.pos;

            // out of range or dead targets lose their ramp
            let kept: Vec<FiringAt> = unit
                .firing_at
                .iter()
                .filter(|record| {
                    registry.get(&record.target, EntityKind::Any).is_some_and(|target| {
                        target.is_alive()
                            && pos.sq_dist(&target.firing_position(pos)) < self.stats.sq_fire_radius
                    })
                })
                .cloned()
                .collect();
            let engaging = unit.engaging.clone();

            let mut records = kept;
            let mut hits: Vec<(EntityId, f32)> = Vec::new();
            for target in &engaging {
                let Some(entity) = registry.get(target, EntityKind::Any) else {
                    continue;
                };
                let firing_position = entity.firing_position(pos);
                match records.iter_mut().find(|record| &record.target == target) {
                    Some(record) => {
                        record.intensity = (record.intensity + self.stats.intensity_ramp).min(1.0);
                        record.firing_position = firing_position;
                        hits.push((target.clone(), record.intensity));
                    }
                    None => {
                        if pos.sq_dist(&firing_position) < self.stats.sq_fire_radius {
                            records.push(FiringAt {
                                target: target.clone(),
                                intensity: 0.0,
                                firing_position,
                            });
                        }
                    }
                }
            }

            if let Some(unit) = registry.units.get_mut(&id) {
                unit.firing_at = records;
            }
            for (target, amount) in hits {
                if let Some(entity) = registry.get_mut(&target, EntityKind::Any) {
                    if entity.receive_damage(amount) {
                        debug!("{} destroyed by {}", target, id);
                        deaths.push(Death {
                            id: target,
                            kind: entity.kind(),
                        });
                    }
                }
            }
        }
        deaths
    }
}

fn engage(registry: &mut EntityRegistry, attacker: &UnitId, target: &EntityId) {
    if let Some(unit) = registry.units.get_mut(attacker) {
        unit.engaging.push(target.clone());
    }
    if let Some(entity) = registry.get_mut(target, EntityKind::Any) {
        entity.targeted_by_mut().push(attacker.clone());
    }
}

fn disengage(registry: &mut EntityRegistry, attacker: &UnitId, target: &EntityId) {
    if let Some(unit) = registry.units.get_mut(attacker) {
        unit.engaging.retain(|t| t != target);
    }
    if let Some(entity) = registry.get_mut(target, EntityKind::Any) {
        entity.targeted_by_mut().retain(|a| a != attacker);
    }
}
