//! Intent validation and application
//!
//! Handling an intent is split in two:
//! 1. [`validate`] reads the world and turns an intent into an [`Action`], or
//!    into nothing when the intent is not allowed. It never mutates anything,
//!    so a rejected intent leaves no trace.
//! 2. [`apply`] performs a validated action and reports what happened as host
//!    events plus any deaths it caused.
//!
//! Spell casts are also exposed through [`validate_cast`], which says why a
//! cast was refused so the caller gets a [`CastOutcome`] back synchronously.

use crate::combat::Death;
use crate::navigation::PathPlanner;
use crate::registry::EntityRegistry;
use log::{debug, info};
use rand::Rng;
use shared::config::SpellEffect;
use shared::entities::is_enemy;
use shared::{
    CastleId, ClientId, Combatant, ControlKey, Controller, EntityId, EntityKind, GameConfig, GarrisonDirection,
    HostEvent, Intent, SpellId, UnitClass, UnitId, Vector2,
};
use std::collections::HashSet;

/// A validated state change, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    BuyUnits {
        buyer: ClientId,
        class: UnitClass,
        n: u32,
        castle: CastleId,
    },
    BuySpell {
        buyer: ClientId,
        spell: SpellId,
        castle: CastleId,
    },
    CastSpell {
        instigator: ClientId,
        position: Vector2,
        spell: SpellId,
        cast_id: String,
    },
    Garrison {
        instigator: ClientId,
        castle: CastleId,
        direction: GarrisonDirection,
        units: Vec<UnitId>,
    },
    Control {
        player: ClientId,
        key: ControlKey,
        pressed: bool,
    },
    ReportLatency {
        reporter: ClientId,
        entries: Vec<(ClientId, u32)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastRejection {
    DuplicateCast,
    NotInstigator,
    NotAlive,
    SpellNotOwned,
    NotEnoughMana,
    OutOfRange,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOutcome {
    Accepted,
    Rejected(CastRejection),
}

/// Read-only view of everything validation looks at.
pub struct IntentView<'a> {
    pub registry: &'a EntityRegistry,
    pub config: &'a GameConfig,
    pub planner: &'a PathPlanner,
    pub seen_casts: &'a HashSet<String>,
}

/// Turns an intent into an action, or `None` when it must be dropped.
pub fn validate(view: &IntentView<'_>, sender: &ClientId, intent: &Intent) -> Option<Action> {
    let action = match intent {
        Intent::RequestBuyUnit {
            buyer,
            unit_class,
            n,
            castle,
        } => validate_buy_units(view, sender, buyer, *unit_class, *n, castle),
        Intent::RequestBuySpell { buyer, spell, castle } => validate_buy_spell(view, sender, buyer, *spell, castle),
        Intent::RequestCastSpell {
            instigator,
            position,
            spell,
            cast_id,
        } => validate_cast(view, sender, instigator, *position, *spell, cast_id).ok(),
        Intent::RequestGarrison {
            instigator,
            unit_class,
            n,
            castle,
            direction,
        } => validate_garrison(view, sender, instigator, *unit_class, *n, castle, *direction),
        Intent::KeyDown { control } => validate_control(view, sender, *control, true),
        Intent::KeyUp { control } => validate_control(view, sender, *control, false),
        Intent::LatencyReport { entries } => Some(Action::ReportLatency {
            reporter: sender.clone(),
            entries: entries.clone(),
        }),
        Intent::ReadyToJoin { .. } | Intent::Ping { .. } | Intent::Pong { .. } => None,
    };
    if action.is_none() {
        debug!("Rejected intent from {}: {:?}", sender, intent);
    }
    action
}

fn living_player<'a>(view: &'a IntentView<'_>, id: &ClientId) -> Option<&'a shared::Player> {
    view.registry.players.get(id).filter(|player| player.is_alive())
}

fn validate_buy_units(
    view: &IntentView<'_>,
    sender: &ClientId,
    buyer: &ClientId,
    class: UnitClass,
    n: u32,
    castle_id: &CastleId,
) -> Option<Action> {
    if sender != buyer || n == 0 {
        return None;
    }
    let player = living_player(view, buyer)?;
    let castle = view.registry.castles.get(castle_id)?;
    if !castle.is_alive() || castle.owner != *buyer || !castle.player_within_range(buyer) {
        return None;
    }
    let cost = u64::from(view.config.unit.buy_cost) * u64::from(n);
    if u64::from(player.gold) < cost {
        return None;
    }
    Some(Action::BuyUnits {
        buyer: buyer.clone(),
        class,
        n,
        castle: castle_id.clone(),
    })
}

fn validate_buy_spell(
    view: &IntentView<'_>,
    sender: &ClientId,
    buyer: &ClientId,
    spell: SpellId,
    castle_id: &CastleId,
) -> Option<Action> {
    if sender != buyer {
        return None;
    }
    let player = living_player(view, buyer)?;
    let castle = view.registry.castles.get(castle_id)?;
    if !castle.is_alive() || !castle.player_within_range(buyer) || !castle.spells_for_sale.contains(&spell) {
        return None;
    }
    if player.spells.contains(&spell) || player.gold < spell.stats().buy_cost {
        return None;
    }
    Some(Action::BuySpell {
        buyer: buyer.clone(),
        spell,
        castle: castle_id.clone(),
    })
}

/// Cast validation that reports the reason for a refusal.
pub fn validate_cast(
    view: &IntentView<'_>,
    sender: &ClientId,
    instigator: &ClientId,
    position: Vector2,
    spell: SpellId,
    cast_id: &str,
) -> Result<Action, CastRejection> {
    if view.seen_casts.contains(cast_id) {
        return Err(CastRejection::DuplicateCast);
    }
    if sender != instigator {
        return Err(CastRejection::NotInstigator);
    }
    let player = living_player(view, instigator).ok_or(CastRejection::NotAlive)?;
    if !player.spells.contains(&spell) {
        return Err(CastRejection::SpellNotOwned);
    }
    let stats = spell.stats();
    if player.mana < stats.cast_cost {
        return Err(CastRejection::NotEnoughMana);
    }
    if player.pos.sq_dist(&position) > stats.cast_range * stats.cast_range {
        return Err(CastRejection::OutOfRange);
    }
    if stats.effect == SpellEffect::Teleport && !view.planner.is_walkable(position) {
        return Err(CastRejection::Unreachable);
    }
    Ok(Action::CastSpell {
        instigator: instigator.clone(),
        position,
        spell,
        cast_id: cast_id.to_string(),
    })
}

fn validate_garrison(
    view: &IntentView<'_>,
    sender: &ClientId,
    instigator: &ClientId,
    class: UnitClass,
    n: u32,
    castle_id: &CastleId,
    direction: GarrisonDirection,
) -> Option<Action> {
    if sender != instigator || n == 0 {
        return None;
    }
    living_player(view, instigator)?;
    let castle = view.registry.castles.get(castle_id)?;
    if !castle.is_alive() || castle.owner != *instigator || !castle.player_within_range(instigator) {
        return None;
    }
    let source = match direction {
        GarrisonDirection::Deposit => instigator.entity(),
        GarrisonDirection::Withdraw => castle_id.entity(),
    };
    let units: Vec<UnitId> = view
        .registry
        .ledger()
        .units_of_class(&source, class)
        .take(n as usize)
        .cloned()
        .collect();
    if units.len() < n as usize {
        return None;
    }
    Some(Action::Garrison {
        instigator: instigator.clone(),
        castle: castle_id.clone(),
        direction,
        units,
    })
}

fn validate_control(view: &IntentView<'_>, sender: &ClientId, key: ControlKey, pressed: bool) -> Option<Action> {
    let player = view.registry.players.get(sender)?;
    if player.controller != Controller::Human {
        return None;
    }
    Some(Action::Control {
        player: sender.clone(),
        key,
        pressed,
    })
}

/// Result of applying one action.
#[derive(Debug, Default)]
pub struct Applied {
    pub events: Vec<HostEvent>,
    pub deaths: Vec<Death>,
}

/// Applies a world-changing action.
///
/// Control and latency actions do not touch the registry and are left to the
/// caller; they produce nothing here.
pub fn apply(
    registry: &mut EntityRegistry,
    config: &GameConfig,
    rng: &mut impl Rng,
    seen_casts: &mut HashSet<String>,
    action: Action,
) -> Applied {
    let mut applied = Applied::default();
    match action {
        Action::BuyUnits { buyer, class, n, castle } => {
            let Some(spawn_at) = registry.castles.get(&castle).map(|c| c.pos) else {
                return applied;
            };
            if let Some(player) = registry.players.get_mut(&buyer) {
                player.gold = player.gold.saturating_sub(config.unit.buy_cost.saturating_mul(n));
            }
            let owner = buyer.entity();
            let new_ids: Vec<UnitId> = (0..n)
                .filter_map(|_| registry.spawn_unit(class, &owner, spawn_at, config, rng))
                .collect();
            info!("{} bought {} units at {}", buyer, new_ids.len(), castle);
            applied.events.push(HostEvent::UnitBought {
                buyer,
                unit_class: class,
                n,
                castle,
                new_ids,
            });
        }
        Action::BuySpell { buyer, spell, castle } => {
            let Some(player) = registry.players.get_mut(&buyer) else {
                return applied;
            };
            player.gold = player.gold.saturating_sub(spell.stats().buy_cost);
            player.spells.push(spell);
            info!("{} bought {:?} at {}", buyer, spell, castle);
            applied.events.push(HostEvent::SpellBought { buyer, castle, spell });
        }
        Action::CastSpell {
            instigator,
            position,
            spell,
            cast_id,
        } => {
            seen_casts.insert(cast_id.clone());
            applied.deaths = cast(registry, &instigator, position, spell);
            applied.events.push(HostEvent::SpellCastConfirmed {
                instigator,
                position,
                spell,
                cast_id,
            });
        }
        Action::Garrison {
            instigator,
            castle,
            direction,
            units,
        } => {
            let target = match direction {
                GarrisonDirection::Deposit => castle.entity(),
                GarrisonDirection::Withdraw => instigator.entity(),
            };
            let moved: Vec<UnitId> = units
                .into_iter()
                .filter(|unit| registry.switch_unit_owner(unit, &target))
                .collect();
            debug!("{} moved {} units {:?} {}", instigator, moved.len(), direction, castle);
            applied.events.push(HostEvent::GarrisonMoved {
                instigator,
                castle,
                direction,
                unit_ids: moved,
            });
        }
        Action::Control { .. } | Action::ReportLatency { .. } => {}
    }
    applied
}

/// Spends mana and applies a spell's effect around `position`.
fn cast(registry: &mut EntityRegistry, instigator: &ClientId, position: Vector2, spell: SpellId) -> Vec<Death> {
    let stats = spell.stats();
    let Some(caster) = registry.players.get_mut(instigator) else {
        return Vec::new();
    };
    caster.mana -= stats.cast_cost;
    let team = Some(caster.team);
    let power = caster.power;
    let sq_range = stats.effect_range * stats.effect_range;
    let mut deaths = Vec::new();

    match stats.effect {
        SpellEffect::Damage => {
            let victims: Vec<EntityId> = registry
                .players
                .values()
                .map(|e| e as &dyn Combatant)
                .chain(registry.castles.values().map(|e| e as &dyn Combatant))
                .chain(registry.units.values().map(|e| e as &dyn Combatant))
                .filter(|e| e.is_alive() && e.attackable() && is_enemy(team, e.team()))
                .filter(|e| e.pos().sq_dist(&position) <= sq_range)
                .map(|e| e.entity_id())
                .collect();
            for victim in victims {
                if let Some(entity) = registry.get_mut(&victim, EntityKind::Any) {
                    if entity.receive_damage(stats.amount * power) {
                        deaths.push(Death {
                            kind: entity.kind(),
                            id: victim,
                        });
                    }
                }
            }
        }
        SpellEffect::Speed => {
            // speed ups land on friends, slow downs on foes
            let on_friends = stats.amount > 0.0;
            for player in registry.players.values_mut() {
                let friendly = !is_enemy(team, Some(player.team));
                if player.is_alive() && friendly == on_friends && player.pos.sq_dist(&position) <= sq_range {
                    player.speed_modifier = stats.amount;
                    player.speed_modifier_left = stats.duration;
                }
            }
        }
        SpellEffect::Teleport => {
            if let Some(caster) = registry.players.get_mut(instigator) {
                caster.pos = position;
                caster.vel = Vector2::ZERO;
            }
        }
    }
    info!("{} cast {:?} at ({:.0}, {:.0})", instigator, spell, position.x, position.y);
    deaths
}
