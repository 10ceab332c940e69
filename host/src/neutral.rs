//! Neutral roaming and the yield check
//!
//! Roving swarms walk their waypoint loop; gold mines stay put. Every tick
//! each neutral looks for a living player within its yield distance whose
//! strength relative to the neutral exceeds its yield limit, and goes over to
//! the first one found. Players already on the neutral's team are skipped, so
//! a given owner triggers the yield exactly once.

use crate::ai::estimate_foe_strength;
use crate::registry::EntityRegistry;
use log::info;
use shared::{ClientId, Combatant, NeutralId, NeutralKind};

/// A completed change of allegiance.
#[derive(Debug, Clone, PartialEq)]
pub struct NeutralYield {
    pub id: NeutralId,
    pub kind: NeutralKind,
    pub new_owner: ClientId,
}

/// Moves roving neutrals one step along their waypoint loop.
pub fn roam(registry: &mut EntityRegistry) {
    for neutral in registry.neutrals.values_mut() {
        if neutral.waypoints.is_empty() || neutral.max_vel <= 0.0 {
            continue;
        }
        let index = neutral.waypoint_index % neutral.waypoints.len();
        if neutral.pos.sq_dist(&neutral.waypoints[index]) < 1.0 {
            neutral.waypoint_index = (index + 1) % neutral.waypoints.len();
        }
        let waypoint = neutral.waypoints[neutral.waypoint_index];
        neutral.vel = (waypoint - neutral.pos).limit(neutral.max_vel);
        neutral.pos += neutral.vel;
    }
}

fn yield_candidate(registry: &EntityRegistry, neutral_id: &NeutralId) -> Option<ClientId> {
    let neutral = registry.neutrals.get(neutral_id)?;
    registry
        .players
        .values()
        .filter(|player| player.is_alive() && Some(player.team) != neutral.team)
        .filter(|player| neutral.pos.sq_dist(&player.pos) < neutral.sq_yield_distance)
        .find(|player| {
            estimate_foe_strength(registry, &player.id.entity(), &neutral.id.entity()) > neutral.yield_limit
        })
        .map(|player| player.id.clone())
}

/// Runs the yield check for every neutral and applies any transfers.
pub fn check_yields(registry: &mut EntityRegistry) -> Vec<NeutralYield> {
    let ids: Vec<NeutralId> = registry.neutrals.keys().cloned().collect();
    let mut yields = Vec::new();

    for id in ids {
        let Some(player) = yield_candidate(registry, &id) else {
            continue;
        };
        if !registry.transfer_neutral(&id, &player) {
            continue;
        }
        let Some(neutral) = registry.neutrals.get_mut(&id) else {
            continue;
        };
        neutral.yielding_to = Some(player.clone());
        info!("Neutral {} yielded to {}", id, player);
        yields.push(NeutralYield {
            id,
            kind: neutral.kind,
            new_owner: player,
        });
    }
    yields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{rng, two_player_registry};
    use shared::{EntityId, GameConfig, Neutral, NeutralSpawn, UnitClass, Vector2};

    fn heading(registry: &EntityRegistry, id: &NeutralId) -> Option<Vector2> {
        let neutral = registry.neutrals.get(id)?;
        neutral.waypoints.get(neutral.waypoint_index).copied()
    }

    fn add_neutral(registry: &mut EntityRegistry, kind: NeutralKind, pos: Vector2, waypoints: Vec<Vector2>) -> NeutralId {
        let neutral = Neutral::from_spawn(
            &NeutralSpawn {
                id: "n1".to_string(),
                kind,
                pos,
                waypoints,
                units: 0,
            },
            &GameConfig::default(),
        );
        let id = neutral.id.clone();
        registry.add_neutral(neutral);
        id
    }

    #[test]
    fn test_roams_to_next_waypoint() {
        let mut registry = two_player_registry();
        let id = add_neutral(
            &mut registry,
            NeutralKind::RovingSwarm,
            Vector2::new(0.0, 500.0),
            vec![Vector2::new(0.0, 500.0), Vector2::new(10.0, 500.0)],
        );

        roam(&mut registry);
        assert_eq!(heading(&registry, &id), Some(Vector2::new(10.0, 500.0)));
        assert!(registry.neutrals[&id].pos.x > 0.0);

        for _ in 0..40 {
            roam(&mut registry);
        }
        // back around the loop toward the first waypoint
        assert!(registry.neutrals[&id].pos.x <= 10.0);
    }

    #[test]
    fn test_mines_stay_put() {
        let mut registry = two_player_registry();
        let id = add_neutral(&mut registry, NeutralKind::GoldMine, Vector2::new(5.0, 5.0), Vec::new());
        roam(&mut registry);
        assert_eq!(registry.neutrals[&id].pos, Vector2::new(5.0, 5.0));
    }

    #[test]
    fn test_yields_once_to_stronger_player() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        // p1 stands at (100, 100)
        let id = add_neutral(&mut registry, NeutralKind::RovingSwarm, Vector2::new(100.0, 200.0), Vec::new());
        let guard = registry
            .spawn_unit(UnitClass::LaserDrone, &id.entity(), Vector2::new(100.0, 200.0), &config, &mut rng())
            .unwrap();
        for _ in 0..3 {
            registry.spawn_unit(UnitClass::LaserDrone, &EntityId::from("p1"), Vector2::new(100.0, 100.0), &config, &mut rng());
        }

        let first = check_yields(&mut registry);
        let second = check_yields(&mut registry);

        assert_eq!(
            first,
            vec![NeutralYield {
                id: id.clone(),
                kind: NeutralKind::RovingSwarm,
                new_owner: ClientId::from("p1"),
            }]
        );
        assert!(second.is_empty());
        assert_eq!(registry.neutrals[&id].team, Some(0));
        assert_eq!(registry.units[&guard].team, Some(0));
    }

    #[test]
    fn test_weaker_player_does_not_capture() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        let id = add_neutral(&mut registry, NeutralKind::RovingSwarm, Vector2::new(100.0, 200.0), Vec::new());
        for _ in 0..2 {
            registry.spawn_unit(UnitClass::LaserDrone, &id.entity(), Vector2::new(100.0, 200.0), &config, &mut rng());
        }
        registry.spawn_unit(UnitClass::LaserDrone, &EntityId::from("p1"), Vector2::new(100.0, 100.0), &config, &mut rng());

        assert!(check_yields(&mut registry).is_empty());
        assert_eq!(registry.neutrals[&id].team, None);
    }
}
