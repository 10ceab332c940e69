//! Whole-session scenarios run against the authoritative simulation
//!
//! Each test seats human players through the normal join flow, adjusts the
//! world where a scenario needs a particular setup, then drives ticks and
//! inspects the host events that would be broadcast.

use host::{AuthoritativeSimulation, HostSettings, Phase};
use shared::{
    Character, ClientId, Combatant, EntityId, EntityKind, GameConfig, HostEvent, Intent, Level, NeutralId, Unit,
    UnitClass, UnitId, Vector2,
};

fn started(humans: &[&str]) -> AuthoritativeSimulation {
    let mut sim = AuthoritativeSimulation::new(HostSettings::new(GameConfig::default(), Level::arena()));
    for id in humans {
        sim.add_peer(ClientId::from(*id));
    }
    for id in humans {
        sim.submit(
            ClientId::from(*id),
            Intent::ReadyToJoin {
                character: Character::ai_default(),
            },
        );
    }
    assert_eq!(sim.phase(), Phase::Running);
    sim.take_events();
    sim
}

/// Gives `owner` a fresh drone at `pos`.
fn drone_for(sim: &mut AuthoritativeSimulation, owner: &ClientId, pos: Vector2) -> UnitId {
    let config = sim.config().clone();
    let team = sim.registry().players()[owner].team;
    let id = UnitId::generate();
    let unit = Unit::new(
        id.clone(),
        UnitClass::LaserDrone,
        owner.entity(),
        EntityKind::Player,
        Some(team),
        pos,
        &config,
    );
    assert!(sim.registry_mut().insert_unit(unit));
    id
}

mod economy_scenarios {
    use super::*;

    /// Buying five drones at 100 gold each from an owned castle
    #[test]
    fn five_drones_cost_five_hundred_gold() {
        let mut sim = started(&["a", "b"]);
        let a = ClientId::from("a");
        sim.registry_mut().player_mut(&a).unwrap().gold = 1000;
        let castle = sim
            .registry()
            .castles()
            .values()
            .find(|castle| castle.owner == a)
            .map(|castle| castle.id.clone())
            .unwrap();

        sim.submit(
            a.clone(),
            Intent::RequestBuyUnit {
                buyer: a.clone(),
                unit_class: UnitClass::LaserDrone,
                n: 5,
                castle: castle.clone(),
            },
        );
        let events = sim.tick();

        let new_ids = events
            .iter()
            .find_map(|event| match event {
                HostEvent::UnitBought {
                    buyer,
                    n,
                    castle: at,
                    new_ids,
                    ..
                } if *buyer == a => {
                    assert_eq!(*n, 5);
                    assert_eq!(*at, castle);
                    Some(new_ids.clone())
                }
                _ => None,
            })
            .expect("purchase was not confirmed");

        assert_eq!(new_ids.len(), 5);
        for id in &new_ids {
            assert_eq!(sim.registry().units()[id].owner, a.entity());
        }
        assert_eq!(sim.registry().players()[&a].gold, 500);
        assert_eq!(sim.registry().strength_of(&a.entity()), 5);
    }

    /// A purchase the buyer cannot afford changes nothing
    #[test]
    fn unaffordable_purchase_is_dropped() {
        let mut sim = started(&["a", "b"]);
        let a = ClientId::from("a");
        sim.registry_mut().player_mut(&a).unwrap().gold = 250;
        let castle = sim
            .registry()
            .castles()
            .values()
            .find(|castle| castle.owner == a)
            .map(|castle| castle.id.clone())
            .unwrap();

        sim.submit(
            a.clone(),
            Intent::RequestBuyUnit {
                buyer: a.clone(),
                unit_class: UnitClass::LaserDrone,
                n: 5,
                castle,
            },
        );
        let events = sim.tick();

        assert!(!events.iter().any(|event| matches!(event, HostEvent::UnitBought { .. })));
        assert_eq!(sim.registry().players()[&a].gold, 250);
        assert_eq!(sim.registry().strength_of(&a.entity()), 0);
    }
}

mod outcome_scenarios {
    use super::*;

    /// Both sole survivors die in the same tick
    #[test]
    fn simultaneous_last_deaths_are_a_tie() {
        let mut sim = started(&["a", "b"]);
        let a = ClientId::from("a");
        let b = ClientId::from("b");

        // each player has an enemy drone sitting on top of it
        let a_pos = sim.registry().players()[&a].pos;
        let b_pos = sim.registry().players()[&b].pos;
        drone_for(&mut sim, &b, a_pos);
        drone_for(&mut sim, &a, b_pos);
        for id in [&a, &b] {
            sim.registry_mut().player_mut(id).unwrap().health = 0.005;
        }

        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(sim.tick());
            if sim.phase() == Phase::Finished {
                break;
            }
        }

        let winners: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                HostEvent::Winner { team_name } => Some(team_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(winners, vec!["Tie"]);
        let deaths = events
            .iter()
            .filter(|event| matches!(event, HostEvent::EntityDeath { kind: EntityKind::Player, .. }))
            .count();
        assert_eq!(deaths, 2);
        assert_eq!(sim.phase(), Phase::Finished);
        assert!(events.iter().any(|event| matches!(event, HostEvent::Pause)));
    }

    /// A lone survivor's team wins when the other player leaves
    #[test]
    fn forfeit_hands_the_win_to_the_other_team() {
        let mut sim = started(&["a", "b"]);
        let a = ClientId::from("a");
        let a_team = sim.registry().players()[&a].team;
        let expected = sim.registry().teams()[a_team].name.clone();

        sim.handle_disconnect(&ClientId::from("b"));
        let events = sim.take_events();

        assert!(events.contains(&HostEvent::Winner { team_name: expected }));
        assert!(!sim.registry().players()[&ClientId::from("b")].is_alive());
    }

    /// Nothing that happens after the result can announce another one
    #[test]
    fn result_is_announced_once() {
        let mut sim = started(&["a", "b"]);
        sim.handle_disconnect(&ClientId::from("b"));
        let first = sim.take_events();
        assert_eq!(
            first.iter().filter(|event| matches!(event, HostEvent::Winner { .. })).count(),
            1
        );
        assert_eq!(sim.phase(), Phase::Finished);

        sim.handle_disconnect(&ClientId::from("a"));
        let mut later = sim.take_events();
        for _ in 0..5 {
            later.extend(sim.tick());
        }

        assert!(!later.iter().any(|event| matches!(event, HostEvent::Winner { .. })));
        assert!(!later.contains(&HostEvent::Pause));
        assert_eq!(sim.phase(), Phase::Finished);
    }
}

mod neutral_scenarios {
    use super::*;

    /// An overwhelming army next to a swarm makes it change sides once
    #[test]
    fn swarm_yields_exactly_once() {
        let mut sim = started(&["a", "b"]);
        let a = ClientId::from("a");
        let swarm = NeutralId::from("swarm-north");
        let swarm_pos = sim.registry().neutrals()[&swarm].pos;

        sim.registry_mut().player_mut(&a).unwrap().pos = swarm_pos;
        for _ in 0..12 {
            drone_for(&mut sim, &a, swarm_pos);
        }

        let mut yields = Vec::new();
        for _ in 0..30 {
            let swarm_pos = sim.registry().neutrals()[&swarm].pos;
            if let Some(player) = sim.registry_mut().player_mut(&a) {
                player.pos = swarm_pos;
                player.vel = Vector2::ZERO;
            }
            for event in sim.tick() {
                if let HostEvent::NeutralYielded { id, new_owner, .. } = event {
                    if id == swarm {
                        yields.push(new_owner);
                    }
                }
            }
        }

        assert_eq!(yields, vec![a.clone()]);
        let team = sim.registry().players()[&a].team;
        let neutral = &sim.registry().neutrals()[&swarm];
        assert_eq!(neutral.team, Some(team));
        assert_eq!(neutral.owner, Some(a.clone()));

        // former enemies no longer fight each other
        let swarm_entity: EntityId = swarm.entity();
        for unit in sim.registry().units().values().filter(|unit| unit.owner == a.entity()) {
            assert!(!unit.engaging.contains(&swarm_entity));
            for target in &unit.engaging {
                assert!(sim.registry().units().values().all(|other| other.id.entity() != *target
                    || other.owner != swarm_entity));
            }
        }
        assert!(sim.registry().engagements_consistent());
    }
}
