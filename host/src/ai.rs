//! AI players
//!
//! Each AI-controlled player gets an [`AiBrain`] that runs a small priority
//! state machine on two cadences:
//! - every `state_every` ticks it picks a state, first match wins:
//!   Flee > AttackCastle > AttackPlayer > ReinforceCastle > RaiseArmy
//! - every `behaviour_every` ticks it executes the current state, which sets
//!   a steering direction (usually along an A* path) and may ask to buy units
//!
//! Between behaviour ticks the last steering direction is kept, so the player
//! accelerates every tick.
//!
//! Strength is a unit-count ratio: `defender units / attacker units`, with an
//! attacker that has no units facing a prohibitive 1000. A ratio below 1 is a
//! fight worth taking. [`reinforced_strength`] adds the strength of every
//! protector that is closer to the defender than the attacker is.

use crate::navigation::{PathFollower, PathPlanner};
use crate::registry::EntityRegistry;
use log::debug;
use shared::config::AiCadence;
use shared::{CastleId, ClientId, Combatant, EntityId, EntityKind, GameConfig, Level, UnitClass, Vector2};

const HOPELESS: f32 = 1000.0;

/// Ratio of the foe's units to the attacker's.
pub fn estimate_foe_strength(registry: &EntityRegistry, foe: &EntityId, attacker: &EntityId) -> f32 {
    let attacker_units = registry.strength_of(attacker);
    if attacker_units == 0 {
        return HOPELESS;
    }
    registry.strength_of(foe) as f32 / attacker_units as f32
}

/// Foe strength plus that of each protector standing closer to the defender than the attacker does.
pub fn reinforced_strength(
    registry: &EntityRegistry,
    defender: &EntityId,
    protectors: &[EntityId],
    attacker: &EntityId,
) -> f32 {
    let mut difficulty = estimate_foe_strength(registry, defender, attacker);
    let (Some(defender_pos), Some(attacker_pos)) = (registry.position_of(defender), registry.position_of(attacker))
    else {
        return difficulty;
    };
    let attacker_sq_dist = defender_pos.sq_dist(&attacker_pos);
    for protector in protectors {
        if protector == defender {
            continue;
        }
        if let Some(pos) = registry.position_of(protector) {
            if defender_pos.sq_dist(&pos) < attacker_sq_dist {
                difficulty += estimate_foe_strength(registry, protector, attacker);
            }
        }
    }
    difficulty
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    Flee,
    AttackCastle,
    AttackPlayer,
    ReinforceCastle,
    RaiseArmy,
}

/// Distances the AI reasons with, derived from the level size.
#[derive(Debug, Clone, Copy)]
pub struct AiSenses {
    pub visible_distance: f32,
    pub safe_player_distance: f32,
    pub safe_castle_distance: f32,
}

impl AiSenses {
    pub fn for_level(level: &Level) -> Self {
        Self {
            visible_distance: level.width.max(level.height),
            safe_player_distance: level.width / 2.0,
            safe_castle_distance: level.width / 3.0,
        }
    }
}

/// What an AI player wants to do this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AiDecision {
    pub acc: Vector2,
    /// Castle to buy one unit at, when the brain wants reinforcements and can afford them.
    pub buy_at: Option<CastleId>,
}

pub struct AiBrain {
    player: ClientId,
    state: AiState,
    engaging: Option<EntityId>,
    flee_dir: Vector2,
    target_dir: Vector2,
    follower: PathFollower,
    senses: AiSenses,
    cadence: AiCadence,
}

impl AiBrain {
    pub fn new(player: ClientId, senses: AiSenses, cadence: AiCadence) -> Self {
        Self {
            player,
            state: AiState::RaiseArmy,
            engaging: None,
            flee_dir: Vector2::ZERO,
            target_dir: Vector2::ZERO,
            follower: PathFollower::new(),
            senses,
            cadence,
        }
    }

    pub fn player(&self) -> &ClientId {
        &self.player
    }

    pub fn state(&self) -> AiState {
        self.state
    }

    pub fn engaging(&self) -> Option<&EntityId> {
        self.engaging.as_ref()
    }

    /// Runs whatever is due this tick and returns the player's acceleration.
    pub fn think(
        &mut self,
        tick: u64,
        registry: &EntityRegistry,
        planner: &PathPlanner,
        config: &GameConfig,
    ) -> AiDecision {
        let Some(me) = registry.players.get(&self.player) else {
            return AiDecision {
                acc: Vector2::ZERO,
                buy_at: None,
            };
        };
        if !me.is_alive() {
            return AiDecision {
                acc: Vector2::ZERO,
                buy_at: None,
            };
        }

        let mut wants_units = false;
        if tick % self.cadence.state_every.max(1) == 0 {
            let previous = self.state;
            self.state = self.choose_state(registry);
            if previous != self.state {
                debug!("AI {} switched from {:?} to {:?}", self.player, previous, self.state);
            }
        }
        if tick % self.cadence.behaviour_every.max(1) == 0 {
            let replan_due = tick % self.cadence.replan_every.max(1) == 0;
            wants_units = self.execute_state(registry, planner, replan_due);
        }

        let buy_at = if wants_units && me.gold >= config.unit.buy_cost {
            self.castle_in_reach(registry)
        } else {
            None
        };
        AiDecision {
            acc: self.target_dir.normalize().scale(me.max_acc),
            buy_at,
        }
    }

    fn me(&self) -> EntityId {
        self.player.entity()
    }

    fn my_team(&self, registry: &EntityRegistry) -> Option<usize> {
        registry.players.get(&self.player).map(|p| p.team)
    }

    fn my_pos(&self, registry: &EntityRegistry) -> Vector2 {
        registry.players.get(&self.player).map_or(Vector2::ZERO, |p| p.pos)
    }

    /// Living enemy players within `dist`.
    fn nearby_foes(&self, registry: &EntityRegistry, dist: f32) -> Vec<EntityId> {
        let team = self.my_team(registry);
        let pos = self.my_pos(registry);
        registry
            .players
            .values()
            .filter(|p| p.is_alive() && Some(p.team) != team && p.pos.sq_dist(&pos) <= dist * dist)
            .map(|p| p.id.entity())
            .collect()
    }

    /// Living enemy castles within `dist`.
    fn nearby_foe_castles(&self, registry: &EntityRegistry, dist: f32) -> Vec<EntityId> {
        let team = self.my_team(registry);
        let pos = self.my_pos(registry);
        registry
            .castles
            .values()
            .filter(|c| c.is_alive() && Some(c.team) != team && c.pos.sq_dist(&pos) <= dist * dist)
            .map(|c| c.id.entity())
            .collect()
    }

    fn nearest_friendly_castle(&self, registry: &EntityRegistry) -> Option<(CastleId, Vector2, f32)> {
        let team = registry.teams.get(self.my_team(registry)?)?;
        let pos = self.my_pos(registry);
        team.castle_ids
            .iter()
            .filter_map(|id| registry.castles.get(id))
            .filter(|castle| castle.is_alive())
            .min_by(|a, b| a.pos.sq_dist(&pos).total_cmp(&b.pos.sq_dist(&pos)))
            .map(|castle| (castle.id.clone(), castle.pos, castle.sq_activation_dist))
    }

    /// An owned castle the player currently stands in.
    fn castle_in_reach(&self, registry: &EntityRegistry) -> Option<CastleId> {
        let me = registry.players.get(&self.player)?;
        me.castle_ids
            .iter()
            .filter_map(|id| registry.castles.get(id))
            .find(|castle| castle.is_alive() && castle.owner == self.player && castle.player_within_range(&self.player))
            .map(|castle| castle.id.clone())
    }

    fn choose_state(&mut self, registry: &EntityRegistry) -> AiState {
        if self.should_flee(registry) {
            AiState::Flee
        } else if self.should_attack_castle(registry) {
            AiState::AttackCastle
        } else if self.should_attack_player(registry) {
            AiState::AttackPlayer
        } else if self.should_reinforce(registry) {
            AiState::ReinforceCastle
        } else {
            AiState::RaiseArmy
        }
    }

    fn should_flee(&mut self, registry: &EntityRegistry) -> bool {
        let Some(me) = registry.players.get(&self.player) else {
            return false;
        };
        let pos = me.pos;

        let attackers: Vec<Vector2> = me
            .targeted_by
            .iter()
            .filter_map(|id| registry.units.get(id))
            .filter(|unit| unit.is_alive())
            .map(|unit| unit.pos)
            .collect();
        if !attackers.is_empty() {
            self.flee_dir = attackers
                .into_iter()
                .fold(Vector2::ZERO, |dir, attacker| dir + (pos - attacker));
            return true;
        }

        let me_id = self.me();
        let mut dir = Vector2::ZERO;
        let mut difficulty = 0.0;
        let threats = self
            .nearby_foe_castles(registry, self.senses.safe_castle_distance)
            .into_iter()
            .chain(self.nearby_foes(registry, self.senses.safe_player_distance));
        for threat in threats {
            let Some(threat_pos) = registry.position_of(&threat) else {
                continue;
            };
            let d = estimate_foe_strength(registry, &threat, &me_id);
            dir += (pos - threat_pos).scale(d);
            difficulty += d;
        }
        self.flee_dir = dir;
        difficulty > 1.0
    }

    /// Picks the easiest target among `candidates`; true if it is winnable.
    fn pick_weakest(&mut self, registry: &EntityRegistry, candidates: &[EntityId], protectors: &[EntityId]) -> bool {
        let me = self.me();
        let mut easiest = 1.0;
        let mut found = None;
        for candidate in candidates {
            let difficulty = reinforced_strength(registry, candidate, protectors, &me);
            if difficulty < easiest {
                easiest = difficulty;
                found = Some(candidate.clone());
            }
        }
        if found.is_some() {
            self.engaging = found;
        }
        easiest < 1.0
    }

    fn should_attack_castle(&mut self, registry: &EntityRegistry) -> bool {
        let castles = self.nearby_foe_castles(registry, self.senses.visible_distance);
        if castles.is_empty() {
            return false;
        }
        let protectors = self.nearby_foes(registry, self.senses.visible_distance);
        self.pick_weakest(registry, &castles, &protectors)
    }

    fn should_attack_player(&mut self, registry: &EntityRegistry) -> bool {
        let foes = self.nearby_foes(registry, self.senses.visible_distance);
        if foes.is_empty() {
            return false;
        }
        let protectors = self.nearby_foe_castles(registry, self.senses.visible_distance);
        self.pick_weakest(registry, &foes, &protectors)
    }

    fn should_reinforce(&mut self, registry: &EntityRegistry) -> bool {
        let Some(team) = self.my_team(registry).and_then(|t| registry.teams.get(t)) else {
            return false;
        };
        let castles: Vec<EntityId> = team.castle_ids.iter().map(|c| c.entity()).collect();
        let guards: Vec<EntityId> = team.player_ids.iter().map(|p| p.entity()).collect();
        let foes = self.nearby_foes(registry, self.senses.visible_distance);

        let mut most_vulnerable = 1.0;
        for castle in &castles {
            for foe in &foes {
                let vulnerability = reinforced_strength(registry, castle, &guards, foe);
                if vulnerability < most_vulnerable {
                    most_vulnerable = vulnerability;
                    self.engaging = Some(castle.clone());
                }
            }
        }
        most_vulnerable < 1.0
    }

    fn head_for(&mut self, registry: &EntityRegistry, planner: &PathPlanner, target: Vector2, replan_due: bool) {
        let pos = self.my_pos(registry);
        self.target_dir = self.follower.steer(planner, pos, target, replan_due);
    }

    /// Sets the steering direction; returns whether the brain wants more units.
    fn execute_state(&mut self, registry: &EntityRegistry, planner: &PathPlanner, replan_due: bool) -> bool {
        match self.state {
            AiState::Flee => match self.nearest_friendly_castle(registry) {
                Some((_, castle_pos, _)) => {
                    self.head_for(registry, planner, castle_pos, replan_due);
                    true
                }
                None => {
                    self.target_dir = self.flee_dir.scale(self.cadence.state_every as f32);
                    false
                }
            },
            AiState::AttackCastle | AiState::AttackPlayer => {
                self.chase_engaged(registry, planner, replan_due);
                false
            }
            AiState::ReinforceCastle => {
                self.chase_engaged(registry, planner, replan_due);
                true
            }
            AiState::RaiseArmy => {
                let pos = self.my_pos(registry);
                match self.nearest_friendly_castle(registry) {
                    Some((_, castle_pos, sq_activation)) if castle_pos.sq_dist(&pos) > sq_activation => {
                        self.head_for(registry, planner, castle_pos, replan_due);
                    }
                    _ => self.target_dir = Vector2::ZERO,
                }
                true
            }
        }
    }

    fn chase_engaged(&mut self, registry: &EntityRegistry, planner: &PathPlanner, replan_due: bool) {
        let Some(target) = self.engaging.clone() else {
            return;
        };
        let Some(entity) = registry.get(&target, EntityKind::Any) else {
            return;
        };
        if entity.is_alive() {
            let target_pos = entity.pos();
            self.head_for(registry, planner, target_pos, replan_due);
        }
    }
}

/// Unit class the AI buys; there is only one.
pub const AI_UNIT_CLASS: UnitClass = UnitClass::LaserDrone;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{rng, two_player_registry};
    use assert_approx_eq::assert_approx_eq;

    fn give_units(registry: &mut EntityRegistry, owner: &str, n: usize) {
        let config = GameConfig::default();
        let pos = registry.position_of(&EntityId::from(owner)).unwrap();
        for _ in 0..n {
            registry.spawn_unit(UnitClass::LaserDrone, &EntityId::from(owner), pos, &config, &mut rng());
        }
    }

    fn brain() -> AiBrain {
        AiBrain::new(ClientId::from("p1"), AiSenses::for_level(&Level::arena()), AiCadence::default())
    }

    #[test]
    fn test_strength_ratio() {
        let mut registry = two_player_registry();
        let p1 = EntityId::from("p1");
        let p2 = EntityId::from("p2");
        assert_approx_eq!(estimate_foe_strength(&registry, &p2, &p1), HOPELESS);

        give_units(&mut registry, "p1", 4);
        give_units(&mut registry, "p2", 2);
        assert_approx_eq!(estimate_foe_strength(&registry, &p2, &p1), 0.5);
    }

    #[test]
    fn test_closer_protector_adds_strength() {
        let mut registry = two_player_registry();
        give_units(&mut registry, "p1", 4);
        give_units(&mut registry, "p2", 2);
        give_units(&mut registry, "c2", 2);
        let p1 = EntityId::from("p1");
        let c2 = EntityId::from("c2");
        let p2 = EntityId::from("p2");

        // p2 stands on its castle, p1 is 200 away
        assert_approx_eq!(reinforced_strength(&registry, &c2, &[p2.clone()], &p1), 1.0);

        registry.players.get_mut(&ClientId::from("p2")).unwrap().pos = Vector2::new(900.0, 900.0);
        assert_approx_eq!(reinforced_strength(&registry, &c2, &[p2], &p1), 0.5);
    }

    #[test]
    fn test_flees_when_targeted() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        give_units(&mut registry, "p2", 1);
        let attacker = registry.units.keys().next().cloned().unwrap();
        registry.units.get_mut(&attacker).unwrap().engaging.push(EntityId::from("p1"));
        registry.players.get_mut(&ClientId::from("p1")).unwrap().targeted_by.push(attacker);

        let mut ai = brain();
        let planner = PathPlanner::without_mesh();
        ai.think(0, &registry, &planner, &config);

        assert_eq!(ai.state(), AiState::Flee);
    }

    #[test]
    fn test_attacks_weaker_castle() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        give_units(&mut registry, "p1", 10);
        give_units(&mut registry, "p2", 2);
        // p2 wanders off so it no longer protects its castle
        registry.players.get_mut(&ClientId::from("p2")).unwrap().pos = Vector2::new(1500.0, 900.0);

        let mut ai = brain();
        let planner = PathPlanner::without_mesh();
        let decision = ai.think(0, &registry, &planner, &config);

        assert_eq!(ai.state(), AiState::AttackCastle);
        assert_eq!(ai.engaging(), Some(&EntityId::from("c2")));
        // c2 sits to the right of p1
        assert!(decision.acc.x > 0.0);
    }

    #[test]
    fn test_raise_army_buys_at_home() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        registry.update_nearby_players();
        give_units(&mut registry, "p2", 5);
        // p2 far away and both sides even enough not to flee or attack
        registry.players.get_mut(&ClientId::from("p2")).unwrap().pos = Vector2::new(1500.0, 900.0);
        registry.castles.get_mut(&shared::CastleId::from("c2")).unwrap().pos = Vector2::new(1500.0, 950.0);

        let mut ai = brain();
        let planner = PathPlanner::without_mesh();
        let decision = ai.think(0, &registry, &planner, &config);

        assert_eq!(ai.state(), AiState::RaiseArmy);
        assert_eq!(decision.buy_at, Some(shared::CastleId::from("c1")));
        assert_eq!(decision.acc, Vector2::ZERO);
    }

    #[test]
    fn test_dead_ai_is_inert() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        registry.handle_death(&EntityId::from("p1"));
        let mut ai = brain();
        let decision = ai.think(0, &registry, &PathPlanner::without_mesh(), &config);
        assert_eq!(decision.acc, Vector2::ZERO);
        assert!(decision.buy_at.is_none());
    }
}
