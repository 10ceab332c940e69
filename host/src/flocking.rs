//! Boid-style unit motion
//!
//! Each tick runs in three passes over all units:
//! 1. [`FlockingMotion::prepare`] resets acceleration, regulates speed and
//!    pulls the unit toward a desired position (its combat target's firing
//!    position, or back into the distance band around its leader)
//! 2. [`FlockingMotion::flock`] adds separation, cohesion and alignment
//!    computed from same-owner neighbours only
//! 3. [`FlockingMotion::integrate`] clamps and applies acceleration and velocity
//!
//! Passes compute from a read-only view and then write, so the order units
//! are visited in never changes the result.

use crate::registry::EntityRegistry;
use shared::config::{FlockingParams, UnitStats};
use shared::{Combatant, EntityKind, GameConfig, UnitId, Vector2};

pub struct FlockingMotion {
    params: FlockingParams,
    unit: UnitStats,
}

impl FlockingMotion {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            params: config.flocking,
            unit: config.unit,
        }
    }

    /// Engaged units aim for their first target; idle ones keep formation.
    fn desired_position(&self, registry: &EntityRegistry, unit_id: &UnitId) -> Option<Vector2> {
        let unit = registry.units.get(unit_id)?;
        if let Some(target) = unit.engaging.first() {
            return registry
                .get(target, EntityKind::Any)
                .map(|entity| entity.firing_position(unit.pos));
        }

        let leader = registry.position_of(unit.leader.as_ref()?)?;
        let delta = leader - unit.pos;
        let distance = delta.magnitude();
        let (min, max) = self.unit.desired_leader_dist;
        if distance < min {
            Some(unit.pos - delta)
        } else if distance > max {
            Some(unit.pos + delta)
        } else {
            None
        }
    }

    pub fn prepare(&self, registry: &mut EntityRegistry) {
        let plans: Vec<(UnitId, Option<Vector2>)> = registry
            .units
            .keys()
            .map(|id| (id.clone(), self.desired_position(registry, id)))
            .collect();

        for (id, desired) in plans {
            let Some(unit) = registry.units.get_mut(&id) else {
                continue;
            };
            unit.acc = Vector2::ZERO;
            unit.is_engaging = !unit.engaging.is_empty();
            unit.is_boiding = !unit.is_engaging;

            let speed = unit.vel.magnitude();
            unit.vel = unit.vel.scale(1.0 + self.unit.desired_speed - speed);

            unit.desired_pos = desired;
            if let Some(target) = desired {
                let desired_vel = target - unit.pos;
                unit.acc += desired_vel - unit.vel;
            }
        }
    }

    /// Steering contribution for one unit from its same-owner neighbours.
    fn boid_steer(&self, registry: &EntityRegistry, unit_id: &UnitId) -> Option<Vector2> {
        let me = registry.units.get(unit_id)?;
        let p = &self.params;

        let mut separation = Vector2::ZERO;
        let mut centroid = Vector2::ZERO;
        let mut mean_vel = Vector2::ZERO;
        let mut neighbours = 0usize;

        for other_id in registry.ledger().units_of(&me.owner) {
            if other_id == unit_id {
                continue;
            }
            let Some(other) = registry.units.get(other_id) else {
                continue;
            };
            let sq_dist = me.pos.sq_dist(&other.pos);
            if sq_dist < p.sq_separation_dist && sq_dist > 0.0 {
                separation += (me.pos - other.pos).scale(p.separation_strength * p.sq_separation_dist / sq_dist);
            }
            if me.is_boiding && sq_dist < p.sq_cohesion_dist && sq_dist > p.sq_separation_dist {
                centroid += other.pos;
                mean_vel += other.vel;
                neighbours += 1;
            }
        }

        let (cohesion, alignment) = if neighbours > 0 {
            let n = neighbours as f32;
            (
                (centroid.scale(1.0 / n) - me.pos).scale(p.cohesion_factor),
                (mean_vel.scale(1.0 / n) - me.vel).scale(p.align_factor),
            )
        } else {
            (Vector2::ZERO, Vector2::ZERO)
        };

        let desired_vel = cohesion + separation.scale(p.separation_factor) + alignment;
        Some(desired_vel - me.vel)
    }

    pub fn flock(&self, registry: &mut EntityRegistry) {
        let steering: Vec<(UnitId, Vector2)> = registry
            .units
            .keys()
            .filter_map(|id| self.boid_steer(registry, id).map(|s| (id.clone(), s)))
            .collect();

        for (id, steer) in steering {
            if let Some(unit) = registry.units.get_mut(&id) {
                unit.acc += steer;
            }
        }
    }

    pub fn integrate(&self, registry: &mut EntityRegistry) {
        for unit in registry.units.values_mut() {
            if !unit.is_alive() {
                continue;
            }
            unit.acc = unit.acc.limit(self.unit.max_acc);
            unit.vel = (unit.vel + unit.acc).limit(self.unit.max_vel);
            unit.pos += unit.vel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{rng, two_player_registry};
    use assert_approx_eq::assert_approx_eq;
    use shared::{EntityId, UnitClass};

    fn spawn_at(registry: &mut EntityRegistry, owner: &str, pos: Vector2) -> UnitId {
        let config = GameConfig::default();
        let id = registry
            .spawn_unit(UnitClass::LaserDrone, &EntityId::from(owner), pos, &config, &mut rng())
            .unwrap();
        let unit = registry.units.get_mut(&id).unwrap();
        unit.pos = pos;
        unit.vel = Vector2::ZERO;
        id
    }

    #[test]
    fn test_separation_pushes_same_owner_apart() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        let a = spawn_at(&mut registry, "p1", Vector2::new(100.0, 150.0));
        let b = spawn_at(&mut registry, "p1", Vector2::new(110.0, 150.0));

        motion.flock(&mut registry);

        assert!(registry.units[&a].acc.x < 0.0);
        assert!(registry.units[&b].acc.x > 0.0);
        assert_approx_eq!(registry.units[&a].acc.y, 0.0);
    }

    #[test]
    fn test_other_owners_are_ignored() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        let a = spawn_at(&mut registry, "p1", Vector2::new(100.0, 150.0));
        spawn_at(&mut registry, "p2", Vector2::new(105.0, 150.0));

        motion.flock(&mut registry);

        assert_eq!(registry.units[&a].acc, Vector2::ZERO);
    }

    #[test]
    fn test_engaged_unit_skips_cohesion() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        let a = spawn_at(&mut registry, "p1", Vector2::new(100.0, 150.0));
        // outside separation, inside cohesion range
        spawn_at(&mut registry, "p1", Vector2::new(200.0, 150.0));

        registry.units.get_mut(&a).unwrap().is_boiding = true;
        motion.flock(&mut registry);
        assert!(registry.units[&a].acc.x > 0.0);

        let unit = registry.units.get_mut(&a).unwrap();
        unit.acc = Vector2::ZERO;
        unit.is_boiding = false;
        motion.flock(&mut registry);
        assert_eq!(registry.units[&a].acc, Vector2::ZERO);
    }

    #[test]
    fn test_prepare_pulls_toward_distant_leader() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        // p1 stands at (100, 100)
        let a = spawn_at(&mut registry, "p1", Vector2::new(400.0, 100.0));

        motion.prepare(&mut registry);

        let unit = &registry.units[&a];
        assert!(unit.is_boiding);
        assert_eq!(unit.desired_pos, Some(Vector2::new(100.0, 100.0)));
        assert!(unit.acc.x < 0.0);
    }

    #[test]
    fn test_prepare_inside_band_has_no_goal() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        let a = spawn_at(&mut registry, "p1", Vector2::new(155.0, 100.0));

        motion.prepare(&mut registry);

        assert_eq!(registry.units[&a].desired_pos, None);
    }

    #[test]
    fn test_prepare_targets_firing_position() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        let a = spawn_at(&mut registry, "p1", Vector2::new(250.0, 100.0));
        registry.units.get_mut(&a).unwrap().engaging.push(EntityId::from("p2"));

        motion.prepare(&mut registry);

        let unit = &registry.units[&a];
        assert!(unit.is_engaging);
        assert!(!unit.is_boiding);
        // p2 stands at (300, 100) with radius 20
        assert_eq!(unit.desired_pos, Some(Vector2::new(280.0, 100.0)));
    }

    #[test]
    fn test_integrate_clamps() {
        let config = GameConfig::default();
        let motion = FlockingMotion::new(&config);
        let mut registry = two_player_registry();
        let a = spawn_at(&mut registry, "p1", Vector2::new(0.0, 0.0));
        registry.units.get_mut(&a).unwrap().acc = Vector2::new(10.0, 0.0);
        registry.units.get_mut(&a).unwrap().vel = Vector2::new(0.99, 0.0);

        motion.integrate(&mut registry);

        let unit = &registry.units[&a];
        assert_approx_eq!(unit.vel.magnitude(), config.unit.max_vel, 1e-5);
        assert_approx_eq!(unit.pos.x, config.unit.max_vel, 1e-5);
    }
}
